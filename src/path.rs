// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Dotted key paths.
//!
//! A path such as `"org.usa.ny"` addresses a value nested inside mappings (and, for reads, arrays
//! by index). Segments that could redirect object internals in a host object model are dropped
//! while splitting, so no staged tree or merge ever sees them.

use smallvec::SmallVec;

/// Keys that are never honoured as path segments.
pub const UNSAFE_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Segment separator.
pub const SEPARATOR: char = '.';

/// The segments of a path. Most paths are shallow, so these rarely spill to the heap.
pub type Segments<'a> = SmallVec<[&'a str; 4]>;

/// Returns `true` if `key` is one of the [`UNSAFE_KEYS`].
pub fn is_unsafe(key: &str) -> bool {
    UNSAFE_KEYS.contains(&key)
}

/// Splits `path` into its segments, dropping unsafe ones.
///
/// ```rust
/// # use changeset::path;
/// assert_eq!(path::split("org.usa.ny").as_slice(), ["org", "usa", "ny"]);
/// assert_eq!(path::split("user.__proto__.admin").as_slice(), ["user", "admin"]);
/// assert!(path::split("").is_empty());
/// ```
pub fn split(path: &str) -> Segments<'_> {
    if path.is_empty() {
        return SmallVec::new();
    }
    path.split(SEPARATOR).filter(|s| !is_unsafe(s)).collect()
}

/// Joins segments back into a dotted path.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(segment.as_ref());
    }
    out
}

/// Splits off the first segment, returning it and the (possibly absent) remainder.
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once(SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Re-serializes `path` with unsafe segments removed.
pub fn sanitize(path: &str) -> String {
    join(&split(path))
}

/// Returns `true` if `ancestor` is a strict dotted prefix of `path`.
///
/// `"org"` is an ancestor of `"org.usa"`, but not of `"organization"`.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join() {
        let segments = split("a.b.c");
        assert_eq!(segments.as_slice(), ["a", "b", "c"]);
        assert_eq!(join(&segments), "a.b.c");
        assert_eq!(split("single").as_slice(), ["single"]);
    }

    #[test]
    fn unsafe_segments_are_filtered() {
        assert_eq!(split("constructor.prototype.x").as_slice(), ["x"]);
        assert_eq!(sanitize("a.__proto__.b"), "a.b");
        assert!(split("__proto__").is_empty());
    }

    #[test]
    fn first_segment() {
        assert_eq!(split_first("a.b.c"), ("a", Some("b.c")));
        assert_eq!(split_first("a"), ("a", None));
    }

    #[test]
    fn ancestry() {
        assert!(is_ancestor("org", "org.usa"));
        assert!(is_ancestor("org.usa", "org.usa.ny"));
        assert!(!is_ancestor("org", "organization"));
        assert!(!is_ancestor("org", "org"));
    }

    #[quickcheck]
    fn join_inverts_split_on_safe_paths(segments: Vec<String>) -> bool {
        let segments: Vec<String> = segments
            .into_iter()
            .filter(|s| !s.is_empty() && !s.contains(SEPARATOR) && !is_unsafe(s))
            .collect();
        let path = join(&segments);
        split(&path).iter().map(|s| s.to_string()).collect::<Vec<_>>() == segments
    }
}
