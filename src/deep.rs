// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Path-addressed access to content, and merging staged changes into it.
//!
//! Content is a plain [`serde_json::Value`]. Reads walk objects by key and arrays by index;
//! writes create missing intermediate objects. [`merge_changes`] folds a change tree onto
//! content and is what commits a [`Changeset`](crate::Changeset).
use crate::{
    leaf::Change,
    path,
    tree::{Node, Tree},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// How far past the end of an array an index write may land. The gap is padded with `null`.
pub const MAX_PADDING: usize = 1024;

/// Whether writing at `index` stays within [`MAX_PADDING`] of an array of `len` items.
pub fn index_in_reach(index: usize, len: usize) -> bool {
    index.saturating_sub(len) <= MAX_PADDING
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Reads the value at `path`.
///
/// Returns `None` as soon as an intermediate is missing, `null`, or a scalar.
///
/// ```rust
/// # use changeset::deep;
/// # use serde_json::json;
/// let content = json!({"org": {"usa": {"ny": "NY"}}, "tags": ["a", "b"]});
/// assert_eq!(deep::get(&content, "org.usa.ny"), Some(&json!("NY")));
/// assert_eq!(deep::get(&content, "tags.1"), Some(&json!("b")));
/// assert_eq!(deep::get(&content, "org.eu.de"), None);
/// ```
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains(path::SEPARATOR) && !path::is_unsafe(path) {
        return step(root, path);
    }
    let segments = path::split(path);
    if segments.is_empty() {
        return None;
    }
    let mut current = root;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Returns `true` if `value` can hold nested entries.
pub fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Writes `value` at `path`.
///
/// Missing intermediates, and intermediates that are neither objects nor arrays holding the
/// addressed index, are replaced by empty objects. If both the existing and the new value are
/// objects the new entries are assigned onto the existing object; otherwise the new value
/// overwrites. An index more than [`MAX_PADDING`] past the end of an array is not written.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments = path::split(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        if step(current, segment).is_none_or(|v| !is_container(v)) {
            assign(current, segment, Value::Object(Map::new()));
        }
        let Some(next) = step_mut(current, segment) else {
            return;
        };
        current = next;
    }
    assign(current, last, value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("replaced by an object above"),
    }
}

fn assign(parent: &mut Value, key: &str, value: Value) {
    if let Value::Array(items) = parent {
        if let Ok(i) = key.parse::<usize>() {
            match i.cmp(&items.len()) {
                std::cmp::Ordering::Less => items[i] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater if index_in_reach(i, items.len()) => {
                    items.resize(i, Value::Null);
                    items.push(value);
                }
                std::cmp::Ordering::Greater => {
                    warn!(target: "changeset::merge", index = i, len = items.len(), "skipping write too far past the end of an array");
                }
            }
            return;
        }
    }
    let map = ensure_object(parent);
    match value {
        Value::Object(incoming) => {
            if let Some(Value::Object(existing)) = map.get_mut(key) {
                existing.extend(incoming);
            } else {
                map.insert(key.to_string(), Value::Object(incoming));
            }
        }
        value => {
            map.insert(key.to_string(), value);
        }
    }
}

/// Removes the value at `path`, returning it.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let segments = path::split(path);
    let (last, parents) = segments.split_last()?;
    let mut current = root;
    for segment in parents {
        current = step_mut(current, segment)?;
    }
    match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => {
            let i = last.parse::<usize>().ok()?;
            (i < items.len()).then(|| items.remove(i))
        }
        _ => None,
    }
}

/// Structural equality used to decide whether a write changes anything.
///
/// With the `chrono` feature, two strings that both parse as RFC 3339 datetimes are equal iff
/// they denote the same instant.
pub fn is_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y || same_instant(x, y),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| is_equal(v, other)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| is_equal(a, b))
        }
        _ => a == b,
    }
}

#[cfg(feature = "chrono")]
fn same_instant(a: &str, b: &str) -> bool {
    use chrono::DateTime;
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(not(feature = "chrono"))]
fn same_instant(_: &str, _: &str) -> bool {
    false
}

/// Decides which keys of the content may be merged into directly.
///
/// [`merge_changes`] consults the policy for every staged key. A key that is not mergeable is
/// never descended into; instead the nearest staged value beneath it is handed to
/// [`MergePolicy::safe_set`]. All other writes also go through `safe_set`, so a host can route
/// them through its own accessors.
pub trait MergePolicy {
    /// Returns `true` if `key` of `target` may be merged into directly.
    fn is_mergeable(&self, target: &Map<String, Value>, key: &str) -> bool {
        let _ = target;
        !path::is_unsafe(key)
    }

    /// Assigns `value` to `key` of `target`.
    fn safe_set(&self, target: &mut Map<String, Value>, key: &str, value: Value) {
        target.insert(key.to_string(), value);
    }
}

/// Denies the [unsafe keys](path::UNSAFE_KEYS) and assigns everything else directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl MergePolicy for DefaultPolicy {}

/// Unwraps a change tree into plain values.
pub fn normalize(changes: &Tree<Change>) -> Value {
    changes.to_value(|change| change.value().clone())
}

/// Unwraps one node of a change tree into a plain value.
pub fn normalize_node(node: &Node<Change>) -> Value {
    node.to_value(&|change: &Change| change.value().clone())
}

/// Lays a staged node over `base`, the value the content holds at the same path.
///
/// A branch over an object is merged into it and a branch over an array writes into it by
/// index. Anything else is replaced by the staged value.
pub fn overlay(base: &mut Value, node: &Node<Change>, policy: &dyn MergePolicy) {
    match (base, node) {
        (Value::Object(existing), Node::Branch(children)) => merge_map(existing, children, policy),
        (base, Node::Branch(children)) if base.is_array() => write_indexed(base, children),
        (base, node) => *base = normalize_node(node),
    }
}

/// Writes the leaves of `children` into `array` by index.
fn write_indexed(array: &mut Value, children: &BTreeMap<String, Node<Change>>) {
    for (sub_path, change) in Tree::leaves_of(children) {
        set(array, &sub_path, change.value().clone());
    }
}

/// Merges `changes` onto `target`, which becomes an object if it is not one already.
///
/// Objects on both sides are merged recursively. Staged leaves replace whatever the content
/// holds, including whole arrays: arrays are never merged position by position. A branch staged
/// over an array writes its indexed leaves into a copy of that array, which then replaces it.
pub fn merge_changes(target: &mut Value, changes: &Tree<Change>, policy: &dyn MergePolicy) {
    merge_map(ensure_object(target), changes.root(), policy);
}

fn merge_map(
    target: &mut Map<String, Value>,
    changes: &BTreeMap<String, Node<Change>>,
    policy: &dyn MergePolicy,
) {
    for (key, node) in changes {
        if !policy.is_mergeable(target, key) {
            if let Some(change) = node.first_leaf() {
                trace!(target: "changeset::merge", key = %key, "merging unsafe key through policy");
                policy.safe_set(target, key, change.value().clone());
            }
            continue;
        }
        match node {
            Node::Leaf(change) => policy.safe_set(target, key, change.value().clone()),
            Node::Branch(children) => match target.get_mut(key) {
                Some(Value::Object(existing)) => merge_map(existing, children, policy),
                Some(Value::Array(items)) => {
                    let mut replaced = Value::Array(items.clone());
                    write_indexed(&mut replaced, children);
                    policy.safe_set(target, key, replaced);
                }
                _ => policy.safe_set(target, key, normalize_node(node)),
            },
        }
    }
}
