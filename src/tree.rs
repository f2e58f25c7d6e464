// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Staged trees.
//!
//! Both the change tree and the error tree of a [`Changeset`](crate::Changeset) are a [`Tree`]:
//! a mapping from key segments to either a leaf or a further mapping. Leaves are tagged explicitly,
//! so user data that happens to carry a `value` field is never confused with a staged leaf.
//!
//! A leaf and a branch never coexist under the same key. Writing below a leaf replaces the leaf
//! with a fresh branch, and writing a leaf over a branch discards everything below it.
use crate::{Error, path};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A node of a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node<L> {
    Leaf(L),
    Branch(BTreeMap<String, Node<L>>),
}

impl<L> Node<L> {
    /// Turns this node into an empty branch if it is a leaf, and returns the branch.
    fn make_branch(&mut self) -> &mut BTreeMap<String, Node<L>> {
        if let Node::Leaf(_) = self {
            *self = Node::Branch(BTreeMap::new());
        }
        match self {
            Node::Branch(map) => map,
            Node::Leaf(_) => unreachable!("leaf was replaced by a branch above"),
        }
    }

    /// Converts the node to a plain value, mapping each leaf with `f`.
    pub fn to_value(&self, f: &impl Fn(&L) -> Value) -> Value {
        match self {
            Node::Leaf(leaf) => f(leaf),
            Node::Branch(map) => Value::Object(
                map.iter()
                    .map(|(k, node)| (k.clone(), node.to_value(f)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Returns the first leaf found by a depth-first walk in key order.
    pub fn first_leaf(&self) -> Option<&L> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(map) => map.values().find_map(Node::first_leaf),
        }
    }

    fn count_leaves(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Branch(map) => map.values().map(Node::count_leaves).sum(),
        }
    }

    fn collect_leaves<'a>(&'a self, prefix: &mut Vec<&'a str>, out: &mut Vec<(String, &'a L)>) {
        match self {
            Node::Leaf(leaf) => out.push((path::join(prefix), leaf)),
            Node::Branch(map) => {
                for (key, node) in map {
                    prefix.push(key);
                    node.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
        }
    }
}

/// A tree of staged leaves addressed by dotted paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<L> {
    root: BTreeMap<String, Node<L>>,
}

impl<L> Default for Tree<L> {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }
}

impl<L> Tree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from flat `(dotted key, leaf)` pairs.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AmbiguousSnapshot`] if one key is a dotted ancestor of another, since
    /// the nesting of such a set is ambiguous.
    pub fn from_flat<I>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, L)>,
    {
        let entries: Vec<(String, L)> = entries.into_iter().collect();
        ensure_disjoint(entries.iter().map(|(k, _)| k.as_str()))?;
        let mut tree = Self::new();
        for (key, leaf) in entries {
            tree.insert(&key, leaf);
        }
        Ok(tree)
    }

    /// The top-level entries.
    pub fn root(&self) -> &BTreeMap<String, Node<L>> {
        &self.root
    }

    /// Number of leaves, counted recursively.
    pub fn len(&self) -> usize {
        self.root.values().map(Node::count_leaves).sum()
    }

    /// Returns `true` if the tree holds no leaves at any depth.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Returns the node stored exactly at `path`.
    pub fn get(&self, path: &str) -> Option<&Node<L>> {
        let segments = path::split(path);
        let (first, rest) = segments.split_first()?;
        let mut node = self.root.get(*first)?;
        for segment in rest {
            match node {
                Node::Branch(map) => node = map.get(*segment)?,
                Node::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Returns the leaf stored exactly at `path`.
    pub fn leaf(&self, path: &str) -> Option<&L> {
        match self.get(path)? {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }

    /// Finds a leaf stored at a strict ancestor of `path`.
    ///
    /// Returns the leaf together with the remainder of `path` below it. Since a leaf never has
    /// descendants, the first leaf met on the way down is also the longest matching ancestor.
    pub fn ancestor_leaf(&self, path: &str) -> Option<(&L, String)> {
        let segments = path::split(path);
        let mut map = &self.root;
        for (i, segment) in segments.iter().enumerate() {
            match map.get(*segment)? {
                Node::Leaf(leaf) if i + 1 < segments.len() => {
                    return Some((leaf, path::join(&segments[i + 1..])));
                }
                Node::Leaf(_) => return None,
                Node::Branch(next) => map = next,
            }
        }
        None
    }

    /// Stores `node` at `path`.
    ///
    /// Missing intermediates are created, and intermediate leaves are replaced by fresh branches.
    /// A branch written over an existing branch is merged into it key by key (shallowly);
    /// anything else overwrites.
    pub fn set(&mut self, path: &str, node: Node<L>) {
        let segments = path::split(path);
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut map = &mut self.root;
        for segment in parents {
            map = map
                .entry(segment.to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()))
                .make_branch();
        }
        let last = last.to_string();
        match node {
            Node::Branch(incoming) => {
                if let Some(Node::Branch(existing)) = map.get_mut(&last) {
                    existing.extend(incoming);
                } else {
                    map.insert(last, Node::Branch(incoming));
                }
            }
            leaf => {
                map.insert(last, leaf);
            }
        }
    }

    /// Stores a leaf at `path`.
    pub fn insert(&mut self, path: &str, leaf: L) {
        self.set(path, Node::Leaf(leaf));
    }

    /// Removes whatever is stored at `path`.
    ///
    /// If a leaf sits at an ancestor of `path`, that leaf is removed instead, since it covers
    /// `path`. Branches left empty by the removal are pruned.
    pub fn remove(&mut self, path: &str) -> Option<Node<L>> {
        let segments = path::split(path);
        remove_in(&mut self.root, &segments)
    }

    /// Returns the leaf at `path` mutably.
    pub fn leaf_mut(&mut self, path: &str) -> Option<&mut L> {
        let segments = path::split(path);
        let (last, parents) = segments.split_last()?;
        let mut map = &mut self.root;
        for segment in parents {
            match map.get_mut(*segment)? {
                Node::Branch(next) => map = next,
                Node::Leaf(_) => return None,
            }
        }
        match map.get_mut(*last)? {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }

    /// All leaves with their dotted paths, in key order.
    pub fn leaves(&self) -> Vec<(String, &L)> {
        Self::leaves_of(&self.root)
    }

    /// All leaves below `map` with their dotted paths relative to it, in key order.
    pub fn leaves_of(map: &BTreeMap<String, Node<L>>) -> Vec<(String, &L)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        for (key, node) in map {
            prefix.push(key.as_str());
            node.collect_leaves(&mut prefix, &mut out);
            prefix.pop();
        }
        out
    }

    /// Keeps only the top-level keys for which `keep` returns `true`.
    pub fn retain_top(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.root.retain(|k, _| keep(k));
    }

    /// Deep-merges `other` into this tree. Where both sides hold a branch the merge recurses;
    /// otherwise `other` wins.
    pub fn merge(mut self, other: Tree<L>) -> Tree<L> {
        merge_maps(&mut self.root, other.root);
        self
    }

    /// Converts the tree to a plain JSON object, mapping each leaf with `f`.
    pub fn to_value(&self, f: impl Fn(&L) -> Value) -> Value {
        Value::Object(
            self.root
                .iter()
                .map(|(k, node)| (k.clone(), node.to_value(&f)))
                .collect(),
        )
    }
}

fn remove_in<L>(map: &mut BTreeMap<String, Node<L>>, segments: &[&str]) -> Option<Node<L>> {
    let (first, rest) = segments.split_first()?;
    match map.get_mut(*first)? {
        Node::Branch(child) if !rest.is_empty() => {
            let removed = remove_in(child, rest);
            if child.is_empty() {
                map.remove(*first);
            }
            removed
        }
        _ => map.remove(*first),
    }
}

fn merge_maps<L>(into: &mut BTreeMap<String, Node<L>>, from: BTreeMap<String, Node<L>>) {
    for (key, node) in from {
        match node {
            Node::Branch(incoming) => {
                if let Some(Node::Branch(existing)) = into.get_mut(&key) {
                    merge_maps(existing, incoming);
                } else {
                    into.insert(key, Node::Branch(incoming));
                }
            }
            leaf => {
                into.insert(key, leaf);
            }
        }
    }
}

/// Asserts that no key in `keys` is a dotted ancestor of another.
pub fn ensure_disjoint<'a>(keys: impl IntoIterator<Item = &'a str>) -> Result<(), Error> {
    let keys: BTreeSet<&str> = keys.into_iter().collect();
    for key in &keys {
        let overlaps = key
            .match_indices(path::SEPARATOR)
            .any(|(i, _)| keys.contains(&key[..i]));
        if overlaps {
            return Err(Error::AmbiguousSnapshot {
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(entries: &[(&str, i64)]) -> Tree<i64> {
        let mut tree = Tree::new();
        for (k, v) in entries {
            tree.insert(k, *v);
        }
        tree
    }

    #[test]
    fn nested_siblings_are_isolated() {
        let mut t = tree(&[("org.usa.ny", 1), ("org.usa.ca", 2)]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.leaf("org.usa.ny"), Some(&1));

        t.remove("org.usa.ny");
        assert_eq!(t.leaf("org.usa.ny"), None);
        assert_eq!(t.leaf("org.usa.ca"), Some(&2));

        t.remove("org.usa.ca");
        assert!(t.root().is_empty(), "empty branches are pruned");
    }

    #[test]
    fn writing_below_a_leaf_replaces_it() {
        let mut t = tree(&[("org", 1)]);
        t.insert("org.usa", 2);
        assert_eq!(t.leaf("org"), None);
        assert_eq!(t.leaf("org.usa"), Some(&2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn writing_a_leaf_over_a_branch_discards_descendants() {
        let mut t = tree(&[("org.usa", 2), ("org.eu", 3)]);
        t.insert("org", 1);
        assert_eq!(t.leaves(), vec![("org".to_string(), &1)]);
    }

    #[test]
    fn branches_merge_shallowly() {
        let mut t = tree(&[("a.x", 1)]);
        let mut incoming = BTreeMap::new();
        incoming.insert("y".to_string(), Node::Leaf(2));
        t.set("a", Node::Branch(incoming));
        assert_eq!(t.leaf("a.x"), Some(&1));
        assert_eq!(t.leaf("a.y"), Some(&2));
    }

    #[test]
    fn ancestor_lookup() {
        let t = tree(&[("user", 1)]);
        assert_eq!(t.ancestor_leaf("user.name.first"), Some((&1, "name.first".into())));
        assert_eq!(t.ancestor_leaf("user"), None);
        assert_eq!(t.ancestor_leaf("other.x"), None);
    }

    #[test]
    fn removing_below_a_leaf_removes_the_leaf() {
        let mut t = tree(&[("user", 1)]);
        assert_eq!(t.remove("user.name"), Some(Node::Leaf(1)));
        assert!(t.is_empty());
    }

    #[test]
    fn merge_prefers_other() {
        let a = tree(&[("name.first", 1), ("name.last", 2), ("age", 3)]);
        let b = tree(&[("name.first", 10), ("email", 4)]);
        let merged = a.merge(b);
        assert_eq!(
            merged.to_value(|v| json!(v)),
            json!({"age": 3, "email": 4, "name": {"first": 10, "last": 2}})
        );
    }

    #[test]
    fn leaves_are_flattened_in_key_order() {
        let t = tree(&[("b", 2), ("a.z", 1), ("a.b", 0)]);
        let keys: Vec<_> = t.leaves().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a.b", "a.z", "b"]);
    }

    #[test]
    fn overlapping_flat_keys_are_rejected() {
        let err = Tree::from_flat([("org".to_string(), 1), ("org.usa".to_string(), 2)]);
        assert!(matches!(err, Err(Error::AmbiguousSnapshot { key }) if key == "org.usa"));

        let ok = Tree::from_flat([("org-a".to_string(), 1), ("org.usa".to_string(), 2)]).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[quickcheck]
    fn insert_then_leaf_roundtrips(keys: Vec<(u8, u8)>, value: i64) -> bool {
        let mut t = Tree::new();
        keys.iter().all(|(a, b)| {
            let key = format!("k{a}.k{b}");
            t.insert(&key, value);
            t.leaf(&key) == Some(&value)
        })
    }
}
