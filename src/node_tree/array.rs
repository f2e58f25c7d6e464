// (c) Copyright 2026 The changeset authors. All rights reserved.
use crate::{
    Error, deep,
    events::{Event, Notifier},
    path,
};
use serde_json::Value;
use std::{cmp::Ordering, slice};
use tracing::trace;

/// Tracks writes to one array.
///
/// The first write copies the whole array; the copy is what gets written back on execute.
/// Nothing is tracked per index.
#[derive(Debug, Clone, Default)]
pub(super) struct ArrayHandler {
    working: Option<Vec<Value>>,
    /// The array as it was before the last execute.
    undo: Option<Vec<Value>>,
}

impl ArrayHandler {
    pub(super) fn working(&self) -> Option<&[Value]> {
        self.working.as_deref()
    }

    fn working_mut(&mut self, source: &Value) -> &mut Vec<Value> {
        self.working
            .get_or_insert_with(|| source.as_array().cloned().unwrap_or_default())
    }

    fn items<'a>(&'a self, source: &'a Value) -> &'a [Value] {
        match (&self.working, source) {
            (Some(items), _) => items,
            (None, Value::Array(items)) => items,
            (None, _) => &[],
        }
    }

    pub(super) fn get(&self, source: &Value, path: &str) -> Option<Value> {
        let (head, rest) = path::split_first(path);
        let item = self.items(source).get(head.parse::<usize>().ok()?)?;
        match rest {
            Some(rest) => deep::get(item, rest).cloned(),
            None => Some(item.clone()),
        }
    }

    /// Writes `value` at an index, or below one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FilteredKey`] if the first segment of `path` is not an index, and
    /// with [`Error::IndexOutOfReach`] if the index lies more than [`deep::MAX_PADDING`] past
    /// the end of the array.
    pub(super) fn set(&mut self, source: &Value, path: &str, value: Value) -> Result<(), Error> {
        let (head, _) = path::split_first(path);
        let Ok(index) = head.parse::<usize>() else {
            return Err(Error::FilteredKey {
                key: head.to_string(),
            });
        };
        let len = self.items(source).len();
        if !deep::index_in_reach(index, len) {
            return Err(Error::IndexOutOfReach {
                key: head.to_string(),
                len,
            });
        }
        let working = self.working_mut(source);
        let mut array = Value::Array(std::mem::take(working));
        deep::set(&mut array, path, value);
        if let Value::Array(items) = array {
            *working = items;
        }
        Ok(())
    }

    pub(super) fn apply(&self, target: &mut Value) {
        if let Some(items) = &self.working {
            *target = Value::Array(items.clone());
        }
    }

    pub(super) fn execute(&mut self, source: &mut Value) {
        let Some(items) = &self.working else {
            return;
        };
        self.undo = source.as_array().cloned();
        *source = Value::Array(items.clone());
    }

    pub(super) fn rollback(&mut self, source: &mut Value) {
        if let Some(previous) = self.undo.take() {
            *source = Value::Array(previous);
        }
        self.working = None;
    }

    pub(super) fn is_dirty(&self) -> bool {
        self.working.is_some()
    }
}

/// Reads and mutates one array of a [`NodeTree`](super::NodeTree) through its buffer.
///
/// Reads see the buffered copy once one exists. Every mutator works like its [`Vec`]
/// counterpart, except that out-of-range positions are clamped instead of panicking.
pub struct ArrayView<'a> {
    handler: &'a mut ArrayHandler,
    source: Value,
    key: String,
    events: Notifier,
}

impl<'a> ArrayView<'a> {
    pub(super) fn new(
        handler: &'a mut ArrayHandler,
        source: Value,
        key: String,
        events: Notifier,
    ) -> Self {
        Self {
            handler,
            source,
            key,
            events,
        }
    }

    fn items(&self) -> &[Value] {
        self.handler.items(&self.source)
    }

    fn mutate<R>(&mut self, op: &str, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let result = f(self.handler.working_mut(&self.source));
        trace!(target: "changeset::node_tree", key = %self.key, op, "mutated array");
        self.events.trigger(&Event::PropertyChanged {
            key: self.key.clone(),
        });
        result
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items().get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Value> {
        self.items().iter()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items().to_vec()
    }

    /// Returns `true` once the array has been mutated through the buffer.
    pub fn is_dirty(&self) -> bool {
        self.handler.is_dirty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        let value = value.into();
        self.mutate("push", |items| items.push(value));
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.mutate("pop", Vec::pop)
    }

    pub fn insert(&mut self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.mutate("insert", |items| items.insert(index.min(items.len()), value));
    }

    pub fn remove(&mut self, index: usize) -> Option<Value> {
        self.mutate("remove", |items| {
            (index < items.len()).then(|| items.remove(index))
        })
    }

    /// Removes `delete` items starting at `start` and inserts `insert` in their place,
    /// returning the removed items.
    pub fn splice<I>(&mut self, start: usize, delete: usize, insert: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        self.mutate("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.mutate("sort", |items| items.sort_by(compare));
    }

    pub fn reverse(&mut self) {
        self.mutate("reverse", |items| items.reverse());
    }

    /// Writes `value` at `index`, or appends it if `index` is past the end.
    pub fn set_index(&mut self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.mutate("set", |items| match items.get_mut(index) {
            Some(slot) => *slot = value,
            None => items.push(value),
        });
    }

    pub fn truncate(&mut self, len: usize) {
        self.mutate("truncate", |items| items.truncate(len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view<'a>(handler: &'a mut ArrayHandler, source: &Value) -> ArrayView<'a> {
        ArrayView::new(handler, source.clone(), "tags".into(), Notifier::new())
    }

    #[test]
    fn reads_pass_through_until_mutated() {
        let source = json!(["a", "b"]);
        let mut handler = ArrayHandler::default();
        let mut tags = view(&mut handler, &source);
        assert_eq!(tags.len(), 2);
        assert!(!tags.is_dirty());

        tags.push("c");
        assert_eq!(tags.to_vec(), vec![json!("a"), json!("b"), json!("c")]);
        assert!(tags.is_dirty());
        assert_eq!(source, json!(["a", "b"]));
    }

    #[test]
    fn mutators_clamp() {
        let source = json!([1, 2, 3]);
        let mut handler = ArrayHandler::default();
        let mut items = view(&mut handler, &source);
        assert_eq!(items.remove(9), None);
        items.insert(9, 4);
        assert_eq!(items.splice(1, 10, [json!(0)]), vec![json!(2), json!(3), json!(4)]);
        items.set_index(3, 9);
        items.set_index(usize::MAX, 8);
        assert_eq!(items.to_vec(), vec![json!(1), json!(0), json!(9), json!(8)]);
        items.set_index(0, 7);
        assert_eq!(items.get(0), Some(&json!(7)));
    }

    #[test]
    fn sort_and_reverse() {
        let source = json!([3, 1, 2]);
        let mut handler = ArrayHandler::default();
        let mut items = view(&mut handler, &source);
        items.sort_by(|a, b| a.as_i64().cmp(&b.as_i64()));
        items.reverse();
        assert_eq!(items.pop(), Some(json!(1)));
        items.truncate(1);
        assert_eq!(items.to_vec(), vec![json!(3)]);
    }

    #[test]
    fn execute_then_rollback_restores() {
        let mut source = json!(["a"]);
        let mut handler = ArrayHandler::default();
        handler.set(&source, "1", json!("b")).unwrap();
        handler.execute(&mut source);
        assert_eq!(source, json!(["a", "b"]));
        handler.rollback(&mut source);
        assert_eq!(source, json!(["a"]));
        assert!(!handler.is_dirty());
    }

    #[test]
    fn distant_index_writes_are_rejected() {
        let source = json!(["a"]);
        let mut handler = ArrayHandler::default();
        assert!(matches!(
            handler.set(&source, "1000000000000000000", json!("x")),
            Err(Error::IndexOutOfReach { len: 1, .. })
        ));
        assert!(!handler.is_dirty());
        handler.set(&source, "3", json!("d")).unwrap();
        assert_eq!(handler.working(), Some(&[json!("a"), Value::Null, Value::Null, json!("d")][..]));
    }

    #[test]
    fn writes_need_an_index() {
        let source = json!([{"n": 1}]);
        let mut handler = ArrayHandler::default();
        handler.set(&source, "0.n", json!(2)).unwrap();
        assert_eq!(handler.get(&source, "0.n"), Some(json!(2)));
        assert!(matches!(
            handler.set(&source, "first", json!(1)),
            Err(Error::FilteredKey { key }) if key == "first"
        ));
    }
}
