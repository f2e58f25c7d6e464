// (c) Copyright 2026 The changeset authors. All rights reserved.
use super::array::ArrayHandler;
use crate::{
    Error,
    changeset::KeyValue,
    deep, path,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Returns `true` if writes below `value` are tracked by a child handler.
pub(super) fn needs_handler(value: &Value) -> bool {
    deep::is_container(value)
}

/// A write tracked by an [`ObjectHandler`] for one of its own keys.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Local {
    /// A scalar write.
    Value(Value),
    /// An object or array swapped in whole. The child handler of the key tracks writes made
    /// below it since.
    Replaced(Value),
}

/// What to do with a key when rolling back an execute.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Undo {
    Restore(Value),
    Delete,
}

/// The handler of one object or array inside the content.
#[derive(Debug, Clone)]
pub(super) enum Handler {
    Object(ObjectHandler),
    Array(ArrayHandler),
}

impl Handler {
    fn for_value(value: &Value) -> Handler {
        match value {
            Value::Array(_) => Handler::Array(ArrayHandler::default()),
            _ => Handler::Object(ObjectHandler::default()),
        }
    }

    fn get(&mut self, source: &Value, path: &str) -> Option<Value> {
        match self {
            Handler::Object(object) => object.get(source, path),
            Handler::Array(array) => array.get(source, path),
        }
    }

    fn set(&mut self, source: &Value, path: &str, value: Value) -> Result<(), Error> {
        match self {
            Handler::Object(object) => object.set(source, path, value),
            Handler::Array(array) => array.set(source, path, value),
        }
    }

    fn apply(&self, target: &mut Value) {
        match self {
            Handler::Object(object) => object.apply(target),
            Handler::Array(array) => array.apply(target),
        }
    }

    /// `base` with every tracked write applied.
    fn materialize(&self, base: &Value) -> Value {
        let mut value = base.clone();
        self.apply(&mut value);
        value
    }

    fn execute(&mut self, source: &mut Value) {
        match self {
            Handler::Object(object) => object.execute(source),
            Handler::Array(array) => array.execute(source),
        }
    }

    fn rollback(&mut self, source: &mut Value) {
        match self {
            Handler::Object(object) => object.rollback(source),
            Handler::Array(array) => array.rollback(source),
        }
    }

    fn is_dirty(&self) -> bool {
        match self {
            Handler::Object(object) => object.is_dirty(),
            Handler::Array(array) => array.is_dirty(),
        }
    }

    fn collect(&self, prefix: &str, out: &mut Vec<KeyValue>) {
        match self {
            Handler::Object(object) => object.collect(prefix, out),
            Handler::Array(array) => {
                if let Some(items) = array.working() {
                    out.push(KeyValue {
                        key: prefix.to_string(),
                        value: Value::Array(items.to_vec()),
                    });
                }
            }
        }
    }
}

/// Tracks writes to the keys of one object.
///
/// Writes below an object- or array-valued key are delegated to a child handler, created the
/// first time the key is read or written. The handler never holds its slice of the content; every
/// operation is handed the slice it applies to.
#[derive(Debug, Clone, Default)]
pub(super) struct ObjectHandler {
    changes: BTreeMap<String, Local>,
    nested: BTreeMap<String, Handler>,
    /// Pre-images captured by the last execute.
    undo: BTreeMap<String, Undo>,
}

/// The value `key` currently has for this handler: its own write if any, else the source's.
fn current<'a>(
    changes: &'a BTreeMap<String, Local>,
    source: &'a Value,
    key: &str,
) -> Option<&'a Value> {
    match changes.get(key) {
        Some(Local::Value(value) | Local::Replaced(value)) => Some(value),
        None => match source {
            Value::Object(map) => map.get(key),
            _ => None,
        },
    }
}

impl ObjectHandler {
    pub(super) fn get(&mut self, source: &Value, path: &str) -> Option<Value> {
        let (head, rest) = path::split_first(path);
        if let Some(Local::Value(value)) = self.changes.get(head) {
            return match rest {
                Some(rest) => deep::get(value, rest).cloned(),
                None => Some(value.clone()),
            };
        }
        let base = current(&self.changes, source, head)?;
        if !needs_handler(base) {
            return rest.map_or(Some(base.clone()), |_| None);
        }
        let child = self
            .nested
            .entry(head.to_string())
            .or_insert_with(|| Handler::for_value(base));
        match rest {
            Some(rest) => child.get(base, rest),
            None => Some(child.materialize(base)),
        }
    }

    pub(super) fn set(&mut self, source: &Value, path: &str, value: Value) -> Result<(), Error> {
        let (head, rest) = path::split_first(path);
        let Some(rest) = rest else {
            self.set_local(source, head, value);
            return Ok(());
        };
        if !current(&self.changes, source, head).is_some_and(needs_handler) {
            // Writing below a scalar or a missing key swaps in a fresh object.
            self.changes
                .insert(head.to_string(), Local::Replaced(Value::Object(Map::new())));
            self.nested.remove(head);
        }
        let Some(base) = current(&self.changes, source, head) else {
            return Ok(());
        };
        self.nested
            .entry(head.to_string())
            .or_insert_with(|| Handler::for_value(base))
            .set(base, rest, value)
    }

    fn set_local(&mut self, source: &Value, key: &str, value: Value) {
        if needs_handler(&value) {
            self.nested
                .insert(key.to_string(), Handler::for_value(&value));
            self.changes.insert(key.to_string(), Local::Replaced(value));
            return;
        }
        self.nested.remove(key);
        let unchanged = match source {
            Value::Object(map) => map.get(key).is_some_and(|old| deep::is_equal(old, &value)),
            _ => false,
        };
        if unchanged {
            self.changes.remove(key);
        } else {
            self.changes.insert(key.to_string(), Local::Value(value));
        }
    }

    /// The value a tracked write of `key` puts into the content.
    fn resolve(&self, key: &str, local: &Local) -> Value {
        match local {
            Local::Value(value) => value.clone(),
            Local::Replaced(base) => match self.nested.get(key) {
                Some(child) => child.materialize(base),
                None => base.clone(),
            },
        }
    }

    /// Writes every tracked change into `target` without recording anything.
    pub(super) fn apply(&self, target: &mut Value) {
        let Value::Object(map) = target else {
            return;
        };
        for (key, local) in &self.changes {
            map.insert(key.clone(), self.resolve(key, local));
        }
        for (key, child) in &self.nested {
            if self.changes.contains_key(key) {
                continue;
            }
            if let Some(value) = map.get_mut(key) {
                child.apply(value);
            }
        }
    }

    /// Writes every tracked change into `source`, remembering what each touched key held before.
    ///
    /// Only the last execute can be rolled back.
    pub(super) fn execute(&mut self, source: &mut Value) {
        let Value::Object(map) = source else {
            return;
        };
        self.undo.clear();
        let touched: BTreeSet<&String> = self.changes.keys().chain(self.nested.keys()).collect();
        for key in touched {
            let undo = match map.get(key) {
                Some(value) => Undo::Restore(value.clone()),
                None => Undo::Delete,
            };
            self.undo.insert(key.clone(), undo);
        }
        for (key, local) in &self.changes {
            map.insert(key.clone(), self.resolve(key, local));
        }
        for (key, child) in &mut self.nested {
            if self.changes.contains_key(key) {
                continue;
            }
            if let Some(value) = map.get_mut(key) {
                child.execute(value);
            }
        }
    }

    /// Undoes the last execute and forgets every tracked write.
    pub(super) fn rollback(&mut self, source: &mut Value) {
        if let Value::Object(map) = source {
            for (key, child) in &mut self.nested {
                if self.changes.contains_key(key) {
                    continue;
                }
                if let Some(value) = map.get_mut(key) {
                    child.rollback(value);
                }
            }
            for (key, undo) in std::mem::take(&mut self.undo) {
                match undo {
                    Undo::Restore(value) => {
                        map.insert(key, value);
                    }
                    Undo::Delete => {
                        map.remove(&key);
                    }
                }
            }
        }
        self.clear();
    }

    /// Forgets every tracked write and pre-image without touching the content.
    pub(super) fn clear(&mut self) {
        self.changes.clear();
        self.nested.clear();
        self.undo.clear();
    }

    pub(super) fn is_dirty(&self) -> bool {
        !self.changes.is_empty() || self.nested.values().any(Handler::is_dirty)
    }

    /// Lists tracked writes by dotted key. A swapped-in value is listed whole, with the writes
    /// made below it applied.
    pub(super) fn collect(&self, prefix: &str, out: &mut Vec<KeyValue>) {
        let key_of = |key: &str| {
            if prefix.is_empty() {
                key.to_string()
            } else {
                path::join(&[prefix, key])
            }
        };
        for (key, local) in &self.changes {
            out.push(KeyValue {
                key: key_of(key),
                value: self.resolve(key, local),
            });
        }
        for (key, child) in &self.nested {
            if !self.changes.contains_key(key) {
                child.collect(&key_of(key), out);
            }
        }
    }

    /// Finds the array handler for `path`, creating handlers on the way.
    ///
    /// Returns the handler with the array it buffers. Returns `None` unless `path` holds an
    /// array.
    pub(super) fn array_mut(
        &mut self,
        source: &Value,
        path: &str,
    ) -> Option<(&mut ArrayHandler, Value)> {
        let (head, rest) = path::split_first(path);
        let base = current(&self.changes, source, head)?;
        if !needs_handler(base) {
            return None;
        }
        let child = self
            .nested
            .entry(head.to_string())
            .or_insert_with(|| Handler::for_value(base));
        match (child, rest) {
            (Handler::Array(array), None) => Some((array, base.clone())),
            (Handler::Object(object), Some(rest)) => object.array_mut(base, rest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: &Value, writes: &[(&str, Value)]) -> ObjectHandler {
        let mut handler = ObjectHandler::default();
        for (path, value) in writes {
            handler.set(source, path, value.clone()).unwrap();
        }
        handler
    }

    #[test]
    fn reads_see_writes_at_any_depth() {
        let source = json!({"user": {"name": {"first": "Jim"}}, "n": 1});
        let mut handler = run(&source, &[("user.name.first", json!("Tom")), ("n", json!(2))]);
        assert_eq!(handler.get(&source, "user.name.first"), Some(json!("Tom")));
        assert_eq!(handler.get(&source, "user"), Some(json!({"name": {"first": "Tom"}})));
        assert_eq!(handler.get(&source, "n"), Some(json!(2)));
        assert_eq!(handler.get(&source, "n.x"), None);
    }

    #[test]
    fn equal_scalar_write_collapses() {
        let source = json!({"n": 1});
        let mut handler = run(&source, &[("n", json!(2))]);
        assert!(handler.is_dirty());
        handler.set(&source, "n", json!(1)).unwrap();
        assert!(!handler.is_dirty());
    }

    #[test]
    fn reads_alone_do_not_dirty() {
        let source = json!({"user": {"tags": ["a"]}});
        let mut handler = ObjectHandler::default();
        assert_eq!(handler.get(&source, "user.tags.0"), Some(json!("a")));
        assert!(!handler.is_dirty());
    }

    #[test]
    fn structural_replacement_adopts_later_writes() {
        let mut source = json!({"user": {"first": "Jim", "last": "Bob"}});
        let mut handler = run(
            &source,
            &[("user", json!({"first": "Ann"})), ("user.last", json!("Lee"))],
        );
        handler.execute(&mut source);
        assert_eq!(source, json!({"user": {"first": "Ann", "last": "Lee"}}));
    }

    #[test]
    fn writing_below_a_scalar_replaces_it() {
        let mut source = json!({"org": 5});
        let mut handler = run(&source, &[("org.usa.ny", json!("NY"))]);
        handler.execute(&mut source);
        assert_eq!(source, json!({"org": {"usa": {"ny": "NY"}}}));
    }

    #[test]
    fn rollback_undoes_execute() {
        let original = json!({"user": {"first": "Jim"}, "keep": true});
        let mut source = original.clone();
        let mut handler = run(
            &source,
            &[("user.first", json!("Tom")), ("user.age", json!(3)), ("added", json!([1]))],
        );
        handler.execute(&mut source);
        assert_eq!(
            source,
            json!({"user": {"first": "Tom", "age": 3}, "keep": true, "added": [1]})
        );
        handler.rollback(&mut source);
        assert_eq!(source, original);
        assert!(!handler.is_dirty());
    }

    #[test]
    fn cleared_executes_stay() {
        let mut source = json!({"n": 1});
        let mut handler = run(&source, &[("n", json!(2))]);
        handler.execute(&mut source);
        handler.clear();
        handler.rollback(&mut source);
        assert_eq!(source, json!({"n": 2}));
    }

    #[test]
    fn collect_lists_leaves_and_replacements() {
        let source = json!({"a": {"b": 1}, "c": 1});
        let handler = run(
            &source,
            &[("a.b", json!(2)), ("c", json!({"d": 1})), ("c.e", json!(2))],
        );
        let mut out = Vec::new();
        handler.collect("", &mut out);
        assert_eq!(
            out,
            vec![
                KeyValue {
                    key: "c".into(),
                    value: json!({"d": 1, "e": 2})
                },
                KeyValue {
                    key: "a.b".into(),
                    value: json!(2)
                },
            ]
        );
    }
}
