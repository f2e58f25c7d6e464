// (c) Copyright 2026 The changeset authors. All rights reserved.
//! The node-tree buffer.
//!
//! Instead of one tree of staged leaves, a [`NodeTree`] keeps a handler per object or array of
//! the content it has touched. Each handler tracks writes to its own keys and records what it
//! overwrote when executing, so [`rollback`](NodeTree::rollback) can undo an execute exactly,
//! including deleting keys the execute added.
//!
//! ```rust
//! # use changeset::{NodeTree, Options};
//! # use serde_json::json;
//! let mut tree = NodeTree::new(json!({"user": {"name": "Jim"}, "tags": ["a"]}), Options::new())?;
//! tree.set("user.name", "Bob")?;
//! tree.array("tags").unwrap().push("b");
//! tree.execute();
//! assert_eq!(tree.data(), json!({"user": {"name": "Bob"}, "tags": ["a", "b"]}));
//!
//! tree.rollback();
//! assert_eq!(tree.data(), json!({"user": {"name": "Jim"}, "tags": ["a"]}));
//! # Ok::<(), changeset::Error>(())
//! ```
//!
//! Node trees do not run validators. Errors can still be recorded with
//! [`add_error`](NodeTree::add_error), and an invalid node tree does not execute.
mod array;
mod object;

pub use array::ArrayView;

use crate::{
    BufferKind, BufferedGraph, Error,
    accessor::Accessor,
    changeset::{ErrorInput, KeyError, KeyValue, Outcome, Saved, Staged},
    content::Content,
    deep,
    events::{Event, EventName, ListenerId, Notifier},
    leaf::Invalid,
    options::Options,
    path,
    tree::Tree,
};
use object::ObjectHandler;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

/// A buffer that tracks writes per object and array of the content.
#[derive(Debug)]
pub struct NodeTree {
    content: Content,
    root: ObjectHandler,
    errors: Tree<Invalid>,
    options: Options,
    events: Notifier,
}

impl NodeTree {
    /// # Errors
    ///
    /// Fails with [`Error::NotAMapping`] if the content is not a JSON object.
    pub fn new(content: impl Into<Content>, options: Options) -> Result<Self, Error> {
        let content = content.into();
        if !content.read(Value::is_object) {
            return Err(Error::NotAMapping);
        }
        Ok(Self {
            content,
            root: ObjectHandler::default(),
            errors: Tree::new(),
            options,
            events: Notifier::new(),
        })
    }

    /// A handle to the content this buffer stages over.
    pub fn content(&self) -> Content {
        self.content.clone()
    }

    pub fn on(&self, name: EventName, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.events.on(name, callback)
    }

    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.events.off(name, id)
    }

    fn notify(&self, key: &str) {
        self.events.trigger(&Event::PropertyChanged {
            key: key.to_string(),
        });
    }

    /// Reads `path` as it would be after executing.
    ///
    /// Top-level accessor names read the buffer's views.
    pub fn get(&mut self, path: &str) -> Option<Value> {
        if let Some(accessor) = Accessor::parse(path) {
            return Some(self.read_accessor(accessor));
        }
        let path = path::sanitize(path);
        let Self { content, root, .. } = self;
        content.read(|source| root.get(source, &path))
    }

    fn read_accessor(&self, accessor: Accessor) -> Value {
        match accessor {
            Accessor::Change => self.change(),
            Accessor::Changes => self.changes().iter().map(KeyValue::to_json).collect(),
            Accessor::Error => self.errors.to_value(Invalid::to_json),
            Accessor::Errors => self.errors().iter().map(KeyError::to_json).collect(),
            Accessor::Data => self.data(),
            Accessor::PendingData => self.pending_data(),
            Accessor::IsValid => self.is_valid().into(),
            Accessor::IsInvalid => self.is_invalid().into(),
            Accessor::IsDirty => self.is_dirty().into(),
            Accessor::IsPristine => self.is_pristine().into(),
            Accessor::IsValidating => false.into(),
        }
    }

    /// Stages `value` at `path`.
    ///
    /// An object or array replaces whatever `path` held as a whole; later writes below it are
    /// tracked against the replacement. A scalar equal to what the content holds cancels any
    /// write staged at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ReadOnly`] if the top-level key names an accessor, with
    /// [`Error::FilteredKey`] if it is not in [`Options::allowed_keys`] or if `path` indexes an
    /// array with something other than a number.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), Error> {
        let path = path::sanitize(path);
        let (head, _) = path::split_first(&path);
        if Accessor::parse(head).is_some() {
            return Err(Error::ReadOnly {
                key: head.to_string(),
            });
        }
        if !self.options.allows(head) {
            return Err(Error::FilteredKey {
                key: head.to_string(),
            });
        }
        let value = value.into();
        let Self { content, root, .. } = self;
        content.read(|source| root.set(source, &path, value))?;
        trace!(target: "changeset::node_tree", key = %path, "staged write");
        self.notify(&path);
        Ok(())
    }

    /// The array at `path`, for reading and mutating through the buffer.
    ///
    /// Returns `None` unless `path` holds an array.
    pub fn array(&mut self, path: &str) -> Option<ArrayView<'_>> {
        let path = path::sanitize(path);
        let Self {
            content,
            root,
            events,
            ..
        } = self;
        let (handler, base) = root.array_mut(&content.borrow(), &path)?;
        Some(ArrayView::new(handler, base, path, events.clone()))
    }

    /// Records an error on `path`, replacing any error already there.
    pub fn add_error(&mut self, path: &str, error: impl Into<ErrorInput>) -> Invalid {
        let invalid = match error.into() {
            ErrorInput::Invalid(invalid) => invalid,
            ErrorInput::Reason(validation) => Invalid {
                value: self.get(path).unwrap_or(Value::Null),
                validation,
            },
        };
        self.errors.insert(path, invalid.clone());
        self.notify(path);
        invalid
    }

    /// Writes every staged change into the content if the buffer is valid and dirty.
    ///
    /// Only the most recent execute can be rolled back.
    pub fn execute(&mut self) -> &mut Self {
        if !(self.is_valid() && self.is_dirty()) {
            trace!(target: "changeset::node_tree", "nothing to execute");
            return self;
        }
        let Self { content, root, .. } = self;
        content.write(|source| root.execute(source));
        debug!(target: "changeset::node_tree", "executed");
        self
    }

    /// Undoes the last execute and discards everything staged.
    pub fn rollback(&mut self) -> &mut Self {
        let Self { content, root, .. } = self;
        content.write(|source| root.rollback(source));
        self.errors.clear();
        debug!(target: "changeset::node_tree", "rolled back");
        self.events.trigger(&Event::AfterRollback);
        self
    }

    /// Executes, forgets what was staged, and persists the content through its hook.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Persist`] if the hook fails. The content stays executed.
    pub async fn save(&mut self, options: &Value) -> Result<Saved, Error> {
        self.execute();
        self.root.clear();
        self.errors.clear();
        let result = match self.content.persist(options) {
            Some(pending) => pending
                .await
                .map(Saved::Persisted)
                .map_err(Error::Persist),
            None => Ok(Saved::Unpersisted),
        };
        match &result {
            Ok(_) => debug!(target: "changeset::node_tree", "saved"),
            Err(err) => warn!(target: "changeset::node_tree", error = %err, "save failed"),
        }
        result
    }

    /// Staged writes by dotted key, in key order.
    ///
    /// A swapped-in object or array is listed once under its own key, with later writes below it
    /// applied; a mutated array is listed whole.
    pub fn changes(&self) -> Vec<KeyValue> {
        let mut out = Vec::new();
        self.root.collect("", &mut out);
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Staged writes as one nested object.
    pub fn change(&self) -> Value {
        let mut change = Value::Object(Map::new());
        for KeyValue { key, value } in self.changes() {
            deep::set(&mut change, &key, value);
        }
        change
    }

    pub fn errors(&self) -> Vec<KeyError> {
        self.errors
            .leaves()
            .into_iter()
            .map(|(key, invalid)| KeyError {
                key,
                value: invalid.value.clone(),
                validation: invalid.validation.clone(),
            })
            .collect()
    }

    /// A copy of the content.
    pub fn data(&self) -> Value {
        self.content.to_value()
    }

    /// The content as it would be after executing, without executing.
    pub fn pending_data(&self) -> Value {
        let mut data = self.content.to_value();
        self.root.apply(&mut data);
        data
    }

    pub fn is_dirty(&self) -> bool {
        self.root.is_dirty()
    }

    pub fn is_pristine(&self) -> bool {
        !self.is_dirty()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }
}

impl BufferedGraph for NodeTree {
    fn kind(&self) -> BufferKind {
        BufferKind::NodeTree
    }

    fn content(&self) -> Content {
        NodeTree::content(self)
    }

    fn get(&mut self, path: &str) -> Option<Value> {
        NodeTree::get(self, path)
    }

    fn set(&mut self, path: &str, value: Value) -> Result<Staged, Error> {
        NodeTree::set(self, path, value.clone())?;
        Ok(Staged::Ready(Outcome::Valid(value)))
    }

    fn execute(&mut self) {
        NodeTree::execute(self);
    }

    fn rollback(&mut self) {
        NodeTree::rollback(self);
    }

    fn changes(&self) -> Vec<KeyValue> {
        NodeTree::changes(self)
    }

    fn is_dirty(&self) -> bool {
        NodeTree::is_dirty(self)
    }

    fn is_valid(&self) -> bool {
        NodeTree::is_valid(self)
    }
}
