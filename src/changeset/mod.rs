// (c) Copyright 2026 The changeset authors. All rights reserved.
//! The flat buffer.
//!
//! A [`Changeset`] stages writes in a change tree and failed writes in an error tree, both keyed
//! by dotted path, and leaves the [`Content`] alone until [`execute`](Changeset::execute) merges
//! the change tree into it. Every write is validated against a [`ValidatorMap`] first, unless the
//! buffer was built with [`Options::skip_validate`].
//!
//! ```rust
//! # use changeset::{Changeset, ValidatorMap, validation::{ValidationContext, Verdict}};
//! # use serde_json::json;
//! let validators = ValidatorMap::new().with("age", |cx: &ValidationContext<'_>| {
//!     match cx.new_value.as_u64() {
//!         Some(_) => Verdict::Valid,
//!         None => Verdict::from("age must be a number"),
//!     }
//! });
//! let buffer = Changeset::new(json!({"name": "Jim", "age": 30}), validators);
//!
//! buffer.set("name", "Bob")?;
//! buffer.set("age", "old")?;
//! assert_eq!(buffer.get("name"), Some(json!("Bob")));
//! assert!(buffer.is_invalid());
//!
//! // Invalid buffers never reach the content.
//! buffer.execute();
//! assert_eq!(buffer.data(), json!({"name": "Jim", "age": 30}));
//!
//! buffer.rollback_invalid(None);
//! buffer.execute();
//! assert_eq!(buffer.data(), json!({"name": "Bob", "age": 30}));
//! # Ok::<(), changeset::Error>(())
//! ```
//!
//! Clones of a `Changeset` are handles to the same buffer.
mod pending;
mod snapshot;

pub use pending::{Outcome, PendingValidation, Staged};
pub use snapshot::Snapshot;

use crate::{
    BufferKind, BufferedGraph, Error,
    accessor::Accessor,
    content::Content,
    deep,
    events::{Event, EventName, ListenerId, Notifier},
    leaf::{Change, Invalid, Validation},
    options::Options,
    tree::{Node, Tree},
    validation::{Check, ValidationContext, ValidatorMap, Verdict},
};
use ahash::HashMap;
use futures::future::join_all;
use pending::RunningGuard;
use serde::Serialize;
use serde_json::{Value, json};
use std::{cell::RefCell, collections::BTreeSet, fmt, rc::Rc};
use tracing::{debug, trace, warn};

/// A staged value as listed by [`Changeset::changes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn to_json(&self) -> Value {
        json!({"key": self.key, "value": self.value})
    }
}

/// A staged failure as listed by [`Changeset::errors`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyError {
    pub key: String,
    pub value: Value,
    pub validation: Validation,
}

impl KeyError {
    pub fn to_json(&self) -> Value {
        json!({
            "key": self.key,
            "value": self.value,
            "validation": Value::from(self.validation.clone()),
        })
    }
}

/// What [`Changeset::add_error`] records.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorInput {
    /// Reasons only; the key's current value is recorded alongside.
    Reason(Validation),
    /// A complete error.
    Invalid(Invalid),
}

impl From<Invalid> for ErrorInput {
    fn from(invalid: Invalid) -> Self {
        ErrorInput::Invalid(invalid)
    }
}

impl From<Validation> for ErrorInput {
    fn from(validation: Validation) -> Self {
        ErrorInput::Reason(validation)
    }
}

impl From<&str> for ErrorInput {
    fn from(reason: &str) -> Self {
        ErrorInput::Reason(reason.into())
    }
}

impl From<String> for ErrorInput {
    fn from(reason: String) -> Self {
        ErrorInput::Reason(reason.into())
    }
}

impl From<Vec<String>> for ErrorInput {
    fn from(reasons: Vec<String>) -> Self {
        ErrorInput::Reason(reasons.into())
    }
}

/// The result of [`Changeset::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum Saved {
    /// The content's persistence hook resolved to this value.
    Persisted(Value),
    /// The content has no persistence hook; the buffer was only executed.
    Unpersisted,
}

struct State {
    content: Content,
    changes: Tree<Change>,
    errors: Tree<Invalid>,
    /// In-flight validations per key.
    running: HashMap<String, usize>,
    /// Bumped by every rollback and restore.
    generation: u64,
    /// Content as it was before the last effective execute.
    previous: Option<Value>,
    validators: ValidatorMap,
    options: Options,
}

impl State {
    fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn is_dirty(&self) -> bool {
        !self.changes.is_empty() || !self.errors.is_empty()
    }

    /// Stages `value` at `key`, unless the content already holds an equal value, in which case
    /// any stale staged value is dropped.
    fn set_property(&mut self, key: &str, value: Value) {
        let unchanged = self.content.read(|content| {
            deep::get(content, key).is_some_and(|old| deep::is_equal(old, &value))
        });
        if !unchanged {
            self.changes.insert(key, Change(value));
        } else if self.changes.leaf(key).is_some() {
            self.changes.remove(key);
        }
    }

    /// Dotted keys of every staged leaf, changes and errors alike.
    fn touched_keys(&self) -> Vec<String> {
        let mut keys = BTreeSet::new();
        keys.extend(self.changes.leaves().into_iter().map(|(key, _)| key));
        keys.extend(self.errors.leaves().into_iter().map(|(key, _)| key));
        keys.into_iter().collect()
    }

    fn reset(&mut self) {
        self.changes.clear();
        self.errors.clear();
        self.running.clear();
        self.generation += 1;
    }
}

/// A buffer of validated writes over shared [`Content`].
#[derive(Clone)]
pub struct Changeset {
    state: Rc<RefCell<State>>,
    events: Notifier,
}

impl fmt::Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Changeset")
            .field("content", &state.content)
            .field("changes", &state.changes)
            .field("errors", &state.errors)
            .field("running", &state.running)
            .finish_non_exhaustive()
    }
}

impl Changeset {
    pub fn new(content: impl Into<Content>, validators: ValidatorMap) -> Self {
        Self::with_options(content, validators, Options::default())
    }

    pub fn with_options(
        content: impl Into<Content>,
        validators: ValidatorMap,
        options: Options,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                content: content.into(),
                changes: Tree::new(),
                errors: Tree::new(),
                running: HashMap::default(),
                generation: 0,
                previous: None,
                validators,
                options,
            })),
            events: Notifier::new(),
        }
    }

    /// A handle to the content this buffer stages over.
    pub fn content(&self) -> Content {
        self.state.borrow().content.clone()
    }

    /// Returns `true` if both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Changeset) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn on(&self, name: EventName, callback: impl Fn(&Event) + 'static) -> ListenerId {
        self.events.on(name, callback)
    }

    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.events.off(name, id)
    }

    pub fn trigger(&self, event: &Event) {
        self.events.trigger(event);
    }

    fn notify(&self, key: &str) {
        self.events.trigger(&Event::PropertyChanged {
            key: key.to_string(),
        });
    }

    /// Reads `path` as it would be after executing.
    ///
    /// A value staged exactly at `path` wins; a staged object is laid over what the content holds
    /// there. Next comes a value staged at an ancestor of `path`, then the buffer's own
    /// [accessors](crate#reserved-keys), and finally the content.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.state.borrow();
        match state.changes.get(path) {
            Some(Node::Leaf(change)) => return Some(change.value().clone()),
            Some(node @ Node::Branch(_)) => {
                let mut base = state
                    .content
                    .read(|content| deep::get(content, path).cloned())
                    .unwrap_or(Value::Null);
                deep::overlay(&mut base, node, state.options.policy());
                return Some(base);
            }
            None => {}
        }
        if let Some((change, rest)) = state.changes.ancestor_leaf(path) {
            return deep::get(change.value(), &rest).cloned();
        }
        if let Some(accessor) = Accessor::parse(path) {
            drop(state);
            return Some(self.read_accessor(accessor));
        }
        state
            .content
            .read(|content| deep::get(content, path).cloned())
    }

    fn read_accessor(&self, accessor: Accessor) -> Value {
        match accessor {
            Accessor::Change => self.change(),
            Accessor::Changes => self.changes().iter().map(KeyValue::to_json).collect(),
            Accessor::Error => self.error(),
            Accessor::Errors => self.errors().iter().map(KeyError::to_json).collect(),
            Accessor::Data => self.data(),
            Accessor::PendingData => self.pending_data(),
            Accessor::IsValid => self.is_valid().into(),
            Accessor::IsInvalid => self.is_invalid().into(),
            Accessor::IsDirty => self.is_dirty().into(),
            Accessor::IsPristine => self.is_pristine().into(),
            Accessor::IsValidating => self.is_validating(None).into(),
        }
    }

    /// Stages `value` at `key`, validating it first.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ReadOnly`] if `key` names one of the buffer's accessors.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<Staged, Error> {
        if Accessor::parse(key).is_some() {
            return Err(Error::ReadOnly {
                key: key.to_string(),
            });
        }
        Ok(self.set_unknown_property(key, value.into()))
    }

    /// Stages `value` at `key` without checking for accessor names.
    pub fn set_unknown_property(&self, key: &str, value: Value) -> Staged {
        trace!(target: "changeset::buffer", key, "staging write");
        let skip = self.state.borrow().options.skip_validate;
        if skip {
            self.state.borrow_mut().set_property(key, value.clone());
            self.notify(key);
            return Staged::Ready(Outcome::Valid(value));
        }
        self.validate_key(key, value)
    }

    /// Runs the rule of `key` on copies of the buffer's state, so validators are free to use
    /// the buffer themselves.
    fn check(&self, key: &str, value: &Value) -> Check {
        let (rule, changes, content) = {
            let state = self.state.borrow();
            let Some(rule) = state.validators.get(key).cloned() else {
                return Check::Ready(Verdict::Valid);
            };
            (rule, deep::normalize(&state.changes), state.content.to_value())
        };
        rule.check(&ValidationContext {
            key,
            new_value: value,
            old_value: deep::get(&content, key),
            changes: &changes,
            content: &content,
        })
    }

    fn validate_key(&self, key: &str, value: Value) -> Staged {
        self.events.trigger(&Event::BeforeValidation {
            key: key.to_string(),
        });
        let check = self.check(key, &value);
        trace!(target: "changeset::validation", key, pending = check.is_pending(), "dispatched validators");
        match check {
            Check::Ready(verdict) => {
                let outcome = self.apply(key, value, verdict);
                self.events.trigger(&Event::AfterValidation {
                    key: key.to_string(),
                });
                Staged::Ready(outcome)
            }
            Check::Pending(verdict) => {
                let guard = RunningGuard::start(&self.state, key);
                let this = self.clone();
                let owned = key.to_string();
                Staged::Pending(PendingValidation::new(key.to_string(), async move {
                    let verdict = verdict.await;
                    if !guard.finish() {
                        warn!(target: "changeset::validation", key = %owned, "discarding validation started before a rollback");
                        return Outcome::Stale;
                    }
                    let outcome = this.apply(&owned, value, verdict);
                    this.events.trigger(&Event::AfterValidation { key: owned });
                    outcome
                }))
            }
        }
    }

    /// Records the verdict on `key`: a valid value is staged, an invalid one becomes an error
    /// and its staged value is dropped.
    fn apply(&self, key: &str, value: Value, verdict: Verdict) -> Outcome {
        let outcome = {
            let mut state = self.state.borrow_mut();
            state.errors.remove(key);
            match verdict {
                Verdict::Valid => {
                    state.set_property(key, value.clone());
                    Outcome::Valid(value)
                }
                Verdict::Invalid(validation) => {
                    state.changes.remove(key);
                    let invalid = Invalid { value, validation };
                    state.errors.insert(key, invalid.clone());
                    Outcome::Invalid(invalid)
                }
            }
        };
        self.notify(key);
        outcome
    }

    /// Validates the current value of each of `keys`, or of every key in the validator map if
    /// `keys` is empty.
    ///
    /// Resolves to `None` if there is nothing to validate. All validations run concurrently and
    /// every outcome is collected, in the order of `keys`.
    pub async fn validate(&self, keys: &[&str]) -> Option<Vec<Outcome>> {
        let keys: Vec<String> = if keys.is_empty() {
            let state = self.state.borrow();
            if state.validators.is_empty() {
                return None;
            }
            state.validators.keys().map(str::to_string).collect()
        } else {
            keys.iter().map(|key| key.to_string()).collect()
        };
        debug!(target: "changeset::validation", keys = keys.len(), "validating");
        let staged: Vec<Staged> = keys
            .iter()
            .map(|key| {
                let value = self.get(key).unwrap_or(Value::Null);
                self.validate_key(key, value)
            })
            .collect();
        Some(join_all(staged.into_iter().map(Staged::settle)).await)
    }

    /// Records an error on `key`, replacing any error already there.
    pub fn add_error(&self, key: &str, error: impl Into<ErrorInput>) -> Invalid {
        let invalid = match error.into() {
            ErrorInput::Invalid(invalid) => invalid,
            ErrorInput::Reason(validation) => Invalid {
                value: self.get(key).unwrap_or(Value::Null),
                validation,
            },
        };
        self.state.borrow_mut().errors.insert(key, invalid.clone());
        self.notify(key);
        invalid
    }

    /// Appends reasons to the error on `key`, keeping the value it was recorded with.
    pub fn push_errors<I, S>(&self, key: &str, reasons: I) -> Invalid
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reasons: Vec<String> = reasons.into_iter().map(Into::into).collect();
        let existing = self.state.borrow().errors.leaf(key).cloned();
        let invalid = match existing {
            Some(mut invalid) => {
                invalid.validation.extend(reasons);
                invalid
            }
            None => Invalid {
                value: self.get(key).unwrap_or(Value::Null),
                validation: Validation::Messages(reasons),
            },
        };
        self.state.borrow_mut().errors.insert(key, invalid.clone());
        self.notify(key);
        invalid
    }

    /// Merges the staged changes into the content if the buffer is valid and dirty.
    ///
    /// The buffer keeps its changes afterwards; [`rollback`](Self::rollback) clears them.
    pub fn execute(&self) -> &Self {
        let mut state = self.state.borrow_mut();
        if !(state.is_valid() && state.is_dirty()) {
            trace!(target: "changeset::buffer", valid = state.is_valid(), "nothing to execute");
            return self;
        }
        let State {
            content,
            changes,
            options,
            previous,
            ..
        } = &mut *state;
        content.write(|value| {
            *previous = Some(value.clone());
            deep::merge_changes(value, changes, options.policy());
        });
        debug!(target: "changeset::buffer", changes = changes.len(), "executed");
        self
    }

    /// Puts the content back the way it was before the last effective [`execute`](Self::execute).
    pub fn unexecute(&self) -> &Self {
        let mut state = self.state.borrow_mut();
        if let Some(previous) = state.previous.take() {
            state.content.write(|value| *value = previous);
            debug!(target: "changeset::buffer", "unexecuted");
        }
        self
    }

    /// Executes, persists the content through its hook, and rolls back.
    ///
    /// The rollback happens whether or not persisting succeeds.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Persist`] if the hook fails. The content stays executed.
    pub async fn save(&self, options: &Value) -> Result<Saved, Error> {
        self.execute();
        let persist = self.state.borrow().content.persist(options);
        let result = match persist {
            Some(pending) => pending
                .await
                .map(Saved::Persisted)
                .map_err(Error::Persist),
            None => Ok(Saved::Unpersisted),
        };
        self.rollback();
        match &result {
            Ok(_) => debug!(target: "changeset::buffer", "saved"),
            Err(err) => warn!(target: "changeset::buffer", error = %err, "save failed"),
        }
        result
    }

    /// Combines this buffer with `other` into a new buffer over the same content.
    ///
    /// Where both stage the same key, `other` wins; a key staged as a change on one side and as an
    /// error on the other keeps only `other`'s entry. The new buffer takes its validators and
    /// options from `self`. Neither side is modified. If neither side is dirty, `self` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotABuffer`] if `other` is not a flat buffer, and with
    /// [`Error::ContentMismatch`] if it stages over different content.
    pub fn merge(&self, other: &dyn BufferedGraph) -> Result<Changeset, Error> {
        let other = match (other.kind(), other.as_changeset()) {
            (BufferKind::Flat, Some(other)) => other,
            _ => return Err(Error::NotABuffer),
        };
        let (content, validators, options, changes, errors) = {
            let this = self.state.borrow();
            let that = other.state.borrow();
            if !this.content.ptr_eq(&that.content) {
                return Err(Error::ContentMismatch);
            }
            if !this.is_dirty() && !that.is_dirty() {
                return Ok(self.clone());
            }
            let mut changes = this.changes.clone();
            changes.retain_top(|key| !that.errors.root().contains_key(key));
            let mut errors = this.errors.clone();
            errors.retain_top(|key| !that.changes.root().contains_key(key));
            (
                this.content.clone(),
                this.validators.clone(),
                this.options.clone(),
                changes.merge(that.changes.clone()),
                errors.merge(that.errors.clone()),
            )
        };
        debug!(target: "changeset::merge", changes = changes.len(), errors = errors.len(), "merged buffers");
        let merged = Changeset::with_options(content, validators, options);
        {
            let mut state = merged.state.borrow_mut();
            state.changes = changes;
            state.errors = errors;
        }
        Ok(merged)
    }

    /// Discards every staged change and error.
    ///
    /// Validations still in flight are abandoned: their outcomes settle as [`Outcome::Stale`].
    pub fn rollback(&self) -> &Self {
        let keys = {
            let mut state = self.state.borrow_mut();
            let keys = state.touched_keys();
            state.reset();
            keys
        };
        debug!(target: "changeset::buffer", keys = keys.len(), "rolled back");
        for key in &keys {
            self.notify(key);
        }
        self.events.trigger(&Event::AfterRollback);
        self
    }

    /// Discards the error on `key`, or every error if `key` is `None`, together with any change
    /// staged under the same key.
    pub fn rollback_invalid(&self, key: Option<&str>) -> &Self {
        let keys = {
            let mut state = self.state.borrow_mut();
            let keys = match key {
                Some(key) => vec![key.to_string()],
                None => state
                    .errors
                    .leaves()
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect(),
            };
            for key in &keys {
                if state.errors.remove(key).is_some() {
                    state.changes.remove(key);
                }
            }
            keys
        };
        trace!(target: "changeset::buffer", keys = keys.len(), "rolled back invalid keys");
        for key in &keys {
            self.notify(key);
        }
        self
    }

    /// Discards whatever is staged at `key`.
    pub fn rollback_property(&self, key: &str) -> &Self {
        {
            let mut state = self.state.borrow_mut();
            state.changes.remove(key);
            state.errors.remove(key);
        }
        trace!(target: "changeset::buffer", key, "rolled back property");
        self.notify(key);
        self
    }

    /// Drops every staged change whose top-level key is not in `allowed`.
    ///
    /// An empty `allowed` list keeps everything.
    pub fn cast(&self, allowed: &[&str]) -> &Self {
        if !allowed.is_empty() {
            self.state
                .borrow_mut()
                .changes
                .retain_top(|key| allowed.contains(&key));
        }
        self
    }

    /// Returns `true` if a validation of `key` is in flight, or of any key if `key` is `None`.
    pub fn is_validating(&self, key: Option<&str>) -> bool {
        let state = self.state.borrow();
        match key {
            Some(key) => state.running.contains_key(key),
            None => !state.running.is_empty(),
        }
    }

    /// Staged values by flattened dotted key.
    pub fn changes(&self) -> Vec<KeyValue> {
        self.state
            .borrow()
            .changes
            .leaves()
            .into_iter()
            .map(|(key, change)| KeyValue {
                key,
                value: change.value().clone(),
            })
            .collect()
    }

    /// Staged errors by flattened dotted key.
    pub fn errors(&self) -> Vec<KeyError> {
        self.state
            .borrow()
            .errors
            .leaves()
            .into_iter()
            .map(|(key, invalid)| KeyError {
                key,
                value: invalid.value.clone(),
                validation: invalid.validation.clone(),
            })
            .collect()
    }

    /// Staged values as one nested object.
    pub fn change(&self) -> Value {
        deep::normalize(&self.state.borrow().changes)
    }

    /// Staged errors as one nested object of `{value, validation}` entries.
    pub fn error(&self) -> Value {
        self.state.borrow().errors.to_value(Invalid::to_json)
    }

    /// A copy of the content.
    pub fn data(&self) -> Value {
        self.state.borrow().content.to_value()
    }

    /// The content as it would be after executing, without executing.
    pub fn pending_data(&self) -> Value {
        let state = self.state.borrow();
        let mut data = state.content.to_value();
        deep::merge_changes(&mut data, &state.changes, state.options.policy());
        data
    }

    pub fn is_valid(&self) -> bool {
        self.state.borrow().is_valid()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Returns `true` if anything is staged, valid or not.
    pub fn is_dirty(&self) -> bool {
        self.state.borrow().is_dirty()
    }

    pub fn is_pristine(&self) -> bool {
        !self.is_dirty()
    }
}

impl BufferedGraph for Changeset {
    fn kind(&self) -> BufferKind {
        BufferKind::Flat
    }

    fn content(&self) -> Content {
        Changeset::content(self)
    }

    fn get(&mut self, path: &str) -> Option<Value> {
        Changeset::get(self, path)
    }

    fn set(&mut self, path: &str, value: Value) -> Result<Staged, Error> {
        Changeset::set(self, path, value)
    }

    fn execute(&mut self) {
        Changeset::execute(self);
    }

    fn rollback(&mut self) {
        Changeset::rollback(self);
    }

    fn changes(&self) -> Vec<KeyValue> {
        Changeset::changes(self)
    }

    fn is_dirty(&self) -> bool {
        Changeset::is_dirty(self)
    }

    fn is_valid(&self) -> bool {
        Changeset::is_valid(self)
    }

    fn merge(&self, other: &dyn BufferedGraph) -> Result<Box<dyn BufferedGraph>, Error> {
        Ok(Box::new(Changeset::merge(self, other)?))
    }

    fn as_changeset(&self) -> Option<&Changeset> {
        Some(self)
    }
}
