// (c) Copyright 2026 The changeset authors. All rights reserved.
use super::Changeset;
use crate::{
    Error,
    leaf::{Change, Invalid},
    tree::Tree,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// The staged state of a [`Changeset`] as plain data, keyed by flattened dotted path.
///
/// Serializes as `{"changes": {key: value}, "errors": {key: {"value", "validation"}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub changes: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, Invalid>,
}

impl Changeset {
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.borrow();
        Snapshot {
            changes: state
                .changes
                .leaves()
                .into_iter()
                .map(|(key, change)| (key, change.value().clone()))
                .collect(),
            errors: state
                .errors
                .leaves()
                .into_iter()
                .map(|(key, invalid)| (key, invalid.clone()))
                .collect(),
        }
    }

    /// Replaces the staged state with `snapshot`.
    ///
    /// Validations still in flight are abandoned.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AmbiguousSnapshot`] if a key of either map is a dotted ancestor of
    /// another key of the same map. The buffer is left untouched.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<&Self, Error> {
        let changes = Tree::from_flat(
            snapshot
                .changes
                .iter()
                .map(|(key, value)| (key.clone(), Change(value.clone()))),
        )?;
        let errors = Tree::from_flat(
            snapshot
                .errors
                .iter()
                .map(|(key, invalid)| (key.clone(), invalid.clone())),
        )?;
        let keys = {
            let mut state = self.state.borrow_mut();
            state.reset();
            state.changes = changes;
            state.errors = errors;
            state.touched_keys()
        };
        debug!(target: "changeset::buffer", keys = keys.len(), "restored");
        for key in &keys {
            self.notify(key);
        }
        Ok(self)
    }

    /// Rewrites the staged changes through `f`.
    ///
    /// `f` receives the staged values by flattened dotted key and returns the object of changes
    /// to stage instead.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::PrepareNotMapping`] if `f` does not return an object, and with
    /// [`Error::AmbiguousSnapshot`] if its keys overlap.
    pub fn prepare<F>(&self, f: F) -> Result<&Self, Error>
    where
        F: FnOnce(Map<String, Value>) -> Value,
    {
        let staged: Map<String, Value> = self
            .state
            .borrow()
            .changes
            .leaves()
            .into_iter()
            .map(|(key, change)| (key, change.value().clone()))
            .collect();
        let Value::Object(prepared) = f(staged) else {
            return Err(Error::PrepareNotMapping);
        };
        let changes =
            Tree::from_flat(prepared.into_iter().map(|(key, value)| (key, Change(value))))?;
        self.state.borrow_mut().changes = changes;
        Ok(self)
    }
}
