// (c) Copyright 2026 The changeset authors. All rights reserved.
//! # changeset: buffered, validated writes over JSON documents
//!
//! This crate stages speculative writes to a nested JSON document, validates each write against
//! per-key validators, and only touches the document when the staged writes are explicitly
//! executed. Until then the caller can read the document as it *would* be, inspect what is
//! staged and what failed validation, and throw everything away again.
//!
//! ```rust
//! use changeset::{Changeset, Content, ValidatorMap, validation::ValidationContext};
//! use serde_json::json;
//!
//! let content = Content::new(json!({"name": "Jim", "address": {"city": "Oslo"}}));
//! let validators = ValidatorMap::new().with("name", |cx: &ValidationContext<'_>| {
//!     match cx.new_value.as_str() {
//!         Some(name) if !name.is_empty() => Ok(()),
//!         _ => Err("name is required"),
//!     }
//! });
//! let buffer = Changeset::new(content.clone(), validators);
//!
//! buffer.set("address.city", "Bergen")?;
//! assert_eq!(buffer.get("address"), Some(json!({"city": "Bergen"})));
//! assert_eq!(content.to_value()["address"]["city"], "Oslo");
//!
//! buffer.set("name", "")?;
//! assert!(buffer.is_invalid());
//! assert_eq!(buffer.errors()[0].key, "name");
//!
//! buffer.rollback_invalid(Some("name"));
//! buffer.execute();
//! assert_eq!(content.to_value()["address"]["city"], "Bergen");
//! # Ok::<(), changeset::Error>(())
//! ```
//!
//! ## Strategies
//!
//! Two buffers implement the common [`BufferedGraph`] interface:
//!
//! - [`Changeset`] keeps one tree of staged values and one of staged errors, both addressed by
//!   dotted path. It validates writes, merges with other buffers over the same content, and
//!   snapshots and restores its state.
//! - [`NodeTree`] keeps a handler per object and array it has touched. It does not validate, but
//!   it can undo an execute exactly and buffers array mutations such as `push` and `splice`.
//!
//! [`buffer`] builds either, selected by [`Options::backend`].
//!
//! ## Validation
//!
//! A validator sees the key, the new and old value, the staged changes and the content, and
//! returns a verdict either immediately or as a future ([`Check`]). Writes whose validation is
//! still pending come back as [`Staged::Pending`]: a future that applies the outcome once
//! polled. Everything is single-threaded; futures are [`LocalBoxFuture`]s and nothing needs to be
//! `Send`.
//!
//! Rolling back or restoring a buffer abandons validations in flight. They still run to
//! completion, but their outcome is discarded and reported as [`Outcome::Stale`].
//!
//! ## Reserved keys
//!
//! The names `change`, `changes`, `error`, `errors`, `data`, `pendingData`, `isValid`,
//! `isInvalid`, `isDirty`, `isPristine` and `isValidating` read the buffer's own views through
//! `get`, and cannot be written.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] under the targets `changeset::buffer`,
//! `changeset::validation`, `changeset::merge` and `changeset::node_tree`. It never installs a
//! subscriber.
//!
//! ## Features
//!
//! - `chrono`: two strings that both parse as RFC 3339 datetimes are considered equal when they
//!   denote the same instant, so writing back the same instant in another offset is not a
//!   change. Enabled by default.
//!
//! [`LocalBoxFuture`]: futures::future::LocalBoxFuture
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod accessor;
pub mod changeset;
pub mod content;
pub mod deep;
mod error;
pub mod events;
pub mod leaf;
mod macros;
pub mod node_tree;
mod options;
pub mod path;
pub mod tree;
pub mod validation;

pub use changeset::{
    Changeset, ErrorInput, KeyError, KeyValue, Outcome, PendingValidation, Saved, Snapshot,
    Staged,
};
pub use content::{Content, Persist, PersistError};
pub use deep::{DefaultPolicy, MergePolicy};
pub use error::Error;
pub use events::{Event, EventName, ListenerId};
pub use leaf::{Change, Invalid, Validation};
pub use node_tree::{ArrayView, NodeTree};
pub use options::Options;
pub use validation::{Check, ValidationContext, Validator, ValidatorMap, Verdict};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Which buffer strategy a [`BufferedGraph`] is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferKind {
    /// [`Changeset`].
    #[default]
    Flat,
    /// [`NodeTree`].
    NodeTree,
}

/// Operations every buffer strategy supports.
///
/// Buffers stage writes over shared [`Content`] and only write to it when executed.
pub trait BufferedGraph {
    fn kind(&self) -> BufferKind;

    /// A handle to the content the buffer stages over.
    fn content(&self) -> Content;

    /// Reads `path` as it would be after executing.
    fn get(&mut self, path: &str) -> Option<Value>;

    /// Stages `value` at `path`.
    fn set(&mut self, path: &str, value: Value) -> Result<Staged, Error>;

    /// Writes the staged changes into the content, if the buffer is valid and dirty.
    fn execute(&mut self);

    /// Discards everything staged.
    fn rollback(&mut self);

    /// Staged values by flattened dotted key, in key order.
    fn changes(&self) -> Vec<KeyValue>;

    fn is_dirty(&self) -> bool;

    fn is_pristine(&self) -> bool {
        !self.is_dirty()
    }

    fn is_valid(&self) -> bool;

    fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Combines this buffer with `other` into a new buffer over the same content.
    ///
    /// # Errors
    ///
    /// Buffers that cannot be merged fail with [`Error::MergeUnsupported`].
    fn merge(&self, other: &dyn BufferedGraph) -> Result<Box<dyn BufferedGraph>, Error> {
        let _ = other;
        Err(Error::MergeUnsupported)
    }

    /// The buffer as a [`Changeset`], if it is one.
    fn as_changeset(&self) -> Option<&Changeset> {
        None
    }
}

/// Builds a buffer of the kind selected by [`Options::backend`].
///
/// Node trees do not validate, so `validators` only applies to flat buffers.
///
/// # Errors
///
/// Fails with [`Error::NotAMapping`] if a node tree is requested over content that is not a
/// JSON object.
pub fn buffer(
    content: impl Into<Content>,
    validators: ValidatorMap,
    options: Options,
) -> Result<Box<dyn BufferedGraph>, Error> {
    debug!(target: "changeset::buffer", backend = ?options.backend, "building buffer");
    Ok(match options.backend {
        BufferKind::Flat => Box::new(Changeset::with_options(content, validators, options)),
        BufferKind::NodeTree => Box::new(NodeTree::new(content, options)?),
    })
}
