// (c) Copyright 2026 The changeset authors. All rights reserved.
//! The document a buffer stages writes over.
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::{
    cell::{Ref, RefCell},
    error, fmt,
    rc::Rc,
};

/// Error produced by a [`Persist`] hook.
pub type PersistError = Box<dyn error::Error>;

/// Persists committed content.
///
/// Buffers call this from `save` after committing, passing the committed content and the
/// caller's options through untouched. Whatever the hook resolves to is handed back to the
/// caller of `save`.
pub trait Persist {
    fn persist(&self, content: &Value, options: &Value)
    -> LocalBoxFuture<'static, Result<Value, PersistError>>;
}

impl<F> Persist for F
where
    F: Fn(&Value, &Value) -> LocalBoxFuture<'static, Result<Value, PersistError>>,
{
    fn persist(
        &self,
        content: &Value,
        options: &Value,
    ) -> LocalBoxFuture<'static, Result<Value, PersistError>> {
        self(content, options)
    }
}

/// Shared handle to a JSON document.
///
/// Clones refer to the same document; two buffers are "over the same content" iff their handles
/// are [`ptr_eq`](Content::ptr_eq). Buffers only write to it when they execute.
#[derive(Clone)]
pub struct Content {
    value: Rc<RefCell<Value>>,
    persist: Option<Rc<dyn Persist>>,
}

impl Content {
    pub fn new(value: Value) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            persist: None,
        }
    }

    /// Creates content that can be saved through `persist`.
    pub fn with_persist(value: Value, persist: impl Persist + 'static) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
            persist: Some(Rc::new(persist)),
        }
    }

    /// Returns a copy of the current document.
    pub fn to_value(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Reads the document in place.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.value.borrow())
    }

    pub(crate) fn borrow(&self) -> Ref<'_, Value> {
        self.value.borrow()
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.value.borrow_mut())
    }

    /// Returns `true` if both handles refer to the same document.
    pub fn ptr_eq(&self, other: &Content) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    pub fn can_persist(&self) -> bool {
        self.persist.is_some()
    }

    pub(crate) fn persist(
        &self,
        options: &Value,
    ) -> Option<LocalBoxFuture<'static, Result<Value, PersistError>>> {
        let persist = self.persist.as_ref()?;
        Some(persist.persist(&self.value.borrow(), options))
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("value", &self.value.borrow())
            .field("persist", &self.persist.is_some())
            .finish()
    }
}
