// (c) Copyright 2026 The changeset authors. All rights reserved.
use super::State;
use crate::leaf::Invalid;
use futures::{FutureExt, future::LocalBoxFuture};
use serde_json::Value;
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

/// What became of a write once its validation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The value passed validation and is staged (or matched the content and was dropped).
    Valid(Value),
    /// The value failed validation and is recorded as an error.
    Invalid(Invalid),
    /// The buffer was rolled back or restored while the validation was running; the result was
    /// discarded.
    Stale,
}

impl Outcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid(_))
    }
}

/// The result of staging a write.
#[derive(Debug)]
pub enum Staged {
    /// Validation (if any) finished synchronously.
    Ready(Outcome),
    /// Validation is still running; poll the future to apply its result to the buffer.
    Pending(PendingValidation),
}

impl Staged {
    pub fn is_pending(&self) -> bool {
        matches!(self, Staged::Pending(_))
    }

    /// Returns the outcome if validation finished synchronously.
    pub fn as_ready(&self) -> Option<&Outcome> {
        match self {
            Staged::Ready(outcome) => Some(outcome),
            Staged::Pending(_) => None,
        }
    }

    /// Waits for validation to finish and its result to be applied.
    pub async fn settle(self) -> Outcome {
        match self {
            Staged::Ready(outcome) => outcome,
            Staged::Pending(pending) => pending.await,
        }
    }
}

/// A validation still in flight.
///
/// Nothing happens until this is polled: once the validators resolve, the outcome is written to
/// the buffer, exactly as a synchronous validation would have been. Dropping it abandons the
/// result. Outcomes land in the order validations finish, not the order they started.
#[must_use = "a pending validation only applies its outcome when polled"]
pub struct PendingValidation {
    key: String,
    future: LocalBoxFuture<'static, Outcome>,
}

impl PendingValidation {
    pub(super) fn new(
        key: String,
        future: impl Future<Output = Outcome> + 'static,
    ) -> PendingValidation {
        Self {
            key,
            future: future.boxed_local(),
        }
    }

    /// The key being validated.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Future for PendingValidation {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.poll_unpin(cx)
    }
}

impl fmt::Debug for PendingValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValidation")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Counts one in-flight validation of a key for as long as it lives.
///
/// The count is only released if the buffer has not been rolled back or restored since the
/// validation started; both reset the counts themselves.
pub(super) struct RunningGuard {
    state: Weak<RefCell<State>>,
    key: String,
    generation: u64,
    released: bool,
}

impl RunningGuard {
    pub(super) fn start(state: &Rc<RefCell<State>>, key: &str) -> Self {
        let mut s = state.borrow_mut();
        *s.running.entry(key.to_string()).or_default() += 1;
        Self {
            state: Rc::downgrade(state),
            key: key.to_string(),
            generation: s.generation,
            released: false,
        }
    }

    /// Releases the count. Returns `true` if the buffer is still in the generation the
    /// validation started in.
    pub(super) fn finish(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let Ok(mut s) = state.try_borrow_mut() else {
            return false;
        };
        if s.generation != self.generation {
            return false;
        }
        if let Some(count) = s.running.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                s.running.remove(&self.key);
            }
        }
        true
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.release();
    }
}
