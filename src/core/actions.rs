//! Per-action pending and error tracking for mutation surfaces.
//!
//! Each control (create form, contribute button, invite field, ...) owns an [`ActionSlot`].
//! While an action is in flight the slot refuses a second submission. A failure leaves its
//! message in the slot until the next success or until the user edits the input.

use crate::errors::Result;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct SlotState {
    pending: bool,
    error: Option<String>,
}

/// Pending flag and last error for one mutation surface.
#[derive(Debug, Default)]
pub struct ActionSlot {
    state: Mutex<SlotState>,
}

/// Marks a slot busy until dropped.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    slot: &'a ActionSlot,
}

impl ActionSlot {
    /// An idle slot with no error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SlotState) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Marks the slot pending, or returns `None` if an action is already in flight.
    pub fn try_begin(&self) -> Option<PendingGuard<'_>> {
        self.with_state(|state| {
            if state.pending {
                None
            } else {
                state.pending = true;
                Some(PendingGuard { slot: self })
            }
        })
    }

    /// Whether an action is in flight.
    pub fn is_pending(&self) -> bool {
        self.with_state(|state| state.pending)
    }

    /// Message of the last failure, if not cleared.
    pub fn error(&self) -> Option<String> {
        self.with_state(|state| state.error.clone())
    }

    /// Clears the surfaced error, e.g. when the user edits the input.
    pub fn clear_error(&self) {
        self.with_state(|state| state.error = None);
    }

    /// Runs `action` unless one is already pending. Success clears the previous error;
    /// failure records its message. Returns `None` when the submission was refused.
    pub async fn run<T, F>(&self, action: F) -> Option<Result<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(_pending) = self.try_begin() else {
            debug!("Ignoring duplicate submission");
            return None;
        };
        let result = action.await;
        self.with_state(|state| {
            state.error = result.as_ref().err().map(ToString::to_string);
        });
        Some(result)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.slot.with_state(|state| state.pending = false);
    }
}
