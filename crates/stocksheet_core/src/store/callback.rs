//! One-shot load correlation registry.
//!
//! # Responsibility
//! - Issue a unique callback key per load request.
//! - Hold at most one pending key; a new load replaces the prior one.
//!
//! # Invariants
//! - A response only completes the load whose key is still pending.
//! - A replaced load fails with `StoreError::Superseded`.

use super::{StoreError, StoreResult};
use log::debug;
use std::sync::Mutex;
use uuid::Uuid;

/// Correlation key handed out for one load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    callback: String,
}

impl LoadTicket {
    pub fn callback(&self) -> &str {
        &self.callback
    }
}

/// Registry enforcing at most one in-flight load.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    pending: Mutex<Option<String>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new load, replacing any pending one.
    pub fn begin(&self) -> LoadTicket {
        let callback = format!("cb_{}", Uuid::new_v4().simple());
        let mut pending = lock_pending(&self.pending);
        if let Some(replaced) = pending.replace(callback.clone()) {
            debug!("event=load_superseded module=store replaced={replaced} by={callback}");
        }
        LoadTicket { callback }
    }

    /// Completes the load for `ticket` if it is still the pending one.
    pub fn finish(&self, ticket: &LoadTicket) -> StoreResult<()> {
        let mut pending = lock_pending(&self.pending);
        match pending.as_deref() {
            Some(current) if current == ticket.callback => {
                *pending = None;
                Ok(())
            }
            _ => Err(StoreError::Superseded {
                callback: ticket.callback.clone(),
            }),
        }
    }

    pub fn is_pending(&self, ticket: &LoadTicket) -> bool {
        lock_pending(&self.pending).as_deref() == Some(ticket.callback.as_str())
    }
}

fn lock_pending(pending: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
