//! Worker lifecycle state.
//!
//! `parsed → installing → installed → activating → activated`. A failed
//! install drops back to `parsed` so the host can try again.

use crate::error::{AgentError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// Lifecycle state plus the two promotion signals a host observes.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move from `from` to `to`, or fail without changing anything.
    pub(crate) fn transition(
        &self,
        action: &str,
        from: WorkerState,
        to: WorkerState,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != from {
            return Err(AgentError::InvalidState {
                action: action.to_string(),
                state: state.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    /// Unconditionally set the state.
    pub(crate) fn set(&self, to: WorkerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    /// Ask to be promoted without waiting for controlled clients to close.
    pub fn skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::SeqCst) {
            info!("Skip waiting requested");
        }
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Record that the agent took control of already-open clients.
    pub fn mark_claimed(&self) {
        self.clients_claimed.store(true, Ordering::SeqCst);
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Fetch events are only intercepted once activated.
    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Activated
    }
}
