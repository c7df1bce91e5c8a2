//! Read-only views of agent state.

use crate::cache::{DynCacheStore, GenerationStats};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::generations::GenerationNames;
use crate::lifecycle::{Lifecycle, WorkerState};
use crate::sync::RelayState;
use crate::OfflineAgent;
use serde::Serialize;

/// Snapshot reported by the host health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub state: WorkerState,
    pub version: String,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub relay: RelayState,
    pub generations: Vec<GenerationStats>,
}

impl OfflineAgent {
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// Names of the generations this version writes to.
    pub fn generation_names(&self) -> &GenerationNames {
        self.inner.generations.names()
    }

    /// The underlying generation store.
    pub fn store(&self) -> &DynCacheStore {
        &self.inner.store
    }

    /// Per-generation entry counts and sizes.
    pub async fn stats(&self) -> Result<Vec<GenerationStats>> {
        self.inner.store.stats().await
    }

    pub async fn status(&self) -> Result<AgentStatus> {
        let lifecycle = &self.inner.lifecycle;
        Ok(AgentStatus {
            state: lifecycle.state(),
            version: self.inner.config.version.clone(),
            skip_waiting: lifecycle.skip_waiting_requested(),
            clients_claimed: lifecycle.clients_claimed(),
            relay: self.inner.relay.state(),
            generations: self.stats().await?,
        })
    }
}
