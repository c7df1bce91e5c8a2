//! Lifecycle event handlers.
//!
//! Every platform callback is an [`AgentEvent`] routed to a named handler.
//! The returned future is the event's "wait until" completion: the host must
//! drive it to the end before considering the event finished.

use crate::control::{ControlMessage, MessageOutcome};
use crate::error::{AgentError, Result};
use crate::fetch::FetchOutcome;
use crate::generations::{ActivationReport, InstallReport};
use crate::http::Request;
use crate::lifecycle::WorkerState;
use crate::sync::SyncOutcome;
use crate::OfflineAgent;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

/// A lifecycle event delivered by the host.
#[derive(Debug)]
pub enum AgentEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Message(Value),
}

/// Completion of a dispatched event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Fetch(FetchOutcome),
    Sync(SyncOutcome),
    Message(MessageOutcome),
}

impl OfflineAgent {
    /// Dispatch one event to its handler and wait for it to complete.
    pub async fn dispatch(&self, event: AgentEvent) -> Result<EventOutcome> {
        match event {
            AgentEvent::Install => self.install().await.map(EventOutcome::Installed),
            AgentEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            AgentEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.fetch(&request).await)),
            AgentEvent::Sync { tag } => self.sync(&tag).await.map(EventOutcome::Sync),
            AgentEvent::Message(value) => self.message(&value).await.map(EventOutcome::Message),
        }
    }

    /// Precache the shell and ask to be promoted immediately.
    ///
    /// On failure nothing is written and the agent returns to `parsed`, so
    /// the host may call this again.
    pub async fn install(&self) -> Result<InstallReport> {
        let state = &self.inner;
        state
            .lifecycle
            .transition("install", WorkerState::Parsed, WorkerState::Installing)?;

        match state.generations.precache_shell(&state.config).await {
            Ok(report) => {
                info!(
                    "Installed {} shell resources into {}",
                    report.cached.len(),
                    report.generation
                );
                state.lifecycle.set(WorkerState::Installed);
                state.lifecycle.skip_waiting();
                Ok(report)
            }
            Err(e) => {
                warn!("Install failed: {}", e);
                state.lifecycle.set(WorkerState::Parsed);
                Err(e)
            }
        }
    }

    /// Delete stale generations, then take control of open clients.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let state = &self.inner;
        state
            .lifecycle
            .transition("activate", WorkerState::Installed, WorkerState::Activating)?;

        let report = state.generations.evict_stale().await;
        state.lifecycle.set(WorkerState::Activated);

        match state.clients.claim().await {
            Ok(count) => {
                info!("Activated and claimed {} clients", count);
                state.lifecycle.mark_claimed();
            }
            Err(e) => warn!("Activated but could not claim clients: {}", e),
        }

        Ok(report)
    }

    /// Activate now if the agent is installed and has asked to skip waiting.
    ///
    /// Returns `None` when there was nothing to promote, including when a
    /// concurrent caller activated first.
    pub async fn promote(&self) -> Result<Option<ActivationReport>> {
        let lifecycle = &self.inner.lifecycle;
        if lifecycle.state() != WorkerState::Installed || !lifecycle.skip_waiting_requested() {
            return Ok(None);
        }
        match self.activate().await {
            Ok(report) => Ok(Some(report)),
            Err(AgentError::InvalidState { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Handle an intercepted request.
    ///
    /// Until the agent is activated every request passes through.
    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        if !self.inner.lifecycle.is_active() {
            return FetchOutcome::Passthrough;
        }
        self.inner.router.handle(request).await
    }

    /// Handle a deferred-retry event.
    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome> {
        self.inner.relay.on_sync(tag).await
    }

    /// Handle a control message from an application instance.
    pub async fn message(&self, value: &Value) -> Result<MessageOutcome> {
        match ControlMessage::decode(value)? {
            None => Ok(MessageOutcome::Ignored),
            Some(ControlMessage::SkipWaiting) => {
                self.inner.lifecycle.skip_waiting();
                if self.promote().await?.is_some() {
                    info!("Promoted on skip-waiting request");
                }
                Ok(MessageOutcome::SkipWaiting)
            }
            Some(ControlMessage::CacheUrls { urls }) => {
                let resolved = urls
                    .iter()
                    .map(|address| self.inner.config.resolve(address))
                    .collect::<Result<Vec<Url>>>()?;
                let count = self.inner.generations.populate_runtime(&resolved).await?;
                info!("Cached {} URLs on request", count);
                Ok(MessageOutcome::Cached { count })
            }
        }
    }
}
