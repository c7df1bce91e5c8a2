//! Deferred-retry relay.
//!
//! When connectivity comes back after the application registered a pending
//! ping retry, the platform fires a tagged sync event. The relay performs no
//! retry itself; it wakes every open application instance with a
//! `{type: "SYNC_PINGS"}` message so their own retry logic can run.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Message posted to application instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    SyncPings,
}

/// Identifier of one open application instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of application instances the agent can reach.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Every currently open instance.
    async fn match_all(&self) -> Result<Vec<ClientId>>;

    /// Deliver a message to one instance.
    async fn post_message(&self, client: &ClientId, message: &OutboundMessage) -> Result<()>;

    /// Take control of every open instance. Returns how many were claimed.
    async fn claim(&self) -> Result<usize> {
        Ok(self.match_all().await?.len())
    }
}

/// Shared client registry handle.
pub type DynClientRegistry = Arc<dyn ClientRegistry>;

/// A registry with nobody in it, for hosts without application instances.
#[derive(Debug, Default)]
pub struct NoClients;

#[async_trait]
impl ClientRegistry for NoClients {
    async fn match_all(&self) -> Result<Vec<ClientId>> {
        Ok(Vec::new())
    }

    async fn post_message(&self, client: &ClientId, _message: &OutboundMessage) -> Result<()> {
        Err(crate::error::AgentError::ClientGone(client.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    Idle,
    Relaying,
}

/// What a sync event led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Tag was not the ping-retry tag.
    Ignored,
    Relayed { notified: usize },
}

/// Forwards ping-retry sync events to application instances.
pub struct SyncRelay {
    tag: String,
    clients: DynClientRegistry,
    /// Sync events currently being relayed.
    in_flight: AtomicUsize,
}

impl SyncRelay {
    pub fn new(tag: impl Into<String>, clients: DynClientRegistry) -> Self {
        Self {
            tag: tag.into(),
            clients,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> RelayState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            RelayState::Relaying
        } else {
            RelayState::Idle
        }
    }

    /// Handle a sync event carrying `tag`.
    pub async fn on_sync(&self, tag: &str) -> Result<SyncOutcome> {
        if tag != self.tag {
            debug!("Ignoring sync event with tag {}", tag);
            return Ok(SyncOutcome::Ignored);
        }

        info!("Background sync triggered");
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.notify_all().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|notified| SyncOutcome::Relayed { notified })
    }

    async fn notify_all(&self) -> Result<usize> {
        let message = OutboundMessage::SyncPings;
        let mut notified = 0;
        for client in self.clients.match_all().await? {
            match self.clients.post_message(&client, &message).await {
                Ok(()) => notified += 1,
                Err(e) => warn!("Could not notify client {}: {}", client, e),
            }
        }
        Ok(notified)
    }
}
