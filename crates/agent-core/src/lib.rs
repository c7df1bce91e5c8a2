//! Offline Agent - Offline-caching agent for a telematics web application.
//!
//! The agent sits between application instances and the network. It keeps a
//! precached application shell and a runtime generation of incidental
//! resources, answers intercepted requests with one of four strategies, and
//! relays deferred ping retries back to every open instance.
//!
//! The crate is headless: a host (see the `offline-agent-host` binary) feeds
//! it lifecycle events and turns its answers into real responses.
//!
//! # Example
//!
//! ```rust,ignore
//! use offline_agent::{AgentConfig, OfflineAgent, Request};
//!
//! #[tokio::main]
//! async fn main() -> offline_agent::Result<()> {
//!     let agent = OfflineAgent::builder(AgentConfig::default()).build()?;
//!
//!     agent.install().await?;
//!     agent.activate().await?;
//!
//!     let request = Request::parse_get("http://localhost:8080/app.js")?;
//!     if let Some(handled) = agent.fetch(&request).await.into_handled() {
//!         handled.background.settle().await;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod fetch;
pub mod generations;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod sync;

mod api;

// Re-export commonly used types
pub use cache::{CacheStore, DynCacheStore, GenerationStats, MemoryCacheStore, SqliteCacheStore};
pub use config::{AgentConfig, NetworkConfig};
pub use control::{ControlMessage, MessageOutcome};
pub use error::{AgentError, Result};
pub use fetch::{BackgroundWork, FetchOutcome, Handled, Reply, Route};
pub use generations::{ActivationReport, GenerationNames, InstallReport};
pub use http::{Destination, Request, Response};
pub use lifecycle::{Lifecycle, WorkerState};
pub use network::{DynFetcher, Fetcher, HttpFetcher, RetryConfig};
pub use sync::{ClientId, ClientRegistry, DynClientRegistry, OutboundMessage, SyncOutcome};

pub use api::{AgentEvent, AgentStatus, EventOutcome, OfflineAgentBuilder};

use std::sync::Arc;

/// Main handle for one offline agent.
///
/// Cheap to clone; every clone shares the same generation store, lifecycle
/// state and client registry.
#[derive(Clone)]
pub struct OfflineAgent {
    inner: Arc<api::AgentState>,
}

impl OfflineAgent {
    /// Create a builder for OfflineAgent.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let agent = OfflineAgent::builder(AgentConfig::default())
    ///     .with_fetcher(fetcher)
    ///     .build()?;
    /// ```
    pub fn builder(config: AgentConfig) -> OfflineAgentBuilder {
        OfflineAgentBuilder::new(config)
    }

    /// Create an agent with an in-memory store and the default HTTP fetcher.
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::builder(config).build()
    }
}
