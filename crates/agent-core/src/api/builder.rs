//! Builder for configuring OfflineAgent initialization.

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::AgentState;
use crate::cache::{DynCacheStore, MemoryCacheStore, SqliteCacheStore};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::fetch::Router;
use crate::generations::{GenerationManager, GenerationNames};
use crate::lifecycle::Lifecycle;
use crate::network::{DynFetcher, HttpFetcher};
use crate::sync::{DynClientRegistry, NoClients, SyncRelay};
use crate::OfflineAgent;
use tracing::info;

/// Builder for configuring OfflineAgent initialization.
///
/// Anything not supplied gets a default: an in-memory generation store, a
/// reqwest-backed fetcher and a registry with no clients.
///
/// # Example
///
/// ```rust,ignore
/// use offline_agent::{AgentConfig, OfflineAgent};
///
/// let agent = OfflineAgent::builder(AgentConfig::default())
///     .sqlite_path("./agent-cache.db")
///     .build()?;
/// ```
pub struct OfflineAgentBuilder {
    config: AgentConfig,
    store: Option<DynCacheStore>,
    sqlite_path: Option<PathBuf>,
    fetcher: Option<DynFetcher>,
    clients: Option<DynClientRegistry>,
}

impl OfflineAgentBuilder {
    /// Create a new builder for the given configuration.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            store: None,
            sqlite_path: None,
            fetcher: None,
            clients: None,
        }
    }

    /// Use an existing generation store.
    ///
    /// Takes precedence over [`sqlite_path`](Self::sqlite_path).
    pub fn with_store(mut self, store: DynCacheStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist generations in a SQLite database at `path`.
    pub fn sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = Some(path.into());
        self
    }

    /// Use a custom network fetcher.
    pub fn with_fetcher(mut self, fetcher: DynFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a client registry for outbound messages and claiming.
    pub fn with_clients(mut self, clients: DynClientRegistry) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Build the OfflineAgent instance.
    pub fn build(self) -> Result<OfflineAgent> {
        self.config.validate()?;

        let store: DynCacheStore = match (self.store, self.sqlite_path) {
            (Some(store), _) => store,
            (None, Some(path)) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| crate::AgentError::io_with_path(e, parent))?;
                    }
                }
                info!("Using SQLite generation store at {}", path.display());
                Arc::new(SqliteCacheStore::new(&path)?)
            }
            (None, None) => MemoryCacheStore::shared(),
        };

        let fetcher: DynFetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new()?),
        };

        let clients: DynClientRegistry = self.clients.unwrap_or_else(|| Arc::new(NoClients));

        let config = Arc::new(self.config);
        let names = GenerationNames::from_config(&config);

        let state = AgentState {
            generations: GenerationManager::new(store.clone(), fetcher.clone(), names.clone()),
            router: Router::new(config.clone(), store.clone(), fetcher, names),
            relay: SyncRelay::new(config.sync_tag.clone(), clients.clone()),
            lifecycle: Lifecycle::new(),
            config,
            store,
            clients,
        };

        Ok(OfflineAgent {
            inner: Arc::new(state),
        })
    }
}
