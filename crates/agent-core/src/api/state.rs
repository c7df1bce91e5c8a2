//! Shared state behind an [`OfflineAgent`](crate::OfflineAgent) handle.

use crate::cache::DynCacheStore;
use crate::config::AgentConfig;
use crate::fetch::Router;
use crate::generations::GenerationManager;
use crate::lifecycle::Lifecycle;
use crate::network::DynFetcher;
use crate::sync::{DynClientRegistry, SyncRelay};
use std::sync::Arc;

pub(crate) struct AgentState {
    pub config: Arc<AgentConfig>,
    pub store: DynCacheStore,
    pub clients: DynClientRegistry,
    pub lifecycle: Lifecycle,
    pub generations: GenerationManager,
    pub router: Router,
    pub relay: SyncRelay,
}
