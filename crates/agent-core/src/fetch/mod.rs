//! Fetch interception: classify each request and answer it with exactly one
//! strategy.
//!
//! | Route                   | Applies to                               | Writes to |
//! |-------------------------|------------------------------------------|-----------|
//! | passthrough             | cross-origin, not POST                   | -         |
//! | offline-post            | cross-origin POST                        | -         |
//! | network-first           | documents, `*.html`                      | shell     |
//! | cache-first             | images, icons prefix                     | runtime   |
//! | stale-while-revalidate  | every other same-origin request          | shell     |

mod background;
mod route;
mod strategies;

pub use background::BackgroundWork;
pub use route::{classify, Route};
pub use strategies::offline_queued_body;

use crate::cache::DynCacheStore;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::generations::GenerationNames;
use crate::http::{Request, Response};
use crate::network::DynFetcher;
use std::sync::Arc;
use strategies::StrategyContext;
use tracing::debug;

/// What the agent answers for an intercepted request.
#[derive(Debug)]
pub enum Reply {
    Response(Response),
    /// Resolved with nothing; the caller must treat it as a hard failure.
    Missing,
    /// The network error reached the caller unrecovered.
    Failed(AgentError),
}

impl Reply {
    /// The response, if there is one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Reply::Response(response) => Some(response),
            Reply::Missing | Reply::Failed(_) => None,
        }
    }
}

/// An intercepted request's answer plus its pending cache writes.
#[derive(Debug)]
pub struct Handled {
    pub route: Route,
    pub reply: Reply,
    pub background: BackgroundWork,
}

/// Outcome of a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    Handled(Handled),
}

impl FetchOutcome {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough)
    }

    pub fn into_handled(self) -> Option<Handled> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Handled(handled) => Some(handled),
        }
    }
}

/// Routes intercepted requests to their strategy.
pub struct Router {
    config: Arc<AgentConfig>,
    ctx: StrategyContext,
}

impl Router {
    pub fn new(
        config: Arc<AgentConfig>,
        store: DynCacheStore,
        fetcher: DynFetcher,
        names: GenerationNames,
    ) -> Self {
        Self {
            config,
            ctx: StrategyContext {
                store,
                fetcher,
                names,
            },
        }
    }

    /// Handle one intercepted request.
    pub async fn handle(&self, request: &Request) -> FetchOutcome {
        let route = classify(request, &self.config);
        debug!("{} {} -> {}", request.method, request.url, route);

        let mut background = BackgroundWork::new();
        let reply = match route {
            Route::Passthrough => return FetchOutcome::Passthrough,
            Route::OfflinePost => strategies::offline_post(&self.ctx, request).await,
            Route::NetworkFirst => {
                strategies::network_first(&self.ctx, request, &mut background).await
            }
            Route::CacheFirst => strategies::cache_first(&self.ctx, request, &mut background).await,
            Route::StaleWhileRevalidate => {
                strategies::stale_while_revalidate(&self.ctx, request, &mut background).await
            }
        };

        FetchOutcome::Handled(Handled {
            route,
            reply,
            background,
        })
    }
}
