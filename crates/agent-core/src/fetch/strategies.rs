//! The four response-sourcing strategies.

use super::background::{put_best_effort, BackgroundWork};
use super::Reply;
use crate::cache::DynCacheStore;
use crate::generations::GenerationNames;
use crate::http::{Request, Response};
use crate::network::DynFetcher;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

/// Shared handles every strategy needs.
#[derive(Clone)]
pub(crate) struct StrategyContext {
    pub store: DynCacheStore,
    pub fetcher: DynFetcher,
    pub names: GenerationNames,
}

impl StrategyContext {
    /// Store-wide lookup where a storage error counts as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.store.match_request(request).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", request.url, e);
                None
            }
        }
    }
}

/// Body of the substitute response for an offline cross-origin write.
pub fn offline_queued_body() -> serde_json::Value {
    json!({ "error": "Offline", "queued": true })
}

/// Cross-origin POST: network, or a 503 telling the app to retry later.
pub(crate) async fn offline_post(ctx: &StrategyContext, request: &Request) -> Reply {
    match ctx.fetcher.fetch(request).await {
        Ok(response) => Reply::Response(response),
        Err(e) => {
            debug!("API call to {} failed, signalling queue for sync: {}", request.url, e);
            Reply::Response(Response::json(
                StatusCode::SERVICE_UNAVAILABLE,
                &offline_queued_body(),
            ))
        }
    }
}

/// Documents: fresh from the network, cached copy when offline.
pub(crate) async fn network_first(
    ctx: &StrategyContext,
    request: &Request,
    background: &mut BackgroundWork,
) -> Reply {
    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            let (returned, stored) = response.split();
            background.store(
                ctx.store.clone(),
                ctx.names.shell(),
                request.clone(),
                stored,
            );
            Reply::Response(returned)
        }
        Err(e) => {
            debug!("Network failed for {}, falling back to cache: {}", request.url, e);
            match ctx.lookup(request).await {
                Some(hit) => Reply::Response(hit),
                None => Reply::Missing,
            }
        }
    }
}

/// Images: cached copy when present, otherwise network into the runtime
/// generation.
pub(crate) async fn cache_first(
    ctx: &StrategyContext,
    request: &Request,
    background: &mut BackgroundWork,
) -> Reply {
    if let Some(hit) = ctx.lookup(request).await {
        return Reply::Response(hit);
    }

    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            let (returned, stored) = response.split();
            background.store(
                ctx.store.clone(),
                ctx.names.runtime(),
                request.clone(),
                stored,
            );
            Reply::Response(returned)
        }
        Err(e) => Reply::Failed(e),
    }
}

/// Everything else: answer from the cache right away and refresh the shell
/// generation in the background. A cold request waits for the network.
pub(crate) async fn stale_while_revalidate(
    ctx: &StrategyContext,
    request: &Request,
    background: &mut BackgroundWork,
) -> Reply {
    let cached = ctx.lookup(request).await;

    if let Some(hit) = cached {
        let ctx = ctx.clone();
        let request = request.clone();
        background.spawn(async move {
            let refreshed = ctx.fetcher.fetch(&request).await;
            match refreshed {
                Ok(response) => {
                    put_best_effort(ctx.store.clone(), ctx.names.shell(), request, response).await
                }
                Err(e) => debug!("Revalidation of {} failed: {}", request.url, e),
            }
        });
        return Reply::Response(hit);
    }

    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            let (returned, stored) = response.split();
            background.store(
                ctx.store.clone(),
                ctx.names.shell(),
                request.clone(),
                stored,
            );
            Reply::Response(returned)
        }
        Err(e) => {
            debug!("Network failed for {} with nothing cached: {}", request.url, e);
            Reply::Missing
        }
    }
}
