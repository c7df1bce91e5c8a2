//! Request classification.

use crate::config::{AgentConfig, RoutingConfig};
use crate::http::{Destination, Request};
use reqwest::Method;
use serde::Serialize;

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Not intercepted; default network behavior applies.
    Passthrough,
    /// Cross-origin write: network, or a synthesized 503 when offline.
    OfflinePost,
    /// Documents: network, falling back to the cache.
    NetworkFirst,
    /// Images: cache, falling back to the network.
    CacheFirst,
    /// Everything else: cached copy now, refreshed copy for next time.
    StaleWhileRevalidate,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Route::Passthrough => "passthrough",
            Route::OfflinePost => "offline-post",
            Route::NetworkFirst => "network-first",
            Route::CacheFirst => "cache-first",
            Route::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

/// Pick the route for `request`. First match wins.
pub fn classify(request: &Request, config: &AgentConfig) -> Route {
    if request.url.origin() != config.scope.origin() {
        return if request.method == Method::POST {
            Route::OfflinePost
        } else {
            Route::Passthrough
        };
    }

    let path = request.url.path();

    if request.destination == Destination::Document || path.ends_with(RoutingConfig::HTML_SUFFIX)
    {
        return Route::NetworkFirst;
    }

    if request.destination == Destination::Image || path.starts_with(&config.icons_prefix) {
        return Route::CacheFirst;
    }

    Route::StaleWhileRevalidate
}
