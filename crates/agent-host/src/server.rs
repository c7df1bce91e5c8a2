//! HTTP server implementation using Axum.

use crate::clients::BroadcastClients;
use crate::handler::{handle_clients, handle_fetch, handle_health, handle_message, handle_sync};
use axum::{
    routing::{get, post},
    Router,
};
use offline_agent::network::{retry_async, RetryConfig};
use offline_agent::{AgentError, DynFetcher, OfflineAgent};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// The agent answering fetch, sync and message events
    pub agent: OfflineAgent,
    /// Network used for requests the agent does not intercept
    pub fetcher: DynFetcher,
    /// Connected application instances
    pub clients: Arc<BroadcastClients>,
}

/// Build the router for the agent endpoints and the fetch fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__agent/health", get(handle_health))
        .route("/__agent/message", post(handle_message))
        .route("/__agent/sync", post(handle_sync))
        .route("/__agent/clients", get(handle_clients))
        .fallback(handle_fetch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

/// Install (retrying while the network is unavailable), then promote.
///
/// Until this finishes every request passes through to the network.
pub async fn bring_up(agent: &OfflineAgent, retry: &RetryConfig) -> offline_agent::Result<()> {
    let (installed, stats) = retry_async(retry, || agent.install(), AgentError::is_retryable).await;
    let report = installed?;
    info!(
        "Installed {} after {} attempt(s)",
        report.generation, stats.attempts
    );

    match agent.promote().await? {
        Some(activation) if !activation.deleted.is_empty() => {
            info!("Evicted {} old generation(s)", activation.deleted.len());
        }
        Some(_) => {}
        None => info!("Installed agent is waiting to be promoted"),
    }
    Ok(())
}
