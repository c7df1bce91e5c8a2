//! HTTP handlers: agent control endpoints and the intercepted-request
//! fallback.

use crate::clients::event_stream;
use crate::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{sse::KeepAlive, IntoResponse, Response as HttpResponse, Sse},
    Json,
};
use offline_agent::http::Destination;
use offline_agent::{AgentError, AgentStatus, FetchOutcome, Reply, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Health endpoint body.
#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    #[serde(flatten)]
    agent: AgentStatus,
}

/// Body of `POST /__agent/sync`.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// HTTP status for an agent error surfaced by a control endpoint.
fn error_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::InvalidMessage { .. } | AgentError::InvalidUrl { .. } => {
            StatusCode::BAD_REQUEST
        }
        AgentError::InvalidState { .. } => StatusCode::CONFLICT,
        e if e.is_retryable() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: AgentError) -> HttpResponse {
    let status = error_status(&err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> HttpResponse {
    match state.agent.status().await {
        Ok(agent) => Json(Health {
            status: "ok",
            agent,
        })
        .into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            error_response(e)
        }
    }
}

/// Control message from an application instance.
pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Value>,
) -> HttpResponse {
    match state.agent.message(&message).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            warn!("Control message failed: {}", e);
            error_response(e)
        }
    }
}

/// Deferred-retry event.
pub async fn handle_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> HttpResponse {
    match state.agent.sync(&request.tag).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            warn!("Sync event {} failed: {}", request.tag, e);
            error_response(e)
        }
    }
}

/// Server-sent event stream for one application instance.
pub async fn handle_clients(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Sse::new(event_stream(state.clients.clone())).keep_alive(KeepAlive::default())
}

/// Every other request is a fetch event.
pub async fn handle_fetch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    let scope = state.agent.config().scope.clone();
    let request = match to_agent_request(scope, method, &uri, headers, body) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match state.agent.fetch(&request).await {
        FetchOutcome::Passthrough => match state.fetcher.fetch(&request).await {
            Ok(response) => to_http_response(response),
            Err(e) => {
                debug!("Passthrough to {} failed: {}", request.url, e);
                bad_gateway(&e.to_string())
            }
        },
        FetchOutcome::Handled(handled) => {
            // Cache writes finish after the response is sent.
            tokio::spawn(handled.background.settle());
            match handled.reply {
                Reply::Response(response) => to_http_response(response),
                Reply::Missing => bad_gateway("offline and not cached"),
                Reply::Failed(e) => bad_gateway(&e.to_string()),
            }
        }
    }
}

/// Build the agent's view of an incoming request.
///
/// Origin-form targets resolve against the scope; absolute-form targets (a
/// client using this host as a proxy) keep their own origin.
fn to_agent_request(
    scope: Url,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> offline_agent::Result<Request> {
    let url = if uri.scheme().is_some() {
        Url::parse(&uri.to_string())?
    } else {
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        scope.join(target)?
    };

    let destination = headers
        .get("sec-fetch-dest")
        .and_then(|value| value.to_str().ok())
        .map(Destination::from_fetch_dest)
        .unwrap_or_default();

    let mut request = Request::get(url).with_destination(destination);
    request.method = method;
    request.headers = headers;
    request.body = (!body.is_empty()).then_some(body);
    Ok(request)
}

fn to_http_response(response: Response) -> HttpResponse {
    let status = response.status;
    let mut headers = response.headers.clone();
    for name in [header::CONTENT_LENGTH, header::TRANSFER_ENCODING, header::CONNECTION] {
        headers.remove(name);
    }

    let mut out = HttpResponse::new(Body::from(response.into_body()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

fn bad_gateway(reason: &str) -> HttpResponse {
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": reason }))).into_response()
}
