//! Integration tests for the OfflineAgent event handlers.
//!
//! Every test drives the agent through its public events with a scripted
//! network, then inspects the generation store directly.

mod common;

use common::*;
use offline_agent::cache::{CacheStore, Generation};
use offline_agent::{
    AgentError, AgentEvent, Destination, EventOutcome, MemoryCacheStore, MessageOutcome,
    OutboundMessage, Reply, Request, Route, SyncOutcome, WorkerState,
};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use url::Url;

const SHELL: &str = "eg-telematics-shell-v1.2.0";
const RUNTIME: &str = "eg-telematics-runtime-v1.2.0";

async fn stored_body(store: &MemoryCacheStore, generation: &str, url: &Url) -> Option<String> {
    let generation = store.open(generation).await.unwrap();
    let hit = generation
        .match_request(&Request::get(url.clone()))
        .await
        .unwrap()?;
    Some(String::from_utf8(hit.into_body().to_vec()).unwrap())
}

fn body_text(reply: Reply) -> String {
    let response = reply.into_response().expect("a response");
    String::from_utf8(response.into_body().to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_install_precaches_shell() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    let agent = agent_with(config, store.clone(), fetcher.clone(), Default::default());

    let report = agent.install().await.unwrap();

    assert_eq!(report.generation, SHELL);
    assert_eq!(report.cached.len(), 4);
    assert_eq!(agent.state(), WorkerState::Installed);
    assert!(agent.lifecycle().skip_waiting_requested());

    let page = url("telematics-simulator.html");
    assert_eq!(
        stored_body(&store, SHELL, &page).await.as_deref(),
        Some("shell:/telematics-simulator.html")
    );
}

#[tokio::test]
async fn test_failed_install_writes_nothing_and_can_retry() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    let manifest = url("manifest.json");
    fetcher.fail(&manifest);
    let agent = agent_with(config, store.clone(), fetcher.clone(), Default::default());

    let err = agent.install().await.unwrap_err();
    assert!(err.is_network_failure());
    assert_eq!(agent.state(), WorkerState::Parsed);
    assert!(stored_body(&store, SHELL, &url("telematics-simulator.html"))
        .await
        .is_none());

    fetcher.heal(&manifest);
    agent.install().await.unwrap();
    assert_eq!(agent.state(), WorkerState::Installed);
}

#[tokio::test]
async fn test_install_rejects_error_status() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    fetcher.serve_status(&url("manifest.json"), StatusCode::NOT_FOUND, "");
    let agent = agent_with(config, store.clone(), fetcher, Default::default());

    let err = agent.install().await.unwrap_err();
    assert!(matches!(err, AgentError::BadStatus { status: 404, .. }));
    assert!(stored_body(&store, SHELL, &url("telematics-simulator.html"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_activate_requires_install() {
    let agent = agent_with(
        config(),
        Arc::new(MemoryCacheStore::new()),
        ScriptedFetcher::new(),
        Default::default(),
    );
    let err = agent.activate().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState { .. }));
}

#[tokio::test]
async fn test_activation_deletes_only_stale_generations() {
    let store = Arc::new(MemoryCacheStore::new());
    for name in [
        "eg-telematics-shell-v1",
        "eg-telematics-runtime-v1",
        "eg-telematics-shell-v2",
        "other-app-shell-v1",
    ] {
        store.open(name).await.unwrap();
    }

    let fetcher = ScriptedFetcher::new();
    let config = config().with_version("v2");
    fetcher.serve_shell(&config);
    let clients = RecordingClients::with_clients(&["tab-1", "tab-2"]);
    let agent = agent_with(config, store.clone(), fetcher, clients);

    agent.install().await.unwrap();
    let report = agent.activate().await.unwrap();

    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(
        deleted,
        vec!["eg-telematics-runtime-v1", "eg-telematics-shell-v1"]
    );
    assert!(report.failed.is_empty());

    let mut remaining = store.keys().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["eg-telematics-shell-v2", "other-app-shell-v1"]);

    assert_eq!(agent.state(), WorkerState::Activated);
    assert!(agent.lifecycle().clients_claimed());
}

#[tokio::test]
async fn test_activation_survives_failed_deletion() {
    let store = FlakyDeleteStore::new(&["eg-telematics-shell-v0"]);
    store.open("eg-telematics-shell-v0").await.unwrap();
    store.open("eg-telematics-runtime-v0").await.unwrap();

    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    let agent = agent_with(config, store.clone(), fetcher, Default::default());
    agent.install().await.unwrap();

    let report = agent.activate().await.unwrap();
    assert_eq!(report.deleted, vec!["eg-telematics-runtime-v0"]);
    assert_eq!(report.failed, vec!["eg-telematics-shell-v0"]);
    assert_eq!(agent.state(), WorkerState::Activated);
}

#[tokio::test]
async fn test_fetch_passes_through_before_activation() {
    let fetcher = ScriptedFetcher::new();
    let agent = agent_with(
        config(),
        Arc::new(MemoryCacheStore::new()),
        fetcher.clone(),
        Default::default(),
    );
    let outcome = agent.fetch(&Request::get(url("app.js"))).await;
    assert!(outcome.is_passthrough());
    assert_eq!(fetcher.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cross_origin_get_is_not_intercepted() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;

    let request = Request::parse_get("https://api.telematics.example/vehicles").unwrap();
    assert!(agent.fetch(&request).await.is_passthrough());
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_offline_cross_origin_post_is_queued() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::post(
        Url::parse("https://api.telematics.example/pings").unwrap(),
        r#"{"lat":1.0}"#,
    );
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(handled.route, Route::OfflinePost);

    let response = handled.reply.into_response().unwrap();
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(
        response.json_body().unwrap(),
        json!({"error": "Offline", "queued": true})
    );
}

#[tokio::test]
async fn test_online_cross_origin_post_returns_network_response() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    let pings = Url::parse("https://api.telematics.example/pings").unwrap();
    fetcher.serve_status(&pings, StatusCode::CREATED, "accepted");

    let handled = agent
        .fetch(&Request::post(pings, "{}"))
        .await
        .into_handled()
        .unwrap();
    let response = handled.reply.into_response().unwrap();
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_document_network_first_updates_shell() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(store.clone(), fetcher.clone()).await;

    let page = url("dashboard");
    fetcher.serve(&page, "fresh dashboard");
    let request = Request::get(page.clone()).with_destination(Destination::Document);

    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(handled.route, Route::NetworkFirst);
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "fresh dashboard");
    assert_eq!(
        stored_body(&store, SHELL, &page).await.as_deref(),
        Some("fresh dashboard")
    );
}

#[tokio::test]
async fn test_document_falls_back_to_cache_when_offline() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(store.clone(), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::get(url("telematics-simulator.html"));
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(handled.route, Route::NetworkFirst);
    assert!(handled.background.is_empty());
    assert_eq!(body_text(handled.reply), "shell:/telematics-simulator.html");
}

#[tokio::test]
async fn test_uncached_document_offline_is_missing() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::get(url("reports.html"));
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert!(matches!(handled.reply, Reply::Missing));
}

#[tokio::test]
async fn test_cached_image_skips_network() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;

    let icon = url("icons/icon-192x192.png");
    let handled = agent
        .fetch(&Request::get(icon.clone()))
        .await
        .into_handled()
        .unwrap();
    assert_eq!(handled.route, Route::CacheFirst);
    assert_eq!(body_text(handled.reply), "shell:/icons/icon-192x192.png");
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_uncached_image_is_fetched_once_into_runtime() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(store.clone(), fetcher.clone()).await;

    let photo = url("photos/truck.jpg");
    fetcher.serve(&photo, "jpeg bytes");
    let request = Request::get(photo.clone()).with_destination(Destination::Image);

    let handled = agent.fetch(&request).await.into_handled().unwrap();
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "jpeg bytes");
    assert_eq!(fetcher.calls_to(&photo), 1);
    assert_eq!(
        stored_body(&store, RUNTIME, &photo).await.as_deref(),
        Some("jpeg bytes")
    );

    // Second request is served from the runtime generation.
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(body_text(handled.reply), "jpeg bytes");
    assert_eq!(fetcher.calls_to(&photo), 1);
}

#[tokio::test]
async fn test_uncached_image_offline_fails() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::get(url("photos/van.jpg")).with_destination(Destination::Image);
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert!(matches!(handled.reply, Reply::Failed(ref e) if e.is_network_failure()));
}

#[tokio::test]
async fn test_stale_while_revalidate_refreshes_for_next_time() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(store.clone(), fetcher.clone()).await;

    let script = url("app.js");
    fetcher.serve(&script, "v1");
    let request = Request::get(script.clone());

    // Cold: waits for the network and stores the result.
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(handled.route, Route::StaleWhileRevalidate);
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "v1");

    // Warm: the stored copy is returned and a refresh is fetched.
    fetcher.serve(&script, "v2");
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    assert_eq!(handled.background.len(), 1);
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "v1");
    assert_eq!(fetcher.calls_to(&script), 2);
    assert_eq!(stored_body(&store, SHELL, &script).await.as_deref(), Some("v2"));

    // Next request sees the refreshed copy.
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "v2");
}

#[tokio::test]
async fn test_stale_while_revalidate_serves_cache_offline() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::get(url("manifest.json"));
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "shell:/manifest.json");
}

#[tokio::test]
async fn test_fragment_does_not_change_cache_key() {
    let fetcher = ScriptedFetcher::new();
    let agent = active_agent(Arc::new(MemoryCacheStore::new()), fetcher.clone()).await;
    fetcher.set_offline(true);

    let request = Request::parse_get("https://app.example/manifest.json#section").unwrap();
    let handled = agent.fetch(&request).await.into_handled().unwrap();
    handled.background.settle().await;
    assert_eq!(body_text(handled.reply), "shell:/manifest.json");
}

// ---------------------------------------------------------------------------
// Sync relay and control channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sync_pings_reaches_every_client() {
    let clients = RecordingClients::with_clients(&["tab-1", "tab-2"]);
    let agent = agent_with(
        config(),
        Arc::new(MemoryCacheStore::new()),
        ScriptedFetcher::new(),
        clients.clone(),
    );

    let outcome = agent.sync("sync-pings").await.unwrap();
    assert_eq!(outcome, SyncOutcome::Relayed { notified: 2 });
    let delivered = clients.delivered();
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|(_, message)| *message == OutboundMessage::SyncPings));

    assert_eq!(agent.sync("sync-photos").await.unwrap(), SyncOutcome::Ignored);
    assert_eq!(clients.delivered().len(), 2);
}

#[tokio::test]
async fn test_skip_waiting_message() {
    let agent = agent_with(
        config(),
        Arc::new(MemoryCacheStore::new()),
        ScriptedFetcher::new(),
        Default::default(),
    );
    let outcome = agent.message(&json!({"type": "SKIP_WAITING"})).await.unwrap();
    assert_eq!(outcome, MessageOutcome::SkipWaiting);
    assert!(agent.lifecycle().skip_waiting_requested());
}

#[tokio::test]
async fn test_skip_waiting_message_promotes_installed_agent() {
    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    let agent = agent_with(
        config,
        Arc::new(MemoryCacheStore::new()),
        fetcher,
        RecordingClients::with_clients(&["tab"]),
    );
    agent.install().await.unwrap();
    assert!(agent.fetch(&Request::get(url("app.js"))).await.is_passthrough());

    let outcome = agent.message(&json!({"type": "SKIP_WAITING"})).await.unwrap();
    assert_eq!(outcome, MessageOutcome::SkipWaiting);
    assert_eq!(agent.state(), WorkerState::Activated);
    assert!(agent.lifecycle().clients_claimed());
    assert!(!agent.fetch(&Request::get(url("app.js"))).await.is_passthrough());

    // Already active: nothing left to promote.
    let outcome = agent.message(&json!({"type": "SKIP_WAITING"})).await.unwrap();
    assert_eq!(outcome, MessageOutcome::SkipWaiting);
    assert!(agent.promote().await.unwrap().is_none());
    assert_eq!(agent.state(), WorkerState::Activated);
}

#[tokio::test]
async fn test_cache_urls_populates_runtime() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    fetcher.serve(&url("routes/north.json"), "north");
    fetcher.serve(&url("routes/south.json"), "south");
    let agent = agent_with(config(), store.clone(), fetcher, Default::default());

    let outcome = agent
        .message(&json!({
            "type": "CACHE_URLS",
            "urls": ["./routes/north.json", "/routes/south.json"]
        }))
        .await
        .unwrap();
    assert_eq!(outcome, MessageOutcome::Cached { count: 2 });
    assert_eq!(
        stored_body(&store, RUNTIME, &url("routes/north.json"))
            .await
            .as_deref(),
        Some("north")
    );
}

#[tokio::test]
async fn test_cache_urls_empty_list_is_a_no_op() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    let agent = agent_with(config(), store.clone(), fetcher.clone(), Default::default());

    let outcome = agent
        .message(&json!({"type": "CACHE_URLS", "urls": []}))
        .await
        .unwrap();
    assert_eq!(outcome, MessageOutcome::Cached { count: 0 });
    assert_eq!(fetcher.call_count(), 0);
    let runtime = store.open(RUNTIME).await.unwrap();
    assert!(runtime.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cache_urls_is_all_or_nothing() {
    let store = Arc::new(MemoryCacheStore::new());
    let fetcher = ScriptedFetcher::new();
    fetcher.serve(&url("routes/north.json"), "north");
    fetcher.fail(&url("routes/south.json"));
    let agent = agent_with(config(), store.clone(), fetcher, Default::default());

    let result = agent
        .message(&json!({
            "type": "CACHE_URLS",
            "urls": ["./routes/north.json", "./routes/south.json"]
        }))
        .await;
    assert!(result.is_err());
    let runtime = store.open(RUNTIME).await.unwrap();
    assert!(runtime.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unrelated_messages_are_ignored() {
    let agent = agent_with(
        config(),
        Arc::new(MemoryCacheStore::new()),
        ScriptedFetcher::new(),
        Default::default(),
    );
    let outcome = agent.message(&json!({"type": "HELLO"})).await.unwrap();
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(!agent.lifecycle().skip_waiting_requested());
}

#[tokio::test]
async fn test_dispatch_routes_events() {
    let fetcher = ScriptedFetcher::new();
    let config = config();
    fetcher.serve_shell(&config);
    let agent = agent_with(
        config,
        Arc::new(MemoryCacheStore::new()),
        fetcher,
        RecordingClients::with_clients(&["tab"]),
    );

    assert!(matches!(
        agent.dispatch(AgentEvent::Install).await.unwrap(),
        EventOutcome::Installed(_)
    ));
    assert!(matches!(
        agent.dispatch(AgentEvent::Activate).await.unwrap(),
        EventOutcome::Activated(_)
    ));
    assert!(matches!(
        agent
            .dispatch(AgentEvent::Sync {
                tag: "sync-pings".into()
            })
            .await
            .unwrap(),
        EventOutcome::Sync(SyncOutcome::Relayed { notified: 1 })
    ));

    let status = agent.status().await.unwrap();
    assert_eq!(status.state, WorkerState::Activated);
    assert_eq!(status.generations.len(), 1);
    assert_eq!(status.generations[0].entry_count, 4);
}
