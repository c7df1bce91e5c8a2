//! Shared fakes for agent integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use offline_agent::cache::{CacheStore, DynGeneration};
use offline_agent::{
    AgentConfig, AgentError, ClientId, ClientRegistry, Fetcher, MemoryCacheStore, OfflineAgent,
    OutboundMessage, Request, Response, Result,
};
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

pub const SCOPE: &str = "https://app.example/";

pub fn url(address: &str) -> Url {
    Url::parse(SCOPE).unwrap().join(address).unwrap()
}

pub fn config() -> AgentConfig {
    AgentConfig::new(Url::parse(SCOPE).unwrap())
}

/// A network that answers from a script and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    unreachable: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `body` with 200 for `url`.
    pub fn serve(&self, url: &Url, body: &str) {
        self.serve_status(url, StatusCode::OK, body);
    }

    pub fn serve_status(&self, url: &Url, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    /// Serve every address of the default shell manifest.
    pub fn serve_shell(&self, config: &AgentConfig) {
        for address in &config.shell_manifest {
            let url = config.resolve(address).unwrap();
            self.serve(&url, &format!("shell:{}", url.path()));
        }
    }

    /// Make one URL fail at the transport level.
    pub fn fail(&self, url: &Url) {
        self.unreachable.lock().unwrap().insert(url.to_string());
    }

    /// Undo [`fail`](Self::fail).
    pub fn heal(&self, url: &Url) {
        self.unreachable.lock().unwrap().remove(url.as_str());
    }

    /// Make every URL fail at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &Url) -> usize {
        let wanted = url.to_string();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| **called == wanted)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push(key.clone());

        if self.offline.load(Ordering::SeqCst) || self.unreachable.lock().unwrap().contains(&key)
        {
            return Err(AgentError::network(format!("{} is unreachable", key)));
        }

        let scripted = self.routes.lock().unwrap().get(&key).cloned();
        let (status, body) = scripted.unwrap_or((StatusCode::NOT_FOUND, String::new()));
        Ok(Response::new(status, body).with_url(request.url.clone()))
    }
}

/// Application instances that record what they were sent.
#[derive(Default)]
pub struct RecordingClients {
    ids: Mutex<Vec<ClientId>>,
    delivered: Mutex<Vec<(ClientId, OutboundMessage)>>,
}

impl RecordingClients {
    pub fn with_clients(names: &[&str]) -> Arc<Self> {
        let clients = Self::default();
        *clients.ids.lock().unwrap() = names.iter().map(|n| ClientId(n.to_string())).collect();
        Arc::new(clients)
    }

    pub fn delivered(&self) -> Vec<(ClientId, OutboundMessage)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientRegistry for RecordingClients {
    async fn match_all(&self) -> Result<Vec<ClientId>> {
        Ok(self.ids.lock().unwrap().clone())
    }

    async fn post_message(&self, client: &ClientId, message: &OutboundMessage) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((client.clone(), message.clone()));
        Ok(())
    }
}

/// A store whose deletions of chosen generations fail.
pub struct FlakyDeleteStore {
    inner: MemoryCacheStore,
    undeletable: HashSet<String>,
}

impl FlakyDeleteStore {
    pub fn new(undeletable: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStore::new(),
            undeletable: undeletable.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl CacheStore for FlakyDeleteStore {
    async fn open(&self, name: &str) -> Result<DynGeneration> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.undeletable.contains(name) {
            return Err(AgentError::Other(format!("{} is locked", name)));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

/// Build an agent over the given fakes with an in-memory store.
pub fn agent_with(
    config: AgentConfig,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<ScriptedFetcher>,
    clients: Arc<RecordingClients>,
) -> OfflineAgent {
    OfflineAgent::builder(config)
        .with_store(store)
        .with_fetcher(fetcher)
        .with_clients(clients)
        .build()
        .expect("agent builds")
}

/// Install and activate an agent whose shell is fully reachable.
pub async fn active_agent(
    store: Arc<dyn CacheStore>,
    fetcher: Arc<ScriptedFetcher>,
) -> OfflineAgent {
    let config = config();
    fetcher.serve_shell(&config);
    let agent = agent_with(config, store, fetcher.clone(), Arc::new(RecordingClients::default()));
    agent.install().await.expect("install succeeds");
    agent.activate().await.expect("activate succeeds");
    fetcher.reset_calls();
    agent
}
