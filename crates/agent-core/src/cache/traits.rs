//! Generation store traits and shared entry types.

use crate::error::{AgentError, Result};
use crate::http::{Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Identity of a stored request: its URL with the fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request.
    pub fn for_request(request: &Request) -> Self {
        Self::for_url(&request.url)
    }

    /// Derive the key for a URL.
    pub fn for_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted response snapshot.
///
/// Unlike [`Response`], an entry can be cloned freely; every lookup hands the
/// caller a fresh [`Response`] built from it.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub key: CacheKey,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Option<Url>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Capture a response for storage under `request`'s key.
    pub fn capture(request: &Request, response: Response) -> Self {
        let status = response.status;
        let headers = response.headers.clone();
        let url = response.url.clone();
        Self {
            key: CacheKey::for_request(request),
            status,
            headers,
            url,
            body: response.into_body(),
            stored_at: Utc::now(),
        }
    }

    /// Build a fresh response for a caller.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status, self.body.clone());
        response.headers = self.headers.clone();
        response.url = self.url.clone();
        response
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Entry count and size of one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub name: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Whether `request` can ever match a stored entry.
pub fn is_matchable(request: &Request) -> bool {
    request.method == Method::GET
}

/// Reject pairs the cache must not hold.
pub fn check_storable(request: &Request, response: &Response) -> Result<()> {
    if request.method != Method::GET {
        return Err(AgentError::UnsupportedMethod {
            method: request.method.to_string(),
            url: request.url.to_string(),
        });
    }
    if response.status == StatusCode::PARTIAL_CONTENT {
        return Err(AgentError::PartialResponse {
            url: request.url.to_string(),
        });
    }
    Ok(())
}

/// One named generation of cached responses.
#[async_trait]
pub trait Generation: Send + Sync {
    /// Full generation name, e.g. `eg-telematics-shell-v1.2.0`.
    fn name(&self) -> &str;

    /// Look up a stored entry by key.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>>;

    /// Store a single entry, replacing any entry under the same key.
    async fn insert(&self, entry: StoredEntry) -> Result<()>;

    /// Store a batch of entries atomically: either all land or none do.
    async fn insert_all(&self, entries: Vec<StoredEntry>) -> Result<()>;

    /// Remove the entry for a key.
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// All keys currently stored, in no particular order.
    async fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Find the stored response for `request`.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !is_matchable(request) {
            return Ok(None);
        }
        Ok(self
            .lookup(&CacheKey::for_request(request))
            .await?
            .map(|entry| entry.to_response()))
    }

    /// Store `response` under `request`.
    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        check_storable(request, &response)?;
        self.insert(StoredEntry::capture(request, response)).await
    }

    /// Store a batch of request/response pairs atomically.
    ///
    /// Every pair is validated before anything is written.
    async fn put_all(&self, pairs: Vec<(Request, Response)>) -> Result<()> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (request, response) in pairs {
            check_storable(&request, &response)?;
            entries.push(StoredEntry::capture(&request, response));
        }
        self.insert_all(entries).await
    }

    /// Delete the stored response for `request`.
    async fn delete(&self, request: &Request) -> Result<bool> {
        self.remove(&CacheKey::for_request(request)).await
    }
}

/// Shared handle to a generation.
pub type DynGeneration = Arc<dyn Generation>;

/// Process-wide registry of generations keyed by name.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a generation, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<DynGeneration>;

    /// Whether a generation with this name exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a generation and all its entries.
    ///
    /// Returns `false` when no generation had that name.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all generations in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Search every generation, in creation order, for `request`.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !is_matchable(request) {
            return Ok(None);
        }
        for name in self.keys().await? {
            let generation = self.open(&name).await?;
            if let Some(response) = generation.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Entry count and size per generation, in creation order.
    async fn stats(&self) -> Result<Vec<GenerationStats>> {
        let mut stats = Vec::new();
        for name in self.keys().await? {
            let generation = self.open(&name).await?;
            let keys = generation.keys().await?;
            let mut total_size_bytes = 0;
            for key in &keys {
                if let Some(entry) = generation.lookup(key).await? {
                    total_size_bytes += entry.size_bytes();
                }
            }
            stats.push(GenerationStats {
                name,
                entry_count: keys.len(),
                total_size_bytes,
            });
        }
        Ok(stats)
    }
}

/// Shared handle to a store.
pub type DynCacheStore = Arc<dyn CacheStore>;
