//! In-memory generation store.
//!
//! Used by tests and by hosts that do not need generations to outlive the
//! process.

use super::traits::{CacheKey, CacheStore, DynGeneration, Generation, StoredEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A generation held entirely in memory.
pub struct MemoryGeneration {
    name: String,
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
}

impl MemoryGeneration {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Generation for MemoryGeneration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<StoredEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn insert(&self, entry: StoredEntry) -> Result<()> {
        debug!("{}: storing {}", self.name, entry.key);
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn insert_all(&self, entries: Vec<StoredEntry>) -> Result<()> {
        // A single write guard makes the batch visible all at once.
        let mut guard = self.entries.write().await;
        for entry in entries {
            guard.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// Generation store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryCacheStore {
    /// Generations in creation order.
    generations: RwLock<Vec<Arc<MemoryGeneration>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for sharing the store as a trait object.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<DynGeneration> {
        if let Some(existing) = self
            .generations
            .read()
            .await
            .iter()
            .find(|g| g.name == name)
        {
            return Ok(existing.clone());
        }

        let mut guard = self.generations.write().await;
        // Another opener may have created it between the two locks.
        if let Some(existing) = guard.iter().find(|g| g.name == name) {
            return Ok(existing.clone());
        }
        debug!("Creating cache generation {}", name);
        let generation = Arc::new(MemoryGeneration::new(name));
        guard.push(generation.clone());
        Ok(generation)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.generations.read().await.iter().any(|g| g.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut guard = self.generations.write().await;
        let before = guard.len();
        guard.retain(|g| g.name != name);
        Ok(guard.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .map(|g| g.name.clone())
            .collect())
    }
}
