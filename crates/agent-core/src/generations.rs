//! Cache generation naming and lifecycle.
//!
//! The agent owns two current generations, `{namespace}-shell-{version}` and
//! `{namespace}-runtime-{version}`. Bumping the version renames both, and the
//! next activation deletes every other generation under `{namespace}-`.

use crate::cache::DynCacheStore;
use crate::config::{AgentConfig, CacheNaming};
use crate::error::{AgentError, Result};
use crate::http::Request;
use crate::network::DynFetcher;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

/// Derived names of the current generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
    namespace: String,
    version: String,
}

impl GenerationNames {
    pub fn new(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.namespace, &config.version)
    }

    /// Prefix shared by every generation this agent has ever owned.
    pub fn prefix(&self) -> String {
        format!("{}-", self.namespace)
    }

    /// Current shell generation name.
    pub fn shell(&self) -> String {
        format!(
            "{}-{}-{}",
            self.namespace,
            CacheNaming::SHELL_ROLE,
            self.version
        )
    }

    /// Current runtime generation name.
    pub fn runtime(&self) -> String {
        format!(
            "{}-{}-{}",
            self.namespace,
            CacheNaming::RUNTIME_ROLE,
            self.version
        )
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.shell() || name == self.runtime()
    }

    /// Owned by this agent's namespace but not current.
    pub fn is_stale(&self, name: &str) -> bool {
        name.starts_with(&self.prefix()) && !self.is_current(name)
    }
}

/// Result of populating the shell generation at install time.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub generation: String,
    pub cached: Vec<String>,
}

/// Result of stale-generation cleanup at activation time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Deletions that errored; those generations stay until a later activation.
    pub failed: Vec<String>,
}

/// Creates, populates and evicts generations.
pub struct GenerationManager {
    store: DynCacheStore,
    fetcher: DynFetcher,
    names: GenerationNames,
}

impl GenerationManager {
    pub fn new(store: DynCacheStore, fetcher: DynFetcher, names: GenerationNames) -> Self {
        Self {
            store,
            fetcher,
            names,
        }
    }

    pub fn names(&self) -> &GenerationNames {
        &self.names
    }

    /// Fetch the shell manifest and store it in the shell generation.
    ///
    /// Any failed fetch fails the whole install and nothing is written.
    pub async fn precache_shell(&self, config: &AgentConfig) -> Result<InstallReport> {
        let urls = config
            .shell_manifest
            .iter()
            .map(|address| config.resolve(address))
            .collect::<Result<Vec<_>>>()?;

        let generation = self.names.shell();
        info!("Precaching {} shell resources into {}", urls.len(), generation);
        self.add_all(&generation, &urls).await?;

        Ok(InstallReport {
            generation,
            cached: urls.into_iter().map(String::from).collect(),
        })
    }

    /// Store an arbitrary list of addresses in the runtime generation.
    ///
    /// Same all-or-nothing semantics as the install precache.
    pub async fn populate_runtime(&self, urls: &[Url]) -> Result<usize> {
        let generation = self.names.runtime();
        self.add_all(&generation, urls).await?;
        Ok(urls.len())
    }

    /// Delete every stale generation under the namespace prefix.
    ///
    /// Deletions run concurrently; failures are logged and reported, never
    /// returned as an error.
    pub async fn evict_stale(&self) -> ActivationReport {
        let names = match self.store.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list cache generations: {}", e);
                return ActivationReport::default();
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| self.names.is_stale(name))
            .collect();

        let outcomes = join_all(stale.iter().map(|name| async move {
            info!("Deleting old cache: {}", name);
            (name.clone(), self.store.delete(name).await)
        }))
        .await;

        let mut report = ActivationReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!("Failed to delete cache {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }
        report
    }

    /// Fetch every URL, then write all responses in one atomic batch.
    async fn add_all(&self, generation_name: &str, urls: &[Url]) -> Result<()> {
        let generation = self.store.open(generation_name).await?;

        let requests: Vec<Request> = urls.iter().cloned().map(Request::get).collect();
        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = self.fetcher.fetch(request).await?;
            if !response.ok() {
                return Err(AgentError::BadStatus {
                    url: request.url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            Ok(response)
        }))
        .await?;

        debug!("Fetched {} resources for {}", responses.len(), generation_name);
        generation
            .put_all(requests.into_iter().zip(responses).collect())
            .await
    }
}
