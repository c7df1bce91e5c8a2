//! Centralized configuration for the offline agent.
//!
//! Constant groups hold the compiled-in defaults; [`AgentConfig`] is the
//! runtime configuration a host builds (or loads from JSON) and hands to the
//! agent.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Cache generation naming defaults.
pub struct CacheNaming;

impl CacheNaming {
    pub const NAMESPACE: &'static str = "eg-telematics";
    pub const VERSION: &'static str = "v1.2.0";
    pub const SHELL_ROLE: &'static str = "shell";
    pub const RUNTIME_ROLE: &'static str = "runtime";
}

/// Request routing defaults.
pub struct RoutingConfig;

impl RoutingConfig {
    pub const DEFAULT_SCOPE: &'static str = "http://localhost:8080/";
    pub const ICONS_PREFIX: &'static str = "/icons/";
    pub const HTML_SUFFIX: &'static str = ".html";
    pub const SYNC_PINGS_TAG: &'static str = "sync-pings";

    /// Resources precached into the shell generation at install time.
    pub const SHELL_MANIFEST: [&'static str; 4] = [
        "./telematics-simulator.html",
        "./manifest.json",
        "./icons/icon-192x192.png",
        "./icons/icon-512x512.png",
    ];
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Timeout the host gives its fetcher; the core default has none.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = "offline-agent/0.1";
    pub const INSTALL_RETRY_ATTEMPTS: u32 = 5;
    pub const INSTALL_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
}

/// Runtime configuration for one agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AgentConfig {
    /// URL the agent controls. Its origin is the agent's own origin and
    /// relative manifest entries resolve against it.
    pub scope: Url,
    /// Shared prefix of every generation this agent owns.
    pub namespace: String,
    /// Version tag; bumping it is the only way to evict old generations.
    pub version: String,
    /// Ordered shell resources fetched verbatim at install time.
    pub shell_manifest: Vec<String>,
    /// Path prefix treated as an image request regardless of destination.
    pub icons_prefix: String,
    /// Deferred-retry tag that wakes up application ping retries.
    pub sync_tag: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse(RoutingConfig::DEFAULT_SCOPE)
                .expect("default scope is a valid URL"),
            namespace: CacheNaming::NAMESPACE.to_string(),
            version: CacheNaming::VERSION.to_string(),
            shell_manifest: RoutingConfig::SHELL_MANIFEST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            icons_prefix: RoutingConfig::ICONS_PREFIX.to_string(),
            sync_tag: RoutingConfig::SYNC_PINGS_TAG.to_string(),
        }
    }
}

impl AgentConfig {
    /// Create a configuration for the given scope with default naming.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    /// Set the version tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the shell manifest.
    pub fn with_shell_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Load and validate a configuration from a JSON file.
    ///
    /// Missing fields fall back to the compiled-in defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::io_with_path(e, path))?;
        let config: AgentConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the agent relies on.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.scope.scheme(), "http" | "https") {
            return Err(AgentError::Config {
                message: format!("scope must be an http(s) URL, got {}", self.scope),
            });
        }
        if self.namespace.is_empty() {
            return Err(AgentError::Config {
                message: "namespace must not be empty".to_string(),
            });
        }
        if self.version.is_empty() {
            return Err(AgentError::Config {
                message: "version must not be empty".to_string(),
            });
        }
        if !self.icons_prefix.starts_with('/') {
            return Err(AgentError::Config {
                message: format!("icons_prefix must be absolute, got {}", self.icons_prefix),
            });
        }
        Ok(())
    }

    /// Resolve an address (relative or absolute) against the scope.
    pub fn resolve(&self, address: &str) -> Result<Url> {
        self.scope.join(address).map_err(|e| AgentError::InvalidUrl {
            url: address.to_string(),
            message: e.to_string(),
        })
    }
}
