//! Error types for the offline agent.
//!
//! Most failures inside the agent are recovered locally (cache fallback,
//! synthesized responses, ignored cache writes). The variants here describe
//! what can still reach a caller: the host binary, a test, or a strategy that
//! decides to swallow the error and log it.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the offline agent.
#[derive(Debug, Error)]
pub enum AgentError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unexpected status {status} for {url}")]
    BadStatus { url: String, status: u16 },

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Cache generation not found: {0}")]
    GenerationNotFound(String),

    #[error("Cannot store {method} request for {url}: only GET requests are cacheable")]
    UnsupportedMethod { method: String, url: String },

    #[error("Cannot store partial response (206) for {url}")]
    PartialResponse { url: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Protocol errors
    #[error("Invalid control message: {message}")]
    InvalidMessage { message: String },

    #[error("Cannot {action} while worker is {state}")]
    InvalidState { action: String, state: String },

    #[error("Client {0} is no longer reachable")]
    ClientGone(String),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(std::time::Duration::from_secs(0))
        } else {
            AgentError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        AgentError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl AgentError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        AgentError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a network error from a plain message.
    pub fn network(message: impl Into<String>) -> Self {
        AgentError::Network {
            message: message.into(),
            cause: None,
        }
    }

    /// Whether this error is a transport-level failure (no response at all).
    ///
    /// This is what the fetch strategies treat as "offline".
    pub fn is_network_failure(&self) -> bool {
        matches!(self, AgentError::Network { .. } | AgentError::Timeout(_))
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Network { .. } | AgentError::Timeout(_) | AgentError::BadStatus { .. }
        )
    }
}
