//! Inbound control messages from application instances.
//!
//! Decoded once at the boundary:
//! - `{"type": "SKIP_WAITING"}`
//! - `{"type": "CACHE_URLS", "urls": ["./a.json", ...]}`
//!
//! Messages with any other (or no) `type` are ignored, matching how the
//! application may share the channel with unrelated traffic.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Promote to active without waiting for controlled clients to close.
    SkipWaiting,
    /// Populate the runtime generation with these addresses.
    CacheUrls { urls: Vec<String> },
}

impl ControlMessage {
    const KNOWN_TYPES: [&'static str; 2] = ["SKIP_WAITING", "CACHE_URLS"];

    /// Decode a raw message.
    ///
    /// Returns `Ok(None)` for messages not addressed to the agent and an error
    /// for a known type with a malformed payload.
    pub fn decode(value: &Value) -> Result<Option<Self>> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) if Self::KNOWN_TYPES.contains(&kind) => kind,
            _ => return Ok(None),
        };

        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| AgentError::InvalidMessage {
                message: format!("{}: {}", kind, e),
            })
    }
}

/// What handling a control message did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Ignored,
    SkipWaiting,
    Cached { count: usize },
}
