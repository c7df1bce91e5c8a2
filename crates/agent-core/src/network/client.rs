//! Network access for the agent.
//!
//! [`Fetcher`] is the seam between the routing strategies and the network.
//! [`HttpFetcher`] implements it over reqwest with:
//! - Transport failures reported as errors ("offline")
//! - HTTP error statuses returned as ordinary responses
//! - Optional request timeout, fixed user agent

use crate::config::NetworkConfig;
use crate::error::{AgentError, Result};
use crate::http::{Request, Response};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Something that can perform a network fetch.
///
/// Implementations must return `Err` only when no response was obtained at
/// all; a 404 or 500 is still a successful fetch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Shared fetcher handle.
pub type DynFetcher = Arc<dyn Fetcher>;

/// Headers that describe the hop between requester and agent, not the
/// resource, and must not be forwarded upstream.
const HOP_BY_HOP: [header::HeaderName; 6] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP.iter() {
        forwarded.remove(name);
    }
    forwarded
}

/// Fetcher backed by a reqwest client.
///
/// Has no timeout unless one is given; bounding request time is the host's
/// decision.
pub struct HttpFetcher {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Create a fetcher without a request timeout.
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Create a fetcher whose requests (including the body read) are bounded
    /// by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(NetworkConfig::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| AgentError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            cause: None,
        })?;

        Ok(Self { client, timeout })
    }

    /// Configured request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn transport_error(&self, request: &Request, err: reqwest::Error) -> AgentError {
        if err.is_timeout() {
            AgentError::Timeout(self.timeout.unwrap_or_default())
        } else {
            AgentError::Network {
                message: format!("{} {} failed: {}", request.method, request.url, err),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(forwardable(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        let status = upstream.status();
        let final_url = upstream.url().clone();
        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        let mut response = Response::new(status, body).with_url(final_url);
        response.headers = headers;
        Ok(response)
    }
}
