//! Request and response snapshots exchanged between the host, the network
//! layer and the cache store.
//!
//! A [`Response`] is deliberately not `Clone`: its body is consumed by whoever
//! receives it. Any path that both returns a response and persists it must call
//! [`Response::split`] to obtain two independent snapshots.

use crate::error::{AgentError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// What the requester intends to do with the response.
///
/// Mirrors the `Sec-Fetch-Dest` vocabulary; only `Document` and `Image` change
/// routing, everything else falls through to the default strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    Worker,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "empty" => Destination::Empty,
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "worker" | "sharedworker" | "serviceworker" => Destination::Worker,
            _ => Destination::Other,
        }
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request with no destination hint.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a POST request carrying a body.
    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            url,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
            body: Some(body.into()),
        }
    }

    /// Parse `url` and build a GET request for it.
    pub fn parse_get(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| AgentError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::get(parsed))
    }

    /// Set the destination hint.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header, ignoring values that are not valid header text.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A response snapshot with a single-consumer body.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL the body was served from, when known.
    pub url: Option<Url>,
    body: Bytes,
}

impl Response {
    /// Create a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url: None,
            body: body.into(),
        }
    }

    /// Create a JSON response.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Record the URL the response came from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Borrow the body without consuming the response.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and take its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Split into two independently consumable snapshots.
    ///
    /// The first is meant for the caller, the second for the cache.
    pub fn split(self) -> (Response, Response) {
        let copy = Response {
            status: self.status,
            headers: self.headers.clone(),
            url: self.url.clone(),
            body: self.body.clone(),
        };
        (self, copy)
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
