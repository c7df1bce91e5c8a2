//! Network access and resilience helpers.
//!
//! This module provides:
//! - The [`Fetcher`] seam used by every routing strategy
//! - A reqwest-backed [`HttpFetcher`]
//! - Retry with exponential backoff for host-driven install retries

mod client;
mod retry;

pub use client::{DynFetcher, Fetcher, HttpFetcher};
pub use retry::{retry_async, RetryConfig, RetryStats};
