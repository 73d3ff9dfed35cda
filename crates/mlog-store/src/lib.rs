//! Record-store REST API client.
//!
//! Production-grade client with:
//! - Session-token caching with single-flight refresh
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)
//!
//! ## Modules
//! - `client` - Main record-store REST API client
//! - `auth` - Thread-safe session token caching
//! - `retry` - Retry policy with exponential backoff
//! - `metrics` - Metrics collection
//! - `types` - Wire types for find/patch/script operations

pub mod auth;
pub mod client;
#[cfg(test)]
mod client_tests;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod types;

pub use auth::{SessionTokenSource, TokenCache, TokenSource};
pub use client::{StoreClient, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use retry::RetryConfig;
pub use types::Record;
