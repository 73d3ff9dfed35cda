//! Retry policy with exponential backoff and jitter.
//!
//! - Exponential backoff with equal jitter
//! - Respects server-requested retry delays on rate limiting
//! - Configurable base and max delays

use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::error::{StoreError, StoreResult};
use crate::metrics::observe_retry;

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let base_delay_ms: u64 = std::env::var("MLOG_STORE_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        let max_delay_ms: u64 = std::env::var("MLOG_STORE_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);

        Self {
            max_retries: 3,
            base_delay_ms,
            max_delay_ms,
        }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Execute an async store operation with retry.
///
/// Retries on:
/// - Network errors (timeouts, connection resets)
/// - HTTP 429 (honors the server-requested delay)
/// - HTTP 5xx
///
/// Does NOT retry:
/// - HTTP 4xx (except 429)
/// - Auth errors
/// - Not found
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = StoreResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let span = info_span!("store_retry", operation = %operation, attempt = attempt + 1);

        let result = op().instrument(span).await;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt, e.retry_after_ms());

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Store operation failed, retrying: {}",
                    e
                );

                observe_retry(operation);

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| StoreError::invalid_response("retry loop exhausted without error")))
}

/// Retry delay for one attempt: a server-requested delay wins outright,
/// otherwise exponential backoff with equal jitter. Half of the backoff
/// window is guaranteed and the other half is spread by clock noise, so
/// parallel tasks retrying the same outage fan out instead of stampeding.
/// The clock is randomness enough here; a rand dependency is not worth it.
fn backoff_delay(config: &RetryConfig, attempt: u32, server_delay_ms: Option<u64>) -> Duration {
    if let Some(ms) = server_delay_ms {
        return Duration::from_millis(ms);
    }

    let ceiling = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(config.max_delay_ms);

    let half = ceiling / 2;
    let jitter = if half > 0 {
        let micros = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_micros()))
            .unwrap_or(0);
        micros % half
    } else {
        0
    };

    Duration::from_millis((half + jitter).max(config.base_delay_ms))
}

// =============================================================================
// Tests
// =============================================================================
