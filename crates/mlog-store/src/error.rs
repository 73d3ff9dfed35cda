//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during record-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("{operation} failed with {status}: {body}")]
    RequestFailed {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Check if the error is transient and worth retrying: network-level
    /// failures, 5xx, and 429/503 responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StoreError::RateLimited(_) => true,
            StoreError::RequestFailed { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Server-requested retry delay, when one was supplied.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            StoreError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(StoreError::request_failed("find", 503, "unavailable").is_retryable());
        assert!(StoreError::request_failed("find", 500, "boom").is_retryable());
        assert!(StoreError::RateLimited(2000).is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!StoreError::request_failed("find", 400, "bad query").is_retryable());
        assert!(!StoreError::not_found("FOOTAGE/101").is_retryable());
        assert!(!StoreError::auth_failed("bad credentials").is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        assert_eq!(StoreError::RateLimited(1500).retry_after_ms(), Some(1500));
        assert_eq!(
            StoreError::request_failed("find", 500, "boom").retry_after_ms(),
            None
        );
    }
}
