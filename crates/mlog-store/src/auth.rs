//! Session-token caching for store authentication.
//!
//! Provides a thread-safe, async-aware token cache with:
//! - Interval-based refresh (the store expires idle sessions)
//! - Single-flight pattern to prevent thundering herd on refresh
//! - Graceful fallback to the existing token on refresh failure

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::types::{Envelope, SessionData};

/// Default refresh interval. Store sessions idle out after 15 minutes;
/// refreshing well before that keeps requests off the expiry edge.
pub const DEFAULT_TOKEN_REFRESH: Duration = Duration::from_secs(10 * 60);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of fresh bearer tokens. Injected so tests can stub authentication.
pub trait TokenSource: Send + Sync {
    fn fetch_token(&self) -> BoxFuture<'_, StoreResult<String>>;
}

/// Cached token with refresh tracking.
struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    refresh_interval: Duration,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token. The next `get_token` call re-authenticates.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    /// Get a valid bearer token, refreshing if necessary.
    ///
    /// Fast path: return the cached token while it is fresh. Slow path:
    /// acquire the write lock and refresh, double-checking first so that
    /// concurrent callers refresh only once.
    pub async fn get_token(&self) -> StoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.refresh_interval {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.refresh_interval {
                return Ok(cached.token.clone());
            }
        }

        match self.source.fetch_token().await {
            Ok(token) => {
                *cache = Some(CachedToken {
                    token: token.clone(),
                    fetched_at: Instant::now(),
                });
                debug!("Refreshed store session token");
                Ok(token)
            }
            Err(e) => {
                // The stale token may still be usable server-side.
                if let Some(cached) = cache.as_ref() {
                    warn!("Token refresh failed, using existing token: {}", e);
                    return Ok(cached.token.clone());
                }
                Err(StoreError::auth_failed(format!(
                    "Failed to obtain session token: {}",
                    e
                )))
            }
        }
    }
}

/// Production token source: opens a store session with Basic credentials.
pub struct SessionTokenSource {
    http: reqwest::Client,
    sessions_url: String,
    username: String,
    password: String,
}

impl SessionTokenSource {
    /// `base_url` is the database root, e.g.
    /// `https://host/fmi/data/v1/databases/MEDIALOG`.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            sessions_url: format!("{}/sessions", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl TokenSource for SessionTokenSource {
    fn fetch_token(&self) -> BoxFuture<'_, StoreResult<String>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.sessions_url)
                .basic_auth(&self.username, Some(&self.password))
                .json(&serde_json::json!({}))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                // Never include the credentials or token in the error text.
                return Err(StoreError::auth_failed(format!(
                    "session open failed with {}",
                    status
                )));
            }

            let envelope: Envelope<SessionData> = response.json().await?;
            Ok(envelope.response.token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        fail: bool,
    }

    impl TokenSource for CountingSource {
        fn fetch_token(&self) -> BoxFuture<'_, StoreResult<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(StoreError::auth_failed("nope"))
                } else {
                    Ok(format!("token-{}", n))
                }
            })
        }
    }

    #[tokio::test]
    async fn caches_token_across_calls() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let cache = TokenCache::new(source.clone(), Duration::from_secs(60));

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let cache = TokenCache::new(source.clone(), Duration::from_secs(60));

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn refresh_failure_without_cached_token_errors() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let cache = TokenCache::new(source, Duration::from_secs(60));
        assert!(cache.get_token().await.is_err());
    }
}
