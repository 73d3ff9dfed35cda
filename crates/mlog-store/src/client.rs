//! Record-store REST API client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use mlog_models::fields;

use crate::auth::{SessionTokenSource, TokenCache, TokenSource, DEFAULT_TOKEN_REFRESH};
use crate::error::{StoreError, StoreResult};
use crate::metrics::{observe_find_pages, observe_request};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Envelope, FindRequest, PatchRequest, Record, RecordData, ScriptData};

/// Extra result slots requested on OR finds, over the number of ids asked
/// for, so duplicate matches never truncate the answer.
const OR_FIND_BUFFER: u64 = 10;

/// Store client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database root, e.g. `https://host/fmi/data/v1/databases/MEDIALOG`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Session token refresh interval
    pub token_refresh: Duration,
    /// Retry policy for transient errors
    pub retry: RetryConfig,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Ok(Self {
            base_url: std::env::var("MLOG_STORE_URL")
                .map_err(|_| StoreError::auth_failed("MLOG_STORE_URL not set"))?
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(
                std::env::var("MLOG_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            token_refresh: std::env::var("MLOG_STORE_TOKEN_REFRESH_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TOKEN_REFRESH),
            retry: RetryConfig::from_env(),
        })
    }
}

/// Record-store REST API client.
///
/// Safe for parallel callers; every call owns its own HTTP interaction and
/// the session token is shared behind the cache's lock.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    tokens: Arc<TokenCache>,
    config: StoreConfig,
}

impl StoreClient {
    /// Create a new store client with an injected token source.
    pub fn new(config: StoreConfig, source: Arc<dyn TokenSource>) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StoreError::Network)?;

        let tokens = Arc::new(TokenCache::new(source, config.token_refresh));

        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    /// Create from environment variables, authenticating with the store's
    /// session endpoint. Credentials are read here and never stored on the
    /// client.
    pub fn from_env() -> StoreResult<Self> {
        let config = StoreConfig::from_env()?;
        let username = std::env::var("MLOG_STORE_USER")
            .map_err(|_| StoreError::auth_failed("MLOG_STORE_USER not set"))?;
        let password = std::env::var("MLOG_STORE_PASSWORD")
            .map_err(|_| StoreError::auth_failed("MLOG_STORE_PASSWORD not set"))?;

        let auth_http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StoreError::Network)?;
        let source = Arc::new(SessionTokenSource::new(
            auth_http,
            &config.base_url,
            username,
            password,
        ));

        Self::new(config, source)
    }

    /// The shared token cache. Step invocations pass the current token to
    /// the step processes.
    pub fn token_cache(&self) -> Arc<TokenCache> {
        Arc::clone(&self.tokens)
    }

    fn layout_url(&self, layout: &str, suffix: &str) -> String {
        format!("{}/layouts/{}{}", self.config.base_url, layout, suffix)
    }

    /// Send one authorized request. An unauthorized response triggers one
    /// silent re-auth and one retry; the token never appears in logs.
    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> StoreResult<(StatusCode, String)> {
        let mut reauthed = false;

        loop {
            let token = self.tokens.get_token().await?;

            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let started = Instant::now();
            let response = request.send().await?;
            let status = response.status();
            observe_request(operation, status.as_u16(), started.elapsed());

            if status == StatusCode::UNAUTHORIZED {
                if reauthed {
                    return Err(StoreError::auth_failed(format!(
                        "{} rejected after re-authentication",
                        operation
                    )));
                }
                debug!(operation, "Session token rejected, re-authenticating");
                self.tokens.invalidate().await;
                reauthed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_ms = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1000);
                return Err(StoreError::RateLimited(retry_after_ms));
            }

            let body_text = response.text().await.unwrap_or_default();
            return Ok((status, body_text));
        }
    }

    /// Run one `_find` page. A "no records" response is normal and yields
    /// an empty page.
    async fn find_page(
        &self,
        operation: &str,
        layout: &str,
        request: &FindRequest,
    ) -> StoreResult<Vec<Record>> {
        let url = self.layout_url(layout, "/_find");
        let body = serde_json::to_value(request)?;

        let (status, text) = self.send(operation, Method::POST, &url, Some(&body)).await?;

        match status {
            StatusCode::OK => {
                let envelope: Envelope<RecordData> = serde_json::from_str(&text)?;
                Ok(envelope.response.data.into_iter().map(Record::from).collect())
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status => Err(StoreError::request_failed(operation, status.as_u16(), text)),
        }
    }

    /// Paginated find of every record matching `field == value`.
    ///
    /// The store's paging is 1-based and rejects explicit offsets that are
    /// not strictly positive, so the first request omits the offset and
    /// subsequent requests advance by the number of records actually
    /// returned. Iteration stops when a page comes back short or when the
    /// safety cap is reached; the cap surfaces as a warning, not an error.
    pub async fn find_by_field(
        &self,
        layout: &str,
        field: &str,
        value: &str,
        page_size: u64,
        cap: u64,
    ) -> StoreResult<Vec<Record>> {
        let mut records: Vec<Record> = Vec::new();
        let mut pages = 0u64;

        loop {
            let mut request = FindRequest::by_field(field, value, page_size);
            if !records.is_empty() {
                request.offset = Some(records.len() as u64);
            }

            let page = with_retry(&self.config.retry, "find_by_field", || {
                self.find_page("find_by_field", layout, &request)
            })
            .await?;
            pages += 1;

            let page_len = page.len() as u64;
            records.extend(page);

            if page_len < page_size {
                break;
            }
            if records.len() as u64 >= cap {
                warn!(
                    layout,
                    value,
                    cap,
                    "Pagination safety cap reached, continuing with records gathered so far"
                );
                break;
            }
        }

        observe_find_pages(layout, pages);
        Ok(records)
    }

    /// Probe whether any record matches `field == value`.
    pub async fn any_by_field(&self, layout: &str, field: &str, value: &str) -> StoreResult<bool> {
        let request = FindRequest::by_field(field, value, 1);
        let page = with_retry(&self.config.retry, "any_by_field", || {
            self.find_page("any_by_field", layout, &request)
        })
        .await?;
        Ok(!page.is_empty())
    }

    /// Single multi-predicate OR find over one field. Tolerates "no
    /// records" as an empty result.
    pub async fn find_by_or(
        &self,
        layout: &str,
        field: &str,
        values: &[&str],
    ) -> StoreResult<Vec<Record>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let limit = values.len() as u64 + OR_FIND_BUFFER;
        let request = FindRequest::by_field_or(field, values.iter().copied(), limit);
        with_retry(&self.config.retry, "find_by_or", || {
            self.find_page("find_by_or", layout, &request)
        })
        .await
    }

    /// Fetch a single record by its store handle.
    pub async fn get_one(&self, layout: &str, record_key: &str) -> StoreResult<Record> {
        let url = self.layout_url(layout, &format!("/records/{}", record_key));

        with_retry(&self.config.retry, "get_one", || async {
            let (status, text) = self.send("get_one", Method::GET, &url, None).await?;
            match status {
                StatusCode::OK => {
                    let envelope: Envelope<RecordData> = serde_json::from_str(&text)?;
                    envelope
                        .response
                        .data
                        .into_iter()
                        .next()
                        .map(Record::from)
                        .ok_or_else(|| {
                            StoreError::invalid_response(format!(
                                "{}/{} returned an empty data array",
                                layout, record_key
                            ))
                        })
                }
                StatusCode::NOT_FOUND => {
                    Err(StoreError::not_found(format!("{}/{}", layout, record_key)))
                }
                status => Err(StoreError::request_failed("get_one", status.as_u16(), text)),
            }
        })
        .await
    }

    /// Fetch the child frames of one footage record.
    pub async fn get_children_of(&self, parent_id: &str, page_size: u64) -> StoreResult<Vec<Record>> {
        self.find_by_field(
            fields::FRAMES_LAYOUT,
            fields::frame::PARENT_ID,
            parent_id,
            page_size,
            // Far above any real frame count per footage; bounds a runaway query.
            50_000,
        )
        .await
    }

    /// Partial update of a single record. Status patches are idempotent, so
    /// transient failures are retried with the usual policy.
    pub async fn patch_fields(
        &self,
        layout: &str,
        record_key: &str,
        field_data: Map<String, Value>,
    ) -> StoreResult<()> {
        let url = self.layout_url(layout, &format!("/records/{}", record_key));
        let body = serde_json::to_value(PatchRequest { field_data })?;

        with_retry(&self.config.retry, "patch_fields", || async {
            let (status, text) = self.send("patch_fields", Method::PATCH, &url, Some(&body)).await?;
            match status {
                StatusCode::OK => Ok(()),
                StatusCode::NOT_FOUND => {
                    Err(StoreError::not_found(format!("{}/{}", layout, record_key)))
                }
                status => Err(StoreError::request_failed(
                    "patch_fields",
                    status.as_u16(),
                    text,
                )),
            }
        })
        .await
    }

    /// Opaque server-side script hook. Not used by the polling core; kept
    /// because auxiliary tooling shares this client and its concurrency
    /// contract.
    pub async fn exec_auxiliary(
        &self,
        layout: &str,
        script: &str,
        param: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let url = self.layout_url(layout, &format!("/script/{}", script));
        let body = param.map(|p| serde_json::json!({ "script.param": p }));

        with_retry(&self.config.retry, "exec_auxiliary", || async {
            let (status, text) = self
                .send("exec_auxiliary", Method::POST, &url, body.as_ref())
                .await?;
            match status {
                StatusCode::OK => {
                    let envelope: Envelope<ScriptData> = serde_json::from_str(&text)?;
                    Ok(envelope.response.script_result)
                }
                status => Err(StoreError::request_failed(
                    "exec_auxiliary",
                    status.as_u16(),
                    text,
                )),
            }
        })
        .await
    }
}
