//! Rate-limited HTTP executor for the App Store Connect API
//!
//! Every outbound call to the source API goes through [`AppStoreClient`],
//! which injects a bearer token from the injected [`TokenProvider`],
//! enforces a fixed per-request timeout, retries transient failures with
//! exponential backoff, and keeps a rate-limit snapshot up to date from the
//! `X-RateLimit-*` response headers. When the remaining budget drops to the
//! block threshold, the next call sleeps until the advertised reset time
//! before dispatching.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::config::AppStoreConfig;
use crate::error::{classify_status, Error, Result};
use crate::types::RateLimitSnapshot;

/// Provides a valid bearer token for the source API.
///
/// Token minting (JWT signing, refresh) lives outside this crate; the
/// provider fails when credentials are invalid or expired and unrefreshable.
pub trait TokenProvider: Send + Sync {
    fn valid_token(&self) -> Result<String>;
}

/// HTTP client for the App Store Connect API.
pub struct AppStoreClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    rate_limit: Mutex<Option<RateLimitSnapshot>>,
    retry: BackoffPolicy,
}

impl AppStoreClient {
    /// Create a new client from configuration and an auth provider.
    pub fn new(config: &AppStoreConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            rate_limit: Mutex::new(None),
            retry: BackoffPolicy::requests().with_max_attempts(config.max_retries),
        })
    }

    /// Execute a GET against `endpoint` (path relative to the base URL),
    /// retrying transient failures per the configured policy.
    ///
    /// 401/403 abort immediately; other 4xx fail without retry; 429, 5xx,
    /// and network/timeout errors are retried with exponential backoff, and
    /// exhaustion surfaces one error carrying the attempt count and the
    /// last status and message.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.retry
            .retry("app_store_request", |_| self.dispatch(endpoint, query))
            .await
    }

    /// Last observed rate-limit snapshot, if any response carried headers.
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Check that credentials work against the live API.
    pub async fn test_authentication(&self) -> bool {
        let probe: Result<serde_json::Value> = self
            .dispatch("/apps", &[("limit", "1".to_string())])
            .await;
        match probe {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "App Store Connect authentication probe failed");
                false
            }
        }
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        // Pre-emptive block when the remaining budget is exhausted
        let gate = self
            .rate_limit()
            .and_then(|snapshot| snapshot.blocking_delay(Utc::now()));
        if let Some(delay) = gate {
            tracing::warn!(
                endpoint,
                delay_ms = delay.as_millis() as u64,
                "rate limit budget exhausted, blocking until reset"
            );
            tokio::time::sleep(delay).await;
        }

        let token = self.tokens.valid_token()?;
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self.http.get(&url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| Error::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: format!("HTTP request failed: {}", e),
            attempts: 1,
        })?;

        // Bookkeeping happens on every response, success or failure
        if let Some(snapshot) = parse_rate_limit_headers(response.headers(), Utc::now()) {
            *self
                .rate_limit
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        }

        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| Error::Client {
                status: status.as_u16(),
                message: format!("failed to parse response as JSON: {}", e),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_status(
                status.as_u16(),
                &extract_error_message(&body),
            ))
        }
    }
}

/// Error body shape: `{"errors": [{"title": ..., "detail": ...}]}`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ErrorEntry {
    title: Option<String>,
    detail: Option<String>,
}

/// Pull a readable message out of a structured error body, falling back to
/// the raw text when the body is not the documented shape.
fn extract_error_message(body: &str) -> String {
    let parsed: ErrorBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => return body.trim().to_string(),
    };

    let parts: Vec<String> = parsed
        .errors
        .iter()
        .filter_map(|e| match (&e.title, &e.detail) {
            (Some(title), Some(detail)) => Some(format!("{}: {}", title, detail)),
            (Some(title), None) => Some(title.clone()),
            (None, Some(detail)) => Some(detail.clone()),
            (None, None) => None,
        })
        .collect();

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}

/// Parse the `X-RateLimit-Remaining/-Reset/-Limit` trio from response
/// headers. Reset is epoch seconds. Returns `None` unless all three are
/// present and well-formed.
fn parse_rate_limit_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<RateLimitSnapshot> {
    fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
    }

    let remaining = header_u64(headers, "X-RateLimit-Remaining")? as u32;
    let limit = header_u64(headers, "X-RateLimit-Limit")? as u32;
    let reset_epoch = header_u64(headers, "X-RateLimit-Reset")?;
    let reset = DateTime::from_timestamp(reset_epoch as i64, 0).unwrap_or(now);

    Some(RateLimitSnapshot {
        remaining,
        reset,
        limit,
    })
}
