//! Differential feed fetching.
//!
//! # Responsibilities
//! - Probe a feed endpoint with `HEAD` when an `ETag` is already known
//! - Fetch the body with `GET` otherwise, or when the `ETag` changed
//! - Extract `ETag` and `Cache-Control: max-age` from responses
//! - Digest payloads so unchanged content is never republished

use std::time::{Duration, Instant};

use reqwest::header::{CACHE_CONTROL, ETAG};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};

/// Errors raised while fetching a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("origin returned status {0}")]
    Status(u16),

    #[error("origin reported status '{0}'")]
    Envelope(String),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Per-endpoint cache state. Mutated only by the endpoint's own fetch loop.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub etag: Option<String>,
    pub max_age: Option<Duration>,
    /// Digest of the last payload that was processed successfully.
    pub content_sha: Option<String>,
    /// When the cached payload was fetched.
    pub fetched_at: Option<Instant>,
}

impl CacheEntry {
    /// Time left before the cached payload exceeds its declared max-age.
    pub fn freshness_left(&self, now: Instant) -> Option<Duration> {
        let fetched_at = self.fetched_at?;
        let max_age = self.max_age?;
        let expires = fetched_at + max_age;
        (expires > now).then(|| expires - now)
    }
}

/// Result of `head_or_get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    /// Body, absent when the `HEAD` probe matched the cached `ETag`.
    pub payload: Option<Vec<u8>>,
    pub etag: Option<String>,
    pub max_age: Option<Duration>,
}

/// HTTP client for origin feed endpoints.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Metadata probe first when an `ETag` is cached; body fetch only if needed.
    pub async fn head_or_get(
        &self,
        path: &str,
        cached_etag: Option<&str>,
    ) -> Result<FeedResponse, FeedError> {
        if let Some(cached) = cached_etag {
            let head = self.send(Method::HEAD, path).await?;
            if head.etag.as_deref() == Some(cached) {
                return Ok(head);
            }
            tracing::debug!(path, "ETag changed, fetching body");
        }
        self.send(Method::GET, path).await
    }

    /// Fetch a JSON document.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        let response = self.send(Method::GET, path).await?;
        let body = response.payload.unwrap_or_default();
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, method: Method, path: &str) -> Result<FeedResponse, FeedError> {
        let is_head = method == Method::HEAD;
        let request = self
            .client
            .request(method, self.url(path))
            .timeout(self.timeout)
            .send();

        let response = with_deadline(self.timeout, request).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let headers = response.headers();
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let max_age = headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);

        let payload = if is_head {
            None
        } else {
            let body = with_deadline(self.timeout, response.bytes()).await??;
            Some(body.to_vec())
        };

        Ok(FeedResponse { payload, etag, max_age })
    }
}

/// Extract `max-age` from a `Cache-Control` header value.
pub fn parse_max_age(value: &str) -> Option<Duration> {
    value
        .split(',')
        .map(str::trim)
        .find_map(|directive| {
            let (key, seconds) = directive.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("max-age") {
                seconds.trim().trim_matches('"').parse::<u64>().ok()
            } else {
                None
            }
        })
        .map(Duration::from_secs)
}

/// Hex SHA-256 digest of a payload.
pub fn content_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
