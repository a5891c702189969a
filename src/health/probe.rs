//! Probe transport shared by all strategies.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::HealthConfig;
use crate::context::ReplicaContext;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};
use crate::specs::types::Envelope;

/// Why a probe did not produce a verdict.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("instance returned status {0}")]
    Status(u16),

    #[error("instance reported status '{0}'")]
    Envelope(String),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// HTTP access to candidate instances.
///
/// Certificates are not verified: instances are addressed by IP.
#[derive(Debug, Clone)]
pub struct ProbeClient {
    client: Client,
}

impl ProbeClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("domain-manager/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// GET a body as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, ProbeError> {
        with_deadline(timeout, self.fetch_text(url, timeout)).await?
    }

    /// GET and decode a JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ProbeError> {
        let body = self.get_text(url, timeout).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET an `{status, data}` document and unwrap `data`.
    pub async fn get_envelope<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T, ProbeError> {
        let envelope: Envelope<T> = self.get_json(url, timeout).await?;
        if !envelope.is_success() {
            return Err(ProbeError::Envelope(envelope.status));
        }
        Ok(envelope.data)
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, ProbeError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Everything a strategy may consult besides the instance itself.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub client: ProbeClient,
    pub config: HealthConfig,
    pub replica: Arc<ReplicaContext>,
}

impl ProbeContext {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.default_timeout_ms)
    }
}

/// Whether a body is an HTML document.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
