//! Decryption of access-restricted ("enterprise") specifications.
//!
//! # Data Flow
//! ```text
//! enterprise blob (base64)
//!     → owner lookup (origin service, 3 attempts, 3 s apart)
//!     → split: 256-byte wrapped key | nonce(12) ‖ ciphertext ‖ tag(16)
//!     → oracle unwraps the key (mutual TLS, 4 attempts, 16 s apart)
//!     → AES-256-GCM open
//!     → JSON payload replaces the composed-service definition
//! ```
//!
//! # Design Decisions
//! - Decrypted specs are cached by content digest with a TTL; a cache miss
//!   simply repeats the whole exchange
//! - Any failure drops only the affected application

use std::sync::Arc;
use std::time::{Duration, Instant};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EnterpriseConfig;
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};
use crate::specs::feed::{content_digest, FeedClient, FeedError};
use crate::specs::types::{ApplicationSpec, ComponentSpec, Envelope};

/// Size of the RSA-wrapped symmetric key at the start of the blob.
pub const WRAPPED_KEY_LEN: usize = 256;
/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// AES-GCM tag length.
pub const TAG_LEN: usize = 16;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that prevent an enterprise specification from being decrypted.
#[derive(Debug, Error)]
pub enum EnterpriseError {
    #[error("enterprise decryption disabled")]
    Disabled,

    #[error("original owner lookup failed: {0}")]
    Owner(#[source] FeedError),

    #[error("malformed enterprise blob: {0}")]
    Malformed(String),

    #[error("oracle request failed: {0}")]
    OracleTransport(#[from] reqwest::Error),

    #[error("oracle returned status {0}")]
    OracleStatus(u16),

    #[error("oracle refused: {0}")]
    OracleRefused(String),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error("authenticated decryption failed")]
    Cipher,

    #[error("decrypted payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("TLS identity error: {0}")]
    Identity(String),
}

impl EnterpriseError {
    /// Transport problems and non-200 answers are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnterpriseError::OracleTransport(_)
                | EnterpriseError::OracleStatus(_)
                | EnterpriseError::Deadline(_)
        )
    }
}

/// Request body of `POST /decryptMessageRSA`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleRequest {
    #[serde(rename = "fluxID")]
    pub flux_id: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    /// Base64 of the wrapped key.
    pub message: String,
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
}

/// Response of `POST /decryptMessageRSA`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    pub status: String,
    /// Base64 of the unwrapped AES key on success, an error text otherwise.
    #[serde(default)]
    pub message: String,
}

/// The decrypted document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnterprisePayload {
    pub compose: Vec<ComponentSpec>,
    #[serde(default)]
    pub contacts: Vec<String>,
}

/// Split a decoded blob into the wrapped key and the sealed remainder.
pub fn split_blob(blob: &[u8]) -> Result<(&[u8], &[u8]), EnterpriseError> {
    if blob.len() < WRAPPED_KEY_LEN + NONCE_LEN + TAG_LEN {
        return Err(EnterpriseError::Malformed(format!(
            "{} bytes is shorter than key, nonce and tag",
            blob.len()
        )));
    }
    Ok(blob.split_at(WRAPPED_KEY_LEN))
}

/// Open `nonce ‖ ciphertext ‖ tag` with a 256-bit key.
pub fn open_sealed(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, EnterpriseError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(EnterpriseError::Malformed("sealed payload too short".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| EnterpriseError::Malformed(format!("key of {} bytes", key.len())))?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnterpriseError::Cipher)
}

/// Apply a decrypted payload to its specification.
pub fn apply_payload(spec: &ApplicationSpec, payload: EnterprisePayload) -> ApplicationSpec {
    let mut decrypted = spec.clone();
    decrypted.compose = payload.compose;
    if !payload.contacts.is_empty() {
        decrypted.contacts = payload.contacts;
    }
    decrypted.enterprise.clear();
    decrypted
}

#[derive(Debug, Clone)]
struct CachedSpec {
    spec: Arc<ApplicationSpec>,
    stored_at: Instant,
}

/// Decrypts enterprise specifications through the oracle.
pub struct EnterpriseDecryptor {
    config: EnterpriseConfig,
    origin: FeedClient,
    oracle: Client,
    cache: DashMap<String, CachedSpec>,
}

impl EnterpriseDecryptor {
    /// Build a decryptor; loads the mutual TLS material when configured.
    pub fn new(config: EnterpriseConfig, origin: FeedClient) -> Result<Self, EnterpriseError> {
        let mut builder = Client::builder().timeout(ORACLE_TIMEOUT);

        if let Some(path) = &config.client_identity_path {
            let pem = std::fs::read(path).map_err(|e| EnterpriseError::Identity(e.to_string()))?;
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| EnterpriseError::Identity(e.to_string()))?;
            builder = builder.identity(identity);
        }
        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| EnterpriseError::Identity(e.to_string()))?;
            let ca = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| EnterpriseError::Identity(e.to_string()))?;
            builder = builder.add_root_certificate(ca);
        }

        let oracle = builder
            .build()
            .map_err(|e| EnterpriseError::Identity(e.to_string()))?;

        Ok(Self {
            config,
            origin,
            oracle,
            cache: DashMap::new(),
        })
    }

    /// Number of cached decrypted specifications.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Decrypt `spec`, consulting the digest cache first.
    pub async fn decrypt(&self, spec: &ApplicationSpec) -> Result<Arc<ApplicationSpec>, EnterpriseError> {
        if !self.config.enabled {
            return Err(EnterpriseError::Disabled);
        }

        let key = self.cache_key(spec);
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Some(hit) = self.cache.get(&key) {
            if hit.stored_at.elapsed() < ttl {
                return Ok(hit.spec.clone());
            }
        }

        let decrypted = Arc::new(self.decrypt_uncached(spec).await?);

        self.cache.retain(|_, v| v.stored_at.elapsed() < ttl);
        self.cache.insert(
            key,
            CachedSpec {
                spec: decrypted.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(decrypted)
    }

    fn cache_key(&self, spec: &ApplicationSpec) -> String {
        if spec.hash.is_empty() {
            content_digest(spec.enterprise.as_bytes())
        } else {
            spec.hash.clone()
        }
    }

    async fn decrypt_uncached(&self, spec: &ApplicationSpec) -> Result<ApplicationSpec, EnterpriseError> {
        let owner = self.original_owner(&spec.name).await?;

        let blob = STANDARD
            .decode(spec.enterprise.trim())
            .map_err(|e| EnterpriseError::Malformed(e.to_string()))?;
        let (wrapped, sealed) = split_blob(&blob)?;

        let request = OracleRequest {
            flux_id: owner,
            app_name: spec.name.clone(),
            message: STANDARD.encode(wrapped),
            block_height: spec.height,
        };

        let policy = RetryPolicy::new(
            self.config.oracle_attempts,
            Duration::from_secs(self.config.oracle_retry_secs),
        );
        let request = &request;
        let aes_key = policy
            .run("decrypt_oracle", move |_| self.unwrap_key(request), EnterpriseError::is_retryable)
            .await?;

        let plaintext = open_sealed(&aes_key, sealed)?;
        let payload: EnterprisePayload = serde_json::from_slice(&plaintext)?;

        tracing::debug!(app = %spec.name, components = payload.compose.len(), "Enterprise spec decrypted");
        Ok(apply_payload(spec, payload))
    }

    async fn original_owner(&self, app: &str) -> Result<String, EnterpriseError> {
        let policy = RetryPolicy::new(
            self.config.owner_attempts,
            Duration::from_secs(self.config.owner_retry_secs),
        );
        let path = format!("/apps/apporiginalowner/{}", app);
        let (origin, path) = (&self.origin, path.as_str());

        policy
            .run(
                "original_owner",
                move |_| async move {
                    let envelope: Envelope<String> = origin.get_json(path).await?;
                    if envelope.is_success() && !envelope.data.is_empty() {
                        Ok(envelope.data)
                    } else {
                        Err(FeedError::Envelope(envelope.status))
                    }
                },
                |_| true,
            )
            .await
            .map_err(EnterpriseError::Owner)
    }

    async fn unwrap_key(&self, request: &OracleRequest) -> Result<Vec<u8>, EnterpriseError> {
        let url = format!("{}/decryptMessageRSA", self.config.oracle_url.trim_end_matches('/'));
        let send = self.oracle.post(url).json(request).send();
        let response = with_deadline(ORACLE_TIMEOUT, send).await??;

        let status = response.status();
        if !status.is_success() {
            return Err(EnterpriseError::OracleStatus(status.as_u16()));
        }

        let body: OracleResponse = with_deadline(ORACLE_TIMEOUT, response.json()).await??;
        if body.status != "ok" && body.status != "success" {
            return Err(EnterpriseError::OracleRefused(body.message));
        }

        STANDARD
            .decode(body.message.trim())
            .map_err(|e| EnterpriseError::Malformed(format!("oracle key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::{AeadCore, OsRng};

    fn seal(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new_from_slice(key).unwrap();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut out = nonce.to_vec();
        out.extend(cipher.encrypt(&nonce, plaintext).unwrap());
        out
    }

    #[test]
    fn test_open_sealed_roundtrip_and_tamper() {
        let key = [7u8; 32];
        let mut sealed = seal(&key, br#"{"compose":[]}"#);
        assert_eq!(open_sealed(&key, &sealed).unwrap(), br#"{"compose":[]}"#);

        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(open_sealed(&key, &sealed), Err(EnterpriseError::Cipher)));
    }

    #[test]
    fn test_split_blob() {
        let blob = vec![1u8; WRAPPED_KEY_LEN + NONCE_LEN + TAG_LEN + 5];
        let (wrapped, sealed) = split_blob(&blob).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);
        assert_eq!(sealed.len(), NONCE_LEN + TAG_LEN + 5);

        assert!(split_blob(&blob[..WRAPPED_KEY_LEN + 10]).is_err());
    }

    #[test]
    fn test_apply_payload_replaces_compose() {
        let spec = ApplicationSpec {
            name: "secret".into(),
            version: 8,
            enterprise: "blob".into(),
            contacts: vec!["old@example.com".into()],
            ..Default::default()
        };
        let payload = EnterprisePayload {
            compose: vec![ComponentSpec {
                name: "web".into(),
                ports: vec![33000],
                domains: vec![String::new()],
                ..Default::default()
            }],
            contacts: Vec::new(),
        };

        let decrypted = apply_payload(&spec, payload);
        assert!(!decrypted.is_enterprise());
        assert_eq!(decrypted.all_ports(), vec![33000]);
        assert_eq!(decrypted.contacts, vec!["old@example.com".to_string()]);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(EnterpriseError::OracleStatus(502).is_retryable());
        assert!(!EnterpriseError::Cipher.is_retryable());
        assert!(!EnterpriseError::OracleRefused("denied".into()).is_retryable());
    }
}
