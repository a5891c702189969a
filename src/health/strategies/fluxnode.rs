//! Full node check.
//!
//! # Data Flow
//! ```text
//! version gate
//!   → login phrase present
//!   → outgoing and incoming peer counts
//!   → explorer scan height (advisory unless enforced)
//!   → daemon height vs reference height
//!   → application catalog size
//!   → permanent message catalog size
//!   → UI on port - 1 serves HTML
//! ```
//!
//! # Design Decisions
//! - Steps run in order and stop at the first failure
//! - The explorer step is started but not awaited by default: nodes that
//!   are mid-scan still pass

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::ProbeStrategy;
use crate::config::HealthConfig;
use crate::discovery::NodeEndpoint;
use crate::health::probe::{looks_like_html, ProbeClient, ProbeContext, ProbeError};
use crate::health::version::min_version_satisfy;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScannedHeight {
    general_scanned_height: u64,
}

/// Multi-step check of a full node's API.
#[derive(Debug, Default, Clone, Copy)]
pub struct FluxNodeProbe;

impl FluxNodeProbe {
    async fn run(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        let base = endpoint.url("http");
        let timeout = ctx.default_timeout();
        let client = &ctx.client;
        let config = &ctx.config;
        let reference = ctx.replica.reference_height().get();

        let version: String = client.get_envelope(&format!("{base}/flux/version"), timeout).await?;
        if !min_version_satisfy(&version, &config.min_node_version) {
            return Ok(reject(endpoint, "version", version));
        }

        let phrase: String = client.get_envelope(&format!("{base}/id/loginphrase"), timeout).await?;
        if phrase.trim().is_empty() {
            return Ok(reject(endpoint, "loginphrase", "empty"));
        }

        let outgoing: Vec<Value> = client
            .get_envelope(&format!("{base}/flux/connectedpeers"), timeout)
            .await?;
        if outgoing.len() < config.min_connected_peers {
            return Ok(reject(endpoint, "connectedpeers", outgoing.len()));
        }

        let incoming: Vec<Value> = client
            .get_envelope(&format!("{base}/flux/incomingconnections"), timeout)
            .await?;
        if incoming.len() < config.min_incoming_peers {
            return Ok(reject(endpoint, "incomingconnections", incoming.len()));
        }

        let scan_url = format!("{base}/explorer/scannedheight");
        if config.enforce_sync_check {
            if !explorer_synced(client, &scan_url, timeout, reference, config).await? {
                return Ok(reject(endpoint, "scannedheight", "behind"));
            }
        } else {
            let (client, config, endpoint) = (client.clone(), config.clone(), *endpoint);
            tokio::spawn(async move {
                match explorer_synced(&client, &scan_url, timeout, reference, &config).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(%endpoint, "Explorer behind reference height (advisory)"),
                    Err(e) => tracing::debug!(%endpoint, error = %e, "Explorer check failed (advisory)"),
                }
            });
        }

        let height: u64 = client
            .get_envelope(&format!("{base}/daemon/getblockcount"), timeout)
            .await?;
        if !within_lag(height, reference, config.max_height_lag) {
            return Ok(reject(endpoint, "blockcount", height));
        }

        let apps: Vec<Value> = client
            .get_envelope(&format!("{base}/apps/globalappsspecifications"), timeout)
            .await?;
        if apps.len() < config.min_apps {
            return Ok(reject(endpoint, "globalappsspecifications", apps.len()));
        }

        let messages: Vec<Value> = client
            .get_envelope(&format!("{base}/apps/permanentmessages"), timeout)
            .await?;
        if messages.len() < config.min_messages {
            return Ok(reject(endpoint, "permanentmessages", messages.len()));
        }

        let ui_port = endpoint.port.saturating_sub(1);
        let ui = client
            .get_text(&format!("{}/", endpoint.url_on("http", ui_port)), timeout)
            .await?;
        if !looks_like_html(&ui) {
            return Ok(reject(endpoint, "ui", ui_port));
        }

        Ok(true)
    }
}

#[async_trait]
impl ProbeStrategy for FluxNodeProbe {
    fn name(&self) -> &'static str {
        "fluxnode"
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        self.run(ctx, endpoint).await
    }
}

/// Whether `height` is close enough to the reference. Unknown reference passes.
pub fn within_lag(height: u64, reference: Option<u64>, max_lag: u64) -> bool {
    match reference {
        Some(reference) => height.saturating_add(max_lag) >= reference,
        None => true,
    }
}

async fn explorer_synced(
    client: &ProbeClient,
    url: &str,
    timeout: Duration,
    reference: Option<u64>,
    config: &HealthConfig,
) -> Result<bool, ProbeError> {
    let scanned: ScannedHeight = client.get_envelope(url, timeout).await?;
    Ok(within_lag(scanned.general_scanned_height, reference, config.max_height_lag))
}

fn reject(endpoint: &NodeEndpoint, step: &'static str, detail: impl std::fmt::Display) -> bool {
    tracing::debug!(%endpoint, step, detail = %detail, "Node check failed");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_lag() {
        assert!(within_lag(100, Some(102), 2));
        assert!(!within_lag(99, Some(102), 2));
        assert!(within_lag(110, Some(102), 2));
        assert!(within_lag(0, None, 2));
    }
}
