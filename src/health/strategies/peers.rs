//! Peer-quality check.

use async_trait::async_trait;
use serde::Deserialize;

use super::ProbeStrategy;
use crate::discovery::NodeEndpoint;
use crate::health::probe::{ProbeContext, ProbeError};

/// Peers that match the known host pattern required for a pass.
pub const MIN_KNOWN_HOST_PEERS: usize = 2;
/// Peers on a non-default port required for a pass.
pub const MIN_NON_DEFAULT_PORT_PEERS: usize = 5;

/// A peer address as reported by the node.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PeerAddress {
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    address: PeerAddress,
}

#[derive(Debug, Deserialize)]
struct PeerPage {
    items: Vec<PeerEntry>,
}

/// Whether the peer set shows genuine external connectivity.
pub fn peer_quality(peers: &[PeerAddress], known_host: &str, default_port: u16) -> bool {
    let known = peers.iter().filter(|p| p.hostname.contains(known_host)).count();
    let elsewhere = peers.iter().filter(|p| p.port != default_port).count();
    known >= MIN_KNOWN_HOST_PEERS || elsewhere >= MIN_NON_DEFAULT_PORT_PEERS
}

/// Lists a node's peers and applies [`peer_quality`].
#[derive(Debug, Clone)]
pub struct PeerQualityProbe {
    pub scheme: &'static str,
    pub path: String,
    pub known_host: String,
    pub default_port: u16,
}

#[async_trait]
impl ProbeStrategy for PeerQualityProbe {
    fn name(&self) -> &'static str {
        "peers"
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        let url = format!("{}{}", endpoint.url(self.scheme), self.path);
        let page: PeerPage = ctx.client.get_json(&url, ctx.default_timeout()).await?;
        let peers: Vec<PeerAddress> = page.items.into_iter().map(|e| e.address).collect();
        Ok(peer_quality(&peers, &self.known_host, self.default_port))
    }
}
