//! Instance discovery.
//!
//! # Responsibilities
//! - Fetch the network-wide application location listing
//! - Keep only syntactically valid IPv4 addresses
//! - Group candidate endpoints by application name
//!
//! # Design Decisions
//! - Locations may carry the node's API port (`ip:port`); it is stripped
//! - The probe port is the application's first declared port

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::specs::feed::{FeedClient, FeedError};
use crate::specs::types::{ApplicationSpec, Envelope};

/// A candidate location of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Base URL of the instance on `port`.
    pub fn url_on(&self, scheme: &str, port: u16) -> String {
        format!("{}://{}:{}", scheme, self.ip, port)
    }

    /// Base URL of the instance on its own port.
    pub fn url(&self, scheme: &str) -> String {
        self.url_on(scheme, self.port)
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One row of the location listing.
#[derive(Debug, Clone, Deserialize)]
pub struct AppLocation {
    pub name: String,
    pub ip: String,
}

/// Parse a listing address, dropping any port suffix.
pub fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let host = raw.trim().split(':').next()?;
    host.parse().ok()
}

/// Unique valid IPs per application name.
pub type LocationIndex = BTreeMap<String, BTreeSet<Ipv4Addr>>;

/// Group a listing by application, discarding malformed addresses.
pub fn index_locations(locations: Vec<AppLocation>) -> LocationIndex {
    let mut index = LocationIndex::new();
    for location in locations {
        match parse_ipv4(&location.ip) {
            Some(ip) => {
                index.entry(location.name).or_default().insert(ip);
            }
            None => {
                tracing::debug!(app = %location.name, ip = %location.ip, "Skipping invalid location");
            }
        }
    }
    index
}

/// Candidate endpoints of one application.
pub fn candidates(index: &LocationIndex, spec: &ApplicationSpec) -> Vec<NodeEndpoint> {
    let Some(port) = spec.first_port() else {
        return Vec::new();
    };
    index
        .get(&spec.name)
        .map(|ips| ips.iter().map(|ip| NodeEndpoint::new(*ip, port)).collect())
        .unwrap_or_default()
}

/// Fetches application locations from the origin service.
#[derive(Debug, Clone)]
pub struct NodeDiscovery {
    client: FeedClient,
    path: String,
}

impl NodeDiscovery {
    pub fn new(client: FeedClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    pub async fn fetch(&self) -> Result<LocationIndex, FeedError> {
        let envelope: Envelope<Vec<AppLocation>> = self.client.get_json(&self.path).await?;
        if !envelope.is_success() {
            return Err(FeedError::Envelope(envelope.status));
        }
        Ok(index_locations(envelope.data))
    }
}
