//! Application specification types.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Feed envelope shared by every origin endpoint: `{status, data}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// A single component of a composed (version 4+) application.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,

    #[serde(default)]
    pub repotag: String,

    #[serde(default, deserialize_with = "lenient_ports")]
    pub ports: Vec<u16>,

    /// User-supplied domain text, one entry per port.
    #[serde(default)]
    pub domains: Vec<String>,
}

/// A hosted application's specification.
///
/// Immutable once decrypted; a newer feed snapshot replaces it wholesale.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Unique, case-sensitive identity.
    pub name: String,

    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub owner: String,

    /// Flat port list (versions up to 3).
    #[serde(default, deserialize_with = "lenient_ports")]
    pub ports: Vec<u16>,

    /// Flat domain list (versions up to 3), one entry per port.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Components (version 4 and later).
    #[serde(default)]
    pub compose: Vec<ComponentSpec>,

    /// Encrypted payload for access-restricted specifications, empty otherwise.
    #[serde(default)]
    pub enterprise: String,

    /// Content digest assigned by the network.
    #[serde(default)]
    pub hash: String,

    /// Registration height, required by the decryption oracle.
    #[serde(default)]
    pub height: u64,

    #[serde(default)]
    pub contacts: Vec<String>,
}

/// Ports and domains of one addressable part of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortGroup<'a> {
    /// Component name, or the application name for flat specifications.
    pub name: &'a str,
    pub ports: &'a [u16],
    pub domains: &'a [String],
}

impl ApplicationSpec {
    /// Whether sensitive fields still await decryption.
    pub fn is_enterprise(&self) -> bool {
        !self.enterprise.is_empty()
    }

    /// Whether the specification uses the composed layout.
    pub fn is_composed(&self) -> bool {
        self.version >= 4
    }

    /// Port groups in declaration order.
    pub fn port_groups(&self) -> Vec<PortGroup<'_>> {
        if self.is_composed() {
            self.compose
                .iter()
                .map(|c| PortGroup {
                    name: &c.name,
                    ports: &c.ports,
                    domains: &c.domains,
                })
                .collect()
        } else {
            vec![PortGroup {
                name: &self.name,
                ports: &self.ports,
                domains: &self.domains,
            }]
        }
    }

    /// Every declared port in declaration order.
    pub fn all_ports(&self) -> Vec<u16> {
        self.port_groups()
            .iter()
            .flat_map(|g| g.ports.iter().copied())
            .collect()
    }

    /// First declared port, used as the probe target.
    pub fn first_port(&self) -> Option<u16> {
        self.all_ports().first().copied()
    }
}

/// A permanent message recorded by the network.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermanentMessage {
    pub hash: String,

    #[serde(default)]
    pub txid: String,

    #[serde(default)]
    pub height: u64,

    #[serde(default)]
    pub app_specifications: Option<serde_json::Value>,
}

/// Snapshot of all known specifications, keyed by name.
pub type SpecMap = BTreeMap<String, ApplicationSpec>;

/// Accepts ports given as numbers or numeric strings.
fn lenient_ports<'de, D>(deserializer: D) -> Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    let raw = Vec::<Port>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|p| match p {
            Port::Number(n) => Ok(n),
            Port::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        })
        .collect()
}
