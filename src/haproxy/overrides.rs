//! Per-application proxy settings.
//!
//! # Design Decisions
//! - Name-substring rules run first and seed the result
//! - A `(port, name)` table hit then replaces everything except the
//!   seeded headers
//! - Configured entries are consulted before the built-in ones
//! - Anything unmatched gets [`Override::default`]

use crate::config::{OverrideEntry, ProxyMode, TlsMode};

const DEFAULT_BALANCE: &str = "roundrobin";

/// Resolved settings of one `(port, component)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub mode: ProxyMode,
    pub tls: TlsMode,
    pub headers: Vec<String>,
    pub check_lines: Vec<String>,
    pub balance: String,
    pub timeouts: Vec<String>,
}

impl Default for Override {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Http,
            tls: TlsMode::Terminate,
            headers: Vec::new(),
            check_lines: Vec::new(),
            balance: DEFAULT_BALANCE.to_string(),
            timeouts: Vec::new(),
        }
    }
}

impl Override {
    fn apply(&mut self, entry: &OverrideEntry) {
        self.mode = entry.mode;
        self.tls = entry.tls;
        for header in &entry.headers {
            if !self.headers.contains(header) {
                self.headers.push(header.clone());
            }
        }
        self.check_lines = entry.check_lines.clone();
        self.balance = entry
            .balance
            .clone()
            .unwrap_or_else(|| DEFAULT_BALANCE.to_string());
        self.timeouts = entry.timeouts.clone();
    }
}

/// Content-management systems that build absolute URLs from the request scheme.
const FORWARDED_PROTO_KEYWORDS: &[&str] = &["wordpress", "ghost", "joomla", "drupal"];
const FORWARDED_PROTO_HEADER: &str = "http-request set-header X-Forwarded-Proto https";

fn entry(port: u16, name: &str) -> OverrideEntry {
    OverrideEntry {
        port,
        name: name.to_string(),
        mode: ProxyMode::Http,
        tls: TlsMode::Terminate,
        headers: Vec::new(),
        check_lines: Vec::new(),
        balance: None,
        timeouts: Vec::new(),
    }
}

fn builtin_entries() -> Vec<OverrideEntry> {
    vec![
        OverrideEntry {
            balance: Some("source".into()),
            check_lines: vec!["option httpchk GET /flux/version".into()],
            ..entry(16127, "fluxapi")
        },
        OverrideEntry {
            tls: TlsMode::Reencrypt,
            check_lines: vec!["option httpchk GET /chainweb/0.0/mainnet01/cut".into()],
            timeouts: vec!["timeout server 120s".into()],
            ..entry(30004, "KadenaChainWebNode")
        },
        OverrideEntry {
            mode: ProxyMode::Tcp,
            balance: Some("source".into()),
            timeouts: vec!["timeout server 1h".into(), "timeout client 1h".into()],
            ..entry(25565, "minecraft")
        },
        OverrideEntry {
            check_lines: vec!["option httpchk GET /info".into()],
            ..entry(9053, "ergonode")
        },
    ]
}

/// Override lookup table.
#[derive(Debug, Clone)]
pub struct OverrideTable {
    entries: Vec<OverrideEntry>,
}

impl OverrideTable {
    /// Configured entries, then the built-in ones.
    pub fn new(configured: &[OverrideEntry]) -> Self {
        let mut entries = configured.to_vec();
        entries.extend(builtin_entries());
        Self { entries }
    }

    /// Settings for `port` of component (or application) `name`.
    pub fn resolve(&self, port: u16, name: &str) -> Override {
        let mut resolved = Override::default();

        let lower = name.to_lowercase();
        if FORWARDED_PROTO_KEYWORDS.iter().any(|k| lower.contains(k)) {
            resolved.headers.push(FORWARDED_PROTO_HEADER.to_string());
        }

        if let Some(entry) = self.entries.iter().find(|e| e.port == port && e.name == name) {
            resolved.apply(entry);
        }
        resolved
    }
}
