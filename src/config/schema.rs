//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control plane.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the domain manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlConfig {
    /// Application specification feed settings.
    pub feed: FeedConfig,

    /// Decryption of access-restricted specifications.
    pub enterprise: EnterpriseConfig,

    /// Partitioning of the application set across replicas.
    pub sharding: ShardingConfig,

    /// Network-wide instance discovery.
    pub discovery: DiscoveryConfig,

    /// Health probe settings.
    pub health: HealthConfig,

    /// Domain naming.
    pub domains: DomainConfig,

    /// DNS record reconciliation.
    pub dns: DnsConfig,

    /// TLS certificate automation.
    pub certs: CertConfig,

    /// Load balancer configuration output and reload.
    pub haproxy: HaproxyConfig,

    /// Reconciliation cycle timing.
    pub cycle: CycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Specification feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Origin service base URL (e.g., "https://api.runonflux.io").
    pub api_base_url: String,

    /// Path of the global application specification feed.
    pub specs_path: String,

    /// Path of the permanent message feed.
    pub messages_path: String,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Retry delay when the origin declares `max-age=0`, in seconds.
    pub stale_retry_secs: u64,

    /// Delay used when the origin declares no max-age at all, in seconds.
    pub fallback_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.runonflux.io".to_string(),
            specs_path: "/apps/globalappsspecifications".to_string(),
            messages_path: "/apps/permanentmessages".to_string(),
            request_timeout_ms: 30_000,
            stale_retry_secs: 5,
            fallback_interval_secs: 60,
        }
    }
}

/// Enterprise specification decryption.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnterpriseConfig {
    /// Decrypt enterprise specifications. When disabled they are dropped.
    pub enabled: bool,

    /// Base URL of the decryption oracle.
    pub oracle_url: String,

    /// PEM bundle (certificate + key) presented to the oracle.
    pub client_identity_path: Option<String>,

    /// CA certificate used to verify the oracle.
    pub ca_cert_path: Option<String>,

    /// Attempts to resolve the original owner.
    pub owner_attempts: u32,

    /// Delay between owner lookups in seconds.
    pub owner_retry_secs: u64,

    /// Attempts against the decryption oracle.
    pub oracle_attempts: u32,

    /// Delay between oracle attempts in seconds.
    pub oracle_retry_secs: u64,

    /// Lifetime of a decrypted specification in the cache, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EnterpriseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            oracle_url: "https://127.0.0.1:16127".to_string(),
            client_identity_path: None,
            ca_cert_path: None,
            owner_attempts: 3,
            owner_retry_secs: 3,
            oracle_attempts: 4,
            oracle_retry_secs: 16,
            cache_ttl_secs: 6 * 60 * 60,
        }
    }
}

/// Sharding and filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Number of buckets the application set is split into.
    pub total_buckets: u32,

    /// Bucket handled by this replica (0 = all applications).
    pub bucket: u32,

    /// Glob patterns; when non-empty only matching names are kept.
    pub allow_list: Vec<String>,

    /// Glob patterns of names that are never processed.
    pub deny_list: Vec<String>,

    /// When non-empty only applications owned by these identities are kept.
    pub owner_allow_list: Vec<String>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            total_buckets: 1,
            bucket: 0,
            allow_list: Vec::new(),
            deny_list: Vec::new(),
            owner_allow_list: Vec::new(),
        }
    }
}

/// Instance discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Path of the network-wide application location listing.
    pub locations_path: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            locations_path: "/apps/locations".to_string(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout for probes that do not define their own, in milliseconds.
    pub default_timeout_ms: u64,

    /// Trusted explorer used to track the reference chain height.
    pub reference_explorer_url: String,

    /// Refresh interval of the reference height in seconds.
    pub reference_refresh_secs: u64,

    /// Blocks a node may lag behind the reference height.
    pub max_height_lag: u64,

    /// Minimum node software version (`major.minor.patch`).
    pub min_node_version: String,

    /// Minimum outgoing peers reported by a node.
    pub min_connected_peers: usize,

    /// Minimum incoming peers reported by a node.
    pub min_incoming_peers: usize,

    /// Minimum number of applications in a node's catalog.
    pub min_apps: usize,

    /// Minimum number of permanent messages in a node's catalog.
    pub min_messages: usize,

    /// Let the explorer sync check decide the verdict.
    pub enforce_sync_check: bool,

    /// Cap on concurrent probes per application (0 = unlimited).
    pub max_concurrent_probes: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            reference_explorer_url: "https://explorer.runonflux.io".to_string(),
            reference_refresh_secs: 120,
            max_height_lag: 2,
            min_node_version: "5.33.0".to_string(),
            min_connected_peers: 8,
            min_incoming_peers: 4,
            min_apps: 100,
            min_messages: 1_000,
            enforce_sync_check: false,
            max_concurrent_probes: 0,
        }
    }
}

/// Domain naming configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Registered root domain (e.g., "runonflux.io").
    pub root_domain: String,

    /// Managed subdomain under the root (e.g., "app").
    pub subdomain: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            root_domain: "runonflux.io".to_string(),
            subdomain: "app".to_string(),
        }
    }
}

impl DomainConfig {
    /// Suffix every managed record must end with (e.g., "app.runonflux.io").
    pub fn managed_suffix(&self) -> String {
        format!("{}.{}", self.subdomain, self.root_domain)
    }
}

/// Supported DNS providers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsProviderKind {
    Cloudflare,
    None,
}

/// DNS reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Enable DNS record management.
    pub enabled: bool,

    /// Provider backing the managed zone.
    pub provider: DnsProviderKind,

    /// Provider API base URL.
    pub api_url: String,

    /// Provider API token.
    pub api_token: String,

    /// Managed zone identifier.
    pub zone_id: String,

    /// Address records should point at. An IP yields A records, a hostname CNAMEs.
    /// When unset the public IP is discovered at runtime.
    pub published_address: Option<String>,

    /// Service returning this replica's public IPv4 as plain text.
    pub public_ip_url: String,

    /// Refresh interval of the public IP in seconds.
    pub public_ip_refresh_secs: u64,

    /// Domains that are never touched.
    pub excluded_domains: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: DnsProviderKind::None,
            api_url: "https://api.cloudflare.com/client/v4".to_string(),
            api_token: String::new(),
            zone_id: String::new(),
            published_address: None,
            public_ip_url: "https://api.ipify.org".to_string(),
            public_ip_refresh_secs: 300,
            excluded_domains: Vec::new(),
        }
    }
}

/// Resolver used for authoritative domain lookups.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    System,
    Cloudflare,
}

/// Certificate automation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertConfig {
    /// Enable certificate issuance.
    pub enabled: bool,

    /// Directory holding `<domain>.pem` bundles.
    pub cert_dir: String,

    /// Artifacts smaller than this are treated as missing.
    pub min_cert_size_bytes: u64,

    /// Issuance command; `{domain}` is substituted.
    pub issue_command: Vec<String>,

    /// File listing the domains handled by the renewal hook.
    pub renewal_hook_path: String,

    /// Line ensured in the renewal hook per domain; `{domain}` is substituted.
    pub renewal_hook_template: String,

    /// Resolver used to confirm a domain points at this replica.
    pub resolver: ResolverKind,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_dir: "/etc/ssl/fluxapps".to_string(),
            min_cert_size_bytes: 1_000,
            issue_command: vec![
                "/usr/local/bin/issue-cert".to_string(),
                "{domain}".to_string(),
            ],
            renewal_hook_path: "/etc/letsencrypt/renewal-hooks/deploy/domains.list".to_string(),
            renewal_hook_template: "{domain}".to_string(),
            resolver: ResolverKind::Cloudflare,
        }
    }
}

/// TLS handling of an application at the load balancer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS terminated at the load balancer, plain HTTP to the backend.
    #[default]
    Terminate,
    /// TLS re-encrypted towards the backend.
    Reencrypt,
}

/// Proxy mode of an application.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Http,
    Tcp,
}

/// An entry of the per-application override table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OverrideEntry {
    /// Application port the entry applies to.
    pub port: u16,

    /// Component or application name the entry applies to.
    pub name: String,

    #[serde(default)]
    pub mode: ProxyMode,

    #[serde(default)]
    pub tls: TlsMode,

    /// Extra `http-request` header lines.
    #[serde(default)]
    pub headers: Vec<String>,

    /// Health check lines placed in the backend.
    #[serde(default)]
    pub check_lines: Vec<String>,

    /// Balancing algorithm (e.g., "roundrobin", "source").
    #[serde(default)]
    pub balance: Option<String>,

    /// Timeout lines placed in the backend.
    #[serde(default)]
    pub timeouts: Vec<String>,
}

/// Load balancer configuration output.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Live configuration file.
    pub config_path: String,

    /// Candidate configuration validated before going live.
    pub staging_path: String,

    /// Validation command; `{config}` is substituted with the staging path.
    pub validate_command: Vec<String>,

    /// Reload command.
    pub reload_command: Vec<String>,

    /// Certificate directory referenced by the HTTPS frontend.
    pub cert_dir: String,

    /// Additional override table entries, consulted before the built-in table.
    pub overrides: Vec<OverrideEntry>,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            config_path: "/etc/haproxy/haproxy.cfg".to_string(),
            staging_path: "/tmp/haproxytemp.cfg".to_string(),
            validate_command: vec![
                "haproxy".to_string(),
                "-c".to_string(),
                "-q".to_string(),
                "-f".to_string(),
                "{config}".to_string(),
            ],
            reload_command: vec![
                "systemctl".to_string(),
                "reload".to_string(),
                "haproxy".to_string(),
            ],
            cert_dir: "/etc/ssl/fluxapps/".to_string(),
            overrides: Vec::new(),
        }
    }
}

/// Reconciliation cycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Delay between reconciliation cycles in seconds.
    pub interval_secs: u64,

    /// Pause after DNS changes before certificate work, in milliseconds.
    pub dns_settle_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 240,
            dns_settle_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
