//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ControlConfig (validated, immutable)
//!     → cloned into each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ControlConfig;
pub use schema::{
    CertConfig, CycleConfig, DiscoveryConfig, DnsConfig, DnsProviderKind, DomainConfig,
    EnterpriseConfig, FeedConfig, HaproxyConfig, HealthConfig, ObservabilityConfig,
    OverrideEntry, ProxyMode, ResolverKind, ShardingConfig, TlsMode,
};
pub use validation::ValidationError;
