//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buckets, timeouts, retry counts)
//! - Check that enabled subsystems carry the settings they need
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControlConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::{ControlConfig, DnsProviderKind};

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sharding.total_buckets must be at least 1")]
    NoBuckets,

    #[error("sharding.bucket {bucket} is outside 0..{total}")]
    BucketOutOfRange { bucket: u32, total: u32 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("domains.{field} must not be empty")]
    EmptyDomain { field: &'static str },

    #[error("dns.{field} is required for the cloudflare provider")]
    MissingDnsSetting { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyCommand { field: &'static str },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ControlConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let sharding = &config.sharding;
    if sharding.total_buckets == 0 {
        errors.push(ValidationError::NoBuckets);
    } else if sharding.bucket >= sharding.total_buckets {
        errors.push(ValidationError::BucketOutOfRange {
            bucket: sharding.bucket,
            total: sharding.total_buckets,
        });
    }

    if config.feed.request_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "feed.request_timeout_ms" });
    }
    if config.health.default_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "health.default_timeout_ms" });
    }
    if config.enterprise.enabled && config.enterprise.oracle_attempts == 0 {
        errors.push(ValidationError::Zero { field: "enterprise.oracle_attempts" });
    }
    if config.cycle.interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "cycle.interval_secs" });
    }

    if config.domains.root_domain.is_empty() {
        errors.push(ValidationError::EmptyDomain { field: "root_domain" });
    }
    if config.domains.subdomain.is_empty() {
        errors.push(ValidationError::EmptyDomain { field: "subdomain" });
    }

    if config.dns.enabled && config.dns.provider == DnsProviderKind::Cloudflare {
        if config.dns.api_token.is_empty() {
            errors.push(ValidationError::MissingDnsSetting { field: "api_token" });
        }
        if config.dns.zone_id.is_empty() {
            errors.push(ValidationError::MissingDnsSetting { field: "zone_id" });
        }
    }

    if config.certs.enabled && config.certs.issue_command.is_empty() {
        errors.push(ValidationError::EmptyCommand { field: "certs.issue_command" });
    }
    if config.haproxy.validate_command.is_empty() {
        errors.push(ValidationError::EmptyCommand { field: "haproxy.validate_command" });
    }
    if config.haproxy.reload_command.is_empty() {
        errors.push(ValidationError::EmptyCommand { field: "haproxy.reload_command" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
