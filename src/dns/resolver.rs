//! Authoritative resolution of domains before certificate issuance.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveError;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use crate::config::ResolverKind;
use crate::context::{normalize_name, PublishedAddress};

/// What a domain currently resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub addresses: Vec<Ipv4Addr>,
    /// CNAME targets, normalized.
    pub aliases: Vec<String>,
}

impl Resolution {
    /// Whether the domain reaches this replica.
    pub fn points_to(&self, published: &PublishedAddress) -> bool {
        match published {
            PublishedAddress::Ip(ip) => self.addresses.contains(ip),
            PublishedAddress::Name(name) => self.aliases.iter().any(|a| a == name),
        }
    }
}

#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// Lookup failures and NXDOMAIN resolve to nothing.
    async fn resolve(&self, domain: &str) -> Resolution;
}

/// hickory-backed resolver.
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    pub fn new(kind: ResolverKind) -> Result<Self, ResolveError> {
        let inner = match kind {
            ResolverKind::System => TokioAsyncResolver::tokio_from_system_conf()?,
            ResolverKind::Cloudflare => {
                TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), ResolverOpts::default())
            }
        };
        Ok(Self { inner })
    }
}

#[async_trait]
impl DomainResolver for HickoryResolver {
    async fn resolve(&self, domain: &str) -> Resolution {
        let mut resolution = Resolution::default();

        match self.inner.lookup(domain, RecordType::CNAME).await {
            Ok(lookup) => {
                for rdata in lookup.iter() {
                    if let RData::CNAME(target) = rdata {
                        resolution.aliases.push(normalize_name(&target.0.to_utf8()));
                    }
                }
            }
            Err(e) => tracing::trace!(domain, error = %e, "No CNAME"),
        }

        match self.inner.ipv4_lookup(domain).await {
            Ok(lookup) => resolution.addresses.extend(lookup.iter().map(|a| a.0)),
            Err(e) => tracing::debug!(domain, error = %e, "A lookup failed"),
        }

        resolution
    }
}

/// Fixed answers, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    answers: HashMap<String, Resolution>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, domain: &str, ip: Ipv4Addr) -> Self {
        self.answers
            .entry(normalize_name(domain))
            .or_default()
            .addresses
            .push(ip);
        self
    }

    pub fn with_alias(mut self, domain: &str, target: &str) -> Self {
        self.answers
            .entry(normalize_name(domain))
            .or_default()
            .aliases
            .push(normalize_name(target));
        self
    }
}

#[async_trait]
impl DomainResolver for StaticResolver {
    async fn resolve(&self, domain: &str) -> Resolution {
        self.answers
            .get(&normalize_name(domain))
            .cloned()
            .unwrap_or_default()
    }
}
