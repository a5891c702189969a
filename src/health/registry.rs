//! Strategy registry and the probe engine.
//!
//! # Design Decisions
//! - Entries are evaluated in registration order; the first match wins
//! - Default order: exact core-service names, known node families and
//!   prefixes, then the website fallback set
//! - Applications with no matching entry are not probed at all

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::Semaphore;

use super::probe::ProbeContext;
use super::strategies::{
    chain_height::HeightAnchor, AllOf, BlockbookProbe, FluxNodeProbe, HeightEstimateProbe,
    PeerQualityProbe, ProbeStrategy, WebsiteProbe,
};
use crate::discovery::NodeEndpoint;
use crate::observability::metrics;
use crate::specs::types::ApplicationSpec;

/// How an entry recognizes an application name.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Case-sensitive equality with any listed name.
    Exact(Vec<String>),
    /// Case-insensitive membership.
    AnyOf(Vec<String>),
    /// Case-insensitive prefix.
    Prefix(String),
}

impl Matcher {
    pub fn exact(names: &[&str]) -> Self {
        Matcher::Exact(names.iter().map(|n| n.to_string()).collect())
    }

    pub fn any_of(names: &[&str]) -> Self {
        Matcher::AnyOf(names.iter().map(|n| n.to_lowercase()).collect())
    }

    pub fn prefix(prefix: &str) -> Self {
        Matcher::Prefix(prefix.to_lowercase())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Exact(names) => names.iter().any(|n| n == name),
            Matcher::AnyOf(names) => {
                let lower = name.to_lowercase();
                names.iter().any(|n| *n == lower)
            }
            Matcher::Prefix(prefix) => name.to_lowercase().starts_with(prefix.as_str()),
        }
    }
}

struct ProbeEntry {
    matcher: Matcher,
    strategy: Arc<dyn ProbeStrategy>,
}

/// Ordered `{matcher, strategy}` list.
#[derive(Default)]
pub struct ProbeRegistry {
    entries: Vec<ProbeEntry>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Later entries lose to earlier ones.
    pub fn register(mut self, matcher: Matcher, strategy: Arc<dyn ProbeStrategy>) -> Self {
        self.entries.push(ProbeEntry { matcher, strategy });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn strategy_for(&self, app_name: &str) -> Option<&Arc<dyn ProbeStrategy>> {
        self.entries
            .iter()
            .find(|e| e.matcher.matches(app_name))
            .map(|e| &e.strategy)
    }

    /// The built-in catalog of known application families.
    pub fn with_defaults() -> Self {
        let kadena = AllOf::new(
            "kadena",
            vec![
                Arc::new(HeightEstimateProbe {
                    label: "kadena_height",
                    scheme: "https",
                    path: "/chainweb/0.0/mainnet01/cut".into(),
                    pointer: "/height".into(),
                    anchor: HeightAnchor {
                        time: 1_704_067_200,
                        height: 86_000_000,
                        blocks_per_interval: 20,
                        interval: Duration::from_secs(30),
                    },
                    tolerance: 4_000,
                }),
                Arc::new(PeerQualityProbe {
                    scheme: "https",
                    path: "/chainweb/0.0/mainnet01/cut/peer".into(),
                    known_host: "chainweb.com".into(),
                    default_port: 443,
                }),
            ],
        );

        let ergo = HeightEstimateProbe {
            label: "ergo_height",
            scheme: "http",
            path: "/info".into(),
            pointer: "/fullHeight".into(),
            anchor: HeightAnchor {
                time: 1_704_067_200,
                height: 1_160_000,
                blocks_per_interval: 1,
                interval: Duration::from_secs(120),
            },
            tolerance: 30,
        };

        Self::new()
            .register(Matcher::exact(&["fluxapi", "fluxos"]), Arc::new(FluxNodeProbe))
            .register(
                Matcher::any_of(&["KadenaChainWebNode", "KadenaChainWebNodeMainnet"]),
                Arc::new(kadena),
            )
            .register(Matcher::prefix("ergo"), Arc::new(ergo))
            .register(
                Matcher::prefix("blockbookbitcoincash"),
                Arc::new(BlockbookProbe {
                    coin: "bitcoincash",
                    min_height: 820_000,
                    address: "bitcoincash:qp3wjpa3tjlj042z2wv7hahsldgwhwy0rq9sywjpyy",
                }),
            )
            .register(
                Matcher::prefix("blockbookbitcoin"),
                Arc::new(BlockbookProbe {
                    coin: "bitcoin",
                    min_height: 820_000,
                    address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
                }),
            )
            .register(
                Matcher::any_of(&["website", "fluxwebsite", "homepage", "landing"]),
                Arc::new(WebsiteProbe),
            )
            .register(Matcher::prefix("wordpress"), Arc::new(WebsiteProbe))
    }
}

/// Runs registered strategies against candidate instances.
pub struct HealthEngine {
    registry: ProbeRegistry,
    ctx: ProbeContext,
    limiter: Option<Arc<Semaphore>>,
}

impl HealthEngine {
    pub fn new(registry: ProbeRegistry, ctx: ProbeContext) -> Self {
        let limiter = match ctx.config.max_concurrent_probes {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self { registry, ctx, limiter }
    }

    /// Whether any strategy applies to this application.
    pub fn is_health_checked_type(&self, spec: &ApplicationSpec) -> bool {
        self.registry.strategy_for(&spec.name).is_some()
    }

    /// Probe one instance. Never fails: faults and panics count as unhealthy.
    /// Applications without a strategy are healthy.
    pub async fn check_instance(&self, spec: &ApplicationSpec, endpoint: &NodeEndpoint) -> bool {
        let Some(strategy) = self.registry.strategy_for(&spec.name) else {
            return true;
        };

        let _permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let outcome = AssertUnwindSafe(strategy.probe(&self.ctx, endpoint))
            .catch_unwind()
            .await;

        let healthy = match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                tracing::debug!(app = %spec.name, %endpoint, strategy = strategy.name(), error = %e, "Probe failed");
                false
            }
            Err(_) => {
                tracing::error!(app = %spec.name, %endpoint, strategy = strategy.name(), "Probe panicked");
                false
            }
        };
        metrics::record_probe(strategy.name(), healthy);
        healthy
    }

    /// Candidates that pass their probe, in input order. Unprobed
    /// applications keep every candidate.
    pub async fn healthy_endpoints(
        &self,
        spec: &ApplicationSpec,
        candidates: &[NodeEndpoint],
    ) -> Vec<NodeEndpoint> {
        if !self.is_health_checked_type(spec) {
            return candidates.to_vec();
        }

        let verdicts = join_all(candidates.iter().map(|c| self.check_instance(spec, c))).await;
        let healthy: Vec<NodeEndpoint> = candidates
            .iter()
            .zip(verdicts)
            .filter_map(|(c, ok)| ok.then_some(*c))
            .collect();

        tracing::info!(
            app = %spec.name,
            candidates = candidates.len(),
            healthy = healthy.len(),
            "Probed application instances"
        );
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        assert!(Matcher::exact(&["fluxapi"]).matches("fluxapi"));
        assert!(!Matcher::exact(&["fluxapi"]).matches("FluxAPI"));
        assert!(Matcher::any_of(&["KadenaChainWebNode"]).matches("kadenachainwebnode"));
        assert!(Matcher::prefix("ergo").matches("ErgoNode2"));
        assert!(!Matcher::prefix("ergo").matches("myergo"));
    }

    #[test]
    fn test_default_priority() {
        let registry = ProbeRegistry::with_defaults();
        let name_of = |app: &str| registry.strategy_for(app).map(|s| s.name());

        assert_eq!(name_of("fluxapi"), Some("fluxnode"));
        assert_eq!(name_of("KadenaChainWebNode"), Some("kadena"));
        assert_eq!(name_of("ergonode"), Some("ergo_height"));
        assert_eq!(name_of("blockbookbitcoin"), Some("blockbook"));
        assert_eq!(name_of("wordpress1700"), Some("website"));
        assert_eq!(name_of("Website"), Some("website"));
        assert_eq!(name_of("minecraft"), None);
    }
}
