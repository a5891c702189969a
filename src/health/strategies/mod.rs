//! Probe strategies, one per application family.

pub mod blockbook;
pub mod chain_height;
pub mod fluxnode;
pub mod peers;
pub mod website;

use std::sync::Arc;

use async_trait::async_trait;

use crate::discovery::NodeEndpoint;
use crate::health::probe::{ProbeContext, ProbeError};

pub use blockbook::BlockbookProbe;
pub use chain_height::HeightEstimateProbe;
pub use fluxnode::FluxNodeProbe;
pub use peers::PeerQualityProbe;
pub use website::WebsiteProbe;

/// Decides whether one instance is healthy.
///
/// `Ok(false)` is a verdict; errors are treated as unhealthy by the caller.
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    /// Stable label for logs and metrics.
    fn name(&self) -> &'static str;

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError>;
}

/// Healthy only if every inner strategy says so, checked in order.
pub struct AllOf {
    name: &'static str,
    strategies: Vec<Arc<dyn ProbeStrategy>>,
}

impl AllOf {
    pub fn new(name: &'static str, strategies: Vec<Arc<dyn ProbeStrategy>>) -> Self {
        Self { name, strategies }
    }
}

#[async_trait]
impl ProbeStrategy for AllOf {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        for strategy in &self.strategies {
            if !strategy.probe(ctx, endpoint).await? {
                tracing::debug!(%endpoint, check = strategy.name(), "Composite check failed");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
