//! Time-anchored chain height check.
//!
//! The expected height is extrapolated from a known anchor block and the
//! chain's nominal block interval, so no external reference is needed.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use super::ProbeStrategy;
use crate::discovery::NodeEndpoint;
use crate::health::probe::{ProbeContext, ProbeError};

/// A known point on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightAnchor {
    /// Unix time of the anchor block, in seconds.
    pub time: u64,
    pub height: u64,
    /// Expected height growth per `interval`.
    pub blocks_per_interval: u64,
    pub interval: Duration,
}

impl HeightAnchor {
    /// Expected height at `now` (unix seconds).
    pub fn estimate(&self, now: u64) -> u64 {
        let interval = self.interval.as_secs().max(1);
        let elapsed = now.saturating_sub(self.time);
        self.height + (elapsed / interval) * self.blocks_per_interval
    }
}

/// Whether `reported` is no more than `tolerance` below `estimate`.
pub fn height_within_tolerance(reported: u64, estimate: u64, tolerance: u64) -> bool {
    reported.saturating_add(tolerance) >= estimate
}

/// Reads a height from a JSON endpoint and compares it to the estimate.
#[derive(Debug, Clone)]
pub struct HeightEstimateProbe {
    pub label: &'static str,
    pub scheme: &'static str,
    pub path: String,
    /// JSON pointer to the height field, e.g. `/fullHeight`.
    pub pointer: String,
    pub anchor: HeightAnchor,
    pub tolerance: u64,
}

#[async_trait]
impl ProbeStrategy for HeightEstimateProbe {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        let url = format!("{}{}", endpoint.url(self.scheme), self.path);
        let body: Value = ctx.client.get_json(&url, ctx.default_timeout()).await?;
        let reported = body
            .pointer(&self.pointer)
            .and_then(Value::as_u64)
            .ok_or(ProbeError::MissingField("height"))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let estimate = self.anchor.estimate(now);
        let healthy = height_within_tolerance(reported, estimate, self.tolerance);
        if !healthy {
            tracing::debug!(%endpoint, reported, estimate, check = self.label, "Height below estimate");
        }
        Ok(healthy)
    }
}
