//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define control-plane metrics (feed fetches, probes, DNS changes, reloads)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `dm_feed_fetch_total` (counter): feed fetches by feed, outcome
//! - `dm_specs_tracked` (gauge): applications in the current snapshot
//! - `dm_probe_total` (counter): probes by strategy, verdict
//! - `dm_dns_changes_total` (counter): record creations/deletions
//! - `dm_certificates_issued_total` (counter): issuance attempts by outcome
//! - `dm_reload_total` (counter): load balancer reloads by outcome
//! - `dm_cycle_duration_seconds` (histogram): reconciliation cycle latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_feed_fetch(feed: &'static str, outcome: &'static str) {
    counter!("dm_feed_fetch_total", "feed" => feed, "outcome" => outcome).increment(1);
}

pub fn record_specs_tracked(count: usize) {
    gauge!("dm_specs_tracked").set(count as f64);
}

pub fn record_probe(strategy: &'static str, healthy: bool) {
    let verdict = if healthy { "healthy" } else { "unhealthy" };
    counter!("dm_probe_total", "strategy" => strategy, "verdict" => verdict).increment(1);
}

pub fn record_dns_change(action: &'static str) {
    counter!("dm_dns_changes_total", "action" => action).increment(1);
}

pub fn record_certificate(outcome: &'static str) {
    counter!("dm_certificates_issued_total", "outcome" => outcome).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    counter!("dm_reload_total", "outcome" => outcome).increment(1);
}

pub fn record_cycle(start: Instant) {
    histogram!("dm_cycle_duration_seconds").record(start.elapsed().as_secs_f64());
}
