//! The reconciliation cycle.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tracing::Instrument;

use super::report::{CycleReport, ReloadStatus};
use crate::discovery::{candidates, NodeDiscovery, NodeEndpoint};
use crate::dns::DnsReconciler;
use crate::haproxy::{AppPlan, ApplyOutcome, ConfigSynthesizer, Reloader};
use crate::health::HealthEngine;
use crate::observability::metrics;
use crate::sharding::Sharder;
use crate::specs::cache::{CacheEvent, SpecCache};
use crate::specs::types::ApplicationSpec;

/// Applications probed at the same time.
const APP_FANOUT: usize = 32;

/// Fetch → filter → probe → domains/DNS/certs → synthesize → reload.
pub struct Pipeline {
    cache: Arc<SpecCache>,
    sharder: Sharder,
    discovery: NodeDiscovery,
    health: HealthEngine,
    synthesizer: ConfigSynthesizer,
    dns: Option<DnsReconciler>,
    reloader: Reloader,
    last_report: ArcSwapOption<CycleReport>,
    /// Cycles never overlap; the live configuration has a single writer.
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        cache: Arc<SpecCache>,
        sharder: Sharder,
        discovery: NodeDiscovery,
        health: HealthEngine,
        synthesizer: ConfigSynthesizer,
        dns: Option<DnsReconciler>,
        reloader: Reloader,
    ) -> Self {
        Self {
            cache,
            sharder,
            discovery,
            health,
            synthesizer,
            dns,
            reloader,
            last_report: ArcSwapOption::empty(),
            running: Mutex::new(()),
        }
    }

    /// Report of the most recent completed cycle.
    pub fn last_report(&self) -> Option<Arc<CycleReport>> {
        self.last_report.load_full()
    }

    /// Run one full cycle. Never fails; problems end up in the report.
    pub async fn run_cycle(&self) -> Arc<CycleReport> {
        let _guard = self.running.lock().await;
        let mut report = CycleReport::new();
        let span = tracing::info_span!("cycle", id = %report.id);
        let started = Instant::now();

        self.execute(&mut report).instrument(span).await;

        report.duration = started.elapsed();
        metrics::record_cycle(started);
        tracing::info!(
            id = %report.id,
            duration_ms = report.duration.as_millis() as u64,
            selected = report.apps_selected,
            healthy = report.apps_healthy,
            domains = report.domains.len(),
            reload = ?report.reload,
            "Cycle complete"
        );
        let report = Arc::new(report);
        self.last_report.store(Some(report.clone()));
        report
    }

    async fn execute(&self, report: &mut CycleReport) {
        let specs = self.cache.get_global_specs();
        report.apps_total = specs.len();
        if specs.is_empty() {
            report.reload = ReloadStatus::Skipped("no specifications yet".into());
            return;
        }

        let selected = self.sharder.select_for_processing(&specs);
        report.apps_selected = selected.len();

        let locations = match self.discovery.fetch().await {
            Ok(locations) => locations,
            Err(e) => {
                tracing::warn!(error = %e, "Location fetch failed, keeping current configuration");
                report.reload = ReloadStatus::Skipped(format!("location fetch failed: {e}"));
                return;
            }
        };

        let located: Vec<(&ApplicationSpec, Vec<_>)> = selected
            .into_iter()
            .map(|spec| (spec, candidates(&locations, spec)))
            .filter(|(_, c)| !c.is_empty())
            .collect();
        report.apps_located = located.len();

        let healthy = self.probe_all(&located).await;
        report.apps_healthy = healthy.len();

        let mut plans: Vec<AppPlan> = Vec::new();
        for (spec, _) in &located {
            let Some(ips) = healthy.get(&spec.name) else {
                continue;
            };
            match self.synthesizer.plan(spec, ips) {
                Ok(plan) => plans.push(plan),
                Err(e) => {
                    report.apps_invalid += 1;
                    tracing::warn!(app = %spec.name, error = %e, "Skipping application with inconsistent domains");
                }
            }
        }

        report.domains = plans.iter().flat_map(AppPlan::domains).collect();
        if let Some(dns) = &self.dns {
            report.dns = Some(dns.reconcile_all(&report.domains).await);
        }

        if plans.is_empty() {
            tracing::warn!(selected = report.apps_selected, "No healthy applications, keeping current configuration");
            report.reload = ReloadStatus::Skipped("no healthy applications".into());
            return;
        }

        let text = self.synthesizer.render(&plans);
        report.reload = match self.reloader.apply(&text).await {
            Ok(ApplyOutcome::Reloaded) => ReloadStatus::Reloaded,
            Ok(ApplyOutcome::Unchanged) => ReloadStatus::Unchanged,
            Err(e) => {
                tracing::error!(error = %e, "Load balancer configuration rejected, previous configuration stays live");
                ReloadStatus::Failed(e.to_string())
            }
        };
    }

    /// Probe every located application, `APP_FANOUT` at a time. Applications
    /// left with no healthy instance are omitted.
    async fn probe_all(
        &self,
        located: &[(&ApplicationSpec, Vec<NodeEndpoint>)],
    ) -> BTreeMap<String, Vec<Ipv4Addr>> {
        let health = &self.health;
        let probes: Vec<_> = located
            .iter()
            .map(|(spec, endpoints)| {
                let spec = (*spec).clone();
                let endpoints = endpoints.clone();
                async move {
                    let healthy = health.healthy_endpoints(&spec, &endpoints).await;
                    (spec.name, healthy.into_iter().map(|e| e.ip).collect::<Vec<_>>())
                }
            })
            .collect();

        let results: Vec<(String, Vec<Ipv4Addr>)> = stream::iter(probes)
            .buffer_unordered(APP_FANOUT)
            .collect()
            .await;
        results.into_iter().filter(|(_, ips)| !ips.is_empty()).collect()
    }

    /// Cycle every `interval` and whenever the specification snapshot changes,
    /// until shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Reconciliation loop starting");
        let mut events = self.cache.subscribe();

        loop {
            self.run_cycle().await;

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    event = events.recv() => match event {
                        Ok(CacheEvent::SpecsUpdated(_)) => break,
                        Ok(CacheEvent::MessagesUpdated(_)) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => {
                            (&mut sleep).await;
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        tracing::info!("Reconciliation loop received shutdown signal, exiting loop");
                        return;
                    }
                }
            }
        }
    }
}
