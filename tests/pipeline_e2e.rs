//! Full reconciliation cycle against a mock origin.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::broadcast;

use domain_manager::config::{ControlConfig, HaproxyConfig};
use domain_manager::context::{PublishedAddress, ReplicaContext};
use domain_manager::discovery::NodeDiscovery;
use domain_manager::dns::{DnsReconciler, InMemoryProvider, StaticResolver};
use domain_manager::domains::DomainMapper;
use domain_manager::haproxy::{ConfigSynthesizer, OverrideTable, Reloader};
use domain_manager::health::{HealthEngine, ProbeClient, ProbeContext, ProbeRegistry};
use domain_manager::pipeline::{Pipeline, ReloadStatus};
use domain_manager::sharding::Sharder;
use domain_manager::specs::cache::{FeedKind, FeedLoop};
use domain_manager::specs::{FeedClient, SpecCache};

mod common;

async fn start_origin(with_locations: bool) -> SocketAddr {
    let mut router = Router::new().route(
        "/apps/globalappsspecifications",
        get(|| async { Json(common::success(json!([common::demo_spec()]))) }),
    );
    if with_locations {
        router = router.route(
            "/apps/locations",
            get(|| async {
                Json(common::success(json!([
                    { "name": "demo", "ip": "1.2.3.4:16127" },
                    { "name": "demo", "ip": "not-an-ip" },
                    { "name": "other", "ip": "5.6.7.8" }
                ])))
            }),
        );
    }
    common::serve(router).await
}

struct Harness {
    pipeline: Arc<Pipeline>,
    provider: Arc<InMemoryProvider>,
    live: std::path::PathBuf,
}

async fn harness(origin: SocketAddr, dir: &Path, validate: &str) -> Harness {
    let config: ControlConfig = common::test_config(origin);
    let client = FeedClient::new(common::base_url(origin), Duration::from_secs(2));

    let cache = Arc::new(SpecCache::new(None));
    let mut feed = FeedLoop::new(
        cache.clone(),
        client.clone(),
        FeedKind::Specs,
        config.feed.specs_path.clone(),
        &config.feed,
    );
    feed.poll_once().await;

    let replica = Arc::new(ReplicaContext::default());
    replica.set_published(PublishedAddress::Ip(Ipv4Addr::new(9, 9, 9, 9)));

    let health = HealthEngine::new(
        ProbeRegistry::with_defaults(),
        ProbeContext {
            client: ProbeClient::new().unwrap(),
            config: config.health.clone(),
            replica: replica.clone(),
        },
    );

    let provider = Arc::new(InMemoryProvider::new());
    let dns = DnsReconciler::new(
        Some(provider.clone()),
        None,
        Arc::new(StaticResolver::new()),
        replica,
        &config.domains.managed_suffix(),
    )
    .with_settle(Duration::ZERO);

    let haproxy = HaproxyConfig {
        config_path: dir.join("haproxy.cfg").display().to_string(),
        staging_path: dir.join("staging.cfg").display().to_string(),
        validate_command: vec![validate.to_string()],
        reload_command: vec!["true".to_string()],
        ..Default::default()
    };
    let live = dir.join("haproxy.cfg");

    let pipeline = Arc::new(Pipeline::new(
        cache,
        Sharder::new(&config.sharding),
        NodeDiscovery::new(client, config.discovery.locations_path.clone()),
        health,
        ConfigSynthesizer::new(
            DomainMapper::new(&config.domains),
            OverrideTable::new(&[]),
            haproxy.cert_dir.clone(),
        ),
        Some(dns),
        Reloader::new(&haproxy),
    ));

    Harness { pipeline, provider, live }
}

#[tokio::test]
async fn test_demo_application_end_to_end() {
    let origin = start_origin(true).await;
    let dir = tempfile::tempdir().unwrap();
    let h = harness(origin, dir.path(), "true").await;

    let report = h.pipeline.run_cycle().await;

    assert_eq!(
        report.domains,
        vec!["demo_8080.sub.example.com".to_string(), "demo.sub.example.com".to_string()]
    );
    assert_eq!(report.apps_located, 1);
    assert_eq!(report.apps_healthy, 1);
    assert_eq!(report.reload, ReloadStatus::Reloaded);

    let text = tokio::fs::read_to_string(&h.live).await.unwrap();
    assert!(text.contains("server 1_2_3_4_8080 1.2.3.4:8080 check"));
    assert!(text.contains("hdr(host) -i demo.sub.example.com"));

    let mut records: Vec<(String, String)> = h
        .provider
        .records()
        .into_iter()
        .map(|r| (r.name, r.content))
        .collect();
    records.sort();
    assert_eq!(
        records,
        vec![
            ("demo.sub.example.com".to_string(), "9.9.9.9".to_string()),
            ("demo_8080.sub.example.com".to_string(), "9.9.9.9".to_string()),
        ]
    );

    let again = h.pipeline.run_cycle().await;
    assert_eq!(again.reload, ReloadStatus::Unchanged);
    assert_eq!(again.dns.as_ref().map(|d| d.adjusted), Some(0));
}

#[tokio::test]
async fn test_rejected_configuration_keeps_previous() {
    let origin = start_origin(true).await;
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("haproxy.cfg"), "previous\n").await.unwrap();
    let h = harness(origin, dir.path(), "false").await;

    let report = h.pipeline.run_cycle().await;

    assert!(matches!(report.reload, ReloadStatus::Failed(_)));
    assert!(!report.succeeded());
    assert_eq!(tokio::fs::read_to_string(&h.live).await.unwrap(), "previous\n");
}

#[tokio::test]
async fn test_location_outage_leaves_configuration_alone() {
    let origin = start_origin(false).await;
    let dir = tempfile::tempdir().unwrap();
    let h = harness(origin, dir.path(), "true").await;

    let report = h.pipeline.run_cycle().await;

    assert!(matches!(report.reload, ReloadStatus::Skipped(_)));
    assert!(!h.live.exists());
    assert!(h.provider.records().is_empty());
}

#[tokio::test]
async fn test_reconciliation_loop_runs_as_spawned_task() {
    let origin = start_origin(true).await;
    let dir = tempfile::tempdir().unwrap();
    let h = harness(origin, dir.path(), "true").await;
    let (shutdown, _) = broadcast::channel(1);

    let task = tokio::spawn(
        h.pipeline
            .clone()
            .run(Duration::from_secs(3600), shutdown.subscribe()),
    );

    let mut report = None;
    for _ in 0..250 {
        report = h.pipeline.last_report();
        if report.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let report = report.expect("first cycle never completed");
    assert_eq!(report.reload, ReloadStatus::Reloaded);

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop ignored shutdown")
        .unwrap();
}
