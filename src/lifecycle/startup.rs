//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every component from configuration, in dependency order
//! - Spawn the feed loops, refreshers and the reconciliation loop
//!
//! # Design Decisions
//! - Fail fast: any construction error is fatal
//! - Nothing is spawned until every component is built

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::shutdown::Shutdown;
use crate::config::{ControlConfig, DnsProviderKind};
use crate::context::ReplicaContext;
use crate::discovery::NodeDiscovery;
use crate::dns::{
    CertificateManager, CloudflareProvider, CommandCertificateManager, DnsProvider, DnsReconciler,
    HickoryResolver,
};
use crate::domains::DomainMapper;
use crate::haproxy::{ConfigSynthesizer, OverrideTable, Reloader};
use crate::health::{HealthEngine, ProbeClient, ProbeContext, ProbeRegistry};
use crate::pipeline::Pipeline;
use crate::sharding::Sharder;
use crate::specs::enterprise::{EnterpriseDecryptor, EnterpriseError};
use crate::specs::{FeedClient, SpecCache};

/// Errors that prevent the control plane from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("enterprise decryption setup failed: {0}")]
    Enterprise(#[from] EnterpriseError),

    #[error("probe client setup failed: {0}")]
    ProbeClient(#[from] reqwest::Error),

    #[error("resolver setup failed: {0}")]
    Resolver(#[from] hickory_resolver::error::ResolveError),
}

/// Handles to everything that was started.
pub struct Running {
    pub cache: Arc<SpecCache>,
    pub context: Arc<ReplicaContext>,
    pub pipeline: Arc<Pipeline>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// The DNS/certificate stage, or `None` when both are disabled.
pub fn build_dns(
    config: &ControlConfig,
    context: Arc<ReplicaContext>,
) -> Result<Option<DnsReconciler>, StartupError> {
    let provider: Option<Arc<dyn DnsProvider>> = match (config.dns.enabled, config.dns.provider) {
        (true, DnsProviderKind::Cloudflare) => Some(Arc::new(CloudflareProvider::new(&config.dns))),
        _ => None,
    };
    let certificates: Option<Arc<dyn CertificateManager>> = config
        .certs
        .enabled
        .then(|| Arc::new(CommandCertificateManager::new(&config.certs)) as Arc<dyn CertificateManager>);

    if provider.is_none() && certificates.is_none() {
        return Ok(None);
    }

    let resolver = Arc::new(HickoryResolver::new(config.certs.resolver)?);
    let reconciler = DnsReconciler::new(
        provider,
        certificates,
        resolver,
        context,
        &config.domains.managed_suffix(),
    )
    .with_excluded(&config.dns.excluded_domains)
    .with_settle(Duration::from_millis(config.cycle.dns_settle_ms));
    Ok(Some(reconciler))
}

/// Build all components and spawn the long-running tasks.
pub fn start(config: &ControlConfig, shutdown: &Shutdown) -> Result<Running, StartupError> {
    let feed_client = FeedClient::new(
        config.feed.api_base_url.clone(),
        Duration::from_millis(config.feed.request_timeout_ms),
    );

    let decryptor = if config.enterprise.enabled {
        Some(EnterpriseDecryptor::new(config.enterprise.clone(), feed_client.clone())?)
    } else {
        None
    };
    let cache = Arc::new(SpecCache::new(decryptor));
    let context = Arc::new(ReplicaContext::from_config(&config.dns));

    let probe_ctx = ProbeContext {
        client: ProbeClient::new()?,
        config: config.health.clone(),
        replica: context.clone(),
    };
    let health = HealthEngine::new(ProbeRegistry::with_defaults(), probe_ctx);

    let synthesizer = ConfigSynthesizer::new(
        DomainMapper::new(&config.domains),
        OverrideTable::new(&config.haproxy.overrides),
        config.haproxy.cert_dir.clone(),
    );

    let pipeline = Arc::new(Pipeline::new(
        cache.clone(),
        Sharder::new(&config.sharding),
        NodeDiscovery::new(feed_client.clone(), config.discovery.locations_path.clone()),
        health,
        synthesizer,
        build_dns(config, context.clone())?,
        Reloader::new(&config.haproxy),
    ));

    let mut tasks = cache.spawn_feeds(feed_client, config.feed.clone(), shutdown.sender());
    tasks.extend(context.spawn_refreshers(&config.dns, &config.health, shutdown.sender()));
    tasks.push(tokio::spawn(pipeline.clone().run(
        Duration::from_secs(config.cycle.interval_secs),
        shutdown.subscribe(),
    )));

    tracing::info!(
        tasks = tasks.len(),
        bucket = config.sharding.bucket,
        total_buckets = config.sharding.total_buckets,
        suffix = %config.domains.managed_suffix(),
        "Control plane started"
    );

    Ok(Running {
        cache,
        context,
        pipeline,
        tasks,
    })
}
