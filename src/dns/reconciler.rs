//! Per-domain DNS and certificate convergence.
//!
//! # Data Flow
//! ```text
//! domain (sequential, one at a time)
//!     → excluded?            → skip
//!     → managed?             → list records
//!                            → delete wrong-content or proxied records
//!                            → keep first correct record, delete the rest
//!                            → create one if none is left
//!     → adjusted?            → settle delay
//!     → certificates on?     → name ≤ 64 chars
//!                            → artifact missing? resolve, then issue
//!                            → ensure renewal hook line
//! ```
//!
//! # Design Decisions
//! - Which correct record survives depends on provider listing order
//! - Domains outside the managed subdomain never get records, only
//!   certificates
//! - A failure on one domain is logged and the batch continues

use std::sync::Arc;
use std::time::Duration;

use super::certs::CertificateManager;
use super::provider::{DnsError, DnsProvider, DomainRecord, NewRecord};
use super::resolver::DomainResolver;
use crate::context::{is_subdomain_of, normalize_name, PublishedAddress, ReplicaContext};
use crate::observability::metrics;

/// Longest domain a certificate can be requested for.
pub const MAX_CERT_DOMAIN_LEN: usize = 64;

/// Outcome for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainOutcome {
    pub created: usize,
    pub deleted: usize,
    pub certificate_issued: bool,
}

impl DomainOutcome {
    pub fn adjusted(&self) -> bool {
        self.created + self.deleted > 0
    }
}

/// Totals for one pass over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    pub domains: usize,
    pub adjusted: usize,
    pub created: usize,
    pub deleted: usize,
    pub certificates_issued: usize,
    pub failures: usize,
    pub skipped: usize,
}

/// Converges provider records and certificates for a batch of domains.
pub struct DnsReconciler {
    provider: Option<Arc<dyn DnsProvider>>,
    certificates: Option<Arc<dyn CertificateManager>>,
    resolver: Arc<dyn DomainResolver>,
    context: Arc<ReplicaContext>,
    managed_suffix: String,
    excluded: Vec<String>,
    settle: Duration,
}

impl DnsReconciler {
    pub fn new(
        provider: Option<Arc<dyn DnsProvider>>,
        certificates: Option<Arc<dyn CertificateManager>>,
        resolver: Arc<dyn DomainResolver>,
        context: Arc<ReplicaContext>,
        managed_suffix: &str,
    ) -> Self {
        Self {
            provider,
            certificates,
            resolver,
            context,
            managed_suffix: normalize_name(managed_suffix),
            excluded: Vec::new(),
            settle: Duration::from_secs(1),
        }
    }

    pub fn with_excluded(mut self, excluded: &[String]) -> Self {
        self.excluded = excluded.iter().map(|d| normalize_name(d)).collect();
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Whether `domain` lies inside the managed subdomain.
    pub fn is_managed(&self, domain: &str) -> bool {
        is_subdomain_of(domain, &self.managed_suffix)
    }

    /// Process every domain in order. Never fails as a whole.
    pub async fn reconcile_all(&self, domains: &[String]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let Some(published) = self.context.published() else {
            tracing::warn!(domains = domains.len(), "Published address unknown, skipping DNS pass");
            summary.skipped = domains.len();
            return summary;
        };

        for domain in domains {
            let domain = normalize_name(domain);
            if self.excluded.contains(&domain) {
                tracing::debug!(%domain, "Domain excluded");
                summary.skipped += 1;
                continue;
            }
            summary.domains += 1;
            match self.reconcile_domain(&domain, &published).await {
                Ok(outcome) => {
                    summary.created += outcome.created;
                    summary.deleted += outcome.deleted;
                    if outcome.adjusted() {
                        summary.adjusted += 1;
                    }
                    if outcome.certificate_issued {
                        summary.certificates_issued += 1;
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(%domain, error = %e, "Domain reconciliation failed");
                }
            }
        }

        tracing::info!(
            domains = summary.domains,
            adjusted = summary.adjusted,
            created = summary.created,
            deleted = summary.deleted,
            certificates = summary.certificates_issued,
            failures = summary.failures,
            "DNS pass complete"
        );
        summary
    }

    /// Records first, then the certificate.
    pub async fn reconcile_domain(
        &self,
        domain: &str,
        published: &PublishedAddress,
    ) -> Result<DomainOutcome, DnsError> {
        let mut outcome = DomainOutcome::default();

        if let Some(provider) = &self.provider {
            if self.is_managed(domain) {
                let (created, deleted) = self.converge_records(provider.as_ref(), domain, published).await?;
                outcome.created = created;
                outcome.deleted = deleted;
            }
        }

        if outcome.adjusted() && !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        if let Some(certificates) = &self.certificates {
            outcome.certificate_issued = self.ensure_certificate(certificates.as_ref(), domain, published).await;
        }
        Ok(outcome)
    }

    /// Make the provider hold exactly one correct, unproxied record.
    /// Returns `(created, deleted)`.
    pub async fn converge_records(
        &self,
        provider: &dyn DnsProvider,
        domain: &str,
        published: &PublishedAddress,
    ) -> Result<(usize, usize), DnsError> {
        let records = provider.list_records(domain).await?;
        let wanted = published.content();

        let (correct, stale): (Vec<DomainRecord>, Vec<DomainRecord>) = records
            .into_iter()
            .partition(|r| !r.proxied && normalize_name(&r.content) == wanted);

        let mut deleted = 0;
        for record in stale.iter().chain(correct.iter().skip(1)) {
            self.guard(&record.name)?;
            provider.delete_record(record).await?;
            metrics::record_dns_change("delete");
            tracing::info!(domain, id = %record.id, content = %record.content, proxied = record.proxied, "Deleted DNS record");
            deleted += 1;
        }

        let mut created = 0;
        if correct.is_empty() {
            self.guard(domain)?;
            let record = NewRecord {
                name: domain.to_string(),
                record_type: published.record_type().to_string(),
                content: wanted,
                proxied: false,
            };
            provider.create_record(&record).await?;
            metrics::record_dns_change("create");
            tracing::info!(domain, content = %record.content, kind = %record.record_type, "Created DNS record");
            created = 1;
        }

        Ok((created, deleted))
    }

    /// Returns whether a certificate was issued. Failures are logged only.
    async fn ensure_certificate(
        &self,
        certificates: &dyn CertificateManager,
        domain: &str,
        published: &PublishedAddress,
    ) -> bool {
        if domain.len() > MAX_CERT_DOMAIN_LEN {
            tracing::debug!(domain, "Domain too long for a certificate");
            return false;
        }

        let mut issued = false;
        if !certificates.certificate_exists(domain).await {
            let resolution = self.resolver.resolve(domain).await;
            if !resolution.points_to(published) {
                tracing::debug!(domain, ?resolution, "Domain does not resolve here yet");
                return false;
            }
            match certificates.issue_certificate(domain).await {
                Ok(()) => {
                    metrics::record_certificate("issued");
                    issued = true;
                }
                Err(e) => {
                    metrics::record_certificate("failed");
                    tracing::warn!(domain, error = %e, "Certificate issuance failed");
                    return false;
                }
            }
        }

        if let Err(e) = certificates.install_renewal_hook(domain).await {
            tracing::warn!(domain, error = %e, "Renewal hook update failed");
        }
        issued
    }

    fn guard(&self, name: &str) -> Result<(), DnsError> {
        if self.is_managed(name) {
            Ok(())
        } else {
            Err(DnsError::OutsideManagedZone(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::dns::certs::CertError;
    use crate::dns::provider::InMemoryProvider;
    use crate::dns::resolver::StaticResolver;

    const DOMAIN: &str = "demo_8080.sub.example.com";

    #[derive(Default)]
    struct RecordingCerts {
        existing: Mutex<Vec<String>>,
        hooks: Mutex<Vec<String>>,
        checked_at: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl CertificateManager for RecordingCerts {
        async fn certificate_exists(&self, domain: &str) -> bool {
            self.checked_at.lock().unwrap().push(tokio::time::Instant::now());
            self.existing.lock().unwrap().iter().any(|d| d == domain)
        }

        async fn issue_certificate(&self, domain: &str) -> Result<(), CertError> {
            self.existing.lock().unwrap().push(domain.to_string());
            Ok(())
        }

        async fn install_renewal_hook(&self, domain: &str) -> Result<(), CertError> {
            self.hooks.lock().unwrap().push(domain.to_string());
            Ok(())
        }
    }

    fn context(ip: [u8; 4]) -> Arc<ReplicaContext> {
        let ctx = ReplicaContext::default();
        ctx.set_published(PublishedAddress::Ip(Ipv4Addr::from(ip)));
        Arc::new(ctx)
    }

    fn reconciler(
        provider: Arc<InMemoryProvider>,
        certs: Option<Arc<RecordingCerts>>,
        resolver: StaticResolver,
    ) -> DnsReconciler {
        DnsReconciler::new(
            Some(provider),
            certs.map(|c| c as Arc<dyn CertificateManager>),
            Arc::new(resolver),
            context([1, 2, 3, 4]),
            "sub.example.com",
        )
        .with_settle(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_converges_to_single_correct_record() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.insert(DOMAIN, "A", "9.9.9.9", false);
        provider.insert(DOMAIN, "A", "8.8.8.8", false);
        provider.insert(DOMAIN, "A", "1.2.3.4", true);

        let dns = reconciler(provider.clone(), None, StaticResolver::new());
        let summary = dns.reconcile_all(&[DOMAIN.to_string()]).await;

        let records = provider.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "1.2.3.4");
        assert!(!records[0].proxied);
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.created, 1);

        let again = dns.reconcile_all(&[DOMAIN.to_string()]).await;
        assert_eq!(again.adjusted, 0);
    }

    #[tokio::test]
    async fn test_duplicates_keep_first_listed() {
        let provider = Arc::new(InMemoryProvider::new());
        let first = provider.insert(DOMAIN, "A", "1.2.3.4", false);
        provider.insert(DOMAIN, "A", "1.2.3.4", false);

        let dns = reconciler(provider.clone(), None, StaticResolver::new());
        dns.reconcile_all(&[DOMAIN.to_string()]).await;

        let records = provider.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, first);
    }

    #[tokio::test]
    async fn test_unmanaged_and_excluded_domains_get_no_records() {
        let provider = Arc::new(InMemoryProvider::new());
        let dns = reconciler(provider.clone(), None, StaticResolver::new())
            .with_excluded(&["bad_1.sub.example.com".to_string()]);

        let summary = dns
            .reconcile_all(&["shop.io".to_string(), "bad_1.sub.example.com".to_string()])
            .await;

        assert!(provider.records().is_empty());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.domains, 1);
    }

    #[tokio::test]
    async fn test_guard_rejects_outside_zone() {
        let provider = InMemoryProvider::new();
        let dns = reconciler(Arc::new(InMemoryProvider::new()), None, StaticResolver::new());
        let published = PublishedAddress::Ip(Ipv4Addr::new(1, 2, 3, 4));

        let result = dns.converge_records(&provider, "example.com", &published).await;
        assert!(matches!(result, Err(DnsError::OutsideManagedZone(_))));
        assert!(!dns.is_managed("evilsub.example.com"));
        assert!(dns.is_managed("App.Sub.Example.com."));
    }

    #[tokio::test]
    async fn test_certificate_issued_only_when_resolving_here() {
        let provider = Arc::new(InMemoryProvider::new());
        let certs = Arc::new(RecordingCerts::default());
        let resolver = StaticResolver::new().with_address("shop.io", Ipv4Addr::new(1, 2, 3, 4));
        let dns = reconciler(provider, Some(certs.clone()), resolver);

        let long = format!("{}.io", "a".repeat(70));
        dns.reconcile_all(&["shop.io".into(), "elsewhere.io".into(), long]).await;

        assert_eq!(*certs.existing.lock().unwrap(), vec!["shop.io".to_string()]);
        assert_eq!(*certs.hooks.lock().unwrap(), vec!["shop.io".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_address_skips_pass() {
        let provider = Arc::new(InMemoryProvider::new());
        let dns = DnsReconciler::new(
            Some(provider.clone()),
            None,
            Arc::new(StaticResolver::new()),
            Arc::new(ReplicaContext::default()),
            "sub.example.com",
        );
        let summary = dns.reconcile_all(&[DOMAIN.to_string()]).await;
        assert_eq!(summary.skipped, 1);
        assert!(provider.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_certificate_work_waits_for_settle_only_after_changes() {
        let provider = Arc::new(InMemoryProvider::new());
        let certs = Arc::new(RecordingCerts::default());
        let settle = Duration::from_secs(1);
        let dns = reconciler(provider.clone(), Some(certs.clone()), StaticResolver::new())
            .with_settle(settle);

        let started = tokio::time::Instant::now();
        let summary = dns.reconcile_all(&[DOMAIN.to_string()]).await;
        assert_eq!(summary.created, 1);
        let first = certs.checked_at.lock().unwrap()[0];
        assert!(first - started >= settle);

        let resumed = tokio::time::Instant::now();
        let again = dns.reconcile_all(&[DOMAIN.to_string()]).await;
        assert_eq!(again.adjusted, 0);
        let second = certs.checked_at.lock().unwrap()[1];
        assert!(second - resumed < Duration::from_millis(1));
    }
}
