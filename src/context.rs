//! Replica-wide state with a defined refresh lifecycle.
//!
//! # Responsibilities
//! - Hold the address this replica publishes in DNS
//! - Hold the reference chain height used by node probes
//! - Run the background tasks that own the single writer role for both
//!
//! # Design Decisions
//! - Readers get lock-free snapshots (arc-swap, atomics)
//! - A failed refresh keeps the previous value

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{DnsConfig, HealthConfig};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by a background refresh. The previous value is kept.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error("not an IPv4 address: {0}")]
    NotIpv4(String),
}

/// The value DNS records of this replica should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedAddress {
    /// A record content.
    Ip(Ipv4Addr),
    /// CNAME target.
    Name(String),
}

impl PublishedAddress {
    /// Interpret configured text: IPv4 literal or hostname.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<Ipv4Addr>() {
            Ok(ip) => PublishedAddress::Ip(ip),
            Err(_) => PublishedAddress::Name(normalize_name(raw)),
        }
    }

    /// DNS record type to publish.
    pub fn record_type(&self) -> &'static str {
        match self {
            PublishedAddress::Ip(_) => "A",
            PublishedAddress::Name(_) => "CNAME",
        }
    }

    /// Normalized record content.
    pub fn content(&self) -> String {
        match self {
            PublishedAddress::Ip(ip) => ip.to_string(),
            PublishedAddress::Name(name) => name.clone(),
        }
    }
}

/// Lowercase, without the trailing root dot.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_lowercase()
}

/// Whether `domain` is a proper subdomain of `suffix`, on a label boundary:
/// `a.sub.example.com` is under `sub.example.com`, `mysub.example.com` is not.
pub fn is_subdomain_of(domain: &str, suffix: &str) -> bool {
    let domain = normalize_name(domain);
    let suffix = normalize_name(suffix);
    domain
        .strip_suffix(suffix.as_str())
        .and_then(|head| head.strip_suffix('.'))
        .is_some_and(|label| !label.is_empty())
}

/// Reference chain height tracked from a trusted explorer (0 = unknown).
#[derive(Debug, Default)]
pub struct ReferenceHeight(AtomicU64);

impl ReferenceHeight {
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            h => Some(h),
        }
    }

    pub fn set(&self, height: u64) {
        self.0.store(height, Ordering::Relaxed);
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerStatus {
    info: ExplorerInfo,
}

#[derive(Debug, Deserialize)]
struct ExplorerInfo {
    blocks: u64,
}

/// Shared replica state.
#[derive(Debug, Default)]
pub struct ReplicaContext {
    published: ArcSwapOption<PublishedAddress>,
    reference_height: ReferenceHeight,
}

impl ReplicaContext {
    /// Context seeded from configuration; a configured address is final.
    pub fn from_config(dns: &DnsConfig) -> Self {
        let context = Self::default();
        if let Some(raw) = &dns.published_address {
            context.set_published(PublishedAddress::parse(raw));
        }
        context
    }

    pub fn published(&self) -> Option<Arc<PublishedAddress>> {
        self.published.load_full()
    }

    pub fn set_published(&self, address: PublishedAddress) {
        self.published.store(Some(Arc::new(address)));
    }

    pub fn reference_height(&self) -> &ReferenceHeight {
        &self.reference_height
    }

    /// Spawn the refresh tasks this configuration needs.
    pub fn spawn_refreshers(
        self: &Arc<Self>,
        dns: &DnsConfig,
        health: &HealthConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let client = Client::new();
        let mut handles = Vec::new();

        if dns.published_address.is_none() {
            let ctx = self.clone();
            let client = client.clone();
            let url = dns.public_ip_url.clone();
            handles.push(tokio::spawn(refresh_loop(
                "public_ip",
                Duration::from_secs(dns.public_ip_refresh_secs),
                shutdown.subscribe(),
                move || {
                    let (ctx, client, url) = (ctx.clone(), client.clone(), url.clone());
                    async move {
                        let ip = fetch_public_ip(&client, &url).await?;
                        ctx.set_published(PublishedAddress::Ip(ip));
                        Ok(ip.to_string())
                    }
                },
            )));
        }

        let ctx = self.clone();
        let url = health.reference_explorer_url.clone();
        handles.push(tokio::spawn(refresh_loop(
            "reference_height",
            Duration::from_secs(health.reference_refresh_secs),
            shutdown.subscribe(),
            move || {
                let (ctx, client, url) = (ctx.clone(), client.clone(), url.clone());
                async move {
                    let height = fetch_reference_height(&client, &url).await?;
                    ctx.reference_height.set(height);
                    Ok(height.to_string())
                }
            },
        )));

        handles
    }
}

async fn fetch_public_ip(client: &Client, url: &str) -> Result<Ipv4Addr, RefreshError> {
    let request = client.get(url).timeout(REFRESH_TIMEOUT).send();
    let response = with_deadline(REFRESH_TIMEOUT, request).await??.error_for_status()?;
    let text = response.text().await?;
    let text = text.trim();
    text.parse()
        .map_err(|_| RefreshError::NotIpv4(text.to_string()))
}

async fn fetch_reference_height(client: &Client, base: &str) -> Result<u64, RefreshError> {
    let url = format!("{}/api/status?q=getInfo", base.trim_end_matches('/'));
    let request = client.get(url).timeout(REFRESH_TIMEOUT).send();
    let response = with_deadline(REFRESH_TIMEOUT, request).await??.error_for_status()?;
    let status: ExplorerStatus = response.json().await?;
    Ok(status.info.blocks)
}

/// Refresh immediately, then every `interval`; failures retry with backoff.
async fn refresh_loop<F, Fut>(
    label: &'static str,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    refresh: F,
) where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, RefreshError>>,
{
    let mut failures = 0u32;
    loop {
        let delay = match refresh().await {
            Ok(value) => {
                tracing::debug!(task = label, value = %value, "Refreshed");
                failures = 0;
                interval
            }
            Err(e) => {
                failures += 1;
                let delay = calculate_backoff(failures, 1_000, interval.as_millis() as u64);
                tracing::warn!(task = label, error = %e, retry_in = ?delay, "Refresh failed");
                delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_address_parse() {
        let ip = PublishedAddress::parse("1.2.3.4");
        assert_eq!(ip.record_type(), "A");
        assert_eq!(ip.content(), "1.2.3.4");

        let name = PublishedAddress::parse("LB1.Example.com.");
        assert_eq!(name.record_type(), "CNAME");
        assert_eq!(name.content(), "lb1.example.com");
    }

    async fn serve_text(body: &'static str) -> String {
        let router = axum::Router::new().route("/", axum::routing::get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_public_ip_refresh_errors_are_typed() {
        let client = Client::new();

        let url = serve_text(" 203.0.113.7\n").await;
        assert_eq!(fetch_public_ip(&client, &url).await.unwrap(), Ipv4Addr::new(203, 0, 113, 7));

        let url = serve_text("<html>blocked</html>").await;
        assert!(matches!(
            fetch_public_ip(&client, &url).await,
            Err(RefreshError::NotIpv4(text)) if text == "<html>blocked</html>"
        ));

        assert!(matches!(
            fetch_public_ip(&client, "http://127.0.0.1:1/").await,
            Err(RefreshError::Http(_))
        ));
    }

    #[test]
    fn test_is_subdomain_of() {
        assert!(is_subdomain_of("a.sub.example.com", "sub.example.com"));
        assert!(is_subdomain_of("App.Sub.Example.com.", "sub.example.com"));
        assert!(!is_subdomain_of("mysub.example.com", "sub.example.com"));
        assert!(!is_subdomain_of("sub.example.com", "sub.example.com"));
        assert!(!is_subdomain_of(".sub.example.com", "sub.example.com"));
    }

    #[test]
    fn test_reference_height_unknown_until_set() {
        let ctx = ReplicaContext::default();
        assert_eq!(ctx.reference_height().get(), None);
        ctx.reference_height().set(1_600_000);
        assert_eq!(ctx.reference_height().get(), Some(1_600_000));
    }

    #[test]
    fn test_configured_address_is_used() {
        let dns = DnsConfig {
            published_address: Some("9.9.9.9".into()),
            ..Default::default()
        };
        let ctx = ReplicaContext::from_config(&dns);
        assert_eq!(
            ctx.published().as_deref(),
            Some(&PublishedAddress::Ip(Ipv4Addr::new(9, 9, 9, 9)))
        );
    }
}
