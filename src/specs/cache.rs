//! The specification cache and its feed loops.
//!
//! # Responsibilities
//! - Run one self-rescheduling loop per feed endpoint
//! - Skip body downloads while the origin's `ETag` is unchanged
//! - Republish only when the payload digest changed
//! - Re-ingest a payload whose enterprise specifications could not all be
//!   decrypted, so a transient oracle failure drops an app for one poll only
//! - Publish immutable snapshots and notify subscribers

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::FeedConfig;
use crate::observability::metrics;
use crate::resilience::backoff::remaining_max_age;
use crate::specs::enterprise::EnterpriseDecryptor;
use crate::specs::feed::{content_digest, CacheEntry, FeedClient, FeedError};
use crate::specs::types::{ApplicationSpec, Envelope, PermanentMessage, SpecMap};

/// Notifications emitted when a feed's content actually changed.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    SpecsUpdated(Arc<SpecMap>),
    MessagesUpdated(Arc<Vec<PermanentMessage>>),
}

/// Which feed a loop serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Specs,
    Messages,
}

impl FeedKind {
    pub fn label(self) -> &'static str {
        match self {
            FeedKind::Specs => "specs",
            FeedKind::Messages => "messages",
        }
    }
}

/// Single writer, many readers: snapshots are replaced, never mutated.
pub struct SpecCache {
    specs: ArcSwap<SpecMap>,
    messages: ArcSwap<Vec<PermanentMessage>>,
    events: broadcast::Sender<CacheEvent>,
    decryptor: Option<EnterpriseDecryptor>,
}

impl SpecCache {
    pub fn new(decryptor: Option<EnterpriseDecryptor>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            specs: ArcSwap::from_pointee(SpecMap::new()),
            messages: ArcSwap::from_pointee(Vec::new()),
            events,
            decryptor,
        }
    }

    /// Current specification snapshot.
    pub fn get_global_specs(&self) -> Arc<SpecMap> {
        self.specs.load_full()
    }

    /// Current permanent message snapshot.
    pub fn get_permanent_messages(&self) -> Arc<Vec<PermanentMessage>> {
        self.messages.load_full()
    }

    /// Subscribe to update notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Build and publish a new specification snapshot.
    ///
    /// Enterprise specifications are decrypted; those that cannot be are
    /// dropped from this snapshot only.
    pub async fn ingest_specs(&self, raw: Vec<ApplicationSpec>) -> Arc<SpecMap> {
        self.ingest(raw).await.0
    }

    /// Like `ingest_specs`, also returning how many enterprise specifications
    /// failed to decrypt.
    async fn ingest(&self, raw: Vec<ApplicationSpec>) -> (Arc<SpecMap>, usize) {
        let (plain, enterprise): (Vec<_>, Vec<_>) =
            raw.into_iter().partition(|spec| !spec.is_enterprise());

        let mut map: SpecMap = plain.into_iter().map(|s| (s.name.clone(), s)).collect();
        let mut failed = 0;

        if !enterprise.is_empty() {
            match &self.decryptor {
                Some(decryptor) => {
                    let results = join_all(enterprise.iter().map(|s| decryptor.decrypt(s))).await;
                    for (spec, result) in enterprise.iter().zip(results) {
                        match result {
                            Ok(decrypted) => {
                                map.insert(spec.name.clone(), (*decrypted).clone());
                            }
                            Err(e) => {
                                failed += 1;
                                tracing::warn!(app = %spec.name, error = %e, "Dropping enterprise spec");
                            }
                        }
                    }
                }
                None => {
                    tracing::debug!(count = enterprise.len(), "Enterprise decryption disabled, skipping specs");
                }
            }
        }

        let snapshot = Arc::new(map);
        self.specs.store(snapshot.clone());
        metrics::record_specs_tracked(snapshot.len());
        let _ = self.events.send(CacheEvent::SpecsUpdated(snapshot.clone()));
        tracing::info!(apps = snapshot.len(), undecrypted = failed, "Specification snapshot updated");
        (snapshot, failed)
    }

    /// Publish a new permanent message snapshot.
    pub fn ingest_messages(&self, messages: Vec<PermanentMessage>) -> Arc<Vec<PermanentMessage>> {
        let snapshot = Arc::new(messages);
        self.messages.store(snapshot.clone());
        let _ = self.events.send(CacheEvent::MessagesUpdated(snapshot.clone()));
        tracing::info!(messages = snapshot.len(), "Permanent message snapshot updated");
        snapshot
    }

    /// Parse a feed payload and publish it. Returns the number of
    /// specifications that could not be decrypted.
    async fn apply_payload(&self, kind: FeedKind, body: &[u8]) -> Result<usize, FeedError> {
        match kind {
            FeedKind::Specs => {
                let envelope: Envelope<Vec<ApplicationSpec>> = serde_json::from_slice(body)?;
                if !envelope.is_success() {
                    return Err(FeedError::Envelope(envelope.status));
                }
                let (_, failed) = self.ingest(envelope.data).await;
                return Ok(failed);
            }
            FeedKind::Messages => {
                let envelope: Envelope<Vec<PermanentMessage>> = serde_json::from_slice(body)?;
                if !envelope.is_success() {
                    return Err(FeedError::Envelope(envelope.status));
                }
                self.ingest_messages(envelope.data);
            }
        }
        Ok(0)
    }

    /// Spawn both feed loops. They never wait on each other.
    pub fn spawn_feeds(
        self: &Arc<Self>,
        client: FeedClient,
        config: FeedConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        [
            (FeedKind::Specs, config.specs_path.clone()),
            (FeedKind::Messages, config.messages_path.clone()),
        ]
        .into_iter()
        .map(|(kind, path)| {
            let feed = FeedLoop::new(self.clone(), client.clone(), kind, path, &config);
            let shutdown = shutdown.subscribe();
            tokio::spawn(feed.run(shutdown))
        })
        .collect()
    }
}

/// One feed endpoint's self-rescheduling fetch loop.
pub struct FeedLoop {
    cache: Arc<SpecCache>,
    client: FeedClient,
    kind: FeedKind,
    path: String,
    entry: CacheEntry,
    stale_retry: Duration,
    fallback: Duration,
}

impl FeedLoop {
    pub fn new(
        cache: Arc<SpecCache>,
        client: FeedClient,
        kind: FeedKind,
        path: String,
        config: &FeedConfig,
    ) -> Self {
        Self {
            cache,
            client,
            kind,
            path,
            entry: CacheEntry::default(),
            stale_retry: Duration::from_secs(config.stale_retry_secs),
            fallback: Duration::from_secs(config.fallback_interval_secs),
        }
    }

    /// Cache state of this endpoint.
    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    /// Loop until shutdown. The next poll is scheduled only after the
    /// current one completes, so polls never overlap.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(feed = self.kind.label(), path = %self.path, "Feed loop starting");
        loop {
            let delay = self.poll_once().await;
            tracing::debug!(feed = self.kind.label(), delay = ?delay, "Next feed poll scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!(feed = self.kind.label(), "Feed loop received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one fetch cycle and return the delay before the next one.
    pub async fn poll_once(&mut self) -> Duration {
        let started = Instant::now();
        let label = self.kind.label();

        let response = match self
            .client
            .head_or_get(&self.path, self.entry.etag.as_deref())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                metrics::record_feed_fetch(label, "error");
                return self.failure_delay(&e);
            }
        };

        let Some(body) = response.payload else {
            // ETag unchanged: nothing to download.
            metrics::record_feed_fetch(label, "not_modified");
            self.entry.max_age = response.max_age;
            self.entry.fetched_at = Some(Instant::now());
            return self.next_delay(response.max_age, Duration::ZERO);
        };

        let digest = content_digest(&body);
        let mut etag = response.etag;
        if self.entry.content_sha.as_deref() == Some(digest.as_str()) {
            metrics::record_feed_fetch(label, "unchanged");
        } else {
            match self.cache.apply_payload(self.kind, &body).await {
                Ok(0) => {
                    metrics::record_feed_fetch(label, "updated");
                    self.entry.content_sha = Some(digest);
                }
                Ok(failed) => {
                    // Neither gate may skip this payload next time.
                    metrics::record_feed_fetch(label, "partial");
                    tracing::warn!(feed = label, failed, "Snapshot incomplete, payload will be ingested again");
                    self.entry.content_sha = None;
                    etag = None;
                }
                Err(e) => {
                    metrics::record_feed_fetch(label, "error");
                    return self.failure_delay(&e);
                }
            }
        }

        self.entry.etag = etag;
        self.entry.max_age = response.max_age;
        self.entry.fetched_at = Some(Instant::now());
        self.next_delay(response.max_age, started.elapsed())
    }

    fn next_delay(&self, max_age: Option<Duration>, elapsed: Duration) -> Duration {
        match max_age {
            // Possibly stale at the origin; check again shortly.
            Some(age) if age.is_zero() => self.stale_retry,
            Some(age) => remaining_max_age(age, elapsed),
            None => self.fallback,
        }
    }

    /// Keep serving the prior value while it is fresh; otherwise retry soon.
    fn failure_delay(&self, error: &FeedError) -> Duration {
        match self.entry.freshness_left(Instant::now()) {
            Some(left) => {
                tracing::warn!(feed = self.kind.label(), error = %error, retry_in = ?left, "Feed fetch failed, cached value still fresh");
                left
            }
            None => {
                tracing::warn!(feed = self.kind.label(), error = %error, retry_in = ?self.stale_retry, "Feed fetch failed");
                self.stale_retry
            }
        }
    }
}
