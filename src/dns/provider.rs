//! DNS provider interface and the in-memory provider.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::timeouts::DeadlineExceeded;

/// Errors raised by DNS providers.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rejected the request: {0}")]
    Api(String),

    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("refusing to modify '{0}' outside the managed subdomain")]
    OutsideManagedZone(String),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

pub type Result<T> = std::result::Result<T, DnsError>;

/// A record held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

/// A record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub proxied: bool,
}

/// Record storage of one zone.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every record named `name`, in provider listing order.
    async fn list_records(&self, name: &str) -> Result<Vec<DomainRecord>>;

    async fn create_record(&self, record: &NewRecord) -> Result<DomainRecord>;

    async fn delete_record(&self, record: &DomainRecord) -> Result<()>;
}

/// Provider backed by a map, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<MemoryZone>,
}

#[derive(Debug, Default)]
struct MemoryZone {
    next_id: u64,
    // Keyed by insertion sequence so listing order is creation order.
    records: BTreeMap<u64, DomainRecord>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if it had been created out of band.
    pub fn insert(&self, name: &str, record_type: &str, content: &str, proxied: bool) -> String {
        let mut zone = self.lock();
        zone.next_id += 1;
        let seq = zone.next_id;
        let id = format!("mem-{seq}");
        zone.records.insert(
            seq,
            DomainRecord {
                id: id.clone(),
                name: name.to_string(),
                record_type: record_type.to_string(),
                content: content.to_string(),
                proxied,
            },
        );
        id
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<DomainRecord> {
        self.lock().records.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryZone> {
        // A poisoned zone is still consistent: every mutation is a single insert/remove.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DnsProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_records(&self, name: &str) -> Result<Vec<DomainRecord>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    async fn create_record(&self, record: &NewRecord) -> Result<DomainRecord> {
        let id = self.insert(&record.name, &record.record_type, &record.content, record.proxied);
        Ok(DomainRecord {
            id,
            name: record.name.clone(),
            record_type: record.record_type.clone(),
            content: record.content.clone(),
            proxied: record.proxied,
        })
    }

    async fn delete_record(&self, record: &DomainRecord) -> Result<()> {
        self.lock().records.retain(|_, r| r.id != record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_listing_order_and_delete() {
        let provider = InMemoryProvider::new();
        provider.insert("a.sub.example.com", "A", "1.1.1.1", false);
        provider.insert("b.sub.example.com", "A", "2.2.2.2", false);
        provider.insert("A.sub.example.com", "A", "3.3.3.3", false);

        let listed = provider.list_records("a.sub.example.com").await.unwrap();
        assert_eq!(
            listed.iter().map(|r| r.content.as_str()).collect::<Vec<_>>(),
            vec!["1.1.1.1", "3.3.3.3"]
        );

        provider.delete_record(&listed[0]).await.unwrap();
        assert_eq!(provider.records().len(), 2);
    }
}
