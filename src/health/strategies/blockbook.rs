//! Indexed-explorer (Blockbook) check.
//!
//! # Responsibilities
//! - Index and backend heights agree and exceed a per-coin floor
//! - The index is in sync and not re-indexing
//! - A known address pages consistently
//! - The newest block is recent

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ProbeStrategy;
use crate::discovery::NodeEndpoint;
use crate::health::probe::{ProbeContext, ProbeError};

/// Allowed gap between the index and its backend node.
pub const MAX_BACKEND_GAP: u64 = 100;
/// Newest block must be younger than this.
pub const MAX_BLOCK_AGE_SECS: i64 = 6 * 60 * 60;
const PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub best_height: u64,
    #[serde(default)]
    pub in_sync: bool,
    #[serde(default)]
    pub initial_sync: bool,
    pub last_block_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendStatus {
    pub blocks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerStatus {
    pub blockbook: IndexStatus,
    pub backend: BackendStatus,
}

/// One page of an address listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPage {
    pub page: u64,
    pub total_pages: u64,
    pub items_on_page: u64,
    pub txs: u64,
    #[serde(default)]
    pub txids: Vec<String>,
}

/// Status checks against the floor and the wall clock.
pub fn status_ok(status: &ExplorerStatus, floor: u64, now: DateTime<Utc>) -> bool {
    let index = &status.blockbook;
    if !index.in_sync || index.initial_sync {
        return false;
    }
    if index.best_height.abs_diff(status.backend.blocks) > MAX_BACKEND_GAP {
        return false;
    }
    if index.best_height <= floor {
        return false;
    }
    match DateTime::parse_from_rfc3339(&index.last_block_time) {
        Ok(last) => (now - last.with_timezone(&Utc)).num_seconds() <= MAX_BLOCK_AGE_SECS,
        Err(_) => false,
    }
}

/// Whether a first page is consistent with its own totals.
pub fn pagination_consistent(page: &AddressPage, page_size: u64) -> bool {
    if page.page != 1 || page.items_on_page != page_size || page.txs == 0 {
        return false;
    }
    if page.txids.len() as u64 > page.items_on_page {
        return false;
    }
    page.total_pages == page.txs.div_ceil(page.items_on_page)
}

/// Blockbook instance for one coin.
#[derive(Debug, Clone)]
pub struct BlockbookProbe {
    pub coin: &'static str,
    pub min_height: u64,
    /// Address with a long, stable history.
    pub address: &'static str,
}

#[async_trait]
impl ProbeStrategy for BlockbookProbe {
    fn name(&self) -> &'static str {
        "blockbook"
    }

    async fn probe(&self, ctx: &ProbeContext, endpoint: &NodeEndpoint) -> Result<bool, ProbeError> {
        let base = endpoint.url("http");
        let timeout = ctx.default_timeout();

        let status: ExplorerStatus = ctx.client.get_json(&format!("{base}/api"), timeout).await?;
        if !status_ok(&status, self.min_height, Utc::now()) {
            tracing::debug!(%endpoint, coin = self.coin, best = status.blockbook.best_height, "Explorer status rejected");
            return Ok(false);
        }

        let url = format!(
            "{base}/api/v2/address/{}?page=1&pageSize={PAGE_SIZE}&details=txids",
            self.address
        );
        let page: AddressPage = ctx.client.get_json(&url, timeout).await?;
        let consistent = pagination_consistent(&page, PAGE_SIZE);
        if !consistent {
            tracing::debug!(%endpoint, coin = self.coin, "Address pagination inconsistent");
        }
        Ok(consistent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn status(best: u64, backend: u64, last: DateTime<Utc>) -> ExplorerStatus {
        ExplorerStatus {
            blockbook: IndexStatus {
                best_height: best,
                in_sync: true,
                initial_sync: false,
                last_block_time: last.to_rfc3339(),
            },
            backend: BackendStatus { blocks: backend },
        }
    }

    #[test]
    fn test_status_checks() {
        let now = Utc::now();
        assert!(status_ok(&status(900_000, 900_050, now), 800_000, now));
        assert!(!status_ok(&status(900_000, 900_101, now), 800_000, now));
        assert!(!status_ok(&status(700_000, 700_000, now), 800_000, now));
        assert!(!status_ok(
            &status(900_000, 900_000, now - ChronoDuration::hours(7)),
            800_000,
            now
        ));

        let mut resyncing = status(900_000, 900_000, now);
        resyncing.blockbook.initial_sync = true;
        assert!(!status_ok(&resyncing, 800_000, now));
    }

    #[test]
    fn test_pagination_consistency() {
        let page = AddressPage {
            page: 1,
            total_pages: 3,
            items_on_page: 10,
            txs: 25,
            txids: vec!["a".into(); 10],
        };
        assert!(pagination_consistent(&page, 10));
        assert!(!pagination_consistent(&AddressPage { total_pages: 2, ..page.clone() }, 10));
        assert!(!pagination_consistent(&AddressPage { txs: 0, ..page.clone() }, 10));
        assert!(!pagination_consistent(&AddressPage { txids: vec!["a".into(); 11], ..page }, 10));
    }
}
