//! Deterministic bucket assignment and selection.

use sha2::{Digest, Sha256};

use crate::config::ShardingConfig;
use crate::sharding::filter::GlobSet;
use crate::specs::{ApplicationSpec, SpecMap};

/// Position of the digest byte that decides the bucket.
const BUCKET_BYTE: usize = 31;

/// Bucket value meaning "process every application".
pub const ALL_BUCKETS: u32 = 0;

/// Bucket of an application: one digest byte of its name, modulo `total`.
pub fn bucket_of(name: &str, total: u32) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from(digest[BUCKET_BYTE]) % total.max(1)
}

/// Applies the replica's filters and bucket to a snapshot.
#[derive(Debug)]
pub struct Sharder {
    total_buckets: u32,
    bucket: u32,
    allow: GlobSet,
    deny: GlobSet,
    owners: Vec<String>,
}

impl Sharder {
    pub fn new(config: &ShardingConfig) -> Self {
        Self {
            total_buckets: config.total_buckets.max(1),
            bucket: config.bucket,
            allow: GlobSet::new(&config.allow_list),
            deny: GlobSet::new(&config.deny_list),
            owners: config.owner_allow_list.clone(),
        }
    }

    pub fn total_buckets(&self) -> u32 {
        self.total_buckets
    }

    /// Bucket of `name` under this replica's bucket count.
    pub fn bucket_of(&self, name: &str) -> u32 {
        bucket_of(name, self.total_buckets)
    }

    /// Whether a single application survives the filters, in their fixed order.
    pub fn keeps(&self, spec: &ApplicationSpec) -> bool {
        if !self.allow.is_empty() && !self.allow.matches(&spec.name) {
            return false;
        }
        if self.deny.matches(&spec.name) {
            return false;
        }
        if !self.owners.is_empty() && !self.owners.iter().any(|o| o == &spec.owner) {
            return false;
        }
        if self.bucket != ALL_BUCKETS && self.bucket_of(&spec.name) != self.bucket {
            return false;
        }
        true
    }

    /// Specs this replica processes, in name order.
    pub fn select_for_processing<'a>(&self, specs: &'a SpecMap) -> Vec<&'a ApplicationSpec> {
        let selected: Vec<_> = specs.values().filter(|s| self.keeps(s)).collect();
        tracing::debug!(
            total = specs.len(),
            selected = selected.len(),
            bucket = self.bucket,
            "Applications selected for processing"
        );
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, owner: &str) -> ApplicationSpec {
        ApplicationSpec {
            name: name.into(),
            owner: owner.into(),
            ..Default::default()
        }
    }

    fn map(specs: Vec<ApplicationSpec>) -> SpecMap {
        specs.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    #[test]
    fn test_bucket_is_deterministic() {
        for name in ["demo", "wordpress1700", "KadenaChainWebNode"] {
            let first = bucket_of(name, 4);
            assert!(first < 4);
            assert_eq!(first, bucket_of(name, 4));
        }
        assert_eq!(bucket_of("demo", 1), 0);
    }

    #[test]
    fn test_single_bucket_only_processes_all_when_configured() {
        // Derived bucket 0 is an ordinary shard; only the configured 0 means all.
        assert!(specs_in_bucket_zero_are_not_special());
        let all = Sharder::new(&ShardingConfig::default());
        let specs = map(vec![spec("a", "o"), spec("b", "o")]);
        assert_eq!(all.select_for_processing(&specs).len(), 2);
    }

    fn specs_in_bucket_zero_are_not_special() -> bool {
        let sharder = Sharder::new(&ShardingConfig {
            total_buckets: 2,
            bucket: 1,
            ..Default::default()
        });
        let zero = (0..32)
            .map(|i| format!("app{}", i))
            .find(|n| bucket_of(n, 2) == 0)
            .unwrap();
        !sharder.keeps(&spec(&zero, "o"))
    }

    #[test]
    fn test_bucket_selection_partitions_the_set() {
        let names: Vec<String> = (0..64).map(|i| format!("app{}", i)).collect();
        let specs = map(names.iter().map(|n| spec(n, "o")).collect());

        let mut seen = 0;
        for bucket in 1..4 {
            let sharder = Sharder::new(&ShardingConfig {
                total_buckets: 4,
                bucket,
                ..Default::default()
            });
            let picked = sharder.select_for_processing(&specs);
            assert!(picked.iter().all(|s| bucket_of(&s.name, 4) == bucket));
            seen += picked.len();
        }
        let zero = names.iter().filter(|n| bucket_of(n, 4) == 0).count();
        assert_eq!(seen + zero, names.len());
    }

    #[test]
    fn test_filter_order() {
        let sharder = Sharder::new(&ShardingConfig {
            allow_list: vec!["web*".into()],
            deny_list: vec!["webtest*".into()],
            owner_allow_list: vec!["owner1".into()],
            ..Default::default()
        });

        assert!(sharder.keeps(&spec("webshop", "owner1")));
        assert!(!sharder.keeps(&spec("shop", "owner1")));
        assert!(!sharder.keeps(&spec("webtest1", "owner1")));
        assert!(!sharder.keeps(&spec("webshop", "owner2")));
    }
}
