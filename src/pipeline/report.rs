//! Per-cycle summary.

use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::dns::ReconcileSummary;

/// What happened to the load balancer in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReloadStatus {
    #[default]
    NotAttempted,
    Reloaded,
    Unchanged,
    /// Not applied; the reason is logged.
    Skipped(String),
    Failed(String),
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub id: Uuid,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// Applications in the specification snapshot.
    pub apps_total: usize,
    /// Applications kept by the sharder.
    pub apps_selected: usize,
    /// Selected applications with at least one candidate location.
    pub apps_located: usize,
    /// Applications with at least one healthy instance.
    pub apps_healthy: usize,
    /// Applications left out because their domains could not be derived.
    pub apps_invalid: usize,
    pub domains: Vec<String>,
    pub dns: Option<ReconcileSummary>,
    pub reload: ReloadStatus,
}

impl CycleReport {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            duration: Duration::ZERO,
            apps_total: 0,
            apps_selected: 0,
            apps_located: 0,
            apps_healthy: 0,
            apps_invalid: 0,
            domains: Vec::new(),
            dns: None,
            reload: ReloadStatus::NotAttempted,
        }
    }

    /// Whether the cycle ended with the load balancer in the desired state.
    pub fn succeeded(&self) -> bool {
        matches!(self.reload, ReloadStatus::Reloaded | ReloadStatus::Unchanged)
    }
}

impl Default for CycleReport {
    fn default() -> Self {
        Self::new()
    }
}
