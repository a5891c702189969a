//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Feed loops, refreshers and the reconciliation loop each hold a receiver
/// and leave their loop when it fires.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// The sender, for components that subscribe their own tasks.
    pub fn sender(&self) -> &broadcast::Sender<()> {
        &self.tx
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger, then wait up to `grace` for `tasks` to finish. Tasks still
    /// running afterwards are aborted.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, grace: Duration) {
        self.trigger();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let all = futures_util::future::join_all(tasks);
        if tokio::time::timeout(grace, all).await.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "Tasks still running after grace period, aborting");
            for handle in aborts {
                handle.abort();
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
