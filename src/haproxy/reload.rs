//! Validate-then-reload of the load balancer.
//!
//! # Data Flow
//! ```text
//! config text
//!     → last successful reload had this text and live still holds it?  → Unchanged
//!     → write staging file
//!     → validate command ({config} = staging path)  → fail: live untouched
//!     → atomically replace live file
//!     → reload command ({config} = live path)
//!     → record the applied digest
//! ```
//!
//! # Design Decisions
//! - Only a successful reload is recorded, so a failed one is retried on the
//!   next apply even though the live file already holds the new text
//! - Nothing is recorded at startup: the first apply always reloads

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::process::Command;

use crate::config::HaproxyConfig;
use crate::observability::metrics;
use crate::specs::feed::content_digest;

/// Errors raised while applying a configuration.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("configuration I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("{0} command is empty")]
    EmptyCommand(&'static str),

    #[error("configuration rejected by validator ({status}): {output}")]
    Invalid { status: String, output: String },

    #[error("reload command failed ({status}): {output}")]
    ReloadFailed { status: String, output: String },
}

/// Result of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Reloaded,
    /// Live configuration already matched.
    Unchanged,
}

/// Applies configuration text to the running load balancer.
#[derive(Debug)]
pub struct Reloader {
    live: PathBuf,
    staging: PathBuf,
    validate_command: Vec<String>,
    reload_command: Vec<String>,
    /// Digest of the text the load balancer last reloaded successfully.
    applied: ArcSwapOption<String>,
}

impl Reloader {
    pub fn new(config: &HaproxyConfig) -> Self {
        Self {
            live: PathBuf::from(&config.config_path),
            staging: PathBuf::from(&config.staging_path),
            validate_command: config.validate_command.clone(),
            reload_command: config.reload_command.clone(),
            applied: ArcSwapOption::empty(),
        }
    }

    pub fn live_path(&self) -> &Path {
        &self.live
    }

    /// Validate and activate `text`. On any error the live file is the
    /// previous one.
    pub async fn apply(&self, text: &str) -> Result<ApplyOutcome, ReloadError> {
        let digest = content_digest(text.as_bytes());
        if self.is_applied(&digest, text).await {
            tracing::debug!(path = %self.live.display(), "Configuration unchanged");
            metrics::record_reload("unchanged");
            return Ok(ApplyOutcome::Unchanged);
        }

        let result = self.validate_and_swap(text).await;
        match &result {
            Ok(_) => {
                self.applied.store(Some(Arc::new(digest)));
                metrics::record_reload("reloaded");
                tracing::info!(path = %self.live.display(), bytes = text.len(), "Load balancer reloaded");
            }
            Err(ReloadError::Invalid { .. }) => metrics::record_reload("invalid"),
            Err(_) => {
                self.applied.store(None);
                metrics::record_reload("error");
            }
        }
        result
    }

    async fn is_applied(&self, digest: &str, text: &str) -> bool {
        let recorded = self.applied.load();
        if recorded.as_deref().map(String::as_str) != Some(digest) {
            return false;
        }
        matches!(tokio::fs::read_to_string(&self.live).await, Ok(current) if current == text)
    }

    async fn validate_and_swap(&self, text: &str) -> Result<ApplyOutcome, ReloadError> {
        tokio::fs::write(&self.staging, text).await?;

        let staging = self.staging.display().to_string();
        let (ok, status, output) = run(&self.validate_command, "validate", &staging).await?;
        if !ok {
            return Err(ReloadError::Invalid { status, output });
        }

        let swap = self.live.with_extension("swap");
        tokio::fs::copy(&self.staging, &swap).await?;
        tokio::fs::rename(&swap, &self.live).await?;

        let live = self.live.display().to_string();
        let (ok, status, output) = run(&self.reload_command, "reload", &live).await?;
        if !ok {
            return Err(ReloadError::ReloadFailed { status, output });
        }
        Ok(ApplyOutcome::Reloaded)
    }
}

async fn run(
    command: &[String],
    label: &'static str,
    config: &str,
) -> Result<(bool, String, String), ReloadError> {
    let argv: Vec<String> = command.iter().map(|a| a.replace("{config}", config)).collect();
    let (program, args) = argv.split_first().ok_or(ReloadError::EmptyCommand(label))?;

    tracing::debug!(command = label, program = %program, "Running");
    let output = Command::new(program).args(args).output().await?;
    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    }
    Ok((output.status.success(), output.status.to_string(), text))
}
