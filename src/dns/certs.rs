//! Certificate artifacts and renewal hook.
//!
//! # Design Decisions
//! - An artifact is `<cert_dir>/<domain>.pem`; it exists only above a
//!   minimum size, so truncated writes count as missing
//! - Issuance is delegated to an external command
//! - The renewal hook is a line list; a domain is appended only when no
//!   line already contains it

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::CertConfig;

/// Errors raised while managing certificates.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("issue command is empty")]
    EmptyCommand,

    #[error("issue command exited with {status}: {stderr}")]
    IssueFailed { status: String, stderr: String },

    #[error("issuance finished but no certificate was written for {0}")]
    Missing(String),
}

/// Certificate collaborator as seen by the reconciler.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    async fn certificate_exists(&self, domain: &str) -> bool;

    async fn issue_certificate(&self, domain: &str) -> Result<(), CertError>;

    async fn install_renewal_hook(&self, domain: &str) -> Result<(), CertError>;
}

/// Certificates managed through an external issuing tool.
#[derive(Debug, Clone)]
pub struct CommandCertificateManager {
    cert_dir: PathBuf,
    min_size: u64,
    issue_command: Vec<String>,
    hook_path: PathBuf,
    hook_template: String,
}

impl CommandCertificateManager {
    pub fn new(config: &CertConfig) -> Self {
        Self {
            cert_dir: PathBuf::from(&config.cert_dir),
            min_size: config.min_cert_size_bytes,
            issue_command: config.issue_command.clone(),
            hook_path: PathBuf::from(&config.renewal_hook_path),
            hook_template: config.renewal_hook_template.clone(),
        }
    }

    pub fn artifact_path(&self, domain: &str) -> PathBuf {
        self.cert_dir.join(format!("{domain}.pem"))
    }
}

#[async_trait]
impl CertificateManager for CommandCertificateManager {
    async fn certificate_exists(&self, domain: &str) -> bool {
        match tokio::fs::metadata(self.artifact_path(domain)).await {
            Ok(meta) => meta.is_file() && meta.len() >= self.min_size,
            Err(_) => false,
        }
    }

    async fn issue_certificate(&self, domain: &str) -> Result<(), CertError> {
        let argv: Vec<String> = self
            .issue_command
            .iter()
            .map(|arg| arg.replace("{domain}", domain))
            .collect();
        let (program, args) = argv.split_first().ok_or(CertError::EmptyCommand)?;

        tracing::info!(domain, program = %program, "Issuing certificate");
        let output = Command::new(program).args(args).output().await?;
        if !output.status.success() {
            return Err(CertError::IssueFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !self.certificate_exists(domain).await {
            return Err(CertError::Missing(domain.to_string()));
        }
        Ok(())
    }

    async fn install_renewal_hook(&self, domain: &str) -> Result<(), CertError> {
        let line = self.hook_template.replace("{domain}", domain);
        if ensure_line_present(&self.hook_path, &line).await? {
            tracing::info!(domain, hook = %self.hook_path.display(), "Renewal hook updated");
        }
        Ok(())
    }
}

/// Append `line` unless an existing line already contains it.
/// Returns whether the file changed.
pub async fn ensure_line_present(path: &Path, line: &str) -> io::Result<bool> {
    let existing = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    if existing.lines().any(|l| l.contains(line)) {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut entry = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        entry.push('\n');
    }
    entry.push_str(line);
    entry.push('\n');
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;
    Ok(true)
}
