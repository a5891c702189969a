//! Reconciliation pipeline.
//!
//! # Data Flow
//! ```text
//! SpecCache snapshot
//!     → Sharder (allow → deny → owner → bucket)
//!     → discovery: candidate endpoints per application
//!     → HealthEngine: healthy endpoints (apps and IPs in parallel)
//!     → ConfigSynthesizer::plan: domains per application
//!     → DnsReconciler: records and certificates, one domain at a time
//!     → ConfigSynthesizer::render → Reloader
//! ```
//!
//! # Design Decisions
//! - A cycle never fails as a whole; its outcome is a `CycleReport`
//! - A cycle that cannot see any healthy application leaves the live
//!   configuration alone
//! - Spec updates start a cycle early; otherwise cycles run on an interval

pub mod cycle;
pub mod report;

pub use cycle::Pipeline;
pub use report::{CycleReport, ReloadStatus};
