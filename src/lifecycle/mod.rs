//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → build components → spawn feed loops, refreshers, pipeline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → loops exit after their current step → drain with deadline
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then components, then tasks
//! - Shutdown has a deadline: stragglers are aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Running, StartupError};
