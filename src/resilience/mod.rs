//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (feed, probe, oracle, DNS provider):
//!     → timeouts.rs (nominal deadline + hard backstop at twice the deadline)
//!     → On failure: retries.rs (fixed attempts, fixed delay)
//!     → backoff.rs (refresh backoff, feed max-age scheduling)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - A timed-out call is an ordinary negative result, never fatal
//! - Retry counts are per call site (owner lookup 3x, oracle 4x)

pub mod backoff;
pub mod retries;
pub mod timeouts;
