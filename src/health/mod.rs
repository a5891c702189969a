//! Health probing of application instances.
//!
//! # Data Flow
//! ```text
//! Application name
//!     → registry.rs picks a strategy (first match wins)
//!     → strategies/* probe each candidate through probe.rs
//!     → verdict: healthy / unhealthy (faults are unhealthy)
//! ```
//!
//! # Design Decisions
//! - Strategies are trait objects so families can be added without
//!   touching the engine
//! - Every request has a nominal timeout and a hard deadline twice as long
//! - Applications without a strategy are routed to all candidates

pub mod probe;
pub mod registry;
pub mod strategies;
pub mod version;

pub use probe::{ProbeClient, ProbeContext, ProbeError};
pub use registry::{HealthEngine, Matcher, ProbeRegistry};
pub use strategies::ProbeStrategy;
pub use version::min_version_satisfy;
