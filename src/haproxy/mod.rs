//! Load balancer configuration.
//!
//! # Data Flow
//! ```text
//! healthy applications
//!     → overrides.rs  per-(port, name) proxy settings
//!     → synth.rs      full configuration text
//!     → reload.rs     stage, validate, swap, reload
//! ```
//!
//! # Design Decisions
//! - The configuration is regenerated from scratch every cycle, never patched
//! - A rejected configuration never replaces the live one

pub mod overrides;
pub mod reload;
pub mod synth;

pub use overrides::{Override, OverrideTable};
pub use reload::{ApplyOutcome, ReloadError, Reloader};
pub use synth::{AppPlan, ConfigSynthesizer, PortRoute};
