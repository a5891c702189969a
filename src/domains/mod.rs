//! Domain derivation subsystem.
//!
//! # Data Flow
//! ```text
//! ApplicationSpec
//!     → mapper.rs canonical: <app>_<port>.<sub>.<root> per port + <app>.<sub>.<root>
//!     → mapper.rs custom:    user text per port → base, www., test. variants
//!     → DNS/cert reconciler and config synthesizer
//! ```
//!
//! # Design Decisions
//! - Canonical names are lowercase and purely mechanical
//! - N ports always yield N + 1 canonical names; anything else skips the app
//! - Custom names inside the managed subdomain are rejected

pub mod mapper;

pub use mapper::{DomainError, DomainMapper, PortDomains};
