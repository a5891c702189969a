//! Application specification subsystem.
//!
//! # Data Flow
//! ```text
//! origin service
//!     → feed.rs (HEAD/GET with ETag + max-age, payload digest)
//!     → cache.rs (per-feed loop, snapshot publication)
//!         → enterprise.rs (decrypt access-restricted specs)
//!     → Arc<SpecMap> snapshots + CacheEvent notifications
//! ```
//!
//! # Design Decisions
//! - Specs and permanent messages are fetched by independent loops
//! - Readers always get an immutable snapshot
//! - A failure never clears a snapshot; the previous one stays served

pub mod cache;
pub mod enterprise;
pub mod feed;
pub mod types;

pub use cache::{CacheEvent, SpecCache};
pub use feed::{FeedClient, FeedError};
pub use types::{ApplicationSpec, ComponentSpec, PermanentMessage, SpecMap};
