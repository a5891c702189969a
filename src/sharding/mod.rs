//! Sharding subsystem.
//!
//! # Data Flow
//! ```text
//! SpecMap snapshot
//!     → filter.rs (1. allow-list, 2. deny-list, 3. owner allow-list)
//!     → bucket.rs (4. keep this replica's bucket, unless bucket 0)
//!     → specs to process this cycle
//! ```
//!
//! # Design Decisions
//! - Filter order is fixed
//! - Glob patterns are anchored at both ends and case-sensitive
//! - Bucket assignment is a pure function of the application name

pub mod bucket;
pub mod filter;

pub use bucket::{bucket_of, Sharder};
pub use filter::{match_rule, GlobSet};
