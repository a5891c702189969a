//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap outbound calls with a hard deadline
//! - Back up the transport's own timeout with a cancellation at twice the
//!   nominal value
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// The hard backstop fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Backstop applied on top of a call's nominal timeout.
pub fn hard_deadline(nominal: Duration) -> Duration {
    nominal.saturating_mul(2)
}

/// Run `fut`, cancelling it once twice the nominal timeout has passed.
///
/// The nominal timeout itself is expected to be enforced by the transport
/// (e.g. `reqwest::RequestBuilder::timeout`).
pub async fn with_deadline<F, T>(nominal: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    let deadline = hard_deadline(nominal);
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}
