//! Retry logic.
//!
//! # Responsibilities
//! - Execute a fallible async operation a bounded number of times
//! - Sleep a fixed delay between attempts
//!
//! # Design Decisions
//! - The last error is returned when all attempts fail
//! - Callers decide which errors are worth retrying via `should_retry`

use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts are exhausted.
    pub async fn run<F, Fut, T, E, P>(&self, label: &str, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && should_retry(&e) => {
                    tracing::debug!(
                        operation = label,
                        attempt,
                        delay = ?self.delay,
                        error = %e,
                        "Retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
