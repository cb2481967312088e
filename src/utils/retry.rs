//! Bounded retry with a fixed interval.
//!
//! Cancellation is only observed between attempts: an attempt already in
//! progress runs to completion, but no further attempt starts and the
//! inter-attempt sleep is cut short.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Attempt count and delay for a retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, the
    /// attempts run out, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(attempt, max = self.max_attempts, error = %e, "Attempt failed");
                }
            }

            if attempt < self.max_attempts {
                debug!(delay_ms = self.interval.as_millis() as u64, "Waiting before next attempt");
                if !sleep_unless_cancelled(cancel, self.interval).await {
                    return Err(SyncError::Cancelled);
                }
            }
        }

        Err(SyncError::RetriesExhausted(self.max_attempts))
    }
}

/// Sleep for `duration`; returns `false` if cancelled first
pub async fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
