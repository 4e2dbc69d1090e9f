//! Retry/backoff scheduling for the sync driver. Pure decision logic — no
//! sleeping, no I/O — so it's unit testable without a real clock.

use std::time::Duration;

use warp_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp,
    DoNotRetry,
}

impl BackoffPolicy {
    /// Decides whether `attempt` (1-indexed, the attempt that just failed
    /// with `error`) should be retried. Only `SyncRemote`/`SyncTimeout`/
    /// `SyncNetwork` are retryable; `SyncProtocol` and
    /// `OperationAborted` never are.
    pub fn decide(&self, attempt: u32, error: &Error) -> RetryDecision {
        if !error.is_retryable_sync_error() {
            return RetryDecision::DoNotRetry;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let scale = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(scale)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        RetryDecision::Retry { after: delay }
    }
}
