//! Opt-in retry for optimistic-concurrency conflicts.

use crate::error::CoreResult;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry after a conflict.
///
/// The n-th retry (counting from 1) waits `initial_delay + delay_factor * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub max_attempts: u32,
    /// Fixed part of every wait.
    pub initial_delay: Duration,
    /// Per-retry growth of the wait.
    pub delay_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
            delay_factor: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Sets the total number of attempts. Zero is treated as one.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Sets the fixed part of every wait.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the per-retry growth of the wait.
    #[must_use]
    pub const fn delay_factor(mut self, factor: Duration) -> Self {
        self.delay_factor = factor;
        self
    }

    /// Returns the wait before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay + self.delay_factor.saturating_mul(retry)
    }
}

/// Runs `f`, rerunning it while it fails with `ConcurrentModification`.
///
/// Other errors are returned immediately. Once the attempts are used up the
/// last conflict is returned.
///
/// # Errors
///
/// Returns the first non-conflict error, or the final conflict.
pub fn retry_on_conflict<T, F>(policy: &RetryPolicy, mut f: F) -> CoreResult<T>
where
    F: FnMut() -> CoreResult<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, max_attempts, ?delay, error = %e, "retrying after conflict");
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            result => return result,
        }
    }
}
