//! Retry with exponential backoff.
//!
//! `RetryPolicy` is plain data; `retry` drives an async operation under it
//! and sleeps on the tokio clock, so tests run it with paused time.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Bounded retry schedule: `base_delay`, then `base_delay * multiplier`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor applied to the delay after each failure.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Every delay the policy can sleep, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.attempts()).map(|attempt| self.delay_after(attempt))
    }
}

/// How a retried operation ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Succeeded(T),
    /// Every attempt failed; carries the last error.
    Exhausted(E),
    /// Shutdown was signalled while waiting to retry.
    Cancelled,
}

/// Run `op` until it succeeds, the policy is exhausted, or `shutdown` fires.
///
/// `op` receives the 1-based attempt number. No delay follows the final
/// attempt.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(e) if attempt >= attempts => return RetryOutcome::Exhausted(e),
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    ?delay,
                    "attempt failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return RetryOutcome::Cancelled,
                }
            }
        }
        attempt += 1;
    }
}
