//! Exponential backoff for fallible async operations.
//!
//! [`Backoff`] retries an operation sequentially, sleeping
//! `min(initial_delay * 2^attempt, max_delay)` between attempts. There is no
//! jitter, so the schedule is a pure function of the configuration and tests
//! can assert exact delays.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

/// Retry budget and delay bounds for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling applied to every computed delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

impl Backoff {
    /// Same policy with a different starting delay.
    pub fn with_initial_delay(self, initial_delay_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            ..self
        }
    }

    /// Delay scheduled after the failed attempt with zero-based index `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Every delay this policy can sleep through, in order.
    #[cfg(test)]
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }

    /// Runs `op` until it succeeds or the attempts run out.
    ///
    /// `on_retry` sees the one-based number of the failed attempt and its
    /// error before each sleep. The last error is returned unchanged.
    pub async fn run<T, E, Op, Fut, R>(&self, op: Op, on_retry: R) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(u32, &E),
        E: Display,
    {
        self.run_if(op, |_| true, on_retry).await
    }

    /// Like [`run`](Self::run), but gives up as soon as `should_retry`
    /// rejects an error.
    pub async fn run_if<T, E, Op, Fut, P, R>(
        &self,
        mut op: Op,
        mut should_retry: P,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        R: FnMut(u32, &E),
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt + 1 >= max_attempts {
                error!(attempts = max_attempts, error = %err, "all attempts failed");
                return Err(err);
            }
            if !should_retry(&err) {
                warn!(attempt = attempt + 1, error = %err, "error is not retryable, giving up");
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );
            on_retry(attempt + 1, &err);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// HTTP statuses worth retrying: rate limiting and server errors.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Error text that indicates a timeout somewhere below us.
pub fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}
