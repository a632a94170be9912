//! Bounded retry with exponential backoff
//!
//! [`execute`] runs an opaque async operation up to `max_attempts` times.
//! Attempt `i` (0-indexed) is preceded by a wait of `base_delay * 2^i`; the
//! first attempt runs immediately. Every error is retried: the executor knows
//! nothing about HTTP, so callers decide what counts as a failure by what they
//! return as `Err`.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics;

/// Retry configuration, immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay multiplied by `2^attempt` before each retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from an attempt count and a base delay in milliseconds
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay applied before the given 0-indexed attempt.
    ///
    /// Attempt 0 never waits. The exponent saturates instead of overflowing.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every delay the executor inserts when all attempts fail
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Final failure after every attempt was used.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E> {
    /// Number of attempts that were made
    pub attempts: u32,
    /// Error returned by the last attempt
    pub last_error: E,
}

impl<E> RetryExhausted<E> {
    /// Take the last underlying error, dropping the attempt count
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

/// Run `operation` under `policy`, returning the first success.
///
/// `label` names the operation in log lines only.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            metrics::record_retry(label);
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = label,
                        "Retry attempt {}/{} succeeded",
                        attempt + 1,
                        max_attempts
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(
                        operation = label,
                        attempts = attempt,
                        "All attempts failed, last error: {}",
                        err
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                warn!(
                    "{}",
                    format_retry(label, attempt + 1, max_attempts, &err, policy.delay_before(attempt))
                );
            }
        }
    }
}

/// Standard retry log line, e.g.
/// `Retrying (attempt 2/3) after server error 503 - waiting 2.0 seconds... (GET /user)`
pub fn format_retry(
    label: &str,
    next_attempt: u32,
    max_attempts: u32,
    reason: &dyn fmt::Display,
    wait: Duration,
) -> String {
    format!(
        "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
        next_attempt,
        max_attempts,
        reason,
        wait.as_secs_f64(),
        label
    )
}
