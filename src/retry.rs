//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

/// Attempt budget and backoff unit for [`execute_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay slept after failed attempt `attempt` (1-based) before the next.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `operation` until it succeeds, `should_retry` refuses the error, or
/// the attempt budget is spent. The first attempt is immediate; after attempt
/// `k` fails the wait is `base_delay * k`.
///
/// Always returns the error from the last attempt that ran.
pub async fn execute_with_retry<T, E, F, Fut, S>(
    mut operation: F,
    should_retry: S,
    policy: RetryPolicy,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    S: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::debug!(attempt, max_attempts, error = %err, "Retry budget exhausted");
                    return Err(err);
                }
                if !should_retry(&err) {
                    tracing::debug!(attempt, error = %err, "Error is not retryable");
                    return Err(err);
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

const NON_RETRYABLE_MARKERS: [&str; 6] = [
    "rejected",
    "user denied",
    "not installed",
    "not found",
    "invalid",
    "malformed",
];

const RETRYABLE_MARKERS: [&str; 4] = ["network", "timeout", "connection", "temporary"];

/// Default retry classification over an error message.
///
/// Rejections, missing agents and malformed data are final; transport-ish
/// failures are retried; anything unrecognized is not.
pub fn should_retry_error(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    if NON_RETRYABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return false;
    }
    RETRYABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
