//! Bounded retry with optional per-attempt timeout and exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::metrics::METRICS;

/// Retry budget for one hook or case body.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = run once).
    pub max_retries: u32,
    /// Wall-clock limit for a single attempt.
    pub timeout: Option<Duration>,
    /// Base delay between attempts; doubled after each failure.
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            timeout: None,
            backoff_base_ms: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, base_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Final value of a retried call and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: Result<T, String>,
    pub attempts: u32,
}

/// Call `op` until it returns `Ok` or `max_retries + 1` attempts are spent.
///
/// `op` receives the 1-based attempt number. A timed-out attempt counts as a
/// failure with a "timed out" message.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            METRICS.inc_retries();
        }
        let result = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(format!("timed out after {}s", limit.as_secs_f64())),
            },
            None => op(attempt).await,
        };

        match result {
            Ok(value) => {
                return RetryOutcome {
                    value: Ok(value),
                    attempts: attempt,
                }
            }
            Err(message) => {
                tracing::debug!(attempt, max_attempts, error = %message, "attempt failed");
                last_error = message;
                if attempt < max_attempts {
                    let delay = policy.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    RetryOutcome {
        value: Err(last_error),
        attempts: max_attempts,
    }
}
