//! Retry policy for transient model provider failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::limiter::{RateLimitTimeout, RateLimiter};
use crate::llm::{FailureClass, LLMError};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts for one logical call, including the first.
    pub max_attempts: u32,
    /// Backoff base; attempt n waits `base * 2^(n-1)` plus jitter.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    /// Timeout applied to each individual provider call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Failure of a retried call.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The rate limiter refused admission. Never retried: retrying would
    /// compound backpressure.
    #[error(transparent)]
    Overloaded(#[from] RateLimitTimeout),

    /// The provider rejected the request; retrying cannot help.
    #[error("permanent provider failure: {0}")]
    Permanent(#[source] LLMError),

    /// All attempts failed with transient errors.
    #[error("provider unavailable after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: LLMError,
    },
}

impl RetryPolicy {
    /// Backoff delay before the attempt after `attempt` (1-based) failed:
    /// exponential in the attempt number, with random jitter in
    /// `[0, base_delay)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(20));
        let jitter = if base_ms > 0 {
            rand::rng().random_range(0..base_ms)
        } else {
            0
        };
        Duration::from_millis(exp.saturating_add(jitter)).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts are
    /// exhausted.
    ///
    /// Every attempt re-admits through the rate limiter independently: a
    /// retry is a new call. The token is held for the attempt's duration and
    /// released before backing off.
    pub async fn execute<T, F, Fut>(
        &self,
        limiter: &RateLimiter,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let token = limiter.admit().await?;

            let outcome = tokio::time::timeout(self.attempt_timeout, operation()).await;
            drop(token);

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => LLMError::Timeout {
                    seconds: self.attempt_timeout.as_secs(),
                },
            };

            match error.class() {
                FailureClass::Permanent => return Err(RetryError::Permanent(error)),
                FailureClass::Transient => {
                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: error,
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
