//! Process-wide admission control for calls to the model provider.
//!
//! A hosted model endpoint enforces its own rate ceiling; exceeding it
//! produces provider-side throttling errors that cost more (latency, wasted
//! retries) than local admission control.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// How tokens return to the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillMode {
    /// A token returns when its holder drops it: the bucket bounds the
    /// number of provider calls in flight.
    Concurrent,
    /// Tokens are consumed on admission and restored one per interval, up to
    /// capacity: the bucket bounds sustained call rate with bursts up to
    /// capacity.
    Interval(Duration),
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Bucket capacity; the limiter never admits more than this many tokens'
    /// worth of work at once.
    pub capacity: usize,
    pub mode: RefillMode,
    /// How long `admit` may suspend before giving up.
    pub admit_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            mode: RefillMode::Concurrent,
            admit_timeout: Duration::from_secs(10),
        }
    }
}

/// Admission timed out: no token became available in time.
#[derive(Debug, Error)]
#[error("rate limiter admission timed out after {0:?}")]
pub struct RateLimitTimeout(pub Duration);

/// A momentarily admitted call.
///
/// Owned by the call for its duration. In concurrent mode, dropping the
/// token frees its slot; in interval mode the token was consumed on
/// admission and the refill task restores it.
#[derive(Debug)]
pub struct AdmitToken {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Token-bucket admission gate in front of the model provider.
///
/// Safe under arbitrary concurrent callers; waiting callers suspend on the
/// semaphore rather than spinning.
///
/// In interval mode a refill task is spawned at construction, so the limiter
/// must be created inside a tokio runtime.
#[derive(Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Create a new limiter with a full bucket.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        let limiter = Self {
            semaphore: Arc::new(Semaphore::new(config.capacity)),
            config,
        };

        if let RefillMode::Interval(interval) = config.mode {
            limiter.spawn_refill_task(interval);
        }

        limiter
    }

    /// Wait for a token, suspending up to the configured admission timeout.
    pub async fn admit(&self) -> Result<AdmitToken, RateLimitTimeout> {
        let acquired = tokio::time::timeout(
            self.config.admit_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| RateLimitTimeout(self.config.admit_timeout))?;

        // The semaphore is never closed while the limiter is alive.
        let permit = acquired.expect("rate limiter semaphore closed");

        match self.config.mode {
            RefillMode::Concurrent => Ok(AdmitToken {
                _permit: Some(permit),
            }),
            RefillMode::Interval(_) => {
                // Consume the token; the refill task restores it later.
                permit.forget();
                Ok(AdmitToken { _permit: None })
            }
        }
    }

    /// Tokens currently available without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Restore one token per interval, capped at capacity.
    fn spawn_refill_task(&self, interval: Duration) {
        let semaphore = Arc::clone(&self.semaphore);
        let capacity = self.config.capacity;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The bucket starts full; skip the immediate first tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if semaphore.available_permits() < capacity {
                    semaphore.add_permits(1);
                    debug!(
                        available = semaphore.available_permits(),
                        capacity, "Refilled rate limiter token"
                    );
                }
            }
        });
    }
}
