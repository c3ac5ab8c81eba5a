//! The conversation orchestrator.
//!
//! Turns inbound chat turns into correctly-ordered, correctly-isolated
//! provider calls: one call in flight per thread, admission through the
//! process-wide rate limiter, retries per policy, and history appends only
//! after confirmed success.

mod error;

pub use error::SubmitError;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::limiter::RateLimiter;
use crate::llm::{CompletionRequest, ModelClient, Turn};
use crate::retry::RetryPolicy;
use crate::session::{SessionGuard, SessionStore};

// ============================================================================
// Settings
// ============================================================================

/// Per-call parameters the orchestrator applies to every exchange.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// System instruction prepended to every request.
    pub system_instruction: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Overall deadline for one submit, dominating lock wait, admission,
    /// and all retry attempts.
    pub deadline: Duration,
    /// Whether provider usage metadata is retained in conversation state.
    pub record_usage: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            system_instruction: "You are a helpful assistant.".to_string(),
            temperature: None,
            max_tokens: None,
            deadline: Duration::from_secs(120),
            record_usage: false,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Composes the session store, rate limiter, retry policy, and model client.
/// Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    sessions: SessionStore,
    client: Arc<dyn ModelClient>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    settings: Arc<OrchestratorSettings>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        sessions: SessionStore,
        client: Arc<dyn ModelClient>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sessions,
            client,
            limiter,
            retry,
            settings: Arc::new(settings),
        }
    }

    /// The session store backing this orchestrator.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Submit one user turn and wait for the assistant's reply.
    pub async fn submit(&self, thread_id: &str, content: &str) -> Result<Turn, SubmitError> {
        self.submit_with_cancel(thread_id, content, CancellationToken::new())
            .await
    }

    /// Submit with caller-driven cancellation.
    ///
    /// A submit cancelled before lock acquisition has no side effects; one
    /// cancelled while the provider call is in flight discards the result
    /// without appending anything. The lock is released on every path.
    pub async fn submit_with_cancel(
        &self,
        thread_id: &str,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<Turn, SubmitError> {
        if thread_id.trim().is_empty() {
            return Err(SubmitError::Validation(
                "thread_id must be a non-empty string".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(SubmitError::Validation(
                "content must be non-empty".to_string(),
            ));
        }

        let deadline = tokio::time::Instant::now() + self.settings.deadline;

        // Idle -> LockAcquired. A caller that gives up here leaves the wait
        // queue without side effects.
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmitError::Cancelled),
            acquired = tokio::time::timeout_at(deadline, self.sessions.lock(thread_id)) => {
                acquired.map_err(|_| SubmitError::Busy)?
            }
        };
        debug!(thread_id, "Thread lock acquired");

        self.sessions.get_or_create(thread_id).await?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SubmitError::Cancelled),
            result = tokio::time::timeout_at(deadline, self.exchange(&guard, content)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(SubmitError::DeadlineExceeded),
                }
            }
        };

        match outcome {
            Ok(turn) => {
                debug!(thread_id, turns = guard.len(), "Exchange succeeded");
                Ok(turn)
            }
            Err(err) => {
                debug!(thread_id, error = %err, "Exchange failed");
                Err(err)
            }
        }
    }

    /// Stage the user turn, call the provider under the retry policy, and
    /// append the assistant's reply. Runs entirely under the thread's lock.
    ///
    /// The staged turns roll back unless the exchange commits, including
    /// when this future is dropped mid-call (caller cancellation, deadline,
    /// client disconnect): history only ever holds confirmed exchanges.
    async fn exchange(
        &self,
        guard: &SessionGuard<'_>,
        content: &str,
    ) -> Result<Turn, SubmitError> {
        let mut staged = StagedExchange::begin(guard);
        guard.append(Turn::user(content))?;

        let mut request = CompletionRequest::new(
            self.settings.model.clone(),
            Some(self.settings.system_instruction.clone()),
            guard.turns(),
        );
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;

        debug!(
            thread_id = guard.thread_id(),
            turns = request.turns.len(),
            "Calling model provider"
        );

        let client = Arc::clone(&self.client);
        let completion = self
            .retry
            .execute(&self.limiter, move || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.complete(request).await }
            })
            .await?;

        guard.append(completion.turn.clone())?;
        staged.commit();
        if self.settings.record_usage {
            if let Some(usage) = completion.usage {
                guard.record_usage(usage);
            }
        }

        if let Err(e) = guard.persist().await {
            // Memory is the source of truth; a persistence fault must not
            // fail a call the provider already answered.
            warn!(
                thread_id = guard.thread_id(),
                error = %e,
                "Failed to persist conversation"
            );
        }

        Ok(completion.turn)
    }
}

// ============================================================================
// Staged Exchange
// ============================================================================

/// Rollback handle for the turns staged during one exchange.
///
/// Dropped without [`commit`](Self::commit), it truncates the history back
/// to where the exchange started. Runs under the thread's lock, so the
/// rollback cannot race another call.
struct StagedExchange<'a, 'b> {
    guard: &'a SessionGuard<'b>,
    base_len: usize,
    committed: bool,
}

impl<'a, 'b> StagedExchange<'a, 'b> {
    fn begin(guard: &'a SessionGuard<'b>) -> Self {
        Self {
            base_len: guard.len(),
            guard,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StagedExchange<'_, '_> {
    fn drop(&mut self) {
        if !self.committed {
            self.guard.truncate(self.base_len);
        }
    }
}
