//! Typed failures surfaced by `submit`.

use thiserror::Error;

use crate::llm::LLMError;
use crate::retry::RetryError;
use crate::session::SessionError;

/// Everything that can go wrong with one submitted turn.
///
/// The HTTP collaborator maps each variant to a status; the core never
/// writes to a response.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The inbound turn was malformed. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The thread's lock could not be acquired within the deadline; another
    /// call for the same thread is still in flight.
    #[error("conversation busy: another call for this thread is in flight")]
    Busy,

    /// The rate limiter refused admission within its timeout.
    #[error("overloaded: no provider capacity within the admission timeout")]
    Overloaded,

    /// Transient provider failures exhausted the retry budget.
    #[error("upstream unavailable after {attempts} attempts")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: LLMError,
    },

    /// The provider rejected the request outright.
    #[error("upstream rejected the request")]
    UpstreamRejected(#[source] LLMError),

    /// The caller abandoned the call; any in-flight result was discarded.
    #[error("submit cancelled by caller")]
    Cancelled,

    /// The overall submit deadline elapsed mid-call.
    #[error("submit deadline exceeded")]
    DeadlineExceeded,

    /// Conversation state could not be read or written.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl From<RetryError> for SubmitError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Overloaded(_) => SubmitError::Overloaded,
            RetryError::Permanent(source) => SubmitError::UpstreamRejected(source),
            RetryError::Exhausted { attempts, last } => SubmitError::UpstreamUnavailable {
                attempts,
                source: last,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitTimeout;
    use std::time::Duration;

    #[test]
    fn retry_errors_map_to_submit_errors() {
        let overloaded: SubmitError =
            RetryError::Overloaded(RateLimitTimeout(Duration::from_secs(1))).into();
        assert!(matches!(overloaded, SubmitError::Overloaded));

        let rejected: SubmitError = RetryError::Permanent(LLMError::Api {
            status: 400,
            message: String::new(),
        })
        .into();
        assert!(matches!(rejected, SubmitError::UpstreamRejected(_)));

        let unavailable: SubmitError = RetryError::Exhausted {
            attempts: 3,
            last: LLMError::Timeout { seconds: 30 },
        }
        .into();
        match unavailable {
            SubmitError::UpstreamUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected UpstreamUnavailable, got {other:?}"),
        }
    }
}
