//! Model client error types and failure classification.

use thiserror::Error;

/// Errors that can occur when calling a model provider.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed before a response was received.
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The per-attempt timeout elapsed before the provider responded.
    #[error("provider call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The provider returned a well-formed response with no usable content.
    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// How a failed call should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying with backoff: network faults, timeouts, throttling,
    /// provider-side errors.
    Transient,
    /// Retrying cannot help: the request itself was rejected.
    Permanent,
}

impl LLMError {
    /// Classify this failure for retry purposes.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            LLMError::Request(_) | LLMError::Timeout { .. } => FailureClass::Transient,
            LLMError::Api { status, .. } => match status {
                408 | 429 => FailureClass::Transient,
                // 529 is Anthropic's "overloaded" status.
                500..=599 => FailureClass::Transient,
                _ => FailureClass::Permanent,
            },
            LLMError::EmptyResponse => FailureClass::Permanent,
        }
    }
}
