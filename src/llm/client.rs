//! Model client trait and provider selection.

use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::LLMError;
use super::types::{Completion, CompletionRequest};

// ============================================================================
// Provider Enum
// ============================================================================

/// Supported model providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Provider {
    Anthropic,
    Ollama,
    OpenAI,
    OpenRouter,
    Other(String),
}

impl Provider {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
            Provider::OpenAI => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Other(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "anthropic" => Provider::Anthropic,
            "ollama" => Provider::Ollama,
            "openai" => Provider::OpenAI,
            "openrouter" => Provider::OpenRouter,
            other => Provider::Other(other.to_string()),
        })
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        s.parse().unwrap()
    }
}

// ============================================================================
// ModelClient Trait
// ============================================================================

/// An async capability that turns an ordered sequence of turns plus a system
/// instruction into a single generated turn.
///
/// The orchestrator only depends on this trait; concrete adapters own their
/// provider's wire format.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Make a single completion call.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LLMError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_known_names() {
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("ollama".parse::<Provider>().unwrap(), Provider::Ollama);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!(
            "openrouter".parse::<Provider>().unwrap(),
            Provider::OpenRouter
        );
    }

    #[test]
    fn provider_preserves_unknown_names() {
        let provider = "acme-llm".parse::<Provider>().unwrap();
        assert_eq!(provider, Provider::Other("acme-llm".to_string()));
        assert_eq!(provider.as_str(), "acme-llm");
    }

    #[test]
    fn provider_deserializes_from_yaml_string() {
        let provider: Provider = serde_yaml::from_str("anthropic").unwrap();
        assert_eq!(provider, Provider::Anthropic);
    }
}
