//! Provider registry for managing model client credentials and creation.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use super::anthropic::AnthropicClient;
use super::client::{ModelClient, Provider};
use super::openai::OpenAICompatibleClient;

/// Default base URLs for each provider.
pub mod defaults {
    pub const ANTHROPIC: &str = "https://api.anthropic.com";
    pub const OLLAMA: &str = "http://localhost:11434/v1";
    pub const OPENAI: &str = "https://api.openai.com/v1";
    pub const OPENROUTER: &str = "https://openrouter.ai/api/v1";
}

/// Registry of model provider credentials.
///
/// Stores API keys from environment variables and creates client instances
/// on-demand with optional base_url overrides from configuration.
///
/// The registry holds a shared `reqwest::Client` that is passed to all
/// clients, enabling connection pooling across requests.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    api_keys: HashMap<Provider, String>,
    client: Client,
}

/// Errors from building a model client.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no api key configured for provider '{0}'")]
    MissingApiKey(Provider),

    #[error("provider '{0}' requires an explicit base_url")]
    MissingBaseUrl(Provider),
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the registry with API keys from environment variables.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            registry.api_keys.insert(Provider::Anthropic, api_key);
            info!("Found Anthropic API key");
        }

        // Ollama doesn't need an API key
        registry.api_keys.insert(Provider::Ollama, String::new());

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            registry.api_keys.insert(Provider::OpenAI, api_key);
            info!("Found OpenAI API key");
        }

        if let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") {
            registry.api_keys.insert(Provider::OpenRouter, api_key);
            info!("Found OpenRouter API key");
        }

        if !registry.has_cloud_provider() {
            warn!(
                "No cloud model providers configured. \
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or OPENROUTER_API_KEY."
            );
        }

        registry
    }

    /// Register an API key for a provider, replacing any existing one.
    pub fn set_api_key(&mut self, provider: Provider, api_key: impl Into<String>) {
        self.api_keys.insert(provider, api_key.into());
    }

    /// Whether at least one cloud provider has a credential.
    #[must_use]
    pub fn has_cloud_provider(&self) -> bool {
        self.api_keys
            .keys()
            .any(|p| !matches!(p, Provider::Ollama))
    }

    /// Create a model client for the given provider.
    ///
    /// `base_url` overrides the provider default when set.
    pub fn create(
        &self,
        provider: &Provider,
        base_url: Option<&str>,
    ) -> Result<Arc<dyn ModelClient>, RegistryError> {
        match provider {
            Provider::Anthropic => {
                let api_key = self
                    .api_keys
                    .get(provider)
                    .cloned()
                    .ok_or_else(|| RegistryError::MissingApiKey(provider.clone()))?;
                let base_url = base_url.unwrap_or(defaults::ANTHROPIC).to_string();
                Ok(Arc::new(AnthropicClient::new(
                    self.client.clone(),
                    api_key,
                    base_url,
                )))
            }
            Provider::Ollama => {
                let base_url = base_url.unwrap_or(defaults::OLLAMA).to_string();
                Ok(Arc::new(OpenAICompatibleClient::new(
                    self.client.clone(),
                    base_url,
                    None,
                )))
            }
            Provider::OpenAI | Provider::OpenRouter => {
                let api_key = self
                    .api_keys
                    .get(provider)
                    .cloned()
                    .ok_or_else(|| RegistryError::MissingApiKey(provider.clone()))?;
                let base_url = base_url
                    .unwrap_or(match provider {
                        Provider::OpenAI => defaults::OPENAI,
                        _ => defaults::OPENROUTER,
                    })
                    .to_string();
                Ok(Arc::new(OpenAICompatibleClient::new(
                    self.client.clone(),
                    base_url,
                    Some(api_key),
                )))
            }
            Provider::Other(_) => {
                // Unknown providers are assumed OpenAI-compatible but need an
                // explicit endpoint; a key is optional.
                let base_url = base_url
                    .ok_or_else(|| RegistryError::MissingBaseUrl(provider.clone()))?
                    .to_string();
                let api_key = self.api_keys.get(provider).cloned();
                Ok(Arc::new(OpenAICompatibleClient::new(
                    self.client.clone(),
                    base_url,
                    api_key,
                )))
            }
        }
    }
}
