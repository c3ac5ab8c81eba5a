//! OpenAI-compatible model client.
//!
//! Works with OpenAI, OpenRouter, Ollama, and other compatible APIs.

use async_trait::async_trait;
use reqwest::Client;

use super::client::ModelClient;
use super::error::LLMError;
use super::types::{Completion, CompletionRequest, Role, Turn, Usage};

/// OpenAI-compatible client (works for OpenAI, OpenRouter, Ollama).
pub struct OpenAICompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleClient {
    #[must_use]
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAICompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = to_request(&request);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        let body: Response = response.json().await?;
        from_response(body)
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(serde::Serialize)]
struct RequestMessage {
    role: String,
    content: String,
}

#[derive(serde::Deserialize)]
struct Response {
    id: String,
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Conversions
// ============================================================================

fn to_request(request: &CompletionRequest) -> Request {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);

    // OpenAI-compatible APIs carry the system instruction as the first message.
    if let Some(system) = &request.system {
        messages.push(RequestMessage {
            role: Role::System.to_string(),
            content: system.clone(),
        });
    }

    for turn in &request.turns {
        messages.push(RequestMessage {
            role: turn.role.to_string(),
            content: turn.content.clone(),
        });
    }

    Request {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

fn from_response(response: Response) -> Result<Completion, LLMError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LLMError::EmptyResponse);
    };

    let content = choice.message.content.unwrap_or_default();
    if content.is_empty() {
        return Err(LLMError::EmptyResponse);
    }

    Ok(Completion {
        id: response.id,
        turn: Turn::assistant(content),
        stop_reason: choice.finish_reason,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}
