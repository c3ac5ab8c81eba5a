//! Anthropic model client with native API format.

use async_trait::async_trait;
use reqwest::Client;

use super::client::ModelClient;
use super::error::LLMError;
use super::types::{Completion, CompletionRequest, Role, Turn, Usage};

/// Anthropic client with native API format.
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl AnthropicClient {
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";

    /// Default `max_tokens` when the request does not specify one; the
    /// Anthropic API requires the field.
    const DEFAULT_MAX_TOKENS: u32 = 4096;

    #[must_use]
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LLMError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = to_request(&request);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await?;

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
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(serde::Serialize)]
struct RequestMessage {
    role: String,
    content: String,
}

#[derive(serde::Deserialize)]
struct Response {
    id: String,
    content: Vec<Content>,
    stop_reason: Option<String>,
    usage: Option<ResponseUsage>,
}

#[derive(serde::Deserialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(serde::Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Conversions
// ============================================================================

fn to_request(request: &CompletionRequest) -> Request {
    let mut system = request.system.clone();
    let mut messages = Vec::new();

    // System-role turns fold into the system field; the last one wins.
    for turn in &request.turns {
        match turn.role {
            Role::System => system = Some(turn.content.clone()),
            Role::User | Role::Assistant => messages.push(RequestMessage {
                role: turn.role.to_string(),
                content: turn.content.clone(),
            }),
        }
    }

    Request {
        model: request.model.clone(),
        max_tokens: request
            .max_tokens
            .unwrap_or(AnthropicClient::DEFAULT_MAX_TOKENS),
        system,
        messages,
        temperature: request.temperature,
    }
}

fn from_response(response: Response) -> Result<Completion, LLMError> {
    let content = response
        .content
        .into_iter()
        .filter(|c| c.content_type == "text")
        .map(|c| c.text)
        .collect::<Vec<_>>()
        .join("");

    if content.is_empty() {
        return Err(LLMError::EmptyResponse);
    }

    Ok(Completion {
        id: response.id,
        turn: Turn::assistant(content),
        stop_reason: response.stop_reason,
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_folds_system_turns_into_system_field() {
        let request = CompletionRequest::new(
            "claude-sonnet-4-20250514",
            Some("Be terse.".to_string()),
            vec![
                Turn::system("Override instruction"),
                Turn::user("Hello"),
                Turn::assistant("Hi"),
            ],
        );

        let wire = to_request(&request);
        assert_eq!(wire.system.as_deref(), Some("Override instruction"));
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.messages[1].role, "assistant");
        assert_eq!(wire.max_tokens, AnthropicClient::DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn response_joins_text_blocks() {
        let json = r#"{
            "id": "msg_01",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "text": ""},
                {"type": "text", "text": " world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;

        let response: Response = serde_json::from_str(json).unwrap();
        let completion = from_response(response).unwrap();

        assert_eq!(completion.id, "msg_01");
        assert_eq!(completion.turn.role, Role::Assistant);
        assert_eq!(completion.turn.content, "Hello world");
        assert_eq!(completion.stop_reason.as_deref(), Some("end_turn"));

        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn empty_content_is_an_error() {
        let json = r#"{"id": "msg_02", "content": [], "stop_reason": null}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert!(matches!(
            from_response(response),
            Err(LLMError::EmptyResponse)
        ));
    }
}
