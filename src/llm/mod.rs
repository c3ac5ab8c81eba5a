//! Model provider clients for chat completions.

mod anthropic;
mod client;
mod error;
mod openai;
mod registry;
mod types;

pub use anthropic::AnthropicClient;
pub use client::{ModelClient, Provider};
pub use error::{FailureClass, LLMError};
pub use openai::OpenAICompatibleClient;
pub use registry::{ProviderRegistry, RegistryError, defaults};
pub use types::{Completion, CompletionRequest, Role, Turn, Usage};
