//! LLM text-generation capability.
//!
//! The [`TextGenerator`] trait is the narrow interface the answering and
//! indexing pipelines depend on; [`ChatCompletionsDriver`] implements it
//! against any OpenAI-compatible Chat Completions endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use graphrag_qa::llm::{ChatCompletionsDriver, LlmSettings, Message, Provider, TextGenerator};
//!
//! let settings = LlmSettings {
//!     base_url: "https://openrouter.ai/api".to_string(),
//!     api_key: Some("sk-...".to_string()),
//!     model: "google/gemini-2.0-flash-001".to_string(),
//!     provider: Provider::OpenRouter,
//!     request_timeout_secs: 60,
//! };
//! let driver = ChatCompletionsDriver::new(settings)?;
//! let text = driver.complete(vec![Message::user("Hello")]).await?;
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Per-call HTTP timeout.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// A message in a prompt.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Single-call text generation.
///
/// Implementations classify failures as
/// [`RagError::BackendTransient`](crate::error::RagError::BackendTransient) when a retry may help and
/// [`RagError::BackendFatal`](crate::error::RagError::BackendFatal) otherwise.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    async fn complete(&self, messages: Vec<Message>) -> crate::error::Result<String>;
}
