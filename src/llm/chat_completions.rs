//! OpenAI Chat Completions API driver.
//!
//! Implements [`TextGenerator`] with a single non-streaming request to
//! `/v1/chat/completions` (or the Azure deployment URL).

use std::time::Duration;

use crate::error::{RagError, Result, is_transient_status};

use super::{LlmSettings, Message, TextGenerator};

/// Driver for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
    url: String,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .field("url", &self.url)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| RagError::BackendFatal(format!("http client: {e}")))?;
        let url = settings.provider.build_chat_url(&settings.base_url);
        Ok(Self {
            http,
            settings,
            url,
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for ChatCompletionsDriver {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": false,
            "messages": messages,
        });

        let mut rb = self.http.post(&self.url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", k)
            } else {
                rb.bearer_auth(k)
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let message = format!(
                "LLM returned {status}: {}",
                detail.chars().take(300).collect::<String>()
            );
            tracing::warn!(status = status.as_u16(), "LLM request failed");
            return Err(if is_transient_status(status.as_u16()) {
                RagError::BackendTransient(message)
            } else {
                RagError::BackendFatal(message)
            });
        }

        let v: serde_json::Value = resp.json().await?;
        extract_content(&v)
    }
}

/// Pull the assistant text out of a Chat Completions response body.
fn extract_content(v: &serde_json::Value) -> Result<String> {
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            RagError::BackendFatal("LLM response missing choices[0].message.content".to_string())
        })
}
