//! Anthropic Messages API provider, adapted from `sx9_claude_sdk::client`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::llm::{ChatCompletion, ChatMessage, Role};

const API_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http_client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { http_client, api_key, model: model.into(), base_url: API_BASE_URL.to_string() })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[async_trait]
impl super::LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32, temperature: f32) -> Result<ChatCompletion> {
        let system = messages.iter().find(|m| m.role == Role::System).map(|m| m.content.as_str());
        let turns: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage { role: if m.role == Role::User { "user" } else { "assistant" }, content: &m.content })
            .collect();

        let request = AnthropicRequest { model: &self.model, max_tokens, temperature, system, messages: turns };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response.headers().get("retry-after").and_then(|v| v.to_str().ok()).and_then(|s| s.parse().ok()).unwrap_or(60);
            return Err(ProviderError::RateLimited { retry_after_seconds: retry_after });
        }
        if !status.is_success() {
            let message = match response.json::<AnthropicErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("HTTP {status}"),
            };
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }

        let parsed: AnthropicResponse = response.json().await?;
        let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");

        Ok(ChatCompletion { text, tokens_in: parsed.usage.input_tokens, tokens_out: parsed.usage.output_tokens, provider_id: self.provider_id().to_string() })
    }
}
