//! LLM Client (C4, §4.4).

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backoff::retry_with_backoff;
use crate::error::Result;
use crate::providers::{LlmProvider, Provider};
use crate::providers::{anthropic::AnthropicProvider, openai::OpenAiProvider};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// §6.4: temperature <= 0.2, max output tokens <= 2048.
pub const MAX_TEMPERATURE: f32 = 0.2;
pub const MAX_OUTPUT_TOKENS: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub provider_id: String,
}

/// Provider-agnostic chat completion client (§4.4). Owns retry/backoff for
/// transient provider failures; a bounded timeout wraps each call.
pub struct LlmClient {
    provider: Provider,
    timeout: Duration,
    max_attempts: u32,
    initial_delay: Duration,
}

impl LlmClient {
    pub fn new(provider: Provider, timeout: Duration) -> Self {
        Self { provider, timeout, max_attempts: DEFAULT_MAX_ATTEMPTS, initial_delay: DEFAULT_INITIAL_DELAY }
    }

    pub fn anthropic(api_key: SecretString, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::new(Provider::Anthropic(AnthropicProvider::new(api_key, model)?), timeout))
    }

    pub fn openai(api_key: SecretString, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::new(Provider::OpenAi(OpenAiProvider::new(api_key, model)?), timeout))
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// `complete(messages) -> {text, tokens_in, tokens_out, provider_id}` (§4.4).
    /// Clamps temperature/max_tokens to the §6.4 ceiling, bounds the whole
    /// call by `timeout`, and retries transient failures with backoff.
    pub async fn complete(&self, messages: &[ChatMessage], max_tokens: u32, temperature: f32) -> Result<ChatCompletion> {
        let max_tokens = max_tokens.min(MAX_OUTPUT_TOKENS);
        let temperature = temperature.min(MAX_TEMPERATURE);
        debug!(provider = self.provider_id(), max_tokens, temperature, "completing chat request");

        let provider = &self.provider;
        retry_with_backoff("llm", self.max_attempts, self.initial_delay, || async {
            tokio::time::timeout(self.timeout, provider.complete(messages, max_tokens, temperature))
                .await
                .unwrap_or_else(|_| Err(crate::error::ProviderError::Timeout(self.timeout)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_and_tokens_are_clamped() {
        assert!(MAX_TEMPERATURE <= 0.2);
        assert!(MAX_OUTPUT_TOKENS <= 2048);
    }
}
