//! OpenAI-compatible chat-completions provider; the second member of the
//! closed provider set (§4.4).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::llm::{ChatCompletion, ChatMessage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    http_client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { http_client, api_key, model: model.into(), base_url: DEFAULT_BASE_URL.to_string() })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatRequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl super::LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32, temperature: f32) -> Result<ChatCompletion> {
        let turns: Vec<ChatRequestMessage> = messages.iter().map(|m| ChatRequestMessage { role: m.role.as_api_str(), content: &m.content }).collect();
        let request = ChatRequest { model: &self.model, max_tokens, temperature, messages: turns };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response.headers().get("retry-after").and_then(|v| v.to_str().ok()).and_then(|s| s.parse().ok()).unwrap_or(60);
            return Err(ProviderError::RateLimited { retry_after_seconds: retry_after });
        }
        if !status.is_success() {
            return Err(ProviderError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default();

        Ok(ChatCompletion { text, tokens_in: parsed.usage.prompt_tokens, tokens_out: parsed.usage.completion_tokens, provider_id: self.provider_id().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::{ChatMessage, LlmClient};
    use crate::providers::Provider;

    #[tokio::test]
    async fn complete_posts_to_chat_completions_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "looks like a brute-force attempt"}}],
                "usage": {"prompt_tokens": 40, "completion_tokens": 8},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(SecretString::new("test-key".to_string()), "gpt-test").unwrap().with_base_url(server.uri());
        let client = LlmClient::new(Provider::OpenAi(provider), Duration::from_secs(5));

        let completion = client.complete(&[ChatMessage::user("triage this alert")], 256, 0.1).await.unwrap();

        assert_eq!(completion.text, "looks like a brute-force attempt");
        assert_eq!(completion.tokens_in, 40);
        assert_eq!(completion.tokens_out, 8);
    }

    #[tokio::test]
    async fn complete_does_not_retry_a_non_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(SecretString::new("test-key".to_string()), "gpt-test").unwrap().with_base_url(server.uri());
        let client = LlmClient::new(Provider::OpenAi(provider), Duration::from_secs(5));

        let result = client.complete(&[ChatMessage::user("triage this alert")], 256, 0.1).await;

        assert!(result.is_err());
    }
}
