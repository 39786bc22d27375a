//! LLM provider abstractions (§4.4, §9: "Model as a closed tagged-variant
//! `Provider = {ProviderA, ProviderB, …}`").
//!
//! Mirrors `sx9_claude_sdk::providers`: one trait all concrete providers
//! implement, selected at construction by a closed enum rather than a
//! dynamic provider string.

pub mod anthropic;
pub mod openai;

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::{ChatCompletion, ChatMessage};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32, temperature: f32) -> Result<ChatCompletion>;
}

/// Closed set of supported providers (§4.4: "selected at construction from
/// a closed set (two or more chat providers)").
pub enum Provider {
    Anthropic(anthropic::AnthropicProvider),
    OpenAi(openai::OpenAiProvider),
}

#[async_trait]
impl LlmProvider for Provider {
    fn provider_id(&self) -> &str {
        match self {
            Self::Anthropic(p) => p.provider_id(),
            Self::OpenAi(p) => p.provider_id(),
        }
    }

    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32, temperature: f32) -> Result<ChatCompletion> {
        match self {
            Self::Anthropic(p) => p.complete(messages, max_tokens, temperature).await,
            Self::OpenAi(p) => p.complete(messages, max_tokens, temperature).await,
        }
    }
}
