//! Embedding Client (C1) and LLM Client (C4): the two outbound model-provider
//! adapters in the pipeline (§4.1, §4.4).

mod backoff;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod providers;

pub use embedding::{EmbeddingClient, HttpEmbeddingClient};
pub use error::{ProviderError, Result};
pub use llm::{ChatCompletion, ChatMessage, LlmClient, Role};
