//! Error type shared by the embedding client and the LLM client.
//!
//! Mirrors `sx9-claude-sdk::error::ClaudeError`: one `thiserror` enum, an
//! `is_retryable()` helper the retry loop in each client consults.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Exhausted local retry/backoff (§4.1, §4.4 contract). Once this
    /// variant is produced, the caller surfaces it to the pipeline as a
    /// dependency-unavailable condition; it is never retried again here.
    #[error("unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Http(_) | Self::Api { status: 500..=599, .. }
        )
    }
}
