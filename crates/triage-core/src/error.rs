//! Shared error type.
//!
//! Mirrors the teacher SDK's `ClaudeError` (one `thiserror` enum per
//! boundary, `is_retryable()` for the adapters that retry locally). This is
//! the error surfaced *past* an adapter boundary: transient retries happen
//! inside C1–C4 and never reach here (§7 policy).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TriageError>;

#[derive(Debug, Error)]
pub enum TriageError {
    /// An external dependency (embedding, vector store, graph store, LLM)
    /// is down after local retry was exhausted, or was never reachable.
    #[error("{dependency} unavailable: {reason}")]
    Unavailable { dependency: &'static str, reason: String },

    /// A required alert field was missing or unparsable.
    #[error("malformed alert: {0}")]
    MalformedAlert(String),

    /// A store operation completed but left data in an inconsistent state
    /// (e.g. an edge dropped because an endpoint could not be merged).
    /// Always non-fatal; carried for metrics/logging.
    #[error("store inconsistency: {0}")]
    StoreInconsistency(String),

    /// Shutdown is in progress; propagate up to the scheduler.
    #[error("cancelled")]
    Cancelled,
}

impl TriageError {
    pub fn unavailable(dependency: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable { dependency, reason: reason.into() }
    }

    /// Whether the alert processor should still attempt subsequent pipeline
    /// steps after this error (everything except `Cancelled`).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
