//! Shared data model for the alert triage engine.
//!
//! Holds the types every other crate in the workspace builds on: the alert
//! and its enrichment (§3.1–3.2), the context bundle (§3.3), the retrieval
//! plan (§3.5), the shared error enum, and the runtime configuration.

pub mod alert;
pub mod bundle;
pub mod config;
pub mod error;
pub mod graph;
pub mod plan;

pub use alert::{Agent, AiAnalysis, Alert, GraphStats, PlanSummary, ProcessingStage, Rule};
pub use bundle::{ContextBundle, EvidenceRecord, EvidenceSource, GraphEdge, GraphNode, GraphPath, Slot, SlotResult};
pub use config::Config;
pub use error::{Result, TriageError};
pub use graph::{dedup_entities, dedup_relationships, GraphEntity, GraphRelationship, NodeRef, NodeType, RelationshipType, UpsertSummary};
pub use plan::{CypherTemplateName, Plan, Priority, RetrievalTask, TaskKind, TaskParams};

/// Cosine-similarity risk/severity classification extracted from an LLM report.
///
/// Order matters: `Ord` ranks severity so the highest-severity token can be
/// picked when more than one candidate appears in a report (see
/// [`RiskLevel::highest`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unknown,
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Parse a risk-level token from free text, case-insensitively.
    pub fn parse_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "informational" => Some(Self::Informational),
            _ => None,
        }
    }

    /// Returns the highest-severity level among `candidates`, or `None` if empty.
    ///
    /// Per SPEC_FULL §11 / spec.md §9 open question: when multiple candidate
    /// risk tokens appear in the first 500 characters of a report, this
    /// implementation picks the highest severity rather than the first match.
    pub fn highest(candidates: impl IntoIterator<Item = Self>) -> Option<Self> {
        candidates.into_iter().max()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Informational => "informational",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
