//! Alert (§3.1) and its enrichment (§3.2).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::TaskKind;
use crate::RiskLevel;

/// A structured event produced by the SIEM, read-only to everything in the
/// core except the vector store adapter's `update_enrichment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,

    /// Absent on a malformed alert (spec.md §8 scenario S3).
    #[serde(default)]
    pub rule: Option<Rule>,

    #[serde(default)]
    pub agent: Option<Agent>,

    /// Arbitrary field bag: srcip, dstip, srcuser, process, file, etc.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub full_log: Option<String>,

    /// Present once C1 has embedded the alert.
    #[serde(default)]
    pub alert_vector: Option<Vec<f32>>,

    /// Present once C8/C10 have written a report back. Invariant: if this is
    /// `Some`, `alert_vector` is also `Some`.
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
}

impl Alert {
    /// A best-effort accessor for `data.*` string fields, used by the
    /// projection (§4.1) and the decision engine (§4.5).
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }

    pub fn host_name(&self) -> Option<&str> {
        self.agent.as_ref().map(|a| a.name.as_str())
    }

    pub fn is_processed(&self) -> bool {
        self.ai_analysis.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: u64,
    pub level: u8,
    pub description: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
}

/// `ai_analysis` as written back onto the alert (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub report_text: String,
    pub provider_id: String,
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub plan_summary: PlanSummary,
    pub graph_stats: GraphStats,
    pub processing_ms: u64,
    pub stage: ProcessingStage,
}

/// Query kinds used by the plan, and counts per kind (§3.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub counts: BTreeMap<TaskKind, u32>,
}

impl PlanSummary {
    pub fn record(&mut self, kind: TaskKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStats {
    pub entities_created: u32,
    pub relationships_created: u32,
    pub edges_skipped: u32,
    pub persisted: bool,
}

/// Terminal state a pipeline pass leaves an alert in (§7): every alert ends
/// in one of {fully enriched, partially enriched, unprocessable}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Complete,
    AnalysisFailed,
    GraphNotPersisted,
    Unprocessable,
}
