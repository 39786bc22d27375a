//! The retrieval Plan (§3.5), produced by the Decision Engine (C5) and
//! consumed by the Hybrid Retriever (C6).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    VectorKnn,
    KeywordTimeWindow,
    CypherTemplate,
}

/// Priority rank, lowest value first (§3.5): critical < high < medium < low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

/// The named query-template registry (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CypherTemplateName {
    AttackSourcePanorama,
    LateralMovementDetection,
    ProcessExecutionChain,
    FileInteractions,
    NetworkTopology,
    UserBehavior,
    TemporalCorrelation,
    IpReputation,
    ThreatLandscape,
}

impl CypherTemplateName {
    /// Hard result LIMIT (§6.3: "Each template has a hard result LIMIT
    /// (default 50)").
    pub fn default_limit(&self) -> usize {
        50
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskParams {
    VectorKnn {
        k: usize,
    },
    KeywordTimeWindow {
        keywords: Vec<String>,
        host: Option<String>,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
        size: usize,
    },
    CypherTemplate {
        name: CypherTemplateName,
        params: BTreeMap<String, serde_json::Value>,
        limit: usize,
    },
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::VectorKnn { .. } => TaskKind::VectorKnn,
            Self::KeywordTimeWindow { .. } => TaskKind::KeywordTimeWindow,
            Self::CypherTemplate { .. } => TaskKind::CypherTemplate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTask {
    pub priority: Priority,
    pub slot: Slot,
    pub params: TaskParams,
}

impl RetrievalTask {
    pub fn kind(&self) -> TaskKind {
        self.params.kind()
    }
}

/// An ordered list of retrieval tasks (§3.5). A plan always includes exactly
/// one `vector_knn` task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<RetrievalTask>,
}

impl Plan {
    /// Sort tasks by priority rank, stably (§4.6 step 1).
    pub fn sorted_by_priority(mut self) -> Self {
        self.tasks.sort_by_key(|t| t.priority);
        self
    }

    pub fn vector_knn_task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.kind() == TaskKind::VectorKnn).count()
    }
}
