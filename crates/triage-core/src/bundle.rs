//! The Context Bundle (§3.3): a typed, compile-time-known map from slot name
//! to evidence records, gathered by C6 and consumed by C7/C9.
//!
//! Design note (spec.md §9): replaces a duck-typed `context_data` dict with
//! sometimes-present keys. Unknown slots are a compile error, not a runtime
//! surprise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Every recognized evidence slot (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    SimilarAlerts,
    AttackPaths,
    LateralMovement,
    TemporalSequences,
    IpReputation,
    UserBehavior,
    ProcessChains,
    FileInteractions,
    NetworkTopology,
    ThreatLandscape,
    HostMetrics,
    ProcessData,
    NetworkLogs,
    ProtocolLogs,
}

impl Slot {
    /// Graph-sourced slots (§4.6 step 5, §4.7 cypher-path rendering trigger).
    pub fn is_graph(&self) -> bool {
        matches!(
            self,
            Self::AttackPaths
                | Self::LateralMovement
                | Self::TemporalSequences
                | Self::IpReputation
                | Self::UserBehavior
                | Self::ProcessChains
                | Self::FileInteractions
                | Self::NetworkTopology
                | Self::ThreatLandscape
        )
    }

    /// The four slots whose non-emptiness flips `graph_present` (§4.7).
    pub fn gates_graph_present(&self) -> bool {
        matches!(
            self,
            Self::AttackPaths | Self::LateralMovement | Self::TemporalSequences | Self::ProcessChains
        )
    }

    pub fn header(&self) -> &'static str {
        match self {
            Self::SimilarAlerts => "Similar prior alerts",
            Self::AttackPaths => "Attack source panorama",
            Self::LateralMovement => "Lateral movement",
            Self::TemporalSequences => "Temporal sequences",
            Self::IpReputation => "IP reputation",
            Self::UserBehavior => "User behavior",
            Self::ProcessChains => "Process execution chains",
            Self::FileInteractions => "File interactions",
            Self::NetworkTopology => "Network topology",
            Self::ThreatLandscape => "Threat landscape",
            Self::HostMetrics => "Host metrics",
            Self::ProcessData => "Process data",
            Self::NetworkLogs => "Network logs",
            Self::ProtocolLogs => "Protocol logs",
        }
    }
}

/// Where one piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    VectorKnn,
    KeywordTimeWindow,
    Graph,
}

/// One piece of evidence. `graph_path` is populated only for
/// `EvidenceSource::Graph` records; `score` is populated for vector/graph
/// records that carry a similarity or relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub source: EvidenceSource,
    pub score: Option<f32>,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub graph_path: Option<GraphPath>,
}

impl EvidenceRecord {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// One Cypher-style node in a rendered path (§6.5 grammar: `node`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_type: String,
    pub id: String,
    pub attrs: BTreeMap<String, String>,
}

/// One Cypher-style edge in a rendered path (§6.5 grammar: `edge`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub rel_type: String,
    pub summary: Option<String>,
    pub attrs: BTreeMap<String, String>,
}

/// A (possibly multi-hop) traversal path: `nodes.len() == edges.len() + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphPath {
    pub fn single_hop(from: GraphNode, edge: GraphEdge, to: GraphNode) -> Self {
        Self { nodes: vec![from, to], edges: vec![edge] }
    }

    /// `false` if the path is malformed (wrong node/edge count relationship);
    /// the formatter skips rendering such a path rather than panicking.
    pub fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.len() == self.edges.len() + 1
    }
}

/// Result for one slot: its records, capped, plus whether the retrieval task
/// that would have populated it failed (§4.6 step 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotResult {
    pub records: Vec<EvidenceRecord>,
    pub failed: bool,
}

/// The typed context bundle (§3.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    slots: BTreeMap<Slot, SlotResult>,
}

impl ContextBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Option<&SlotResult> {
        self.slots.get(&slot)
    }

    pub fn records(&self, slot: Slot) -> &[EvidenceRecord] {
        self.slots.get(&slot).map(|s| s.records.as_slice()).unwrap_or(&[])
    }

    /// Insert records into a slot, capping at `result_cap` (§4.6 step 4,
    /// invariant P8). Extra records beyond the cap are dropped, not merged
    /// with any already present.
    pub fn set_records(&mut self, slot: Slot, mut records: Vec<EvidenceRecord>, result_cap: usize) {
        records.truncate(result_cap);
        self.slots.entry(slot).or_default().records = records;
        self.slots.get_mut(&slot).unwrap().failed = false;
    }

    pub fn mark_failed(&mut self, slot: Slot) {
        let entry = self.slots.entry(slot).or_default();
        entry.failed = true;
    }

    pub fn is_slot_populated(&self, slot: Slot) -> bool {
        self.slots.get(&slot).map(|s| !s.records.is_empty()).unwrap_or(false)
    }

    /// `graph_hit_count` (§4.6 step 5): total records across all graph-sourced slots.
    pub fn graph_hit_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(slot, _)| slot.is_graph())
            .map(|(_, result)| result.records.len())
            .sum()
    }

    /// `graph_present` (§4.7): any of the four gating slots is non-empty.
    pub fn graph_present(&self) -> bool {
        self.slots
            .iter()
            .any(|(slot, result)| slot.gates_graph_present() && !result.records.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &SlotResult)> {
        self.slots.iter().map(|(slot, result)| (*slot, result))
    }

    pub fn was_task_skipped(&self, slot: Slot) -> bool {
        !self.slots.contains_key(&slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_cap_truncates() {
        let mut bundle = ContextBundle::new();
        let records: Vec<_> = (0..10)
            .map(|i| EvidenceRecord {
                source: EvidenceSource::VectorKnn,
                score: Some(i as f32),
                fields: serde_json::Map::new(),
                graph_path: None,
            })
            .collect();
        bundle.set_records(Slot::SimilarAlerts, records, 3);
        assert_eq!(bundle.records(Slot::SimilarAlerts).len(), 3);
    }

    #[test]
    fn graph_present_requires_gating_slot() {
        let mut bundle = ContextBundle::new();
        assert!(!bundle.graph_present());
        bundle.set_records(
            Slot::IpReputation,
            vec![EvidenceRecord {
                source: EvidenceSource::Graph,
                score: None,
                fields: serde_json::Map::new(),
                graph_path: None,
            }],
            50,
        );
        assert!(!bundle.graph_present(), "ip_reputation does not gate graph_present");
        bundle.set_records(
            Slot::AttackPaths,
            vec![EvidenceRecord {
                source: EvidenceSource::Graph,
                score: None,
                fields: serde_json::Map::new(),
                graph_path: None,
            }],
            50,
        );
        assert!(bundle.graph_present());
    }
}
