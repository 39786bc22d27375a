//! Threat Knowledge Graph schema (§3.4): node/edge types shared by the
//! Graph Store Adapter (C3) and the Graph Persister (C9).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Alert,
    Host,
    IpAddress,
    User,
    Process,
    File,
    Rule,
    ThreatIndicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    TriggeredOn,
    HasSourceIp,
    HasDestIp,
    InvolvesUser,
    InvolvesProcess,
    AccessesFile,
    MatchedRule,
    SimilarTo,
    Precedes,
    SpawnedBy,
    LoggedInto,
    CommunicatesWith,
    PartOf,
}

/// A node upsert-by-identity (§3.4 invariant: "Every node identity key is
/// unique; all writes use an upsert-by-identity").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntity {
    pub node_type: NodeType,
    pub identity: String,
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl GraphEntity {
    pub fn new(node_type: NodeType, identity: impl Into<String>) -> Self {
        Self { node_type, identity: identity.into(), attrs: BTreeMap::new() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Stable key used to dedup entities before upsert (SPEC_FULL §11).
    pub fn dedup_key(&self) -> (NodeType, &str) {
        (self.node_type, self.identity.as_str())
    }
}

/// An edge endpoint reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    pub node_type: NodeType,
    pub identity: String,
}

impl NodeRef {
    pub fn new(node_type: NodeType, identity: impl Into<String>) -> Self {
        Self { node_type, identity: identity.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub rel_type: RelationshipType,
    pub from: NodeRef,
    pub to: NodeRef,
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl GraphRelationship {
    pub fn new(rel_type: RelationshipType, from: NodeRef, to: NodeRef) -> Self {
        Self { rel_type, from, to, attrs: BTreeMap::new() }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Stable key used to dedup relationships before upsert (SPEC_FULL §11,
    /// spec.md §8 R2/S5). Two edges of the same type between the same
    /// endpoints are the same edge for idempotence purposes; the score on a
    /// `SIMILAR_TO` edge or the time gap on a `PRECEDES` edge is not part of
    /// the identity (a later write still overwrites the scalar attribute,
    /// per the §3.4 monotonic-attribute invariant for non-Alert nodes, and
    /// "Alert nodes are immutable after creation except for..." — attributes
    /// on the edge itself follow the same merge-or-create semantics).
    pub fn dedup_key(&self) -> (RelationshipType, String, String) {
        (self.rel_type, format!("{:?}:{}", self.from.node_type, self.from.identity), format!("{:?}:{}", self.to.node_type, self.to.identity))
    }
}

/// Result of an upsert batch (§4.3): created counts plus skipped edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpsertSummary {
    pub nodes_created: u32,
    pub relationships_created: u32,
    pub edges_skipped: u32,
}

/// Deduplicate entities by identity key, keeping the last write for each
/// (SPEC_FULL §11: cuts edges_created noise on repeated extraction from the
/// same alert within a single persist call).
pub fn dedup_entities(entities: Vec<GraphEntity>) -> Vec<GraphEntity> {
    let mut seen: BTreeMap<(NodeType, String), GraphEntity> = BTreeMap::new();
    for entity in entities {
        let key = (entity.node_type, entity.identity.clone());
        seen.insert(key, entity);
    }
    seen.into_values().collect()
}

/// Deduplicate relationships by (type, from, to), keeping the last write.
pub fn dedup_relationships(relationships: Vec<GraphRelationship>) -> Vec<GraphRelationship> {
    let mut seen: BTreeMap<(RelationshipType, String, String), GraphRelationship> = BTreeMap::new();
    for rel in relationships {
        let key = rel.dedup_key();
        seen.insert(key, rel);
    }
    seen.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_entities_keeps_one_per_identity() {
        let entities = vec![
            GraphEntity::new(NodeType::Host, "A1").with_attr("name", "web-01"),
            GraphEntity::new(NodeType::Host, "A1").with_attr("name", "web-01-renamed"),
            GraphEntity::new(NodeType::IpAddress, "203.0.113.45"),
        ];
        let deduped = dedup_entities(entities);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn dedup_relationships_collapses_duplicate_edges() {
        let from = NodeRef::new(NodeType::Alert, "a1");
        let to = NodeRef::new(NodeType::Alert, "a0");
        let rels = vec![
            GraphRelationship::new(RelationshipType::SimilarTo, from.clone(), to.clone()).with_attr("score", 0.71),
            GraphRelationship::new(RelationshipType::SimilarTo, from, to).with_attr("score", 0.95),
        ];
        let deduped = dedup_relationships(rels);
        assert_eq!(deduped.len(), 1);
    }
}
