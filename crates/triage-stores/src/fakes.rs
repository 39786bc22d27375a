//! In-memory fakes for the vector and graph store adapters (SPEC_FULL §10.4,
//! behind the `test-support` feature). Grounded on the `DashMap`-backed node
//! registry in `sx9-cdn-threat-intel`'s `ThreatIntelCdnNode`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use triage_core::{AiAnalysis, Alert, EvidenceRecord, EvidenceSource, GraphEntity, GraphRelationship, NodeType, RelationshipType, UpsertSummary};

use crate::error::StoreResult;
use crate::graph_store::{identity_key, GraphStoreAdapter};
use crate::vector_store::{KeywordTimeWindowQuery, KnnFilter, VectorStoreAdapter};

/// Flattens a node's attrs plus its identity property into a plain JSON
/// object, mirroring the real HTTP adapter's row shape closely enough for
/// `templates::row_to_evidence` to treat fake rows the same as live ones.
fn node_properties(entity: &GraphEntity) -> serde_json::Map<String, serde_json::Value> {
    let mut props: serde_json::Map<String, serde_json::Value> = entity.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    props.insert(identity_key(entity.node_type).to_string(), serde_json::Value::String(entity.identity.clone()));
    props
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Drop-in for `VectorStoreAdapter` backed by a `DashMap` of alerts, for
/// unit and integration tests that should not reach the network.
#[derive(Default)]
pub struct InMemoryVectorStore {
    alerts: DashMap<String, Alert>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alert: Alert) {
        self.alerts.insert(alert.id.clone(), alert);
    }
}

#[async_trait]
impl VectorStoreAdapter for InMemoryVectorStore {
    async fn list_unprocessed(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        let mut unprocessed: Vec<Alert> = self.alerts.iter().filter(|entry| !entry.value().is_processed()).map(|entry| entry.value().clone()).collect();
        unprocessed.sort_by_key(|alert| alert.timestamp);
        unprocessed.truncate(limit);
        Ok(unprocessed)
    }

    async fn knn(&self, vector: &[f32], k: usize, filter: KnnFilter) -> StoreResult<Vec<EvidenceRecord>> {
        let mut scored: Vec<(f32, Alert)> = self
            .alerts
            .iter()
            .filter(|entry| !filter.require_ai_analysis || entry.value().ai_analysis.is_some())
            .filter_map(|entry| {
                let alert = entry.value().clone();
                alert.alert_vector.as_ref().map(|v| (cosine_similarity(vector, v), alert))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(score, alert)| EvidenceRecord {
                source: EvidenceSource::VectorKnn,
                score: Some(score),
                fields: serde_json::to_value(&alert).ok().and_then(|v| v.as_object().cloned()).unwrap_or_default(),
                graph_path: None,
            })
            .collect())
    }

    async fn keyword_time_window(&self, query: KeywordTimeWindowQuery) -> StoreResult<Vec<EvidenceRecord>> {
        let mut matches: Vec<Alert> = self
            .alerts
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|alert| alert.timestamp >= query.from_ts && alert.timestamp <= query.to_ts)
            .filter(|alert| query.host.as_deref().map_or(true, |host| alert.host_name().as_deref() == Some(host)))
            .filter(|alert| {
                let haystack = serde_json::to_string(&alert.data).unwrap_or_default().to_lowercase();
                let log = alert.full_log.clone().unwrap_or_default().to_lowercase();
                let description = alert.rule.as_ref().map(|r| r.description.to_lowercase()).unwrap_or_default();
                query.keywords.iter().any(|kw| {
                    let kw = kw.to_lowercase();
                    haystack.contains(&kw) || log.contains(&kw) || description.contains(&kw)
                })
            })
            .collect();
        matches.sort_by_key(|alert| std::cmp::Reverse(alert.timestamp));
        matches.truncate(query.size);
        Ok(matches
            .into_iter()
            .map(|alert| EvidenceRecord {
                source: EvidenceSource::KeywordTimeWindow,
                score: None,
                fields: serde_json::to_value(&alert).ok().and_then(|v| v.as_object().cloned()).unwrap_or_default(),
                graph_path: None,
            })
            .collect())
    }

    async fn update_enrichment(&self, alert_id: &str, vector: &[f32], analysis: &AiAnalysis) -> StoreResult<()> {
        if let Some(mut entry) = self.alerts.get_mut(alert_id) {
            entry.alert_vector = Some(vector.to_vec());
            entry.ai_analysis = Some(analysis.clone());
        }
        Ok(())
    }

    async fn ensure_index_template(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Drop-in for `GraphStoreAdapter`, tracking created nodes/edges in memory
/// so tests can assert on idempotence (spec.md §8 S5, R2) without a network
/// round trip.
pub struct InMemoryGraphStore {
    nodes: DashMap<(triage_core::NodeType, String), GraphEntity>,
    edges: DashMap<(triage_core::RelationshipType, String, String), GraphRelationship>,
    available: Arc<AtomicU32>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self { nodes: DashMap::new(), edges: DashMap::new(), available: Arc::new(AtomicU32::new(1)) }
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the fake into degraded mode, for exercising the §4.3 sentinel
    /// contract without standing up a real HTTP failure.
    pub fn set_available(&self, available: bool) {
        self.available.store(available as u32, Ordering::SeqCst);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Answers the `attack_source_panorama` template shape: alerts that
    /// share `$src_ip` via a `HAS_SOURCE_IP` edge, joined with whatever else
    /// each matched alert touches (excluding its `MATCHED_RULE` edge).
    fn attack_source_panorama_rows(&self, params: &serde_json::Value) -> Vec<serde_json::Value> {
        let Some(src_ip) = params.get("src_ip").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Some(ip_node) = self.nodes.get(&(NodeType::IpAddress, src_ip.to_string())) else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for edge in self.edges.iter() {
            let rel = edge.value();
            if rel.rel_type != RelationshipType::HasSourceIp || rel.to.identity != ip_node.identity {
                continue;
            }
            let Some(alert_node) = self.nodes.get(&(NodeType::Alert, rel.from.identity.clone())) else {
                continue;
            };
            for other in self.edges.iter() {
                let other_rel = other.value();
                if other_rel.rel_type == RelationshipType::MatchedRule || other_rel.from.identity != alert_node.identity || other_rel.from.node_type != NodeType::Alert {
                    continue;
                }
                let Some(target) = self.nodes.get(&(other_rel.to.node_type, other_rel.to.identity.clone())) else {
                    continue;
                };
                let mut fields = node_properties(&alert_node);
                fields.extend(node_properties(&target));
                rows.push(serde_json::Value::Object(fields));
            }
        }
        rows
    }

    /// Answers the `temporal_correlation` template shape: alerts `TRIGGERED_ON`
    /// the given host, matched by host identity or (to tolerate callers that
    /// still key on the agent's display name) by its `name` attribute.
    fn temporal_correlation_rows(&self, params: &serde_json::Value) -> Vec<serde_json::Value> {
        let Some(host) = params.get("host").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Some(host_node) = self.nodes.iter().find(|entry| {
            let (node_type, identity) = entry.key();
            *node_type == NodeType::Host && (identity.as_str() == host || entry.value().attrs.get("name").and_then(|v| v.as_str()) == Some(host))
        }) else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for edge in self.edges.iter() {
            let rel = edge.value();
            if rel.rel_type != RelationshipType::TriggeredOn || rel.to.identity != host_node.identity {
                continue;
            }
            let Some(alert_node) = self.nodes.get(&(NodeType::Alert, rel.from.identity.clone())) else {
                continue;
            };
            let mut fields = node_properties(&alert_node);
            fields.extend(node_properties(&host_node));
            rows.push(serde_json::Value::Object(fields));
        }
        rows
    }
}

#[async_trait]
impl GraphStoreAdapter for InMemoryGraphStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) != 0
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        if !self.is_available() {
            return Err(crate::error::StoreError::Unavailable("graph store unavailable".to_string()));
        }
        Ok(())
    }

    async fn run(&self, query: &str, params: serde_json::Value, _timeout: std::time::Duration) -> StoreResult<Vec<serde_json::Value>> {
        if !self.is_available() {
            return Err(crate::error::StoreError::Unavailable("graph store unavailable".to_string()));
        }
        if query.contains("IpAddress {address: $src_ip})<-[:HAS_SOURCE_IP]-(a:Alert)") {
            return Ok(self.attack_source_panorama_rows(&params));
        }
        if query.contains("TRIGGERED_ON]->(h:Host {agent_id: $host})") {
            return Ok(self.temporal_correlation_rows(&params));
        }
        Ok(Vec::new())
    }

    async fn upsert(&self, entities: Vec<GraphEntity>, relationships: Vec<GraphRelationship>) -> StoreResult<UpsertSummary> {
        if !self.is_available() {
            return Err(crate::error::StoreError::Unavailable("graph store unavailable".to_string()));
        }

        let entities = triage_core::dedup_entities(entities);
        let relationships = triage_core::dedup_relationships(relationships);

        let mut summary = UpsertSummary::default();
        for entity in entities {
            let key = (entity.node_type, entity.identity.clone());
            if self.nodes.insert(key, entity).is_none() {
                summary.nodes_created += 1;
            }
        }
        for rel in relationships {
            let from_type = rel.from.node_type;
            let from_id = rel.from.identity.clone();
            let to_type = rel.to.node_type;
            let to_id = rel.to.identity.clone();
            if !self.nodes.contains_key(&(from_type, from_id)) || !self.nodes.contains_key(&(to_type, to_id)) {
                summary.edges_skipped += 1;
                continue;
            }
            let key = rel.dedup_key();
            if self.edges.insert(key, rel).is_none() {
                summary.relationships_created += 1;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::NodeType;

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            timestamp: Utc::now(),
            rule: None,
            agent: None,
            data: serde_json::Map::new(),
            full_log: None,
            alert_vector: None,
            ai_analysis: None,
        }
    }

    #[tokio::test]
    async fn list_unprocessed_excludes_analyzed_alerts() {
        let store = InMemoryVectorStore::new();
        store.insert(alert("a1"));
        let mut analyzed = alert("a2");
        analyzed.ai_analysis = Some(triage_core::AiAnalysis {
            report_text: "x".to_string(),
            provider_id: "anthropic".to_string(),
            timestamp: Utc::now(),
            risk_level: triage_core::RiskLevel::Low,
            plan_summary: triage_core::PlanSummary::default(),
            graph_stats: triage_core::GraphStats::default(),
            processing_ms: 0,
            stage: triage_core::ProcessingStage::Complete,
        });
        store.insert(analyzed);
        let result = store.list_unprocessed(10).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "a1");
    }

    #[tokio::test]
    async fn repeated_upsert_of_same_edge_creates_zero_second_time() {
        let store = InMemoryGraphStore::new();
        let host = GraphEntity::new(NodeType::Host, "h1");
        let ip = GraphEntity::new(NodeType::IpAddress, "10.0.0.1");
        let rel = GraphRelationship::new(triage_core::RelationshipType::CommunicatesWith, triage_core::NodeRef::new(NodeType::Host, "h1"), triage_core::NodeRef::new(NodeType::IpAddress, "10.0.0.1"));

        let first = store.upsert(vec![host.clone(), ip.clone()], vec![rel.clone()]).await.unwrap();
        assert_eq!(first.nodes_created, 2);
        assert_eq!(first.relationships_created, 1);

        let second = store.upsert(vec![host, ip], vec![rel]).await.unwrap();
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(second.edges_skipped, 0);
    }

    #[tokio::test]
    async fn degraded_fake_returns_unavailable() {
        let store = InMemoryGraphStore::new();
        store.set_available(false);
        let result = store.upsert(vec![], vec![]).await;
        assert!(result.is_err());
    }
}
