//! Graph Persister (C9, §4.9): extracts entities and relationships from the
//! alert, the retrieved context, and the report text, then upserts them.

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use triage_core::{Alert, ContextBundle, GraphEntity, GraphRelationship, NodeRef, NodeType, RelationshipType, RiskLevel, Slot, UpsertSummary};
use triage_stores::GraphStoreAdapter;

const PRECEDES_WINDOW_SECONDS: i64 = 1800;

pub struct PersistOutcome {
    pub summary: UpsertSummary,
    pub persisted: bool,
}

pub(crate) fn is_internal_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

fn ip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap())
}

fn hash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-fA-F0-9]{64}\b|\b[a-fA-F0-9]{40}\b|\b[a-fA-F0-9]{32}\b").unwrap())
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b").unwrap())
}

/// Extracts (entities, relationships) from the alert, bundle, and report.
/// Every step is individually gated: a missing field suppresses that one
/// entity/edge, never the whole extraction (§4.9).
pub fn extract(alert: &Alert, bundle: &ContextBundle, report_text: &str, risk_level: RiskLevel, similarity_threshold: f32) -> (Vec<GraphEntity>, Vec<GraphRelationship>) {
    let mut entities = Vec::new();
    let mut relationships = Vec::new();

    let alert_ref = NodeRef::new(NodeType::Alert, alert.id.clone());

    // Step 1: Alert node.
    let mut alert_entity = GraphEntity::new(NodeType::Alert, alert.id.clone())
        .with_attr("timestamp", alert.timestamp.to_rfc3339())
        .with_attr("risk_level", risk_level.as_str());
    if let Some(rule) = &alert.rule {
        alert_entity = alert_entity.with_attr("rule_id", rule.id).with_attr("rule_level", rule.level);
    }
    entities.push(alert_entity);

    // Step 2: Host node + TRIGGERED_ON.
    if let Some(agent) = &alert.agent {
        let mut host = GraphEntity::new(NodeType::Host, agent.id.clone()).with_attr("name", agent.name.clone());
        if let Some(ip) = &agent.ip {
            host = host.with_attr("ip", ip.clone());
        }
        entities.push(host);
        relationships.push(GraphRelationship::new(RelationshipType::TriggeredOn, alert_ref.clone(), NodeRef::new(NodeType::Host, agent.id.clone())));
    }

    // Step 3: IPAddress nodes + HAS_SOURCE_IP / HAS_DEST_IP.
    if let Some(srcip) = alert.data_str("srcip") {
        entities.push(GraphEntity::new(NodeType::IpAddress, srcip).with_attr("is_internal", is_internal_ip(srcip)));
        relationships.push(GraphRelationship::new(RelationshipType::HasSourceIp, alert_ref.clone(), NodeRef::new(NodeType::IpAddress, srcip.to_string())));
    }
    if let Some(dstip) = alert.data_str("dstip") {
        entities.push(GraphEntity::new(NodeType::IpAddress, dstip).with_attr("is_internal", is_internal_ip(dstip)));
        relationships.push(GraphRelationship::new(RelationshipType::HasDestIp, alert_ref.clone(), NodeRef::new(NodeType::IpAddress, dstip.to_string())));
    }

    // Step 4: User node + INVOLVES_USER.
    if let Some(user) = alert.data_str("srcuser").or_else(|| alert.data_str("user")) {
        entities.push(GraphEntity::new(NodeType::User, user));
        relationships.push(GraphRelationship::new(RelationshipType::InvolvesUser, alert_ref.clone(), NodeRef::new(NodeType::User, user.to_string())));
    }

    // Step 5: Process node + INVOLVES_PROCESS.
    if let Some(process) = alert.data_str("process") {
        let host_scope = alert.host_name().unwrap_or("unknown-host");
        let identity = format!("{process}@{host_scope}");
        entities.push(GraphEntity::new(NodeType::Process, identity.clone()).with_attr("name", process));
        relationships.push(GraphRelationship::new(RelationshipType::InvolvesProcess, alert_ref.clone(), NodeRef::new(NodeType::Process, identity)));
    }

    // Step 6: File node + ACCESSES_FILE.
    if let Some(path) = alert.data_str("file") {
        entities.push(GraphEntity::new(NodeType::File, path));
        relationships.push(GraphRelationship::new(RelationshipType::AccessesFile, alert_ref.clone(), NodeRef::new(NodeType::File, path.to_string())));
    }

    // Step 7: Rule node + MATCHED_RULE.
    if let Some(rule) = &alert.rule {
        let id = rule.id.to_string();
        entities.push(GraphEntity::new(NodeType::Rule, id.clone()).with_attr("description", rule.description.clone()).with_attr("level", rule.level));
        relationships.push(GraphRelationship::new(RelationshipType::MatchedRule, alert_ref.clone(), NodeRef::new(NodeType::Rule, id)));
    }

    // Step 8: SIMILAR_TO edges, score >= similarity_threshold.
    for record in bundle.records(Slot::SimilarAlerts) {
        let Some(score) = record.score else { continue };
        if score < similarity_threshold {
            continue;
        }
        let Some(other_id) = record.field_str("id") else { continue };
        if other_id == alert.id {
            continue;
        }
        relationships.push(GraphRelationship::new(RelationshipType::SimilarTo, alert_ref.clone(), NodeRef::new(NodeType::Alert, other_id.to_string())).with_attr("score", score));
    }

    // Step 9: PRECEDES edges, oriented earliest -> latest, within the correlation window.
    for record in bundle.records(Slot::TemporalSequences) {
        let Some(other_id) = record.field_str("id") else { continue };
        let Some(other_ts_str) = record.field_str("timestamp") else { continue };
        let Ok(other_ts) = chrono::DateTime::parse_from_rfc3339(other_ts_str) else { continue };
        let other_ts = other_ts.with_timezone(&chrono::Utc);
        let gap = (alert.timestamp - other_ts).num_seconds().abs();
        if gap > PRECEDES_WINDOW_SECONDS {
            continue;
        }
        let (earlier, later) = if other_ts <= alert.timestamp { (other_id.to_string(), alert.id.clone()) } else { (alert.id.clone(), other_id.to_string()) };
        if earlier == later {
            continue;
        }
        relationships.push(GraphRelationship::new(RelationshipType::Precedes, NodeRef::new(NodeType::Alert, earlier), NodeRef::new(NodeType::Alert, later)).with_attr("time_gap_seconds", gap));
    }

    // Step 10: ThreatIndicator nodes from the report, each with one PART_OF edge.
    for ip in ip_regex().find_iter(report_text) {
        let value = ip.as_str();
        let identity = format!("ip:{value}");
        entities.push(GraphEntity::new(NodeType::ThreatIndicator, identity.clone()).with_attr("kind", "ip").with_attr("value", value));
        relationships.push(GraphRelationship::new(RelationshipType::PartOf, NodeRef::new(NodeType::ThreatIndicator, identity), alert_ref.clone()));
    }
    for hash in hash_regex().find_iter(report_text) {
        let value = hash.as_str();
        let identity = format!("hash:{value}");
        entities.push(GraphEntity::new(NodeType::ThreatIndicator, identity.clone()).with_attr("kind", "hash").with_attr("value", value));
        relationships.push(GraphRelationship::new(RelationshipType::PartOf, NodeRef::new(NodeType::ThreatIndicator, identity), alert_ref.clone()));
    }
    for domain in domain_regex().find_iter(report_text) {
        let value = domain.as_str();
        if ip_regex().is_match(value) {
            continue; // an IPv4 literal also matches the loose domain pattern
        }
        let identity = format!("domain:{value}");
        entities.push(GraphEntity::new(NodeType::ThreatIndicator, identity.clone()).with_attr("kind", "domain").with_attr("value", value));
        relationships.push(GraphRelationship::new(RelationshipType::PartOf, NodeRef::new(NodeType::ThreatIndicator, identity), alert_ref.clone()));
    }

    (entities, relationships)
}

/// Runs extraction then upserts via the graph store. If the store is
/// degraded, extraction still runs and the summary reports `persisted =
/// false`; no exception propagates (§4.9: "Failure isolation").
pub async fn persist(graph_store: &dyn GraphStoreAdapter, alert: &Alert, bundle: &ContextBundle, report_text: &str, risk_level: RiskLevel, similarity_threshold: f32) -> PersistOutcome {
    let (entities, relationships) = extract(alert, bundle, report_text, risk_level, similarity_threshold);

    if !graph_store.is_available() {
        let summary = UpsertSummary { nodes_created: 0, relationships_created: 0, edges_skipped: relationships.len() as u32 };
        return PersistOutcome { summary, persisted: false };
    }

    match graph_store.upsert(entities, relationships).await {
        Ok(summary) => PersistOutcome { summary, persisted: true },
        Err(_) => PersistOutcome { summary: UpsertSummary::default(), persisted: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{Agent, Rule};

    fn alert() -> Alert {
        Alert {
            id: "a1".to_string(),
            timestamp: Utc::now(),
            rule: Some(Rule { id: 100002, level: 8, description: "SSH brute force".to_string(), groups: vec!["authentication".to_string()] }),
            agent: Some(Agent { id: "A1".to_string(), name: "web-01".to_string(), ip: Some("192.168.1.10".to_string()) }),
            data: serde_json::json!({"srcip": "203.0.113.45", "dstip": "192.168.1.10", "srcuser": "admin"}).as_object().unwrap().clone(),
            full_log: None,
            alert_vector: None,
            ai_analysis: None,
        }
    }

    #[test]
    fn scenario_s1_extraction_yields_expected_edges() {
        let bundle = ContextBundle::new();
        let (entities, relationships) = extract(&alert(), &bundle, "analysis text", RiskLevel::High, 0.7);
        assert!(entities.iter().any(|e| e.node_type == NodeType::Alert && e.identity == "a1"));
        assert!(relationships.iter().any(|r| r.rel_type == RelationshipType::TriggeredOn && r.to.identity == "A1"));
        assert!(relationships.iter().any(|r| r.rel_type == RelationshipType::HasSourceIp && r.to.identity == "203.0.113.45"));
        assert!(relationships.iter().any(|r| r.rel_type == RelationshipType::InvolvesUser && r.to.identity == "admin"));
    }

    #[test]
    fn internal_ip_is_flagged() {
        let entities = extract(&alert(), &ContextBundle::new(), "", RiskLevel::High, 0.7).0;
        let dst = entities.iter().find(|e| e.identity == "192.168.1.10").unwrap();
        assert_eq!(dst.attrs.get("is_internal"), Some(&serde_json::Value::Bool(true)));
        let src = entities.iter().find(|e| e.identity == "203.0.113.45").unwrap();
        assert_eq!(src.attrs.get("is_internal"), Some(&serde_json::Value::Bool(false)));
    }

    #[test]
    fn threat_indicators_extracted_from_report_text() {
        let report = "Observed connection to 198.51.100.23 and payload hash deadbeefdeadbeefdeadbeefdeadbeef, domain evil-example.com.";
        let (entities, relationships) = extract(&alert(), &ContextBundle::new(), report, RiskLevel::Critical, 0.7);
        assert!(entities.iter().any(|e| e.node_type == NodeType::ThreatIndicator && e.identity == "ip:198.51.100.23"));
        assert!(entities.iter().any(|e| e.node_type == NodeType::ThreatIndicator && e.identity == "hash:deadbeefdeadbeefdeadbeefdeadbeef"));
        assert!(entities.iter().any(|e| e.node_type == NodeType::ThreatIndicator && e.identity == "domain:evil-example.com"));
        assert!(relationships.iter().filter(|r| r.rel_type == RelationshipType::PartOf).count() >= 3);
    }

    #[tokio::test]
    async fn degraded_store_still_runs_extraction_and_reports_not_persisted() {
        let store = triage_stores::InMemoryGraphStore::new();
        store.set_available(false);
        let outcome = persist(&store, &alert(), &ContextBundle::new(), "report", RiskLevel::High, 0.7).await;
        assert!(!outcome.persisted);
    }
}
