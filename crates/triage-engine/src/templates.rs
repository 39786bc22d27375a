//! The named Cypher-template registry (§6.3): one parameterized traversal
//! pattern per template name, each expressible as a single query with a
//! hard result LIMIT.

use std::collections::BTreeMap;

use serde_json::Value;
use triage_core::{CypherTemplateName, EvidenceRecord, EvidenceSource, GraphPath};

/// Renders the query text for a template. Parameters are referenced by
/// `$name`, never string-interpolated (§4.3 contract).
pub fn render(name: CypherTemplateName, _params: &BTreeMap<String, Value>, limit: usize) -> String {
    let body = match name {
        CypherTemplateName::AttackSourcePanorama => {
            "MATCH (src:IpAddress {address: $src_ip})<-[:HAS_SOURCE_IP]-(a:Alert) \
             WHERE a.timestamp >= $timestamp - duration('PT1H') AND a.timestamp <= $timestamp + duration('PT1H') \
             MATCH (a)-[r]->(n) WHERE type(r) <> 'MATCHED_RULE' RETURN a, r, n"
        }
        CypherTemplateName::LateralMovementDetection => {
            "MATCH (u:User {username: $username})<-[:INVOLVES_USER]-(a:Alert)-[:TRIGGERED_ON]->(h:Host) \
             MATCH (u)-[:LOGGED_INTO]->(other:Host) WHERE other <> h AND a.timestamp <= $timestamp + duration('PT30M') \
             RETURN a, h, other"
        }
        CypherTemplateName::ProcessExecutionChain => {
            "MATCH path = (p:Process)-[:SPAWNED_BY*1..5]->(ancestor:Process) \
             WHERE p.identity = $alert_id \
             OPTIONAL MATCH (a:Alert)-[:INVOLVES_PROCESS]->(ancestor) WHERE a.timestamp >= $timestamp - duration('PT2H') AND a.timestamp <= $timestamp + duration('PT2H') \
             RETURN path, a"
        }
        CypherTemplateName::FileInteractions => {
            "MATCH (f:File)<-[:ACCESSES_FILE]-(a:Alert)-[:INVOLVES_PROCESS]->(p:Process) \
             WHERE a.id = $alert_id \
             RETURN f, a, p"
        }
        CypherTemplateName::NetworkTopology => {
            "MATCH path = (src:IpAddress {address: $src_ip})-[:COMMUNICATES_WITH*1..3]->(dst:IpAddress) \
             OPTIONAL MATCH (a:Alert)-[:HAS_SOURCE_IP|HAS_DEST_IP]->(dst) WHERE a.timestamp >= $timestamp - duration('PT6H') AND a.timestamp <= $timestamp + duration('PT6H') \
             RETURN path, a"
        }
        CypherTemplateName::UserBehavior => {
            "MATCH (u:User {username: $username})<-[:INVOLVES_USER]-(a:Alert) WHERE a.timestamp >= $timestamp - duration('P7D') \
             OPTIONAL MATCH (u)-[:LOGGED_INTO]->(h:Host) \
             RETURN a, h"
        }
        CypherTemplateName::TemporalCorrelation => {
            "MATCH (a:Alert)-[:TRIGGERED_ON]->(h:Host {agent_id: $host}) \
             WHERE a.timestamp >= $timestamp - duration('PT30M') AND a.timestamp <= $timestamp + duration('PT30M') \
             RETURN a, h"
        }
        CypherTemplateName::IpReputation => {
            "MATCH (ip:IpAddress {address: $src_ip}) \
             OPTIONAL MATCH (ip)<-[:HAS_SOURCE_IP]-(a:Alert) \
             RETURN ip, count(a) AS attack_count"
        }
        CypherTemplateName::ThreatLandscape => {
            "MATCH (a:Alert {id: $alert_id})-[]-(shared) \
             MATCH (other:Alert)-[]-(shared) WHERE other.rule_level >= 7 AND other.timestamp >= $timestamp - duration('PT24H') \
             RETURN other, shared"
        }
    };
    format!("{body} LIMIT {limit}")
}

/// Converts one row returned by the graph store into an evidence record.
/// Rows matching the `{nodes, edges}` path shape become a rendered graph
/// path; anything else is kept as a plain field record (§3.3).
pub fn row_to_evidence(_name: CypherTemplateName, row: Value) -> EvidenceRecord {
    let score = row.get("attack_count").and_then(|v| v.as_f64()).map(|v| v as f32);
    if let Ok(path) = serde_json::from_value::<GraphPath>(row.clone()) {
        if path.is_well_formed() {
            return EvidenceRecord { source: EvidenceSource::Graph, score, fields: row.as_object().cloned().unwrap_or_default(), graph_path: Some(path) };
        }
    }
    EvidenceRecord { source: EvidenceSource::Graph, score, fields: row.as_object().cloned().unwrap_or_default(), graph_path: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_renders_with_a_limit_clause() {
        let params = BTreeMap::new();
        for name in [
            CypherTemplateName::AttackSourcePanorama,
            CypherTemplateName::LateralMovementDetection,
            CypherTemplateName::ProcessExecutionChain,
            CypherTemplateName::FileInteractions,
            CypherTemplateName::NetworkTopology,
            CypherTemplateName::UserBehavior,
            CypherTemplateName::TemporalCorrelation,
            CypherTemplateName::IpReputation,
            CypherTemplateName::ThreatLandscape,
        ] {
            let query = render(name, &params, name.default_limit());
            assert!(query.contains("LIMIT 50"));
        }
    }

    #[test]
    fn malformed_row_falls_back_to_field_record() {
        let row = serde_json::json!({"attack_count": 3});
        let record = row_to_evidence(CypherTemplateName::IpReputation, row);
        assert!(record.graph_path.is_none());
        assert_eq!(record.score, Some(3.0));
    }
}
