//! Decision Engine (C5, §4.5): a pure function from alert to plan.

use chrono::Duration as ChronoDuration;
use triage_core::{Alert, CypherTemplateName, Plan, Priority, RetrievalTask, Slot, TaskParams};

const RESOURCE_VOCAB: &[&str] = &["cpu", "memory", "ram", "disk", "performance", "overload"];
const SECURITY_GROUPS: &[&str] = &["authentication", "attack", "intrusion_detection", "malware"];

fn haystack(alert: &Alert) -> String {
    let mut text = String::new();
    if let Some(rule) = &alert.rule {
        text.push_str(&rule.description.to_lowercase());
        text.push(' ');
        text.push_str(&rule.groups.join(" ").to_lowercase());
    }
    text
}

fn has_any(haystack: &str, groups: &[String], needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n) || groups.iter().any(|g| g.eq_ignore_ascii_case(n)))
}

fn rule_groups(alert: &Alert) -> Vec<String> {
    alert.rule.as_ref().map(|r| r.groups.clone()).unwrap_or_default()
}

fn rule_level(alert: &Alert) -> u8 {
    alert.rule.as_ref().map(|r| r.level).unwrap_or(0)
}

fn is_ssh_related(haystack: &str, groups: &[String]) -> bool {
    has_any(haystack, groups, &["ssh"])
}

fn is_malware_related(haystack: &str, groups: &[String]) -> bool {
    has_any(haystack, groups, &["malware", "trojan", "ransomware", "virus"])
}

fn is_web_attack_related(haystack: &str, groups: &[String]) -> bool {
    has_any(haystack, groups, &["web", "sql", "xss", "injection", "http"])
}

fn is_auth_or_privilege_related(haystack: &str, groups: &[String]) -> bool {
    has_any(haystack, groups, &["authentication", "privilege", "login", "logon", "sudo"])
}

fn is_non_internal_ip(ip: &str) -> bool {
    !crate::persister::is_internal_ip(ip)
}

/// Produce the retrieval plan for an alert. Deterministic; never touches a
/// store (§4.5: "The planner MUST NOT inspect the stores").
pub fn plan(alert: &Alert) -> Plan {
    let mut tasks = Vec::new();
    let haystack = haystack(alert);
    let groups = rule_groups(alert);
    let level = rule_level(alert);

    // Rule 1: always one vector_knn task, priority high, k=5.
    tasks.push(RetrievalTask { priority: Priority::High, slot: Slot::SimilarAlerts, params: TaskParams::VectorKnn { k: 5 } });

    let host = alert.host_name().map(str::to_string);
    let now = alert.timestamp;

    // Rule 2: resource-monitoring vocabulary -> process/memory over +-5min.
    if has_any(&haystack, &groups, RESOURCE_VOCAB) {
        let keywords = RESOURCE_VOCAB.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let window = ChronoDuration::minutes(5);
        tasks.push(RetrievalTask {
            priority: Priority::Medium,
            slot: Slot::ProcessData,
            params: TaskParams::KeywordTimeWindow { keywords: keywords.clone(), host: host.clone(), from_ts: now - window, to_ts: now + window, size: 50 },
        });
        tasks.push(RetrievalTask {
            priority: Priority::Medium,
            slot: Slot::HostMetrics,
            params: TaskParams::KeywordTimeWindow { keywords, host: host.clone(), from_ts: now - window, to_ts: now + window, size: 50 },
        });
    }

    // Rule 3: security event (level >= 7 or groups intersect security set) -> +-1min.
    if level >= 7 || groups.iter().any(|g| SECURITY_GROUPS.iter().any(|s| g.eq_ignore_ascii_case(s))) {
        let window = ChronoDuration::minutes(1);
        let keywords = vec!["cpu".to_string(), "network".to_string(), "user".to_string()];
        tasks.push(RetrievalTask {
            priority: Priority::High,
            slot: Slot::NetworkLogs,
            params: TaskParams::KeywordTimeWindow { keywords: keywords.clone(), host: host.clone(), from_ts: now - window, to_ts: now + window, size: 50 },
        });
        tasks.push(RetrievalTask {
            priority: Priority::High,
            slot: Slot::HostMetrics,
            params: TaskParams::KeywordTimeWindow { keywords, host: host.clone(), from_ts: now - window, to_ts: now + window, size: 50 },
        });
    }

    // Rule 4: SSH-related.
    if is_ssh_related(&haystack, &groups) {
        tasks.push(cypher_task(Priority::Critical, Slot::AttackPaths, CypherTemplateName::AttackSourcePanorama, alert));
        tasks.push(cypher_task(Priority::High, Slot::LateralMovement, CypherTemplateName::LateralMovementDetection, alert));
    }

    // Rule 5: malware-related.
    if is_malware_related(&haystack, &groups) {
        tasks.push(cypher_task(Priority::Critical, Slot::ProcessChains, CypherTemplateName::ProcessExecutionChain, alert));
        tasks.push(cypher_task(Priority::High, Slot::FileInteractions, CypherTemplateName::FileInteractions, alert));
    }

    // Rule 6: web-attack-related.
    if is_web_attack_related(&haystack, &groups) {
        tasks.push(cypher_task(Priority::High, Slot::NetworkTopology, CypherTemplateName::NetworkTopology, alert));
    }

    // Rule 7: authentication/privilege-related.
    if is_auth_or_privilege_related(&haystack, &groups) {
        tasks.push(cypher_task(Priority::Medium, Slot::UserBehavior, CypherTemplateName::UserBehavior, alert));
    }

    // Rule 8: always, temporal correlation, +-30min.
    tasks.push(cypher_task(Priority::Medium, Slot::TemporalSequences, CypherTemplateName::TemporalCorrelation, alert));

    // Rule 9: non-internal IP present.
    let carries_external_ip = [alert.data_str("srcip"), alert.data_str("dstip")].into_iter().flatten().any(is_non_internal_ip);
    if carries_external_ip {
        tasks.push(cypher_task(Priority::Medium, Slot::IpReputation, CypherTemplateName::IpReputation, alert));
    }

    // Rule 10: rule.level >= 8 -> threat landscape, 24h window.
    if level >= 8 {
        tasks.push(cypher_task(Priority::Medium, Slot::ThreatLandscape, CypherTemplateName::ThreatLandscape, alert));
    }

    Plan { tasks }.sorted_by_priority()
}

fn cypher_task(priority: Priority, slot: Slot, name: CypherTemplateName, alert: &Alert) -> RetrievalTask {
    let mut params = std::collections::BTreeMap::new();
    params.insert("alert_id".to_string(), serde_json::Value::String(alert.id.clone()));
    if let Some(ip) = alert.data_str("srcip") {
        params.insert("src_ip".to_string(), serde_json::Value::String(ip.to_string()));
    }
    if let Some(user) = alert.data_str("srcuser").or_else(|| alert.data_str("user")) {
        params.insert("username".to_string(), serde_json::Value::String(user.to_string()));
    }
    if let Some(host) = alert.host_name() {
        params.insert("host".to_string(), serde_json::Value::String(host.to_string()));
    }
    params.insert("timestamp".to_string(), serde_json::Value::String(alert.timestamp.to_rfc3339()));

    RetrievalTask { priority, slot, params: TaskParams::CypherTemplate { name, params, limit: name.default_limit() } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{Agent, Rule, TaskKind};

    fn base_alert() -> Alert {
        Alert {
            id: "a1".to_string(),
            timestamp: Utc::now(),
            rule: Some(Rule { id: 100002, level: 8, description: "SSH brute force attack detected".to_string(), groups: vec!["authentication".to_string(), "attack".to_string()] }),
            agent: Some(Agent { id: "A1".to_string(), name: "web-01".to_string(), ip: Some("192.168.1.10".to_string()) }),
            data: serde_json::json!({"srcip": "203.0.113.45", "dstip": "192.168.1.10", "srcuser": "admin"}).as_object().unwrap().clone(),
            full_log: None,
            alert_vector: None,
            ai_analysis: None,
        }
    }

    #[test]
    fn always_exactly_one_vector_knn_task() {
        let p = plan(&base_alert());
        assert_eq!(p.vector_knn_task_count(), 1);
        assert!(!p.tasks.is_empty());
    }

    #[test]
    fn ssh_brute_force_scenario_matches_spec_s1() {
        let p = plan(&base_alert());
        let kinds: Vec<_> = p.tasks.iter().map(|t| (t.kind(), t.slot)).collect();
        assert!(kinds.iter().any(|(k, s)| *k == TaskKind::VectorKnn && *s == Slot::SimilarAlerts));
        assert!(p.tasks.iter().any(|t| matches!(&t.params, TaskParams::CypherTemplate { name: CypherTemplateName::AttackSourcePanorama, .. }) && t.priority == Priority::Critical));
        assert!(p.tasks.iter().any(|t| matches!(&t.params, TaskParams::CypherTemplate { name: CypherTemplateName::LateralMovementDetection, .. }) && t.priority == Priority::High));
        assert!(p.tasks.iter().any(|t| matches!(&t.params, TaskParams::CypherTemplate { name: CypherTemplateName::TemporalCorrelation, .. })));
        assert!(p.tasks.iter().any(|t| matches!(&t.params, TaskParams::CypherTemplate { name: CypherTemplateName::IpReputation, .. })));
        assert!(p.tasks.iter().any(|t| matches!(&t.params, TaskParams::CypherTemplate { name: CypherTemplateName::ThreatLandscape, .. })));
        // Stable sort by priority: critical first.
        assert_eq!(p.tasks.first().unwrap().priority, Priority::Critical);
    }

    #[test]
    fn resource_alert_emits_keyword_tasks_not_cypher() {
        let mut alert = base_alert();
        alert.rule = Some(Rule { id: 2, level: 7, description: "High CPU usage detected".to_string(), groups: vec!["system".to_string(), "performance".to_string()] });
        alert.data = serde_json::json!({"cpu_usage": "95%"}).as_object().unwrap().clone();
        let p = plan(&alert);
        assert!(p.tasks.iter().any(|t| t.slot == Slot::ProcessData));
        assert!(p.tasks.iter().any(|t| t.slot == Slot::HostMetrics));
        assert!(!p.tasks.iter().any(|t| t.slot == Slot::AttackPaths));
    }

    #[test]
    fn malformed_alert_still_yields_vector_knn_only() {
        let alert = Alert { id: "a3".to_string(), timestamp: Utc::now(), rule: None, agent: None, data: serde_json::Map::new(), full_log: None, alert_vector: None, ai_analysis: None };
        let p = plan(&alert);
        assert_eq!(p.tasks.len(), 2); // vector_knn + the always-on temporal_correlation
        assert_eq!(p.vector_knn_task_count(), 1);
    }
}
