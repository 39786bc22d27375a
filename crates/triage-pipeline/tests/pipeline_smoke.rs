//! End-to-end smoke test wiring the Decision Engine, Hybrid Retriever, and
//! Context Formatter together against the in-memory store fakes. Stops short
//! of the LLM call: `LlmClient` is a concrete closed-provider struct (not a
//! trait), so it cannot be faked across crate boundaries without a real HTTP
//! endpoint, same limitation as in `triage-engine`'s own analyzer tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use triage_core::{Agent, Alert, ContextBundle, RiskLevel, Rule, Slot};
use triage_engine::{decision, formatter, persister, Retriever, RetrieverConfig};
use triage_stores::{GraphStoreAdapter, InMemoryGraphStore, InMemoryVectorStore};

fn ssh_brute_force_alert() -> Alert {
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

fn retriever_config() -> RetrieverConfig {
    RetrieverConfig {
        retrieval_concurrency: 8,
        result_cap: 50,
        graph_minimum: 10,
        vector_store_timeout: Duration::from_secs(5),
        graph_store_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn ssh_scenario_produces_non_empty_bundle_and_plain_context() {
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let graph_store = Arc::new(InMemoryGraphStore::new());

    // Seed the graph with a prior alert on the same host and source IP, so
    // the graph-aware cypher templates have something to traverse.
    let prior_alert = Alert { id: "a0".to_string(), ..ssh_brute_force_alert() };
    let (entities, relationships) = persister::extract(&prior_alert, &ContextBundle::new(), "prior report", RiskLevel::Medium, 0.7);
    graph_store.upsert(entities, relationships).await.unwrap();

    let retriever = Retriever::new(vector_store, graph_store, retriever_config());

    let alert = ssh_brute_force_alert();
    let plan = decision::plan(&alert);
    assert_eq!(plan.vector_knn_task_count(), 1);

    let bundle = retriever.retrieve(plan, &alert, &[0.1, 0.2, 0.3]).await;
    assert!(!bundle.was_task_skipped(Slot::AttackPaths));
    assert!(bundle.graph_present());

    let formatted = formatter::format(&bundle);
    assert!(formatted.graph_present);
}

#[tokio::test]
async fn degraded_graph_store_still_yields_vector_and_keyword_slots() {
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let graph_store = Arc::new(InMemoryGraphStore::new());
    graph_store.set_available(false);
    let retriever = Retriever::new(vector_store, graph_store, retriever_config());

    let alert = ssh_brute_force_alert();
    let plan = decision::plan(&alert);
    let bundle = retriever.retrieve(plan, &alert, &[0.1, 0.2, 0.3]).await;

    assert!(bundle.was_task_skipped(Slot::AttackPaths));
    assert!(!bundle.graph_present());
}

#[tokio::test]
async fn malformed_alert_plan_only_runs_vector_and_temporal_tasks() {
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let graph_store = Arc::new(InMemoryGraphStore::new());
    let retriever = Retriever::new(vector_store, graph_store, retriever_config());

    let alert = Alert { id: "a3".to_string(), timestamp: Utc::now(), rule: None, agent: None, data: serde_json::Map::new(), full_log: None, alert_vector: None, ai_analysis: None };
    let plan = decision::plan(&alert);
    assert_eq!(plan.tasks.len(), 2);

    let bundle = retriever.retrieve(plan, &alert, &[0.0, 0.0]).await;
    assert!(!bundle.graph_present());
}
