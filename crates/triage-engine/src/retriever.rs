//! Hybrid Retriever (C6, §4.6): executes a plan against the vector and graph
//! stores, merging results into a typed context bundle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};
use triage_core::{Alert, ContextBundle, EvidenceRecord, Plan, RetrievalTask, Slot, TaskParams};
use triage_stores::{GraphStoreAdapter, KeywordTimeWindowQuery, KnnFilter, VectorStoreAdapter};

pub struct RetrieverConfig {
    pub retrieval_concurrency: usize,
    pub result_cap: usize,
    pub graph_minimum: usize,
    pub vector_store_timeout: Duration,
    pub graph_store_timeout: Duration,
}

pub struct Retriever {
    vector_store: Arc<dyn VectorStoreAdapter>,
    graph_store: Arc<dyn GraphStoreAdapter>,
    config: RetrieverConfig,
}

enum TaskOutcome {
    Records(Slot, Vec<EvidenceRecord>),
    Failed(Slot),
    Skipped,
}

impl Retriever {
    pub fn new(vector_store: Arc<dyn VectorStoreAdapter>, graph_store: Arc<dyn GraphStoreAdapter>, config: RetrieverConfig) -> Self {
        Self { vector_store, graph_store, config }
    }

    /// Runs `plan` against `alert_vector`, returning a bundle that always
    /// resolves successfully (§4.6 step 6: per-task failures are isolated).
    pub async fn retrieve(&self, plan: Plan, alert: &Alert, alert_vector: &[f32]) -> ContextBundle {
        let plan = plan.sorted_by_priority();
        let graph_degraded = !self.graph_store.is_available();

        let outcomes = stream::iter(plan.tasks.into_iter())
            .map(|task| self.run_task(task, alert_vector, graph_degraded))
            .buffer_unordered(self.config.retrieval_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut bundle = ContextBundle::new();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Records(slot, records) => bundle.set_records(slot, records, self.config.result_cap),
                TaskOutcome::Failed(slot) => bundle.mark_failed(slot),
                TaskOutcome::Skipped => {}
            }
        }

        self.enrich_if_thin(&mut bundle, alert).await;
        bundle
    }

    async fn run_task(&self, task: RetrievalTask, alert_vector: &[f32], graph_degraded: bool) -> TaskOutcome {
        let slot = task.slot;
        if graph_degraded && matches!(task.params, TaskParams::CypherTemplate { .. }) {
            debug!(?slot, "graph store degraded, skipping cypher_template task");
            return TaskOutcome::Skipped;
        }

        match task.params {
            TaskParams::VectorKnn { k } => {
                let result = tokio::time::timeout(self.config.vector_store_timeout, self.vector_store.knn(alert_vector, k, KnnFilter::default())).await;
                self.to_outcome(slot, result)
            }
            TaskParams::KeywordTimeWindow { keywords, host, from_ts, to_ts, size } => {
                let query = KeywordTimeWindowQuery { keywords, host, from_ts, to_ts, size };
                let result = tokio::time::timeout(self.config.vector_store_timeout, self.vector_store.keyword_time_window(query)).await;
                self.to_outcome(slot, result)
            }
            TaskParams::CypherTemplate { name, params, limit } => {
                let query = crate::templates::render(name, &params, limit);
                let result = tokio::time::timeout(self.config.graph_store_timeout, self.graph_store.run(&query, serde_json::to_value(&params).unwrap_or_default(), self.config.graph_store_timeout)).await;
                match result {
                    Ok(Ok(rows)) => TaskOutcome::Records(slot, rows.into_iter().map(|row| crate::templates::row_to_evidence(name, row)).collect()),
                    Ok(Err(err)) => {
                        warn!(?slot, error = %err, "cypher_template task failed");
                        TaskOutcome::Failed(slot)
                    }
                    Err(_) => {
                        warn!(?slot, "cypher_template task timed out");
                        TaskOutcome::Failed(slot)
                    }
                }
            }
        }
    }

    fn to_outcome<E: std::fmt::Display>(&self, slot: Slot, result: Result<Result<Vec<EvidenceRecord>, E>, tokio::time::error::Elapsed>) -> TaskOutcome {
        match result {
            Ok(Ok(records)) => TaskOutcome::Records(slot, records),
            Ok(Err(err)) => {
                warn!(?slot, error = %err, "retrieval task failed");
                TaskOutcome::Failed(slot)
            }
            Err(_) => {
                warn!(?slot, "retrieval task timed out");
                TaskOutcome::Failed(slot)
            }
        }
    }

    /// Step 5 (§4.6): when graph evidence is thin and the default keyword
    /// slots were never planned, backfill them on the alert's own host over
    /// a +-2 minute window around the alert's timestamp.
    async fn enrich_if_thin(&self, bundle: &mut ContextBundle, alert: &Alert) {
        if bundle.graph_hit_count() >= self.config.graph_minimum {
            return;
        }

        let default_slots = [Slot::ProcessData, Slot::HostMetrics, Slot::NetworkLogs];
        let missing: Vec<Slot> = default_slots.into_iter().filter(|slot| bundle.was_task_skipped(*slot)).collect();
        if missing.is_empty() {
            return;
        }

        let anchor = alert.timestamp;
        let host = alert.host_name().map(str::to_string);
        let window = ChronoDuration::minutes(2);
        let keywords = vec!["process".to_string(), "memory".to_string(), "network".to_string()];
        for slot in missing {
            let query = KeywordTimeWindowQuery { keywords: keywords.clone(), host: host.clone(), from_ts: anchor - window, to_ts: anchor + window, size: self.config.result_cap };
            match tokio::time::timeout(self.config.vector_store_timeout, self.vector_store.keyword_time_window(query)).await {
                Ok(Ok(records)) => bundle.set_records(slot, records, self.config.result_cap),
                Ok(Err(err)) => {
                    warn!(?slot, error = %err, "default enrichment task failed");
                    bundle.mark_failed(slot);
                }
                Err(_) => {
                    warn!(?slot, "default enrichment task timed out");
                    bundle.mark_failed(slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{Agent, Alert, Priority, Rule};
    use triage_stores::{InMemoryGraphStore, InMemoryVectorStore};

    fn alert() -> Alert {
        Alert {
            id: "a1".to_string(),
            timestamp: Utc::now(),
            rule: Some(Rule { id: 1, level: 8, description: "SSH brute force".to_string(), groups: vec!["authentication".to_string()] }),
            agent: Some(Agent { id: "A1".to_string(), name: "web-01".to_string(), ip: None }),
            data: serde_json::json!({"srcip": "203.0.113.45"}).as_object().unwrap().clone(),
            full_log: None,
            alert_vector: None,
            ai_analysis: None,
        }
    }

    #[tokio::test]
    async fn degraded_graph_yields_bundle_with_only_non_graph_slots() {
        let vector_store = Arc::new(InMemoryVectorStore::new());
        let graph_store = Arc::new(InMemoryGraphStore::new());
        graph_store.set_available(false);
        let retriever = Retriever::new(vector_store, graph_store, RetrieverConfig { retrieval_concurrency: 4, result_cap: 50, graph_minimum: 10, vector_store_timeout: Duration::from_secs(5), graph_store_timeout: Duration::from_secs(5) });

        let alert = alert();
        let plan = crate::decision::plan(&alert);
        let bundle = retriever.retrieve(plan, &alert, &[0.1, 0.2, 0.3]).await;

        assert!(!bundle.graph_present());
        assert!(bundle.was_task_skipped(Slot::AttackPaths));
    }

    #[test]
    fn priority_rank_ordering_is_critical_first() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
    }
}
