//! Alert Processor (C10, §4.10): orchestrates one alert end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument};
use triage_core::{AiAnalysis, Alert, GraphStats, PlanSummary, ProcessingStage, RiskLevel};
use triage_engine::{analyzer, decision, formatter, persister, Retriever};
use triage_providers::{EmbeddingClient, LlmClient};
use triage_stores::{GraphStoreAdapter, VectorStoreAdapter};

/// Everything one alert's pass needs, shared across concurrent alerts in a
/// tick (§5: "Vector store adapter and graph store adapter maintain one
/// shared connection pool each, created once at startup").
pub struct ProcessorDeps {
    pub embedding: Arc<dyn EmbeddingClient>,
    pub vector_store: Arc<dyn VectorStoreAdapter>,
    pub graph_store: Arc<dyn GraphStoreAdapter>,
    pub retriever: Arc<Retriever>,
    pub llm: Arc<LlmClient>,
    pub embedding_dimension: usize,
    pub similarity_threshold: f32,
}

fn is_malformed(alert: &Alert) -> bool {
    alert.rule.is_none() && alert.agent.is_none()
}

/// Processes a single alert through the full pipeline (§4.10 steps 1-10).
/// Never panics and never propagates an error: every failure mode converts
/// into a terminal enrichment that is still written back, per §7's policy
/// that every alert leaves the unprocessed set.
#[instrument(skip(deps, alert), fields(alert_id = %alert.id))]
pub async fn process_alert(deps: &ProcessorDeps, alert: Alert) -> ProcessingStage {
    let start = Instant::now();

    if is_malformed(&alert) {
        let analysis = AiAnalysis {
            report_text: "unprocessable: alert is missing both rule and agent fields".to_string(),
            provider_id: "none".to_string(),
            timestamp: chrono::Utc::now(),
            risk_level: RiskLevel::Unknown,
            plan_summary: PlanSummary::default(),
            graph_stats: GraphStats::default(),
            processing_ms: start.elapsed().as_millis() as u64,
            stage: ProcessingStage::Unprocessable,
        };
        write_back(&deps.vector_store, &alert.id, &vec![0.0; deps.embedding_dimension], &analysis).await;
        info!(risk_level = %analysis.risk_level, processing_ms = analysis.processing_ms, "alert unprocessable, no graph write");
        return ProcessingStage::Unprocessable;
    }

    // Step 1: pure projection, reused from the embedding client's own
    // alert-to-text projection (§4.1 and §4.10 step 1 describe the same shape).
    let summary = triage_providers::embedding::project_alert_text(&alert);

    // Step 2.
    let embed_result = deps.embedding.embed_alert(&alert).await;

    let (vector, report_text, provider_id, risk_level, plan_summary, bundle) = match embed_result {
        Ok(vector) => {
            // Step 3.
            let plan = decision::plan(&alert);
            let mut plan_summary = PlanSummary::default();
            for task in &plan.tasks {
                plan_summary.record(task.kind());
            }
            // Step 4.
            let bundle = deps.retriever.retrieve(plan, &alert, &vector).await;
            // Step 5.
            let formatted = formatter::format(&bundle);
            // Step 6.
            let outcome = analyzer::analyze(&deps.llm, &summary, &formatted).await;
            (vector, outcome.report_text, outcome.provider_id, outcome.risk_level, plan_summary, Some(bundle))
        }
        Err(err) => {
            error!(error = %err, "embedding unavailable, short-circuiting to enrichment-failed");
            let vector = vec![0.0; deps.embedding_dimension];
            (vector, format!("enrichment-failed: embedding unavailable ({err})"), "none".to_string(), RiskLevel::Unknown, PlanSummary::default(), None)
        }
    };

    let analysis_failed = bundle.is_none() || report_text.starts_with("analysis-failed") || report_text.starts_with("enrichment-failed");

    // Step 7: pending enrichment, graph_stats not yet known.
    let mut graph_stats = GraphStats::default();
    let mut analysis = AiAnalysis {
        report_text: report_text.clone(),
        provider_id: provider_id.clone(),
        timestamp: chrono::Utc::now(),
        risk_level,
        plan_summary,
        graph_stats: graph_stats.clone(),
        processing_ms: start.elapsed().as_millis() as u64,
        stage: if analysis_failed { ProcessingStage::AnalysisFailed } else { ProcessingStage::Complete },
    };

    // Step 8.
    write_back(&deps.vector_store, &alert.id, &vector, &analysis).await;

    // Step 9.
    let empty_bundle = triage_core::ContextBundle::new();
    let bundle_ref = bundle.as_ref().unwrap_or(&empty_bundle);
    let persist_outcome = persister::persist(deps.graph_store.as_ref(), &alert, bundle_ref, &report_text, risk_level, deps.similarity_threshold).await;

    let final_graph_stats = GraphStats {
        entities_created: persist_outcome.summary.nodes_created,
        relationships_created: persist_outcome.summary.relationships_created,
        edges_skipped: persist_outcome.summary.edges_skipped,
        persisted: persist_outcome.persisted,
    };

    // Step 10: rewrite only if graph_stats actually changed (spec.md §9 open
    // question, resolved here as "skip the no-op second write").
    if final_graph_stats != graph_stats {
        graph_stats = final_graph_stats;
        analysis.graph_stats = graph_stats.clone();
        analysis.stage = if !analysis_failed && !graph_stats.persisted { ProcessingStage::GraphNotPersisted } else { analysis.stage };
        analysis.processing_ms = start.elapsed().as_millis() as u64;
        write_back(&deps.vector_store, &alert.id, &vector, &analysis).await;
    }

    info!(risk_level = %analysis.risk_level, stage = ?analysis.stage, processing_ms = analysis.processing_ms, graph_persisted = graph_stats.persisted, "alert processed");
    analysis.stage
}

async fn write_back(vector_store: &Arc<dyn VectorStoreAdapter>, alert_id: &str, vector: &[f32], analysis: &AiAnalysis) {
    if let Err(err) = vector_store.update_enrichment(alert_id, vector, analysis).await {
        error!(alert_id, error = %err, "failed to write back enrichment");
    }
}

/// Total end-to-end budget check (§4.10): "soft target 3s per alert, hard
/// timeout 30s". Exposed so the scheduler can enforce the hard ceiling.
pub const HARD_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn malformed_detection_matches_scenario_s3() {
        let alert = Alert { id: "a3".to_string(), timestamp: Utc::now(), rule: None, agent: None, data: serde_json::Map::new(), full_log: None, alert_vector: None, ai_analysis: None };
        assert!(is_malformed(&alert));
    }

    #[test]
    fn alert_with_rule_is_not_malformed() {
        let alert = Alert {
            id: "a1".to_string(),
            timestamp: Utc::now(),
            rule: Some(triage_core::Rule { id: 1, level: 5, description: "x".to_string(), groups: vec![] }),
            agent: None,
            data: serde_json::Map::new(),
            full_log: None,
            alert_vector: None,
            ai_analysis: None,
        };
        assert!(!is_malformed(&alert));
    }
}
