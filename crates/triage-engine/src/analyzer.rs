//! Analyzer (C8, §4.8): selects a prompt template, invokes the LLM, and
//! extracts the risk-level token from the report.

use triage_core::RiskLevel;
use triage_providers::llm::{MAX_OUTPUT_TOKENS, MAX_TEMPERATURE};
use triage_providers::{ChatMessage, LlmClient};

use crate::formatter::FormattedContext;

const RISK_LEVEL_SCAN_CHARS: usize = 500;

pub struct AnalysisOutcome {
    pub report_text: String,
    pub provider_id: String,
    pub risk_level: RiskLevel,
}

const GRAPH_AWARE_SYSTEM_PROMPT: &str = "You are a security analyst triaging a SIEM alert using a threat knowledge graph. \
Given the alert summary and a graph context block rendered in Cypher-path notation, \
(1) summarize the event, (2) interpret the graph: attack paths, related entities, lateral movement, \
(3) rate risk as one of Critical/High/Medium/Low/Informational drawing on the graph evidence, \
(4) give a recommendation that references specific graph entities by name.";

const PLAIN_SYSTEM_PROMPT: &str = "You are a security analyst triaging a SIEM alert. \
Given the alert summary and supporting context (similar prior alerts, system metrics, process and network activity), \
(1) summarize the event, (2) interpret the available evidence, \
(3) rate risk as one of Critical/High/Medium/Low/Informational, \
(4) give a recommendation.";

fn render_graph_aware_prompt(alert_summary: &str, graph_context: &str) -> String {
    format!("Alert summary:\n{alert_summary}\n\nGraph context:\n{graph_context}")
}

fn render_plain_prompt(alert_summary: &str, ctx: &FormattedContext) -> String {
    format!(
        "Alert summary:\n{alert_summary}\n\nSimilar prior alerts:\n{}\n\nSystem metrics:\n{}\n\nProcess activity:\n{}\n\nNetwork activity:\n{}\n\nAdditional context:\n{}",
        ctx.similar_alerts_context, ctx.system_metrics_context, ctx.process_context, ctx.network_context, ctx.additional_context
    )
}

/// Extracts the highest-severity risk token found in the first
/// [`RISK_LEVEL_SCAN_CHARS`] characters of `report`, case-insensitively
/// (spec.md §9 open question, resolved as "highest severity wins").
fn extract_risk_level(report: &str) -> RiskLevel {
    let window: String = report.chars().take(RISK_LEVEL_SCAN_CHARS).collect();
    let candidates = window.split(|c: char| !c.is_alphanumeric()).filter_map(RiskLevel::parse_token);
    RiskLevel::highest(candidates).unwrap_or(RiskLevel::Unknown)
}

/// Runs the analysis. Never propagates an LLM failure; on timeout or
/// provider exhaustion, returns a structured analysis-failed report instead
/// (§4.8 step 5, §7 policy: "C8 converts LLM failure to a structured
/// analysis-failed report").
pub async fn analyze(llm: &LlmClient, alert_summary: &str, formatted: &FormattedContext) -> AnalysisOutcome {
    let (system_prompt, user_prompt) = if formatted.graph_present {
        (GRAPH_AWARE_SYSTEM_PROMPT, render_graph_aware_prompt(alert_summary, formatted.graph_context.as_deref().unwrap_or_default()))
    } else {
        (PLAIN_SYSTEM_PROMPT, render_plain_prompt(alert_summary, formatted))
    };

    let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];

    match llm.complete(&messages, MAX_OUTPUT_TOKENS, MAX_TEMPERATURE).await {
        Ok(completion) => AnalysisOutcome { risk_level: extract_risk_level(&completion.text), report_text: completion.text, provider_id: completion.provider_id },
        Err(err) => AnalysisOutcome {
            report_text: format!("analysis-failed: {err}"),
            provider_id: llm.provider_id().to_string(),
            risk_level: RiskLevel::Unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_severity_among_multiple_tokens() {
        let report = "This looks like a Low severity event, but could escalate to Critical if unaddressed.";
        assert_eq!(extract_risk_level(report), RiskLevel::Critical);
    }

    #[test]
    fn no_token_in_window_yields_unknown() {
        let report = "Nothing conclusive can be said about this event at this time.";
        assert_eq!(extract_risk_level(report), RiskLevel::Unknown);
    }

    #[test]
    fn token_outside_scan_window_is_ignored() {
        let padding = "x".repeat(RISK_LEVEL_SCAN_CHARS + 10);
        let report = format!("{padding} Critical");
        assert_eq!(extract_risk_level(&report), RiskLevel::Unknown);
    }
}
