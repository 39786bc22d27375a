//! Context Formatter (C7, §4.7): renders the context bundle into the string
//! slots required by the prompt templates. Pure; cannot fail (§7 policy).

use triage_core::{ContextBundle, Slot};

const PER_RECORD_CAP: usize = 400;
const GRAPH_BLOCK_CAP: usize = 4_000;
const DEGENERATE_FALLBACK_MAX_LINES: usize = 10;
const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// The rendered prompt slots, plus `graph_present` (§4.7, §6.5).
#[derive(Debug, Clone, Default)]
pub struct FormattedContext {
    pub graph_present: bool,
    pub graph_context: Option<String>,
    pub similar_alerts_context: String,
    pub system_metrics_context: String,
    pub process_context: String,
    pub network_context: String,
    pub additional_context: String,
}

fn truncate(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(cap).collect();
        truncated.push_str("...");
        truncated
    }
}

fn render_plain_block(slot: Slot, bundle: &ContextBundle) -> String {
    let records = bundle.records(slot);
    if records.is_empty() {
        return String::new();
    }
    let mut out = format!("{}:\n", slot.header());
    for record in records {
        let mut line = String::from("- ");
        if let Some(score) = record.score {
            line.push_str(&format!("(score {score:.3}) "));
        }
        let body = record
            .field_str("report_text")
            .or_else(|| record.field_str("description"))
            .map(str::to_string)
            .unwrap_or_else(|| record.fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", "));
        line.push_str(&truncate(&body, PER_RECORD_CAP));
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn render_graph_block(bundle: &ContextBundle) -> String {
    let graph_slots = [
        Slot::AttackPaths,
        Slot::LateralMovement,
        Slot::TemporalSequences,
        Slot::ProcessChains,
        Slot::FileInteractions,
        Slot::NetworkTopology,
        Slot::UserBehavior,
        Slot::IpReputation,
        Slot::ThreatLandscape,
    ];

    let mut out = String::new();
    for slot in graph_slots {
        let records = bundle.records(slot);
        if records.is_empty() {
            continue;
        }
        out.push_str(&format!("{}:\n", slot.header()));
        for record in records {
            if let Some(path) = &record.graph_path {
                if path.is_well_formed() {
                    out.push_str(&crate::cypher_path::render_path(path));
                    out.push('\n');
                }
            }
        }
    }

    if out.chars().count() > GRAPH_BLOCK_CAP {
        let mut capped: String = out.chars().take(GRAPH_BLOCK_CAP).collect();
        capped.push_str(TRUNCATION_MARKER);
        capped
    } else {
        out
    }
}

/// Degenerate Cypher-path fallback (§4.7): when no gating slot is populated
/// but non-graph records still carry entity-shaped fields (an IP, a host),
/// synthesize a handful of structured lines so the LLM isn't left with
/// nothing but prose. Capped at 10 lines.
fn synthesize_degenerate_lines(bundle: &ContextBundle) -> String {
    let mut lines = Vec::new();
    for slot in [Slot::SimilarAlerts, Slot::HostMetrics, Slot::ProcessData, Slot::NetworkLogs, Slot::ProtocolLogs] {
        for record in bundle.records(slot) {
            if lines.len() >= DEGENERATE_FALLBACK_MAX_LINES {
                break;
            }
            let Some(ip) = record.field_str("srcip").or_else(|| record.field_str("dstip")) else { continue };
            let host = record.field_str("host_name").or_else(|| record.field_str("agent_name")).unwrap_or("unknown-host");
            lines.push(format!("(IpAddress:{ip}) -[OBSERVED_WITH]-> (Host:{host})"));
        }
    }
    lines.truncate(DEGENERATE_FALLBACK_MAX_LINES);
    lines.join("\n")
}

/// Renders the bundle. Never fails (§4.7, §7: "C5, C7 are pure and cannot fail").
pub fn format(bundle: &ContextBundle) -> FormattedContext {
    let graph_present = bundle.graph_present();

    let graph_context = if graph_present {
        Some(render_graph_block(bundle))
    } else {
        let fallback = synthesize_degenerate_lines(bundle);
        if fallback.is_empty() {
            None
        } else {
            Some(fallback)
        }
    };

    let network_context = {
        let mut combined = render_plain_block(Slot::NetworkLogs, bundle);
        combined.push_str(&render_plain_block(Slot::ProtocolLogs, bundle));
        combined
    };

    FormattedContext {
        graph_present,
        graph_context,
        similar_alerts_context: render_plain_block(Slot::SimilarAlerts, bundle),
        system_metrics_context: render_plain_block(Slot::HostMetrics, bundle),
        process_context: render_plain_block(Slot::ProcessData, bundle),
        network_context,
        additional_context: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{EvidenceRecord, EvidenceSource, GraphEdge, GraphNode, GraphPath};

    #[test]
    fn empty_bundle_yields_no_graph_context() {
        let bundle = ContextBundle::new();
        let formatted = format(&bundle);
        assert!(!formatted.graph_present);
        assert!(formatted.graph_context.is_none());
    }

    #[test]
    fn gating_slot_with_graph_path_renders_cypher_block_under_cap() {
        let mut bundle = ContextBundle::new();
        let path = GraphPath::single_hop(
            GraphNode { node_type: "IpAddress".to_string(), id: "203.0.113.45".to_string(), attrs: Default::default() },
            GraphEdge { rel_type: "HAS_SOURCE_IP".to_string(), summary: None, attrs: Default::default() },
            GraphNode { node_type: "Alert".to_string(), id: "a1".to_string(), attrs: Default::default() },
        );
        bundle.set_records(Slot::AttackPaths, vec![EvidenceRecord { source: EvidenceSource::Graph, score: None, fields: Default::default(), graph_path: Some(path) }], 50);

        let formatted = format(&bundle);
        assert!(formatted.graph_present);
        let context = formatted.graph_context.unwrap();
        assert!(context.contains("HAS_SOURCE_IP"));
        assert!(context.chars().count() <= GRAPH_BLOCK_CAP + TRUNCATION_MARKER.len());
    }

    #[test]
    fn degenerate_fallback_is_capped_at_ten_lines() {
        let mut bundle = ContextBundle::new();
        let records = (0..20)
            .map(|i| {
                let mut fields = serde_json::Map::new();
                fields.insert("srcip".to_string(), serde_json::Value::String(format!("10.0.0.{i}")));
                EvidenceRecord { source: EvidenceSource::VectorKnn, score: None, fields, graph_path: None }
            })
            .collect();
        bundle.set_records(Slot::SimilarAlerts, records, 50);

        let formatted = format(&bundle);
        assert!(!formatted.graph_present);
        let fallback = formatted.graph_context.unwrap();
        assert_eq!(fallback.lines().count(), DEGENERATE_FALLBACK_MAX_LINES);
    }
}
