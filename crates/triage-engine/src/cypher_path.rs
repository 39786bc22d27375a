//! The Cypher-path notation (§6.5 grammar) used to render graph evidence
//! into the LLM prompt, and its inverse parser (used only by R1's
//! round-trip property test).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use triage_core::{GraphEdge, GraphNode, GraphPath};

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(([A-Za-z0-9_]+):([^{)]+?)(?:\s\{([^}]*)\})?\)").unwrap())
}

fn edge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-\[([A-Za-z0-9_]+)(?::\s*([^\]{]+?))?(?:\s\{([^}]*)\})?\]->\s*").unwrap())
}

fn render_kvlist(attrs: &BTreeMap<String, String>) -> String {
    attrs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn parse_kvlist(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn render_node(node: &GraphNode) -> String {
    if node.attrs.is_empty() {
        format!("({}:{})", node.node_type, node.id)
    } else {
        format!("({}:{} {{{}}})", node.node_type, node.id, render_kvlist(&node.attrs))
    }
}

fn render_edge(edge: &GraphEdge) -> String {
    let mut out = format!("-[{}", edge.rel_type);
    if let Some(summary) = &edge.summary {
        out.push_str(": ");
        out.push_str(summary);
    }
    if !edge.attrs.is_empty() {
        out.push(' ');
        out.push('{');
        out.push_str(&render_kvlist(&edge.attrs));
        out.push('}');
    }
    out.push_str("]->");
    out
}

/// Render one path as a single line per the §6.5 grammar. A well-formed
/// path with N edges renders `node0 -[edge0]-> node1 -[edge1]-> node2 ...`.
pub fn render_path(path: &GraphPath) -> String {
    if !path.is_well_formed() {
        return String::new();
    }
    let mut out = render_node(&path.nodes[0]);
    for (edge, node) in path.edges.iter().zip(path.nodes.iter().skip(1)) {
        out.push(' ');
        out.push_str(&render_edge(edge));
        out.push(' ');
        out.push_str(&render_node(node));
    }
    out
}

/// Parses one rendered line back into a `GraphPath`. Returns `None` if the
/// line does not conform to the grammar.
pub fn parse_line(line: &str) -> Option<GraphPath> {
    let mut remaining = line;
    let node_re = node_regex();
    let edge_re = edge_regex();

    let first = node_re.captures(remaining)?;
    let mut nodes = vec![GraphNode { node_type: first[1].to_string(), id: first[2].to_string(), attrs: first.get(3).map(|m| parse_kvlist(m.as_str())).unwrap_or_default() }];
    remaining = remaining[first.get(0).unwrap().end()..].trim_start();

    let mut edges = Vec::new();
    while !remaining.is_empty() {
        let edge_caps = edge_re.captures(remaining)?;
        edges.push(GraphEdge {
            rel_type: edge_caps[1].to_string(),
            summary: edge_caps.get(2).map(|m| m.as_str().trim().to_string()),
            attrs: edge_caps.get(3).map(|m| parse_kvlist(m.as_str())).unwrap_or_default(),
        });
        remaining = remaining[edge_caps.get(0).unwrap().end()..].trim_start();

        let node_caps = node_re.captures(remaining)?;
        nodes.push(GraphNode { node_type: node_caps[1].to_string(), id: node_caps[2].to_string(), attrs: node_caps.get(3).map(|m| parse_kvlist(m.as_str())).unwrap_or_default() });
        remaining = remaining[node_caps.get(0).unwrap().end()..].trim_start();
    }

    Some(GraphPath { nodes, edges })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(t: &str, id: &str) -> GraphNode {
        GraphNode { node_type: t.to_string(), id: id.to_string(), attrs: BTreeMap::new() }
    }

    #[test]
    fn renders_the_spec_example_verbatim() {
        let mut edge_attrs = BTreeMap::new();
        edge_attrs.insert("count".to_string(), "127x".to_string());
        let path = GraphPath::single_hop(node("IP", "203.0.113.45"), GraphEdge { rel_type: "FAILED_LOGIN".to_string(), summary: Some("127x".to_string()), attrs: BTreeMap::new() }, node("Host", "web-server-01"));
        let rendered = render_path(&path);
        assert_eq!(rendered, "(IP:203.0.113.45) -[FAILED_LOGIN: 127x]-> (Host:web-server-01)");
    }

    #[test]
    fn round_trips_single_hop_paths() {
        let path = GraphPath::single_hop(node("Alert", "a1"), GraphEdge { rel_type: "TRIGGERED_ON".to_string(), summary: None, attrs: BTreeMap::new() }, node("Host", "web-01"));
        let rendered = render_path(&path);
        let parsed = parse_line(&rendered).unwrap();
        assert_eq!(parsed.nodes.len(), path.nodes.len());
        assert_eq!(parsed.edges.len(), path.edges.len());
        assert_eq!(parsed.nodes[0].id, path.nodes[0].id);
        assert_eq!(parsed.edges[0].rel_type, path.edges[0].rel_type);
    }

    #[test]
    fn round_trips_multi_hop_paths_with_attrs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("is_internal".to_string(), "false".to_string());
        let nodes = vec![node("Alert", "a1"), GraphNode { node_type: "IpAddress".to_string(), id: "203.0.113.45".to_string(), attrs }, node("Host", "web-01")];
        let edges = vec![
            GraphEdge { rel_type: "HAS_SOURCE_IP".to_string(), summary: None, attrs: BTreeMap::new() },
            GraphEdge { rel_type: "COMMUNICATES_WITH".to_string(), summary: Some("3 sessions".to_string()), attrs: BTreeMap::new() },
        ];
        let path = GraphPath { nodes, edges };
        let rendered = render_path(&path);
        let parsed = parse_line(&rendered).unwrap();
        assert_eq!(parsed.nodes.len(), 3);
        assert_eq!(parsed.edges.len(), 2);
        assert_eq!(parsed.nodes[1].attrs.get("is_internal"), Some(&"false".to_string()));
    }
}
