//! Graph Store Adapter (C3, §4.3).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use triage_core::{GraphEntity, GraphRelationship, NodeType, UpsertSummary};

use crate::backoff::retry_with_backoff;
use crate::error::{StoreError, StoreResult};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Parameterized traversal/write execution, session management, schema init
/// (§4.3). When the driver could not be established at construction, every
/// operation short-circuits to `StoreError::Unavailable` without attempting
/// a network call — the "degraded mode" sentinel (§4.3, §9 design note).
#[async_trait]
pub trait GraphStoreAdapter: Send + Sync {
    fn is_available(&self) -> bool;

    /// Creates uniqueness constraints per node identity key and indexes on
    /// `Alert.timestamp`, `IPAddress.address`, `Host.agent_id`,
    /// `User.username` when missing. Safe to call repeatedly.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Executes a parameterized query; parameters are never string-interpolated.
    async fn run(&self, query: &str, params: serde_json::Value, timeout: Duration) -> StoreResult<Vec<serde_json::Value>>;

    /// MERGE-style upsert for every node and edge. Edges whose endpoints
    /// could not be merged are dropped and counted in `edges_skipped`; this
    /// never fails the whole batch.
    async fn upsert(&self, entities: Vec<GraphEntity>, relationships: Vec<GraphRelationship>) -> StoreResult<UpsertSummary>;
}

pub(crate) fn identity_key(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Alert => "id",
        NodeType::Host => "agent_id",
        NodeType::IpAddress => "address",
        NodeType::User => "username",
        NodeType::Process => "identity",
        NodeType::File => "path",
        NodeType::Rule => "id",
        NodeType::ThreatIndicator => "value_kind",
    }
}

#[derive(Serialize)]
struct Statement {
    statement: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct Transaction {
    statements: Vec<Statement>,
}

#[derive(Deserialize, Default)]
struct StatementStats {
    #[serde(default)]
    nodes_created: u32,
    #[serde(default)]
    relationships_created: u32,
}

#[derive(Deserialize)]
struct RowData {
    #[serde(default)]
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
    #[serde(default)]
    stats: StatementStats,
}

#[derive(Deserialize)]
struct TransactionResponse {
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Flattens one returned row into a single JSON object: a node/relationship
/// column contributes its own properties at the top level, a scalar column
/// is keyed by its column name. Matches the plain-property "row" result
/// format of the transactional HTTP endpoint (no labels/internal ids).
fn flatten_row(columns: &[String], values: Vec<serde_json::Value>) -> serde_json::Value {
    let mut flat = serde_json::Map::new();
    for (column, value) in columns.iter().zip(values) {
        match value {
            serde_json::Value::Object(obj) => flat.extend(obj),
            other => {
                flat.insert(column.clone(), other);
            }
        }
    }
    serde_json::Value::Object(flat)
}

/// HTTP-backed adapter for a Cypher-style transactional endpoint (modeled on
/// Neo4j's HTTP transaction API; any store speaking the same contract works).
pub struct HttpGraphStore {
    http_client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<SecretString>,
    max_attempts: u32,
    initial_delay: Duration,
}

impl HttpGraphStore {
    /// `base_url = None` models "driver unavailable at startup" (§4.3):
    /// every operation returns `StoreError::Unavailable` without a network call.
    pub fn new(base_url: Option<String>, api_key: Option<SecretString>) -> StoreResult<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http_client, base_url, api_key, max_attempts: DEFAULT_MAX_ATTEMPTS, initial_delay: DEFAULT_INITIAL_DELAY })
    }

    fn require_base_url(&self) -> StoreResult<&str> {
        self.base_url.as_deref().ok_or_else(|| StoreError::Unavailable("graph driver not configured".to_string()))
    }

    async fn execute_transaction(&self, statements: Vec<Statement>) -> StoreResult<TransactionResponse> {
        let base_url = self.require_base_url()?;
        let mut builder = self.http_client.post(format!("{base_url}/tx/commit"));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let response = builder.json(&Transaction { statements }).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
        }
        Ok(response.json().await?)
    }

    fn merge_entity_statement(entity: &GraphEntity) -> Statement {
        let label = format!("{:?}", entity.node_type);
        let key = identity_key(entity.node_type);
        let mut parameters = serde_json::Map::new();
        parameters.insert("identity".to_string(), serde_json::Value::String(entity.identity.clone()));
        for (k, v) in &entity.attrs {
            parameters.insert(k.clone(), v.clone());
        }
        let set_clauses: String = entity.attrs.keys().map(|k| format!("n.{k} = ${k}")).collect::<Vec<_>>().join(", ");
        let statement = if set_clauses.is_empty() {
            format!("MERGE (n:{label} {{{key}: $identity}})")
        } else {
            format!("MERGE (n:{label} {{{key}: $identity}}) SET {set_clauses}")
        };
        Statement { statement, parameters: serde_json::Value::Object(parameters) }
    }

    fn merge_relationship_statement(rel: &GraphRelationship) -> Statement {
        let from_label = format!("{:?}", rel.from.node_type);
        let to_label = format!("{:?}", rel.to.node_type);
        let from_key = identity_key(rel.from.node_type);
        let to_key = identity_key(rel.to.node_type);
        let rel_type = format!("{:?}", rel.rel_type);

        let mut parameters = serde_json::Map::new();
        parameters.insert("from_identity".to_string(), serde_json::Value::String(rel.from.identity.clone()));
        parameters.insert("to_identity".to_string(), serde_json::Value::String(rel.to.identity.clone()));
        for (k, v) in &rel.attrs {
            parameters.insert(k.clone(), v.clone());
        }
        let set_clauses: String = rel.attrs.keys().map(|k| format!("r.{k} = ${k}")).collect::<Vec<_>>().join(", ");
        let set_clause = if set_clauses.is_empty() { String::new() } else { format!(" SET {set_clauses}") };

        let statement = format!(
            "MATCH (a:{from_label} {{{from_key}: $from_identity}}), (b:{to_label} {{{to_key}: $to_identity}}) \
             MERGE (a)-[r:{rel_type}]->(b){set_clause}"
        );
        Statement { statement, parameters: serde_json::Value::Object(parameters) }
    }
}

#[async_trait]
impl GraphStoreAdapter for HttpGraphStore {
    fn is_available(&self) -> bool {
        self.base_url.is_some()
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("graph driver not configured".to_string()));
        }
        let constraints = [NodeType::Alert, NodeType::Host, NodeType::IpAddress, NodeType::User, NodeType::Process, NodeType::File, NodeType::Rule, NodeType::ThreatIndicator]
            .into_iter()
            .map(|node_type| {
                let label = format!("{node_type:?}");
                let key = identity_key(node_type);
                Statement {
                    statement: format!("CREATE CONSTRAINT IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE"),
                    parameters: json!({}),
                }
            })
            .chain([
                Statement { statement: "CREATE INDEX IF NOT EXISTS FOR (n:Alert) ON (n.timestamp)".to_string(), parameters: json!({}) },
                Statement { statement: "CREATE INDEX IF NOT EXISTS FOR (n:IpAddress) ON (n.address)".to_string(), parameters: json!({}) },
                Statement { statement: "CREATE INDEX IF NOT EXISTS FOR (n:Host) ON (n.agent_id)".to_string(), parameters: json!({}) },
                Statement { statement: "CREATE INDEX IF NOT EXISTS FOR (n:User) ON (n.username)".to_string(), parameters: json!({}) },
            ])
            .collect();

        retry_with_backoff("graph_store", self.max_attempts, self.initial_delay, || async { self.execute_transaction(constraints_clone(&constraints)).await.map(|_| ()) }).await
    }

    async fn run(&self, query: &str, params: serde_json::Value, timeout: Duration) -> StoreResult<Vec<serde_json::Value>> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("graph driver not configured".to_string()));
        }
        let statement = Statement { statement: query.to_string(), parameters: params };
        let response = tokio::time::timeout(timeout, self.execute_transaction(vec![statement]))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;
        if !response.errors.is_empty() {
            return Err(StoreError::Api { status: 500, message: format!("{:?}", response.errors) });
        }
        let Some(result) = response.results.into_iter().next() else {
            return Ok(Vec::new());
        };
        let rows = result.data.into_iter().map(|row| flatten_row(&result.columns, row.row)).collect();
        Ok(rows)
    }

    async fn upsert(&self, entities: Vec<GraphEntity>, relationships: Vec<GraphRelationship>) -> StoreResult<UpsertSummary> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("graph driver not configured".to_string()));
        }

        let entities = triage_core::dedup_entities(entities);
        let relationships = triage_core::dedup_relationships(relationships);

        let mut summary = UpsertSummary::default();

        if !entities.is_empty() {
            let statements: Vec<Statement> = entities.iter().map(Self::merge_entity_statement).collect();
            let response = retry_with_backoff("graph_store", self.max_attempts, self.initial_delay, || async { self.execute_transaction(clone_statements(&statements)).await }).await?;
            summary.nodes_created = response.results.iter().map(|r| r.stats.nodes_created).sum();
        }

        // Relationships are merged one at a time so a missing endpoint only
        // drops that one edge (§3.4 invariant, §4.3 contract), never the batch.
        for rel in &relationships {
            let statement = Self::merge_relationship_statement(rel);
            match self.execute_transaction(vec![statement]).await {
                Ok(response) if response.errors.is_empty() => {
                    summary.relationships_created += response.results.iter().map(|r| r.stats.relationships_created).sum::<u32>();
                }
                _ => {
                    warn!(rel_type = ?rel.rel_type, from = ?rel.from, to = ?rel.to, "edge endpoint could not be merged, skipping");
                    summary.edges_skipped += 1;
                }
            }
        }

        Ok(summary)
    }
}

fn clone_statements(statements: &[Statement]) -> Vec<Statement> {
    statements.iter().map(|s| Statement { statement: s.statement.clone(), parameters: s.parameters.clone() }).collect()
}

fn constraints_clone(statements: &[Statement]) -> Vec<Statement> {
    clone_statements(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn degraded_mode_short_circuits_without_network_call() {
        let store = HttpGraphStore::new(None, None).unwrap();
        assert!(!store.is_available());
        let result = store.ensure_schema().await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        let result = store.upsert(vec![], vec![]).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn identity_key_covers_every_node_type() {
        for node_type in [NodeType::Alert, NodeType::Host, NodeType::IpAddress, NodeType::User, NodeType::Process, NodeType::File, NodeType::Rule, NodeType::ThreatIndicator] {
            assert!(!identity_key(node_type).is_empty());
        }
    }
}
