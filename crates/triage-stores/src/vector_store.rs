//! Vector Store Adapter (C2, §4.2).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use triage_core::{AiAnalysis, Alert, EvidenceRecord, EvidenceSource};

use crate::backoff::retry_with_backoff;
use crate::error::{StoreError, StoreResult};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// k-NN filter (§4.2: "default filter excludes alerts lacking `ai_analysis`").
#[derive(Debug, Clone, Copy)]
pub struct KnnFilter {
    pub require_ai_analysis: bool,
}

impl Default for KnnFilter {
    fn default() -> Self {
        Self { require_ai_analysis: true }
    }
}

#[derive(Debug, Clone)]
pub struct KeywordTimeWindowQuery {
    pub keywords: Vec<String>,
    pub host: Option<String>,
    pub from_ts: DateTime<Utc>,
    pub to_ts: DateTime<Utc>,
    pub size: usize,
}

/// k-NN search + document update against the SIEM index (§4.2, §6.1).
#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    /// Returns the `limit` oldest alerts lacking `ai_analysis`, oldest-first
    /// by event time.
    async fn list_unprocessed(&self, limit: usize) -> StoreResult<Vec<Alert>>;

    /// Top-k by cosine similarity, respecting `filter`.
    async fn knn(&self, vector: &[f32], k: usize, filter: KnnFilter) -> StoreResult<Vec<EvidenceRecord>>;

    /// Compound fuzzy query over rule description, `data.*`, `full_log`,
    /// dual-sorted by score then timestamp.
    async fn keyword_time_window(&self, query: KeywordTimeWindowQuery) -> StoreResult<Vec<EvidenceRecord>>;

    /// Idempotent partial document update.
    async fn update_enrichment(&self, alert_id: &str, vector: &[f32], analysis: &AiAnalysis) -> StoreResult<()>;

    /// Installs the `alert_vector` k-NN mapping (cosine, HNSW m=16,
    /// ef_construction=512). Safe to call repeatedly.
    async fn ensure_index_template(&self) -> StoreResult<()>;
}

#[derive(Serialize)]
struct IndexMapping {
    mappings: IndexMappingProperties,
}

#[derive(Serialize)]
struct IndexMappingProperties {
    properties: serde_json::Value,
}

/// HTTP-backed adapter for an OpenSearch/Elasticsearch-style k-NN index
/// (§6.1: "knn_vector, configured dimension, cosine similarity, HNSW
/// parameters m=16, ef_construction=512, ef_search>=256").
pub struct HttpVectorStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    index_name: String,
    vector_dim: usize,
    max_attempts: u32,
    initial_delay: Duration,
}

impl HttpVectorStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>, index_name: impl Into<String>, vector_dim: usize, timeout: Duration) -> StoreResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client, base_url: base_url.into(), api_key, index_name: index_name.into(), vector_dim, max_attempts: DEFAULT_MAX_ATTEMPTS, initial_delay: DEFAULT_INITIAL_DELAY })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.index_name, path);
        let mut builder = self.http_client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        builder
    }

    async fn search_once(&self, body: serde_json::Value) -> StoreResult<Vec<serde_json::Value>> {
        let response = self.request(reqwest::Method::POST, "_search").json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
        }
        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed["hits"]["hits"].as_array().cloned().unwrap_or_default())
    }
}

fn hit_to_evidence(hit: &serde_json::Value, source: EvidenceSource) -> EvidenceRecord {
    let score = hit["_score"].as_f64().map(|s| s as f32);
    let fields = hit["_source"].as_object().cloned().unwrap_or_default();
    EvidenceRecord { source, score, fields, graph_path: None }
}

fn hit_to_alert(hit: &serde_json::Value) -> Option<Alert> {
    serde_json::from_value(hit["_source"].clone()).ok()
}

#[async_trait]
impl VectorStoreAdapter for HttpVectorStore {
    async fn list_unprocessed(&self, limit: usize) -> StoreResult<Vec<Alert>> {
        let body = json!({
            "size": limit,
            "query": { "bool": { "must_not": [ { "exists": { "field": "ai_analysis" } } ] } },
            "sort": [ { "timestamp": "asc" } ],
        });
        let hits = retry_with_backoff("vector_store", self.max_attempts, self.initial_delay, || self.search_once(body.clone())).await?;
        Ok(hits.iter().filter_map(hit_to_alert).collect())
    }

    async fn knn(&self, vector: &[f32], k: usize, filter: KnnFilter) -> StoreResult<Vec<EvidenceRecord>> {
        let mut query = json!({ "knn": { "alert_vector": { "vector": vector, "k": k } } });
        if filter.require_ai_analysis {
            query = json!({
                "bool": {
                    "must": [ query ],
                    "filter": [ { "exists": { "field": "ai_analysis" } } ],
                }
            });
        }
        let body = json!({ "size": k, "query": query });
        let hits = retry_with_backoff("vector_store", self.max_attempts, self.initial_delay, || self.search_once(body.clone())).await?;
        Ok(hits.iter().map(|h| hit_to_evidence(h, EvidenceSource::VectorKnn)).collect())
    }

    async fn keyword_time_window(&self, query: KeywordTimeWindowQuery) -> StoreResult<Vec<EvidenceRecord>> {
        let should: Vec<serde_json::Value> = query
            .keywords
            .iter()
            .map(|kw| {
                json!({
                    "multi_match": {
                        "query": kw,
                        "fields": ["rule.description^2", "data.*", "full_log"],
                        "fuzziness": "AUTO",
                    }
                })
            })
            .collect();

        let mut filters = vec![json!({
            "range": { "timestamp": { "gte": query.from_ts.to_rfc3339(), "lte": query.to_ts.to_rfc3339() } }
        })];
        if let Some(host) = &query.host {
            filters.push(json!({ "term": { "agent.name": host } }));
        }

        let body = json!({
            "size": query.size,
            "query": { "bool": { "should": should, "minimum_should_match": 1, "filter": filters } },
            "sort": [ "_score", { "timestamp": "desc" } ],
        });

        let hits = retry_with_backoff("vector_store", self.max_attempts, self.initial_delay, || self.search_once(body.clone())).await?;
        Ok(hits.iter().map(|h| hit_to_evidence(h, EvidenceSource::KeywordTimeWindow)).collect())
    }

    async fn update_enrichment(&self, alert_id: &str, vector: &[f32], analysis: &AiAnalysis) -> StoreResult<()> {
        let body = json!({
            "doc": {
                "alert_vector": vector,
                "ai_analysis": analysis,
            }
        });
        retry_with_backoff("vector_store", self.max_attempts, self.initial_delay, || {
            let path = format!("_update/{alert_id}");
            let body = body.clone();
            async move {
                let response = self.request(reqwest::Method::POST, &path).json(&body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(StoreError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
                }
                Ok(())
            }
        })
        .await
    }

    async fn ensure_index_template(&self) -> StoreResult<()> {
        let mapping = IndexMapping {
            mappings: IndexMappingProperties {
                properties: json!({
                    "alert_vector": {
                        "type": "knn_vector",
                        "dimension": self.vector_dim,
                        "method": {
                            "name": "hnsw",
                            "space_type": "cosinesimil",
                            "parameters": { "m": 16, "ef_construction": 512 },
                        },
                    },
                    "ai_analysis": { "type": "object", "enabled": true },
                }),
            },
        };
        retry_with_backoff("vector_store", self.max_attempts, self.initial_delay, || {
            let mapping = serde_json::to_value(&mapping).unwrap();
            async move {
                let response = self.request(reqwest::Method::PUT, "").json(&mapping).send().await?;
                let status = response.status();
                if !status.is_success() && status.as_u16() != 400 {
                    // 400 commonly means "index already exists" on a repeat call.
                    return Err(StoreError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
                }
                Ok(())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_knn_filter_excludes_unanalyzed() {
        assert!(KnnFilter::default().require_ai_analysis);
    }
}
