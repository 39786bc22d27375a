//! Embedding Client (C1, §4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use triage_core::Alert;

use crate::backoff::retry_with_backoff;
use crate::error::{ProviderError, Result};

const MAX_FULL_LOG_CHARS: usize = 8000;
const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Turn an alert into text, then embed it, with bounded exponential-backoff
/// retry (§4.1 contract). Implementations own their retry policy so this
/// trait's methods never return a transient error — only the final
/// `ProviderError::Unavailable`.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_alert(&self, alert: &Alert) -> Result<Vec<f32>> {
        let text = project_alert_text(alert);
        self.embed(&text).await
    }

    /// Total input tokens recorded across calls (§4.1: "Records tokens_in
    /// per call"), for the scheduler's metrics.
    fn tokens_in_total(&self) -> u64;
}

/// Project an alert into the compact textual form §4.1 specifies: rule
/// description and level, agent identifier, rule groups, and selected
/// `data` fields, with `full_log` truncated to 8000 characters.
pub fn project_alert_text(alert: &Alert) -> String {
    let mut parts = Vec::new();

    if let Some(rule) = &alert.rule {
        parts.push(format!("rule: {} (level {})", rule.description, rule.level));
        if !rule.groups.is_empty() {
            parts.push(format!("groups: {}", rule.groups.join(", ")));
        }
    }
    if let Some(agent) = &alert.agent {
        parts.push(format!("agent: {} ({})", agent.name, agent.id));
    }
    for field in ["srcip", "dstip", "srcuser", "process", "file"] {
        if let Some(value) = alert.data_str(field) {
            parts.push(format!("{field}: {value}"));
        }
    }
    if let Some(full_log) = &alert.full_log {
        let truncated: String = full_log.chars().take(MAX_FULL_LOG_CHARS).collect();
        parts.push(format!("log: {truncated}"));
    }

    parts.join("\n")
}

/// L2-normalize a vector in place. A zero vector is left unchanged.
fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Matryoshka-style prefix truncation to the construction-time dimension,
/// followed by L2 normalization (§4.1).
fn truncate_and_normalize(mut vector: Vec<f32>, target_dim: usize) -> Vec<f32> {
    if vector.len() > target_dim {
        vector.truncate(target_dim);
    }
    l2_normalize(&mut vector);
    vector
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponseRow {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseRow>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    prompt_tokens: u64,
}

/// HTTP-backed embedding client for an OpenAI-compatible embeddings endpoint
/// (§6.2: "the specific model and dimension are configuration").
pub struct HttpEmbeddingClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model_id: String,
    target_dim: usize,
    tokens_in_total: AtomicU64,
    max_attempts: u32,
    initial_delay: Duration,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, model_id: impl Into<String>, target_dim: usize) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
            model_id: model_id.into(),
            target_dim,
            tokens_in_total: AtomicU64::new(0),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        })
    }

    async fn embed_once(&self, text: &str) -> Result<(Vec<f32>, u64)> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&EmbeddingRequest { input: text, model: &self.model_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api { status: status.as_u16(), message: response.text().await.unwrap_or_default() });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| ProviderError::Api { status: status.as_u16(), message: "empty embeddings response".to_string() })?;
        let tokens = parsed.usage.map(|u| u.prompt_tokens).unwrap_or(0);
        Ok((vector, tokens))
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(chars = text.len(), "embedding text");
        let (vector, tokens) = retry_with_backoff("embedding", self.max_attempts, self.initial_delay, || self.embed_once(text)).await?;
        self.tokens_in_total.fetch_add(tokens, Ordering::Relaxed);
        Ok(truncate_and_normalize(vector, self.target_dim))
    }

    fn tokens_in_total(&self) -> u64 {
        self.tokens_in_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Agent, Rule};

    fn sample_alert() -> Alert {
        Alert {
            id: "a1".into(),
            timestamp: chrono::Utc::now(),
            rule: Some(Rule { id: 100002, level: 8, description: "SSH brute force attack detected".into(), groups: vec!["authentication".into(), "attack".into()] }),
            agent: Some(Agent { id: "A1".into(), name: "web-01".into(), ip: Some("192.168.1.10".into()) }),
            data: serde_json::json!({"srcip": "203.0.113.45", "dstip": "192.168.1.10", "srcuser": "admin"}).as_object().unwrap().clone(),
            full_log: Some("x".repeat(9000)),
            alert_vector: None,
            ai_analysis: None,
        }
    }

    #[test]
    fn projection_includes_rule_and_truncates_log() {
        let text = project_alert_text(&sample_alert());
        assert!(text.contains("SSH brute force"));
        assert!(text.contains("srcip: 203.0.113.45"));
        let log_line = text.lines().find(|l| l.starts_with("log: ")).unwrap();
        assert_eq!(log_line.len() - "log: ".len(), MAX_FULL_LOG_CHARS);
    }

    #[test]
    fn projection_handles_malformed_alert() {
        let alert = Alert { id: "a3".into(), timestamp: chrono::Utc::now(), rule: None, agent: None, data: serde_json::Map::new(), full_log: None, alert_vector: None, ai_analysis: None };
        assert_eq!(project_alert_text(&alert), "");
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let v = truncate_and_normalize(vec![3.0, 4.0], 2);
        assert!((v[0] * v[0] + v[1] * v[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn truncation_applies_before_normalize() {
        let v = truncate_and_normalize(vec![3.0, 4.0, 5.0], 2);
        assert_eq!(v.len(), 2);
    }

    #[tokio::test]
    async fn embed_posts_to_embeddings_endpoint_and_tracks_tokens() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [3.0, 4.0]}],
                "usage": {"prompt_tokens": 12},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(server.uri(), SecretString::new("test-key".to_string()), "text-embedding-test", 2).unwrap();
        let vector = client.embed("some alert text").await.unwrap();

        assert_eq!(vector.len(), 2);
        assert!((vector[0] * vector[0] + vector[1] * vector[1] - 1.0).abs() < 1e-6);
        assert_eq!(client.tokens_in_total(), 12);
    }

    #[tokio::test]
    async fn embed_does_not_retry_a_non_retryable_api_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(server.uri(), SecretString::new("test-key".to_string()), "text-embedding-test", 2).unwrap();
        let result = client.embed("some alert text").await;

        assert!(result.is_err());
    }
}
