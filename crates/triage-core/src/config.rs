//! Runtime configuration (§6.6), layered from a TOML file with environment
//! variable overrides — the teacher's `config` crate pattern — with a
//! `clap` surface for one-off CLI overrides on the pipeline binary.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

fn default_interval_seconds() -> u64 {
    60
}
fn default_batch_size() -> usize {
    10
}
fn default_alert_concurrency() -> usize {
    5
}
fn default_retrieval_concurrency() -> usize {
    8
}
fn default_k() -> usize {
    5
}
fn default_result_cap() -> usize {
    50
}
fn default_graph_minimum() -> usize {
    10
}
fn default_correlation_window_seconds() -> i64 {
    1800
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_log_filter() -> String {
    "triage_pipeline=info".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default)]
    pub credentials: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub credentials: String,
    pub model_id: String,
    /// Only consulted by the embedding client; the LLM client's concrete
    /// providers (§4.4) each hardcode their own API base URL.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    pub embedding_ms: u64,
    pub vector_store_ms: u64,
    pub graph_store_ms: u64,
    pub llm_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        // §5: embedding 10s, vector_store 5s, graph_store 30s per template, llm 25s.
        Self { embedding_ms: 10_000, vector_store_ms: 5_000, graph_store_ms: 30_000, llm_ms: 25_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub vector_store: StoreConfig,

    /// Optional: absent means the graph adapter boots in degraded mode (§4.3).
    #[serde(default)]
    pub graph_store: Option<StoreConfig>,

    pub embedding: ProviderConfig,
    pub llm: ProviderConfig,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_alert_concurrency")]
    pub alert_concurrency: usize,
    #[serde(default = "default_retrieval_concurrency")]
    pub retrieval_concurrency: usize,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
    #[serde(default = "default_graph_minimum")]
    pub graph_minimum: usize,
    #[serde(default = "default_correlation_window_seconds")]
    pub correlation_window_seconds: i64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Config {
    /// Layered load: `config/default.toml`, then `config/local.toml` if
    /// present, then environment variables prefixed `TRIAGE_` (double
    /// underscore as the nested-key separator), matching the teacher's
    /// `config` crate usage in `sx9-foundation-daemon`.
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("TRIAGE").separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn vector_store_credentials(&self) -> Option<SecretString> {
        self.vector_store.credentials.clone().map(SecretString::new)
    }
}

/// CLI overrides for local runs (teacher's `clap` `derive` + `env` pattern).
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "triage-pipeline", about = "AI-driven security alert triage engine")]
pub struct Cli {
    #[arg(long, env = "TRIAGE_INTERVAL_SECONDS")]
    pub interval_seconds: Option<u64>,

    #[arg(long, env = "TRIAGE_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(long, env = "TRIAGE_LOG_FILTER")]
    pub log_filter: Option<String>,

    #[arg(long, env = "TRIAGE_CONFIG_DIR", default_value = "config")]
    pub config_dir: String,
}

impl Cli {
    /// Apply CLI overrides onto a loaded `Config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(v) = self.interval_seconds {
            config.interval_seconds = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = &self.log_filter {
            config.log_filter = v.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_default_matches_spec_section_5() {
        let t = TimeoutsConfig::default();
        assert_eq!(t.embedding_ms, 10_000);
        assert_eq!(t.vector_store_ms, 5_000);
        assert_eq!(t.graph_store_ms, 30_000);
        assert_eq!(t.llm_ms, 25_000);
    }
}
