//! Bootstrap binary for the alert triage pipeline: loads configuration,
//! wires the adapters, and runs the scheduler until an OS signal arrives.

mod metrics;
mod processor;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use triage_core::config::{Cli, Config, ProviderConfig};
use triage_engine::{Retriever, RetrieverConfig};
use triage_providers::llm::LlmClient;
use triage_providers::providers::{anthropic::AnthropicProvider, openai::OpenAiProvider, Provider};
use triage_providers::HttpEmbeddingClient;
use triage_stores::{GraphStoreAdapter, HttpGraphStore, HttpVectorStore, VectorStoreAdapter};

use crate::metrics::Metrics;
use crate::processor::ProcessorDeps;
use crate::scheduler::SchedulerConfig;

fn init_tracing(log_filter: &str) {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("triage_pipeline=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Selects the closed provider variant by model id prefix (§4.4: "selected at
/// construction from a closed set").
fn build_llm_client(config: &ProviderConfig, timeout: Duration) -> anyhow::Result<LlmClient> {
    let api_key = SecretString::new(config.credentials.clone());
    let provider = if config.model_id.starts_with("claude") {
        Provider::Anthropic(AnthropicProvider::new(api_key, config.model_id.clone())?)
    } else {
        Provider::OpenAi(OpenAiProvider::new(api_key, config.model_id.clone())?)
    };
    Ok(LlmClient::new(provider, timeout))
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(Config::load()?);
    init_tracing(&config.log_filter);

    info!(interval_seconds = config.interval_seconds, batch_size = config.batch_size, "starting alert triage pipeline");

    let vector_store = Arc::new(HttpVectorStore::new(
        config.vector_store.url.clone(),
        config.vector_store_credentials(),
        "alerts",
        config.embedding_dimension,
        Duration::from_millis(config.timeouts.vector_store_ms),
    )?);
    if let Err(err) = vector_store.ensure_index_template().await {
        error!(error = %err, "failed to ensure vector store index template, continuing");
    }

    let graph_store: Arc<HttpGraphStore> = match &config.graph_store {
        Some(store_config) => {
            let api_key = store_config.credentials.clone().map(SecretString::new);
            let store = Arc::new(HttpGraphStore::new(Some(store_config.url.clone()), api_key)?);
            if let Err(err) = store.ensure_schema().await {
                error!(error = %err, "graph store schema init failed, continuing in degraded mode");
            }
            store
        }
        None => {
            info!("no graph_store configured, booting in degraded mode");
            Arc::new(HttpGraphStore::new(None, None)?)
        }
    };

    let embedding = Arc::new(HttpEmbeddingClient::new(
        config.embedding.base_url.clone(),
        SecretString::new(config.embedding.credentials.clone()),
        config.embedding.model_id.clone(),
        config.embedding_dimension,
    )?);

    let llm = Arc::new(build_llm_client(&config.llm, Duration::from_millis(config.timeouts.llm_ms))?);

    let retriever = Arc::new(Retriever::new(
        vector_store.clone(),
        graph_store.clone(),
        RetrieverConfig {
            retrieval_concurrency: config.retrieval_concurrency,
            result_cap: config.result_cap,
            graph_minimum: config.graph_minimum,
            vector_store_timeout: Duration::from_millis(config.timeouts.vector_store_ms),
            graph_store_timeout: Duration::from_millis(config.timeouts.graph_store_ms),
        },
    ));

    let deps = Arc::new(ProcessorDeps {
        embedding,
        vector_store,
        graph_store,
        retriever,
        llm,
        embedding_dimension: config.embedding_dimension,
        similarity_threshold: config.similarity_threshold,
    });

    let metrics = Arc::new(Metrics::default());
    let shutdown = CancellationToken::new();

    let scheduler_shutdown = shutdown.clone();
    let scheduler_metrics = metrics.clone();
    let scheduler_config = SchedulerConfig {
        interval: Duration::from_secs(config.interval_seconds),
        batch_size: config.batch_size,
        alert_concurrency: config.alert_concurrency,
    };

    let scheduler_handle = tokio::spawn(async move {
        scheduler::run(deps, scheduler_config, scheduler_metrics, scheduler_shutdown).await;
    });

    wait_for_shutdown_signal().await;
    shutdown.cancel();
    let _ = scheduler_handle.await;

    let snapshot = metrics.snapshot();
    info!(
        ticks_run = snapshot.ticks_run,
        ticks_skipped = snapshot.ticks_skipped,
        alerts_processed = snapshot.alerts_processed,
        alerts_failed = snapshot.alerts_failed,
        alerts_unprocessable = snapshot.alerts_unprocessable,
        "alert triage pipeline stopped"
    );

    Ok(())
}
