//! GraphRAG question answering server and benchmark runner.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};

use graphrag_qa::benchmark::{self, BenchmarkHarness, OutputDirs};
use graphrag_qa::config::{AppConfig, RunMode, load_llm_settings};
use graphrag_qa::llm::{ChatCompletionsDriver, TextGenerator};
use graphrag_qa::{AppState, build_embedder, build_extractor, build_service, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    // Initialize tracing and metrics (M-LOG-STRUCTURED)
    let metrics = telemetry::init()?;

    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    let settings = load_llm_settings().map_err(|msg| anyhow::anyhow!("Configuration error: {msg}"))?;
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let llm: Arc<dyn TextGenerator> = Arc::new(ChatCompletionsDriver::new(settings)?);
    let embedder = build_embedder(&config).await?;
    let extractor = build_extractor(&config, Arc::clone(&llm))?;
    let service = Arc::new(build_service(&config, llm, embedder, extractor)?);

    let corpus_dir = config.corpus_dir();
    match service.reindex_dir(&corpus_dir).await {
        Ok(stats) => info!(
            name: "index.built",
            version = stats.version,
            entities = stats.entities,
            relations = stats.relations,
            communities = stats.communities,
            "Initial index built"
        ),
        // A benchmark against an empty graph measures nothing.
        Err(e) if config.mode == RunMode::Benchmark => {
            return Err(e).context(format!("indexing {} failed", corpus_dir.display()));
        }
        Err(e) => error!(
            corpus_dir = %corpus_dir.display(),
            error = %e,
            "Initial indexing failed; serving an empty graph"
        ),
    }

    match config.mode {
        RunMode::Serve => {
            let state = AppState::new(service, Arc::clone(&config), Some(metrics));
            server::start_server(state).await
        }
        RunMode::Benchmark => run_benchmark(&config, service).await,
    }
}

async fn run_benchmark(
    config: &AppConfig,
    service: Arc<graphrag_qa::rag::QuestionService>,
) -> anyhow::Result<()> {
    let settings = &config.benchmark;
    let path = settings
        .questions_file
        .as_deref()
        .context("benchmark mode requires benchmark.questions_file")?;
    let questions = benchmark::load_questions(Path::new(path)).await?;

    let mut harness = BenchmarkHarness::new(
        service,
        OutputDirs::new(&settings.metrics_dir, &settings.data_dir),
    );
    if let Some(url) = &settings.endpoint_url {
        let timeout = config.resilience.request_timeout() + Duration::from_secs(5);
        harness = harness.with_endpoint(url.clone(), timeout)?;
    }

    let report = harness.run(&questions, settings.concurrency).await?;
    info!(
        name: "benchmark.finished",
        questions = report.internal.questions,
        successes = report.internal.successes,
        failures = report.internal.failures,
        throughput_qps = report.internal.throughput_qps,
        metrics_dir = %settings.metrics_dir,
        data_dir = %settings.data_dir,
        "Benchmark finished"
    );
    Ok(())
}
