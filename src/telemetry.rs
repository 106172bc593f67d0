use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize application telemetry (logging and metrics).
///
/// Configures:
/// - `tracing-subscriber::fmt` for structured logging, compact by default
///   or JSON lines when `LOG_FORMAT=json`.
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`).
/// - A global Prometheus recorder; render it with the returned handle.
pub fn init() -> anyhow::Result<PrometheusHandle> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,graphrag_qa=debug"));

    let compact_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .compact()
    });
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(compact_layer)
        .with(json_layer)
        .try_init()?;

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("questions_total", "Questions received");
    metrics::describe_counter!("questions_failed_total", "Questions answered with status failed");
    metrics::describe_histogram!(
        "question_latency_seconds",
        metrics::Unit::Seconds,
        "End-to-end answer latency"
    );
    metrics::describe_counter!("answer_cache_hits_total", "Answers served from cache");
    metrics::describe_counter!("llm_retries_total", "Retried LLM calls after transient failures");
    metrics::describe_gauge!("snapshot_version", "Version of the published graph snapshot");
}
