//! Bounded worker pool that replays a question set through the question
//! service, and optionally through a live HTTP endpoint.

use super::report::{BenchmarkReport, Phase, PhaseReport, QuestionOutcome};
use super::BenchmarkError;
use crate::rag::domain::answer::{AnswerStatus, Question};
use crate::rag::service::QuestionService;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const INTERNAL_RESULTS_FILE: &str = "benchmark_internal_results.json";
pub const END_TO_END_RESULTS_FILE: &str = "benchmark_end_to_end_results.json";
pub const SUMMARY_FILE: &str = "benchmark_summary.json";

/// Where reports are written.
#[derive(Debug, Clone)]
pub struct OutputDirs {
    /// Receives `benchmark_summary.json`
    pub metrics_dir: PathBuf,
    /// Receives the per-phase result files
    pub data_dir: PathBuf,
}

impl OutputDirs {
    pub fn new(metrics_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            metrics_dir: metrics_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Create both directories and verify they accept writes.
    pub async fn prepare(&self) -> Result<(), BenchmarkError> {
        for dir in [&self.metrics_dir, &self.data_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| BenchmarkError::Io {
                    path: dir.clone(),
                    source,
                })?;

            let marker = dir.join(".write-check");
            tokio::fs::write(&marker, b"")
                .await
                .map_err(|source| BenchmarkError::Io {
                    path: dir.clone(),
                    source,
                })?;
            // Best effort; the marker file is empty.
            let _ = tokio::fs::remove_file(&marker).await;
        }
        Ok(())
    }
}

/// Request body sent to `POST /question`.
#[derive(Debug, Serialize)]
struct QuestionBody<'a> {
    question: &'a str,
}

/// The fields of the HTTP response the harness cares about.
#[derive(Debug, Deserialize)]
struct AnswerBody {
    #[serde(default)]
    status: Option<AnswerStatus>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Drives the question service with a capped number of in-flight requests.
#[derive(Debug)]
pub struct BenchmarkHarness {
    service: Arc<QuestionService>,
    output: OutputDirs,
    endpoint_url: Option<String>,
    http: reqwest::Client,
}

impl BenchmarkHarness {
    pub fn new(service: Arc<QuestionService>, output: OutputDirs) -> Self {
        Self {
            service,
            output,
            endpoint_url: None,
            http: reqwest::Client::new(),
        }
    }

    /// Also replay every question against `url` (a `POST /question` endpoint).
    pub fn with_endpoint(mut self, url: impl Into<String>, timeout: Duration) -> Result<Self, BenchmarkError> {
        self.http = reqwest::Client::builder().timeout(timeout).build()?;
        self.endpoint_url = Some(url.into());
        Ok(self)
    }

    /// Run every phase and persist the results.
    ///
    /// Output directories are checked before the first question is issued.
    pub async fn run(
        &self,
        questions: &[String],
        concurrency: usize,
    ) -> Result<BenchmarkReport, BenchmarkError> {
        if concurrency == 0 {
            return Err(BenchmarkError::InvalidConcurrency);
        }
        self.output.prepare().await?;

        let started_at = Utc::now();
        let snapshot_version = self.service.store().snapshot().version();
        info!(
            questions = questions.len(),
            concurrency,
            snapshot_version,
            "Benchmark started"
        );

        let internal = self.run_internal(questions, concurrency).await;
        write_json(&self.output.data_dir.join(INTERNAL_RESULTS_FILE), &internal).await?;
        log_phase(&internal);

        let end_to_end = match &self.endpoint_url {
            Some(url) => {
                let phase = self.run_end_to_end(url, questions, concurrency).await;
                write_json(&self.output.data_dir.join(END_TO_END_RESULTS_FILE), &phase).await?;
                log_phase(&phase);
                Some(phase)
            }
            None => None,
        };

        let report = BenchmarkReport {
            started_at,
            finished_at: Utc::now(),
            snapshot_version,
            internal,
            end_to_end,
        };
        write_json(&self.output.metrics_dir.join(SUMMARY_FILE), &report.summary()).await?;
        Ok(report)
    }

    async fn run_internal(&self, questions: &[String], concurrency: usize) -> PhaseReport {
        let started = Instant::now();
        let outcomes: Vec<QuestionOutcome> = futures::stream::iter(questions.iter().enumerate())
            .map(|(index, text)| async move {
                let t = Instant::now();
                let trace = self.service.answer_traced(Question::new(text.as_str())).await;
                let latency_ms = t.elapsed().as_secs_f64() * 1000.0;
                QuestionOutcome {
                    index,
                    question: text.clone(),
                    request_id: Some(trace.request_id),
                    status: trace.answer.status,
                    latency_ms,
                    retrieve_ms: Some(trace.timings.retrieve_ms),
                    compose_ms: Some(trace.timings.compose_ms),
                    generate_ms: Some(trace.timings.generate_ms),
                    cached: trace.cached,
                    error: trace.answer.failure.map(|f| f.message),
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        PhaseReport::from_outcomes(Phase::Internal, concurrency, outcomes, started.elapsed())
    }

    async fn run_end_to_end(&self, url: &str, questions: &[String], concurrency: usize) -> PhaseReport {
        let started = Instant::now();
        let outcomes: Vec<QuestionOutcome> = futures::stream::iter(questions.iter().enumerate())
            .map(|(index, text)| async move {
                let t = Instant::now();
                let result = self.post_question(url, text).await;
                let latency_ms = t.elapsed().as_secs_f64() * 1000.0;
                let (status, request_id, error) = match result {
                    Ok(body) => (body.status.unwrap_or(AnswerStatus::Success), body.request_id, None),
                    Err(e) => {
                        warn!(index, error = %e, "End-to-end request failed");
                        (AnswerStatus::Failed, None, Some(e))
                    }
                };
                QuestionOutcome {
                    index,
                    question: text.clone(),
                    request_id,
                    status,
                    latency_ms,
                    retrieve_ms: None,
                    compose_ms: None,
                    generate_ms: None,
                    cached: false,
                    error,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        PhaseReport::from_outcomes(Phase::EndToEnd, concurrency, outcomes, started.elapsed())
    }

    async fn post_question(&self, url: &str, question: &str) -> Result<AnswerBody, String> {
        let response = self
            .http
            .post(url)
            .json(&QuestionBody { question })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }
        response.json::<AnswerBody>().await.map_err(|e| e.to_string())
    }
}

fn log_phase(report: &PhaseReport) {
    info!(
        phase = ?report.phase,
        questions = report.questions,
        successes = report.successes,
        failures = report.failures,
        throughput_qps = report.throughput_qps,
        p95_ms = report.latency.p95_ms,
        "Benchmark phase complete"
    );
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BenchmarkError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| BenchmarkError::Io {
            path: path.to_path_buf(),
            source,
        })
}
