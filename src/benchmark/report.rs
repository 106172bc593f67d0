//! Benchmark reports: per-question outcomes, latency statistics, and the
//! summary persisted next to the raw results.

use crate::rag::domain::answer::AnswerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which path a phase drove questions through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// In-process calls to the question service
    Internal,
    /// HTTP requests against a running server
    EndToEnd,
}

/// Result of one benchmarked question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOutcome {
    /// Position in the question set
    pub index: usize,
    pub question: String,
    pub request_id: Option<String>,
    pub status: AnswerStatus,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieve_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_ms: Option<f64>,
    #[serde(default)]
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuestionOutcome {
    pub fn is_success(&self) -> bool {
        self.status != AnswerStatus::Failed
    }
}

/// Latency statistics in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Create from a list of latency measurements (milliseconds).
    pub fn from_measurements(measurements: &[f64]) -> Self {
        if measurements.is_empty() {
            return Self::default();
        }

        let mut sorted = measurements.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let percentile = |p: f64| {
            let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        Self {
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            mean_ms: mean,
            std_dev_ms: variance.sqrt(),
            p50_ms: percentile(50.0),
            p90_ms: percentile(90.0),
            p95_ms: percentile(95.0),
            p99_ms: percentile(99.0),
        }
    }
}

/// Everything recorded for one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub concurrency: usize,
    pub questions: usize,
    pub successes: usize,
    pub failures: usize,
    pub wall_time_ms: f64,
    /// Completed questions per second of wall time
    pub throughput_qps: f64,
    pub latency: LatencyStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_retrieval_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_generation_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_request_ms: Option<f64>,
    pub outcomes: Vec<QuestionOutcome>,
}

impl PhaseReport {
    /// Aggregate outcomes sorted by question index.
    pub fn from_outcomes(
        phase: Phase,
        concurrency: usize,
        mut outcomes: Vec<QuestionOutcome>,
        wall_time: Duration,
    ) -> Self {
        outcomes.sort_by_key(|o| o.index);

        let latencies: Vec<f64> = outcomes.iter().map(|o| o.latency_ms).collect();
        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        let questions = outcomes.len();

        // Never zero, so a non-empty run always reports positive throughput.
        let secs = wall_time.as_secs_f64().max(1e-9);
        let throughput_qps = if questions == 0 {
            0.0
        } else {
            questions as f64 / secs
        };

        let (total_retrieval_ms, total_generation_ms, total_request_ms) = match phase {
            Phase::Internal => (
                Some(outcomes.iter().filter_map(|o| o.retrieve_ms).sum()),
                Some(outcomes.iter().filter_map(|o| o.generate_ms).sum()),
                None,
            ),
            Phase::EndToEnd => (None, None, Some(latencies.iter().sum())),
        };

        Self {
            phase,
            concurrency,
            questions,
            successes,
            failures: questions - successes,
            wall_time_ms: wall_time.as_secs_f64() * 1000.0,
            throughput_qps,
            latency: LatencyStats::from_measurements(&latencies),
            total_retrieval_ms,
            total_generation_ms,
            total_request_ms,
            outcomes,
        }
    }

    pub fn summary(&self) -> PhaseSummary {
        PhaseSummary {
            phase: self.phase,
            questions: self.questions,
            successes: self.successes,
            failures: self.failures,
            wall_time_ms: self.wall_time_ms,
            throughput_qps: self.throughput_qps,
            latency: self.latency.clone(),
        }
    }
}

/// Phase aggregates without per-question rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub questions: usize,
    pub successes: usize,
    pub failures: usize,
    pub wall_time_ms: f64,
    pub throughput_qps: f64,
    pub latency: LatencyStats,
}

/// Result of a full benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot_version: u64,
    pub internal: PhaseReport,
    pub end_to_end: Option<PhaseReport>,
}

impl BenchmarkReport {
    /// Outcomes recorded by the internal phase.
    pub fn outcomes(&self) -> &[QuestionOutcome] {
        &self.internal.outcomes
    }

    pub fn summary(&self) -> BenchmarkSummary {
        BenchmarkSummary {
            started_at: self.started_at,
            finished_at: self.finished_at,
            snapshot_version: self.snapshot_version,
            phases: std::iter::once(&self.internal)
                .chain(self.end_to_end.as_ref())
                .map(PhaseReport::summary)
                .collect(),
        }
    }
}

/// Contents of `benchmark_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot_version: u64,
    pub phases: Vec<PhaseSummary>,
}
