//! Benchmark Harness
//!
//! Replays a fixed question set through the same [`QuestionService`] that
//! serves HTTP traffic, with a bounded number of questions in flight, and
//! persists per-question results plus aggregate latency and throughput.
//!
//! [`QuestionService`]: crate::rag::service::QuestionService

pub mod harness;
pub mod report;

pub use harness::{BenchmarkHarness, OutputDirs};
pub use report::{BenchmarkReport, LatencyStats, Phase, PhaseReport, QuestionOutcome};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("output location {path} is not writable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid question set: {0}")]
    InvalidQuestions(String),

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionEntry {
    Text(String),
    Object { question: String },
}

/// Parse a question set: a JSON array (of strings or `{"question": ...}`
/// objects), or plain text with one question per line.
pub fn parse_questions(content: &str) -> Result<Vec<String>, BenchmarkError> {
    let trimmed = content.trim_start();
    let questions: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<QuestionEntry>>(trimmed)
            .map_err(|e| BenchmarkError::InvalidQuestions(e.to_string()))?
            .into_iter()
            .map(|entry| match entry {
                QuestionEntry::Text(q) | QuestionEntry::Object { question: q } => q,
            })
            .collect()
    } else {
        content.lines().map(str::to_string).collect()
    };

    Ok(questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect())
}

/// Read and parse a question set file.
pub async fn load_questions(path: &Path) -> Result<Vec<String>, BenchmarkError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BenchmarkError::InvalidQuestions(format!("{}: {e}", path.display())))?;
    parse_questions(&content)
}
