//! Per-request models: questions, retrieval results, and answers.

use crate::error::{ErrorKind, RagError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Question
// =============================================================================

/// Caller hint for retrieval strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Local always; global when the question looks broad.
    #[default]
    Auto,
    /// Entity neighbourhood only.
    Local,
    /// Local plus community summaries.
    Global,
}

/// An incoming question. Lives for the duration of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub mode: QueryMode,
    pub received_at: DateTime<Utc>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_mode(text, QueryMode::Auto)
    }

    pub fn with_mode(text: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            mode,
            received_at: Utc::now(),
        }
    }
}

// =============================================================================
// Retrieval Result
// =============================================================================

/// What a retrieved item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Entity,
    Community,
}

/// A retrieved graph element with the text that represents it in context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub kind: ItemKind,
    pub id: String,
    pub text: String,
}

/// A context item with its relevance score (non-negative, higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: ContextItem,
    pub score: f32,
}

/// Ordered, bounded retrieval output.
///
/// Sorted by non-increasing score; equal scores keep discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub items: Vec<ScoredItem>,
    /// Version of the snapshot the items were read from
    pub snapshot_version: u64,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|s| s.item.id.as_str())
    }
}

// =============================================================================
// Answer
// =============================================================================

/// Outcome of answering a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Answer generated from a non-empty context.
    Success,
    /// Answer generated, but without supporting context.
    Partial,
    /// No answer could be generated.
    Failed,
}

/// Why an answer failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RagError> for Failure {
    fn from(err: &RagError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Generated text plus the context items it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// IDs of context items included in the prompt
    pub sources: Vec<String>,
    pub status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl Answer {
    pub fn success(text: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            text: text.into(),
            sources,
            status: AnswerStatus::Success,
            failure: None,
        }
    }

    pub fn failed(err: &RagError) -> Self {
        Self {
            text: String::new(),
            sources: Vec::new(),
            status: AnswerStatus::Failed,
            failure: Some(Failure::from(err)),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == AnswerStatus::Failed
    }
}

// =============================================================================
// Request lifecycle
// =============================================================================

/// Per-request pipeline state.
///
/// `Received -> Retrieving -> Composing -> Generating -> Responded`, with
/// `Failed` reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    Retrieving,
    Composing,
    Generating,
    Responded,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }

    /// The next stage on the success path.
    pub fn advance(self) -> Self {
        match self {
            Self::Received => Self::Retrieving,
            Self::Retrieving => Self::Composing,
            Self::Composing => Self::Generating,
            Self::Generating | Self::Responded => Self::Responded,
            Self::Failed => Self::Failed,
        }
    }

    /// Transition to `Failed`; terminal stages stay put.
    pub fn fail(self) -> Self {
        if self.is_terminal() { self } else { Self::Failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_success_path() {
        let mut stage = RequestStage::Received;
        let mut seen = vec![stage];
        while !stage.is_terminal() {
            stage = stage.advance();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                RequestStage::Received,
                RequestStage::Retrieving,
                RequestStage::Composing,
                RequestStage::Generating,
                RequestStage::Responded,
            ]
        );
    }

    #[test]
    fn test_fail_is_terminal() {
        assert_eq!(RequestStage::Composing.fail(), RequestStage::Failed);
        assert_eq!(RequestStage::Responded.fail(), RequestStage::Responded);
        assert_eq!(RequestStage::Failed.advance(), RequestStage::Failed);
    }

    #[test]
    fn test_failed_answer_carries_kind() {
        let answer = Answer::failed(&RagError::Timeout(500));
        assert!(answer.is_failed());
        assert!(answer.text.is_empty());
        assert_eq!(answer.failure.unwrap().kind, ErrorKind::Timeout);
    }
}
