//! Error taxonomy for the retrieval-augmented answering pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    /// A graph lookup referenced an entity that is not in the snapshot.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// Malformed request or non-positive budget.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Retryable failure of an external service (timeout, rate limit, 5xx).
    #[error("transient backend error: {0}")]
    BackendTransient(String),

    /// Non-retryable failure of an external service.
    #[error("backend error: {0}")]
    BackendFatal(String),

    /// The request exceeded its deadline.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// An index build produced no usable entities.
    #[error("indexing failed: {0}")]
    IndexingFailure(String),
}

impl RagError {
    /// Classification of this error, used at the HTTP boundary.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::BackendTransient(_) => ErrorKind::BackendTransient,
            Self::BackendFatal(_) => ErrorKind::BackendFatal,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::IndexingFailure(_) => ErrorKind::IndexingFailure,
        }
    }

    /// Whether the failed call may succeed if repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendTransient(_))
    }
}

/// Serializable error classification carried by failed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    BackendTransient,
    BackendFatal,
    Timeout,
    IndexingFailure,
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::BackendTransient(err.to_string());
        }
        match err.status() {
            Some(status) if is_transient_status(status.as_u16()) => {
                Self::BackendTransient(err.to_string())
            }
            _ => Self::BackendFatal(err.to_string()),
        }
    }
}

/// HTTP statuses worth retrying: request timeout, rate limiting, server errors.
#[must_use]
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
