//! Answer Generator
//!
//! Fills the answer prompt and calls the LLM, retrying transient failures
//! with capped exponential backoff. Never returns an error: exhaustion or a
//! fatal backend error yields a failed [`Answer`].

use crate::error::RagError;
use crate::llm::{Message, TextGenerator};
use crate::rag::domain::answer::{Answer, AnswerStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ANSWER_INSTRUCTIONS: &str = "Answer the question using the provided context from a knowledge graph.\n\
- Use only facts found in the context.\n\
- If the context is empty, state that you don't have enough information to answer the question.\n\
- When dealing with dates, mention the month in full.";

/// Retry schedule for transient backend failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total calls, including the first (at least 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(4000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): `initial * multiplier^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_backoff.as_secs_f64() * exp;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()).max(0.0))
    }
}

/// Build the prompt for a question and its context.
pub fn build_prompt(question: &str, context: &str) -> Vec<Message> {
    let context = if context.trim().is_empty() {
        "(empty)"
    } else {
        context
    };
    vec![
        Message::system(ANSWER_INSTRUCTIONS),
        Message::user(format!("Context:\n{context}\n\nQuestion: {question}")),
    ]
}

#[derive(Debug, Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { llm, policy }
    }

    /// Generate an answer. Status is `Partial` when `context` is empty.
    ///
    /// Sources are left empty for the caller to fill in.
    pub async fn generate(&self, question: &str, context: &str) -> Answer {
        let messages = build_prompt(question, context);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.llm.complete(messages.clone()).await {
                Ok(text) => {
                    let status = if context.trim().is_empty() {
                        AnswerStatus::Partial
                    } else {
                        AnswerStatus::Success
                    };
                    debug!(attempt, ?status, "Generated answer");
                    return Answer {
                        text: text.trim().to_string(),
                        sources: Vec::new(),
                        status,
                        failure: None,
                    };
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient LLM failure, retrying"
                    );
                    metrics::counter!("llm_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Answer generation failed");
                    return Answer::failed(&exhausted(e, attempt));
                }
            }
        }
    }
}

fn exhausted(err: RagError, attempts: u32) -> RagError {
    match err {
        RagError::BackendTransient(msg) if attempts > 1 => {
            RagError::BackendTransient(format!("{msg} (after {attempts} attempts)"))
        }
        other => other,
    }
}

// =============================================================================
// Tests
// =============================================================================
