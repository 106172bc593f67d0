//! Context Composer
//!
//! Packs retrieved items into a token-bounded context string.

use crate::rag::domain::answer::RetrievalResult;
use crate::rag::tokens::TokenCounter;
use std::sync::Arc;

const ITEM_SEPARATOR: &str = "\n\n";

/// Context text plus the IDs of the items it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedContext {
    pub text: String,
    pub sources: Vec<String>,
}

impl ComposedContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ContextComposer {
    counter: Arc<dyn TokenCounter>,
}

impl ContextComposer {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Append item texts in result order until the next one would exceed `token_budget`.
    ///
    /// The output never exceeds the budget. If the first item alone is too
    /// large it is truncated to fit; a zero budget yields empty output.
    pub fn compose(&self, result: &RetrievalResult, token_budget: usize) -> ComposedContext {
        let mut out = ComposedContext::default();
        if token_budget == 0 {
            return out;
        }

        for scored in &result.items {
            let item = &scored.item;
            let candidate = if out.text.is_empty() {
                item.text.clone()
            } else {
                format!("{}{ITEM_SEPARATOR}{}", out.text, item.text)
            };

            if self.counter.count(&candidate) <= token_budget {
                out.text = candidate;
                out.sources.push(item.id.clone());
                continue;
            }

            if out.text.is_empty() {
                let truncated = self.counter.truncate(&item.text, token_budget);
                if !truncated.is_empty() {
                    tracing::debug!(item = %item.id, token_budget, "Truncated first context item");
                    out.text = truncated;
                    out.sources.push(item.id.clone());
                }
            }
            break;
        }
        out
    }
}
