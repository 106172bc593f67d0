//! Token counting for context budgets.

use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Counts atomic text units (tokens or words) for budget enforcement.
pub trait TokenCounter: Send + Sync + std::fmt::Debug {
    fn count(&self, text: &str) -> usize;

    /// Longest prefix of `text` that fits in `budget` units.
    ///
    /// Cuts at word boundaries when possible, otherwise inside the first word.
    fn truncate(&self, text: &str, budget: usize) -> String {
        if budget == 0 {
            return String::new();
        }
        if self.count(text) <= budget {
            return text.to_string();
        }

        let word_ends: Vec<usize> = word_end_offsets(text);
        let fits = |end: usize| self.count(text[..end].trim_end()) <= budget;

        let cut = match last_fitting(&word_ends, fits) {
            Some(end) => end,
            None => {
                let first_word_end = word_ends.first().copied().unwrap_or(text.len());
                let char_ends: Vec<usize> = text[..first_word_end]
                    .char_indices()
                    .map(|(i, c)| i + c.len_utf8())
                    .collect();
                last_fitting(&char_ends, fits).unwrap_or(0)
            }
        };

        let out = text[..cut].trim().to_string();
        if self.count(&out) <= budget {
            out
        } else {
            String::new()
        }
    }
}

/// Binary search for the largest candidate accepted by `fits` (assumed monotone).
fn last_fitting(candidates: &[usize], fits: impl Fn(usize) -> bool) -> Option<usize> {
    let (mut lo, mut hi) = (0usize, candidates.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if fits(candidates[mid]) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.checked_sub(1).map(|i| candidates[i])
}

fn word_end_offsets(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                ends.push(i);
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

/// Whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// BPE tokens using cl100k_base (GPT-4/3.5 standard).
#[derive(Clone)]
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl TiktokenCounter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: Arc::new(cl100k_base()?),
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Build the counter named in configuration (`cl100k` or `words`).
pub fn from_name(name: &str) -> anyhow::Result<Arc<dyn TokenCounter>> {
    match name {
        "words" => Ok(Arc::new(WordCounter)),
        "cl100k" | "tiktoken" => Ok(Arc::new(TiktokenCounter::new()?)),
        other => anyhow::bail!("unknown tokenizer: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(WordCounter.count("  one two\nthree "), 3);
        assert_eq!(WordCounter.count(""), 0);
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let out = WordCounter.truncate("alpha beta gamma delta", 2);
        assert_eq!(out, "alpha beta");
        assert_eq!(WordCounter.truncate("alpha beta", 0), "");
        assert_eq!(WordCounter.truncate("alpha beta", 5), "alpha beta");
    }

    #[test]
    fn test_tiktoken_truncate_respects_budget() {
        let counter = TiktokenCounter::new().unwrap();
        let text = "Alice is a researcher who collaborates with Bob on graph algorithms.";
        let total = counter.count(text);
        assert!(total > 5);

        for budget in 1..total {
            let cut = counter.truncate(text, budget);
            assert!(counter.count(&cut) <= budget, "budget {budget}: {cut:?}");
            assert!(!cut.is_empty());
            assert!(text.starts_with(&cut));
        }
    }

    #[test]
    fn test_truncate_inside_single_long_word() {
        let counter = TiktokenCounter::new().unwrap();
        let word = "supercalifragilisticexpialidocious";
        let cut = counter.truncate(word, 2);
        assert!(!cut.is_empty());
        assert!(counter.count(&cut) <= 2);
    }
}
