//! Answer cache keyed by normalized question text.
//!
//! Entries are tagged with the snapshot version they were generated from
//! and the whole cache is cleared when a new snapshot is published.

use crate::rag::domain::answer::{Answer, AnswerStatus, QueryMode};
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    snapshot_version: u64,
    mode: QueryMode,
    question: String,
}

impl CacheKey {
    pub fn new(snapshot_version: u64, mode: QueryMode, question: &str) -> Self {
        Self {
            snapshot_version,
            mode,
            question: normalize_question(question),
        }
    }
}

/// Sentence-ending marks dropped from the end of a question.
const TERMINAL_MARKS: [char; 3] = ['?', '.', '!'];

/// Lowercase, collapse whitespace, drop trailing `?`, `.` and `!`.
///
/// Other trailing symbols are significant: "C++" and "C" are different questions.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(TERMINAL_MARKS)
        .trim_end()
        .to_lowercase()
}

/// In-process cache of successful answers.
#[derive(Clone)]
pub struct AnswerCache {
    cache: Cache<CacheKey, Answer>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl std::fmt::Debug for AnswerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerCache")
            .field("entries", &self.cache.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl AnswerCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Answer> {
        match self.cache.get(key).await {
            Some(answer) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("answer_cache_hits_total").increment(1);
                Some(answer)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an answer. Only `success` answers are kept.
    pub async fn insert(&self, key: CacheKey, answer: &Answer) {
        if answer.status == AnswerStatus::Success {
            self.cache.insert(key, answer.clone()).await;
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  Who does   Alice collaborate with?? "),
            "who does alice collaborate with"
        );
    }

    #[test]
    fn test_normalize_keeps_trailing_symbols() {
        assert_eq!(normalize_question("Who maintains C++?"), "who maintains c++");
        assert_eq!(normalize_question("Who maintains C#!"), "who maintains c#");
        assert_ne!(
            CacheKey::new(1, QueryMode::Auto, "Who maintains C++?"),
            CacheKey::new(1, QueryMode::Auto, "Who maintains C")
        );
    }

    #[tokio::test]
    async fn test_trailing_symbols_do_not_share_entries() {
        let cache = AnswerCache::new(100, Duration::from_secs(60));
        cache
            .insert(
                CacheKey::new(1, QueryMode::Auto, "Who maintains C++?"),
                &Answer::success("Bjarne", vec![]),
            )
            .await;

        assert!(cache
            .get(&CacheKey::new(1, QueryMode::Auto, "Who maintains C"))
            .await
            .is_none());
        assert!(cache
            .get(&CacheKey::new(1, QueryMode::Auto, "who maintains c++"))
            .await
            .is_some());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn test_only_success_is_cached() {
        let cache = AnswerCache::new(100, Duration::from_secs(60));
        let key = CacheKey::new(1, QueryMode::Auto, "Who?");

        cache
            .insert(key.clone(), &Answer::failed(&RagError::Timeout(5)))
            .await;
        assert!(cache.get(&key).await.is_none());

        cache
            .insert(key.clone(), &Answer::success("Bob", vec!["person:bob".into()]))
            .await;
        let hit = cache.get(&CacheKey::new(1, QueryMode::Auto, "who")).await;
        assert_eq!(hit.unwrap().text, "Bob");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[tokio::test]
    async fn test_version_is_part_of_key() {
        let cache = AnswerCache::new(100, Duration::from_secs(60));
        cache
            .insert(CacheKey::new(1, QueryMode::Auto, "q"), &Answer::success("a", vec![]))
            .await;
        assert!(cache.get(&CacheKey::new(2, QueryMode::Auto, "q")).await.is_none());
    }
}
