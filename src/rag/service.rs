//! Question Service
//!
//! Runs retrieve → compose → generate for one question under a deadline,
//! tracking the request stage and per-stage timings. Every outcome,
//! including timeouts and component errors, becomes an [`Answer`].

use crate::error::{RagError, Result};
use crate::rag::cache::{AnswerCache, CacheKey};
use crate::rag::composer::ContextComposer;
use crate::rag::corpus::load_documents;
use crate::rag::domain::answer::{Answer, Question, RequestStage};
use crate::rag::domain::graph::Document;
use crate::rag::generator::AnswerGenerator;
use crate::rag::indexer::Indexer;
use crate::rag::retrieval::GraphRetriever;
use crate::rag::store::{GraphStore, SnapshotStats};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-request limits.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Retrieval result bound
    pub max_items: usize,
    /// Context size in tokenizer units
    pub token_budget: usize,
    /// Deadline from `Received` to `Responded`/`Failed`
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_items: 20,
            token_budget: 2000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Milliseconds spent in each pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct StageTimings {
    pub retrieve_ms: f64,
    pub compose_ms: f64,
    pub generate_ms: f64,
    pub total_ms: f64,
}

/// An answer together with how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerTrace {
    pub request_id: String,
    pub answer: Answer,
    /// Final stage (`Responded` or `Failed`)
    pub stage: RequestStage,
    /// Stage that was in progress when the request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<RequestStage>,
    pub timings: StageTimings,
    pub snapshot_version: u64,
    pub cached: bool,
}

#[derive(Debug)]
struct Progress {
    stage: RequestStage,
    failed_stage: Option<RequestStage>,
    timings: StageTimings,
    snapshot_version: u64,
    cached: bool,
}

impl Progress {
    fn enter(&mut self, stage: RequestStage) {
        self.stage = stage;
        tracing::trace!(?stage, "Stage");
    }

    fn advance(&mut self) {
        self.enter(self.stage.advance());
    }

    fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.failed_stage = Some(self.stage);
        }
        self.enter(self.stage.fail());
    }
}

/// Answers questions against the current graph snapshot.
#[derive(Debug)]
pub struct QuestionService {
    store: Arc<GraphStore>,
    retriever: GraphRetriever,
    composer: ContextComposer,
    generator: AnswerGenerator,
    indexer: Option<Indexer>,
    cache: Option<AnswerCache>,
    config: ServiceConfig,
    reindex_lock: tokio::sync::Mutex<()>,
}

impl QuestionService {
    pub fn new(
        store: Arc<GraphStore>,
        retriever: GraphRetriever,
        composer: ContextComposer,
        generator: AnswerGenerator,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            composer,
            generator,
            indexer: None,
            cache: None,
            config,
            reindex_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn with_cache(mut self, cache: AnswerCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Answer a question. Never fails; errors become a failed [`Answer`].
    pub async fn answer(&self, question: Question) -> Answer {
        self.answer_traced(question).await.answer
    }

    /// Answer a question and report stage timings.
    pub async fn answer_traced(&self, question: Question) -> AnswerTrace {
        let started = Instant::now();
        let mut progress = Progress {
            stage: RequestStage::Received,
            failed_stage: None,
            timings: StageTimings::default(),
            snapshot_version: 0,
            cached: false,
        };
        metrics::counter!("questions_total").increment(1);

        let deadline = self.config.request_timeout;
        let outcome = tokio::time::timeout(deadline, self.run(&question, &mut progress)).await;

        let answer = match outcome {
            Ok(Ok(answer)) => {
                if answer.is_failed() {
                    progress.fail();
                } else {
                    progress.enter(RequestStage::Responded);
                }
                answer
            }
            Ok(Err(e)) => {
                warn!(request_id = %question.id, stage = ?progress.stage, error = %e, "Question failed");
                progress.fail();
                Answer::failed(&e)
            }
            Err(_) => {
                let e = RagError::Timeout(deadline.as_millis() as u64);
                warn!(request_id = %question.id, stage = ?progress.stage, error = %e, "Question timed out");
                progress.fail();
                Answer::failed(&e)
            }
        };

        progress.timings.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("question_latency_seconds").record(started.elapsed().as_secs_f64());
        if answer.is_failed() {
            metrics::counter!("questions_failed_total").increment(1);
        }
        info!(
            request_id = %question.id,
            status = ?answer.status,
            stage = ?progress.stage,
            sources = answer.sources.len(),
            cached = progress.cached,
            total_ms = progress.timings.total_ms,
            "Question answered"
        );

        AnswerTrace {
            request_id: question.id,
            answer,
            stage: progress.stage,
            failed_stage: progress.failed_stage,
            timings: progress.timings,
            snapshot_version: progress.snapshot_version,
            cached: progress.cached,
        }
    }

    async fn run(&self, question: &Question, progress: &mut Progress) -> Result<Answer> {
        if question.text.trim().is_empty() {
            return Err(RagError::InvalidArgument("question must not be empty".to_string()));
        }

        // Held for the whole request; a concurrent publish does not affect it.
        let snapshot = self.store.snapshot();
        progress.snapshot_version = snapshot.version();

        let key = CacheKey::new(snapshot.version(), question.mode, &question.text);
        if let Some(cache) = &self.cache {
            if let Some(answer) = cache.get(&key).await {
                progress.cached = true;
                return Ok(answer);
            }
            debug!(hits = cache.hits(), misses = cache.misses(), "Answer cache miss");
        }

        progress.advance();
        let t = Instant::now();
        let retrieved = self
            .retriever
            .retrieve(question, &snapshot, self.config.max_items)
            .await?;
        progress.timings.retrieve_ms = t.elapsed().as_secs_f64() * 1000.0;

        progress.advance();
        let t = Instant::now();
        let context = self.composer.compose(&retrieved, self.config.token_budget);
        progress.timings.compose_ms = t.elapsed().as_secs_f64() * 1000.0;

        progress.advance();
        let t = Instant::now();
        let mut answer = self.generator.generate(&question.text, &context.text).await;
        progress.timings.generate_ms = t.elapsed().as_secs_f64() * 1000.0;

        if !answer.is_failed() {
            answer.sources = context.sources;
            if let Some(cache) = &self.cache {
                cache.insert(key, &answer).await;
            }
        }
        Ok(answer)
    }

    // =========================================================================
    // Reindexing
    // =========================================================================

    /// Build a snapshot from `documents` and publish it atomically.
    ///
    /// Concurrent reindex calls are serialized; readers are never blocked.
    pub async fn reindex(&self, documents: &[Document]) -> Result<SnapshotStats> {
        let indexer = self
            .indexer
            .as_ref()
            .ok_or_else(|| RagError::IndexingFailure("no indexer configured".to_string()))?;

        let _guard = self.reindex_lock.lock().await;
        let snapshot = indexer.build(documents).await?;
        let published = self.store.publish(snapshot);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        Ok(published.stats())
    }

    /// Reload the corpus directory and reindex.
    pub async fn reindex_dir(&self, dir: &Path) -> Result<SnapshotStats> {
        let dir = dir.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || load_documents(&dir))
            .await
            .map_err(|e| RagError::IndexingFailure(format!("corpus loader panicked: {e}")))??;
        self.reindex(&documents).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::{Message, TextGenerator};
    use crate::rag::domain::answer::AnswerStatus;
    use crate::rag::domain::graph::{Entity, EntityType};
    use crate::rag::embedding::LexicalEmbedder;
    use crate::rag::generator::RetryPolicy;
    use crate::rag::retrieval::RetrieverConfig;
    use crate::rag::store::GraphSnapshot;
    use crate::rag::tokens::WordCounter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct SlowEcho {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TextGenerator for SlowEcho {
        async fn complete(&self, messages: Vec<Message>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
    }

    fn snapshot() -> GraphSnapshot {
        let mut alice = Entity {
            id: "person:alice".into(),
            name: "Alice".into(),
            entity_type: EntityType::Person,
            description: "Alice is a researcher.".into(),
            provenance: Vec::new(),
            embedding: Vec::new(),
        };
        alice.embedding = LexicalEmbedder::default().embed_one(&alice.text());
        GraphSnapshot::new(vec![alice], Vec::new(), Vec::new())
    }

    fn service(llm: Arc<SlowEcho>, timeout: Duration) -> QuestionService {
        let store = Arc::new(GraphStore::default());
        store.publish(snapshot());
        QuestionService::new(
            store,
            GraphRetriever::new(Arc::new(LexicalEmbedder::default()), RetrieverConfig::default()),
            ContextComposer::new(Arc::new(WordCounter)),
            AnswerGenerator::new(llm, RetryPolicy::default()),
            ServiceConfig {
                request_timeout: timeout,
                ..ServiceConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_success_path_reaches_responded() {
        let svc = service(Arc::new(SlowEcho::default()), Duration::from_secs(5));
        let trace = svc.answer_traced(Question::new("Who is Alice?")).await;
        assert_eq!(trace.stage, RequestStage::Responded);
        assert_eq!(trace.answer.status, AnswerStatus::Success);
        assert_eq!(trace.answer.sources, vec!["person:alice"]);
        assert!(trace.answer.text.contains("Alice is a researcher."));
        assert_eq!(trace.snapshot_version, 1);
        assert_eq!(trace.failed_stage, None);
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid() {
        let svc = service(Arc::new(SlowEcho::default()), Duration::from_secs(5));
        let trace = svc.answer_traced(Question::new("   ")).await;
        assert_eq!(trace.stage, RequestStage::Failed);
        assert_eq!(trace.failed_stage, Some(RequestStage::Received));
        assert_eq!(
            trace.answer.failure.unwrap().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_in_generating_stage() {
        let llm = Arc::new(SlowEcho {
            delay: Duration::from_secs(60),
            ..SlowEcho::default()
        });
        let svc = service(llm, Duration::from_millis(500));
        let trace = svc.answer_traced(Question::new("Who is Alice?")).await;
        assert_eq!(trace.stage, RequestStage::Failed);
        assert_eq!(trace.failed_stage, Some(RequestStage::Generating));
        assert!(trace.answer.is_failed());
        assert_eq!(trace.answer.failure.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_questions() {
        let llm = Arc::new(SlowEcho::default());
        let svc = service(llm.clone(), Duration::from_secs(5))
            .with_cache(AnswerCache::new(100, Duration::from_secs(60)));

        let first = svc.answer_traced(Question::new("Who is Alice?")).await;
        let second = svc.answer_traced(Question::new("who is alice")).await;
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.answer, second.answer);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reindex_without_indexer_fails() {
        let svc = service(Arc::new(SlowEcho::default()), Duration::from_secs(5));
        let err = svc.reindex(&[]).await.unwrap_err();
        assert!(matches!(err, RagError::IndexingFailure(_)));
    }
}
