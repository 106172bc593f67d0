//! GraphRAG Question Answering
//!
//! A question-answering service that grounds LLM answers in a knowledge
//! graph extracted from a document corpus.
//!
//! # Architecture
//!
//! - **Indexing**: documents are chunked, entities and relations extracted,
//!   deduplicated, embedded, and clustered into summarized communities
//! - **Serving**: each question is answered by retrieving graph context,
//!   packing it into a token budget, and prompting an LLM
//! - **Benchmarking**: a bounded worker pool replays a question set and
//!   persists latency and throughput reports
//!
//! # Modules
//!
//! - [`rag`]: graph store, indexer, retriever, composer, generator, question service
//! - [`llm`]: text-generation capability and the Chat Completions driver
//! - [`benchmark`]: benchmark harness and reports
//! - [`server`]: HTTP API
//! - [`config`]: layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod benchmark;
pub mod config;
pub mod error;
pub mod llm;
pub mod rag;
pub mod resilience;
pub mod server;
pub mod telemetry;

use crate::config::AppConfig;
use crate::llm::TextGenerator;
use crate::rag::cache::AnswerCache;
use crate::rag::composer::ContextComposer;
use crate::rag::embedding::{Embedder, FastEmbedder, LexicalEmbedder};
use crate::rag::extraction::{
    ExternalNlpExtractor, LeidenConfig, LlmExtractor, RelationshipExtractor,
};
use crate::rag::generator::{AnswerGenerator, RetryPolicy};
use crate::rag::indexer::{Indexer, IndexerConfig};
use crate::rag::retrieval::{GraphRetriever, RetrieverConfig};
use crate::rag::service::{QuestionService, ServiceConfig};
use crate::rag::store::GraphStore;
use crate::rag::tokens;
use crate::resilience::SimpleRateLimiter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Question answering pipeline and graph store.
    pub service: Arc<QuestionService>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// Prometheus render handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    pub fn new(
        service: Arc<QuestionService>,
        config: Arc<AppConfig>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let rate_limiter = Arc::new(SimpleRateLimiter::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));
        Self {
            service,
            rate_limiter,
            config,
            metrics,
        }
    }
}

/// Build the embedder named in configuration.
pub async fn build_embedder(config: &AppConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.embedding.provider.as_str() {
        "lexical" => Ok(Arc::new(LexicalEmbedder::new(config.embedding.dimensions))),
        "fastembed" => Ok(Arc::new(FastEmbedder::initialize().await?)),
        other => anyhow::bail!("unknown embedding provider: {other}"),
    }
}

/// Build the extractor named in configuration.
pub fn build_extractor(
    config: &AppConfig,
    llm: Arc<dyn TextGenerator>,
) -> anyhow::Result<Arc<dyn RelationshipExtractor>> {
    match config.indexing.extractor.as_str() {
        "llm" => Ok(Arc::new(LlmExtractor::new(llm))),
        "external_nlp" => {
            let url = config
                .indexing
                .nlp_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("indexing.nlp_url is required for external_nlp"))?;
            Ok(Arc::new(ExternalNlpExtractor::new(url)))
        }
        other => anyhow::bail!("unknown extractor: {other}"),
    }
}

/// Wire the question service from configuration and injected capabilities.
pub fn build_service(
    config: &AppConfig,
    llm: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn RelationshipExtractor>,
) -> anyhow::Result<QuestionService> {
    let r = &config.retrieval;
    let retriever = GraphRetriever::new(
        Arc::clone(&embedder),
        RetrieverConfig {
            top_k: r.top_k,
            hops: r.hops,
            hop_decay: r.hop_decay,
            community_top_k: r.community_top_k,
            global_min_words: r.global_min_words,
            global_keywords: r.global_keywords.iter().map(|k| k.to_lowercase()).collect(),
            ..RetrieverConfig::default()
        },
    );

    let composer = ContextComposer::new(tokens::from_name(&config.composer.tokenizer)?);

    let g = &config.generator;
    let generator = AnswerGenerator::new(
        Arc::clone(&llm),
        RetryPolicy {
            max_attempts: g.max_attempts,
            initial_backoff: Duration::from_millis(g.initial_backoff_ms),
            max_backoff: Duration::from_millis(g.max_backoff_ms),
            multiplier: g.backoff_multiplier,
        },
    );

    let indexer = Indexer::new(
        extractor,
        embedder,
        llm,
        IndexerConfig {
            chunk_size: config.indexing.chunk_size,
            leiden: LeidenConfig {
                resolution: config.indexing.community_resolution,
                levels: config.indexing.community_levels,
                ..LeidenConfig::default()
            },
            summary_concurrency: config.indexing.summary_concurrency,
        },
    );

    let mut service = QuestionService::new(
        Arc::new(GraphStore::default()),
        retriever,
        composer,
        generator,
        ServiceConfig {
            max_items: config.retrieval.max_items,
            token_budget: config.composer.token_budget,
            request_timeout: config.resilience.request_timeout(),
        },
    )
    .with_indexer(indexer);

    if config.cache.enabled {
        service = service.with_cache(AnswerCache::new(
            config.cache.max_capacity,
            Duration::from_secs(config.cache.ttl_secs),
        ));
    }
    Ok(service)
}
