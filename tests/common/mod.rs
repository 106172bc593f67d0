//! Deterministic capability stubs shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use graphrag_qa::error::{RagError, Result};
use graphrag_qa::llm::{Message, TextGenerator};
use graphrag_qa::rag::composer::ContextComposer;
use graphrag_qa::rag::domain::graph::{
    Document, EntityType, ExtractedEntity, ExtractedRelation, ExtractionResult,
};
use graphrag_qa::rag::embedding::LexicalEmbedder;
use graphrag_qa::rag::extraction::RelationshipExtractor;
use graphrag_qa::rag::generator::{AnswerGenerator, RetryPolicy};
use graphrag_qa::rag::indexer::{Indexer, IndexerConfig};
use graphrag_qa::rag::retrieval::{GraphRetriever, RetrieverConfig};
use graphrag_qa::rag::service::{QuestionService, ServiceConfig};
use graphrag_qa::rag::store::GraphStore;
use graphrag_qa::rag::tokens::WordCounter;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Known entities: (surface form, type, description).
const LEXICON: &[(&str, EntityType, &str)] = &[
    ("Alice", EntityType::Person, "Alice is a researcher."),
    ("Bob", EntityType::Person, "Bob is an engineer."),
    ("Carol", EntityType::Person, "Carol runs the lab office."),
    ("Acme Labs", EntityType::Organization, "Acme Labs is a research lab."),
    ("Paris", EntityType::Location, "Paris is a city in France."),
];

/// Phrase to relation label.
const RELATIONS: &[(&str, &str)] = &[
    ("collaborates with", "collaborates with"),
    ("works at", "works at"),
    ("researcher at", "works at"),
    ("lives in", "lives in"),
    ("manages", "manages"),
];

/// Finds lexicon entries per sentence and links the nearest entity on each
/// side of a relation phrase.
#[derive(Debug, Default)]
pub struct DictionaryExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RelationshipExtractor for DictionaryExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("EXTRACTION_FAILS") {
            return Err(RagError::BackendFatal("extractor rejected chunk".into()));
        }

        let mut result = ExtractionResult::default();
        for sentence in text.split('.') {
            let mut found: Vec<(usize, &str)> = LEXICON
                .iter()
                .filter_map(|(name, _, _)| sentence.find(name).map(|pos| (pos, *name)))
                .collect();
            found.sort_unstable();

            for (_, name) in &found {
                let (_, entity_type, description) = LEXICON
                    .iter()
                    .find(|(n, _, _)| n == name)
                    .expect("lexicon entry");
                result.entities.push(ExtractedEntity {
                    name: (*name).to_string(),
                    entity_type: entity_type.clone(),
                    description: (*description).to_string(),
                });
            }

            for (phrase, label) in RELATIONS {
                let Some(at) = sentence.find(phrase) else {
                    continue;
                };
                let source = found.iter().rev().find(|(pos, _)| *pos < at);
                let target = found.iter().find(|(pos, _)| *pos >= at + phrase.len());
                if let (Some((_, s)), Some((_, t))) = (source, target) {
                    result.relations.push(ExtractedRelation {
                        source: (*s).to_string(),
                        target: (*t).to_string(),
                        relation_type: (*label).to_string(),
                        weight: None,
                        description: String::new(),
                    });
                }
            }
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "dictionary"
    }
}

/// Replies with the last prompt message, so answers quote their context.
#[derive(Debug, Default)]
pub struct EchoGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
    }
}

pub fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "alice.txt",
            "Alice is a researcher at Acme Labs. Alice collaborates with Bob on graph algorithms.",
        ),
        Document::new(
            "bob.txt",
            "Bob lives in Paris. Bob works at Acme Labs.",
        ),
        Document::new("carol.txt", "Carol manages the Acme Labs office in Paris."),
    ]
}

pub fn retriever() -> GraphRetriever {
    GraphRetriever::new(Arc::new(LexicalEmbedder::default()), RetrieverConfig::default())
}

/// A question service wired entirely with deterministic stubs.
pub fn service(llm: Arc<EchoGenerator>) -> QuestionService {
    let embedder = Arc::new(LexicalEmbedder::default());
    let indexer = Indexer::new(
        Arc::new(DictionaryExtractor::default()),
        embedder,
        llm.clone(),
        IndexerConfig::default(),
    );
    QuestionService::new(
        Arc::new(GraphStore::default()),
        retriever(),
        ContextComposer::new(Arc::new(WordCounter)),
        AnswerGenerator::new(
            llm,
            RetryPolicy {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                ..RetryPolicy::default()
            },
        ),
        ServiceConfig::default(),
    )
    .with_indexer(indexer)
}
