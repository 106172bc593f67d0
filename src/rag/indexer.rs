//! Indexer
//!
//! Turns raw documents into a [`GraphSnapshot`]: chunk, extract, merge
//! duplicates by normalized name plus type, embed, detect communities, and
//! summarize each community.

use crate::error::{RagError, Result};
use crate::llm::{Message, TextGenerator};
use crate::rag::corpus::chunk_document;
use crate::rag::domain::graph::{
    Community, Document, Entity, ExtractionResult, Provenance, Relation, normalize_name,
    normalize_relation_type,
};
use crate::rag::embedding::Embedder;
use crate::rag::extraction::{LeidenCommunityDetector, LeidenConfig, RelationshipExtractor};
use crate::rag::store::GraphSnapshot;
use futures::{StreamExt, stream};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relation lines included in an entity's embedding text.
const EMBED_RELATION_LINES: usize = 10;
/// Members listed in a community summary prompt.
const SUMMARY_MEMBER_LIMIT: usize = 25;

const SUMMARY_PROMPT: &str = "You summarize clusters of a knowledge graph. Given the entities and \
relations below, write a short paragraph (at most four sentences) describing what connects them \
and the main facts they share. Use only the information given.";

/// Indexing parameters.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Maximum characters per extraction chunk
    pub chunk_size: usize,
    /// Community detection parameters
    pub leiden: LeidenConfig,
    /// Concurrent summary requests
    pub summary_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            leiden: LeidenConfig::default(),
            summary_concurrency: 4,
        }
    }
}

/// Builds graph snapshots from documents using injected capabilities.
#[derive(Debug, Clone)]
pub struct Indexer {
    extractor: Arc<dyn RelationshipExtractor>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    config: IndexerConfig,
}

#[derive(Debug)]
struct EntityAcc {
    name: String,
    entity_type: crate::rag::domain::graph::EntityType,
    descriptions: Vec<String>,
    provenance: Vec<Provenance>,
}

#[derive(Debug)]
struct RelationAcc {
    weight: Option<f32>,
    description: String,
    provenance: Vec<Provenance>,
}

impl Indexer {
    pub fn new(
        extractor: Arc<dyn RelationshipExtractor>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            generator,
            config,
        }
    }

    /// Build a snapshot from `documents`.
    ///
    /// A document whose extraction fails is logged and skipped entirely.
    /// Fails with [`RagError::IndexingFailure`] when no entities survive.
    pub async fn build(&self, documents: &[Document]) -> Result<GraphSnapshot> {
        let started = std::time::Instant::now();
        let mut entities: BTreeMap<String, EntityAcc> = BTreeMap::new();
        let mut relations: BTreeMap<(String, String, String), RelationAcc> = BTreeMap::new();
        let mut skipped = 0usize;

        for document in documents {
            let extracted = match self.extract_document(document).await {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(
                        document = %document.id,
                        extractor = self.extractor.name(),
                        error = %e,
                        "Extraction failed, skipping document"
                    );
                    skipped += 1;
                    continue;
                }
            };
            for (provenance, result) in extracted {
                merge_chunk(&mut entities, &mut relations, provenance, result);
            }
        }

        if entities.is_empty() {
            return Err(RagError::IndexingFailure(format!(
                "no entities extracted from {} documents ({skipped} skipped)",
                documents.len()
            )));
        }

        let entities: Vec<Entity> = entities
            .into_iter()
            .map(|(id, mut acc)| {
                acc.provenance.sort();
                acc.provenance.dedup();
                Entity {
                    id,
                    name: acc.name,
                    entity_type: acc.entity_type,
                    description: acc.descriptions.join(" "),
                    provenance: acc.provenance,
                    embedding: Vec::new(),
                }
            })
            .collect();
        let relations: Vec<Relation> = relations
            .into_iter()
            .map(|((source_id, target_id, relation_type), mut acc)| {
                acc.provenance.sort();
                acc.provenance.dedup();
                Relation {
                    source_id,
                    target_id,
                    relation_type,
                    weight: acc.weight,
                    description: acc.description,
                    provenance: acc.provenance,
                }
            })
            .collect();

        let draft = GraphSnapshot::new(entities, relations, Vec::new());
        let texts = draft
            .entities()
            .iter()
            .map(|e| draft.describe(&e.id, EMBED_RELATION_LINES))
            .collect::<Result<Vec<String>>>()?;
        let embeddings = self.embedder.embed(texts).await?;

        let mut communities = LeidenCommunityDetector::with_config(self.config.leiden.clone())
            .detect_communities(draft.entities(), draft.relations());
        self.summarize(&draft, &mut communities).await?;

        let (mut entities, relations, _) = draft.into_parts();
        for (entity, embedding) in entities.iter_mut().zip(embeddings) {
            entity.embedding = embedding;
        }
        let snapshot = GraphSnapshot::new(entities, relations, communities);

        info!(
            documents = documents.len(),
            skipped,
            entities = snapshot.entities().len(),
            relations = snapshot.relations().len(),
            communities = snapshot.all_communities().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Index build complete"
        );
        Ok(snapshot)
    }

    /// Extract every chunk of a document; any chunk failure fails the document.
    async fn extract_document(
        &self,
        document: &Document,
    ) -> Result<Vec<(Provenance, ExtractionResult)>> {
        let mut out = Vec::new();
        for chunk in chunk_document(document, self.config.chunk_size) {
            let result = self.extractor.extract(chunk.text).await?;
            debug!(
                document = %document.id,
                offset = chunk.offset,
                entities = result.entities.len(),
                relations = result.relations.len(),
                "Extracted chunk"
            );
            out.push((
                Provenance {
                    document_id: document.id.clone(),
                    offset: chunk.offset,
                },
                result,
            ));
        }
        Ok(out)
    }

    /// Fill in summary and embedding for each community.
    ///
    /// A failed summary call falls back to a listing of member names.
    async fn summarize(&self, snapshot: &GraphSnapshot, communities: &mut [Community]) -> Result<()> {
        if communities.is_empty() {
            return Ok(());
        }

        let prompts: Vec<(String, String)> = communities
            .iter()
            .map(|c| community_prompt(snapshot, c))
            .collect();

        let summaries: Vec<String> = stream::iter(prompts)
            .map(|(prompt, fallback)| {
                let generator = Arc::clone(&self.generator);
                async move {
                    let messages = vec![Message::system(SUMMARY_PROMPT), Message::user(prompt)];
                    match generator.complete(messages).await {
                        Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
                        Ok(_) => fallback,
                        Err(e) => {
                            warn!(error = %e, "Community summary failed, using member listing");
                            fallback
                        }
                    }
                }
            })
            .buffered(self.config.summary_concurrency.max(1))
            .collect()
            .await;

        let embeddings = self.embedder.embed(summaries.clone()).await?;
        for ((community, summary), embedding) in communities.iter_mut().zip(summaries).zip(embeddings)
        {
            community.summary = summary;
            community.embedding = embedding;
        }
        Ok(())
    }
}

/// Fold one chunk's extraction into the accumulators.
fn merge_chunk(
    entities: &mut BTreeMap<String, EntityAcc>,
    relations: &mut BTreeMap<(String, String, String), RelationAcc>,
    provenance: Provenance,
    result: ExtractionResult,
) {
    // Names resolve to the entity declared in the same chunk first.
    let mut local: HashMap<String, String> = HashMap::new();

    for extracted in result.entities {
        let normalized = normalize_name(&extracted.name);
        if normalized.is_empty() {
            continue;
        }
        let key = Entity::key(&extracted.name, &extracted.entity_type);
        local.entry(normalized).or_insert_with(|| key.clone());

        let acc = entities.entry(key).or_insert_with(|| EntityAcc {
            name: extracted.name.trim().to_string(),
            entity_type: extracted.entity_type.clone(),
            descriptions: Vec::new(),
            provenance: Vec::new(),
        });
        let description = extracted.description.trim();
        if !description.is_empty() && !acc.descriptions.iter().any(|d| d == description) {
            acc.descriptions.push(description.to_string());
        }
        acc.provenance.push(provenance.clone());
    }

    for extracted in result.relations {
        let resolve = |name: &str| {
            let normalized = normalize_name(name);
            local.get(&normalized).cloned().or_else(|| {
                entities
                    .iter()
                    .find(|(_, acc)| normalize_name(&acc.name) == normalized)
                    .map(|(key, _)| key.clone())
            })
        };
        let (Some(source), Some(target)) = (resolve(&extracted.source), resolve(&extracted.target))
        else {
            debug!(
                source = %extracted.source,
                target = %extracted.target,
                "Dropping relation with unknown endpoint"
            );
            continue;
        };
        let relation_type = normalize_relation_type(&extracted.relation_type);
        if relation_type.is_empty() {
            continue;
        }

        let acc = relations
            .entry((source, target, relation_type))
            .or_insert_with(|| RelationAcc {
                weight: None,
                description: String::new(),
                provenance: Vec::new(),
            });
        acc.weight = match (acc.weight, extracted.weight) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if acc.description.is_empty() {
            acc.description = extracted.description.trim().to_string();
        }
        acc.provenance.push(provenance.clone());
    }
}

/// Prompt body and fallback summary for one community.
fn community_prompt(snapshot: &GraphSnapshot, community: &Community) -> (String, String) {
    let mut prompt = String::from("Entities:\n");
    let mut names = Vec::new();
    for id in community.entity_ids.iter().take(SUMMARY_MEMBER_LIMIT) {
        if let Ok(text) = snapshot.describe(id, 5) {
            prompt.push_str(&text);
            prompt.push('\n');
        }
        if let Ok(entity) = snapshot.get(id) {
            names.push(entity.name.clone());
        }
    }
    let fallback = format!("Community of related entities: {}.", names.join(", "));
    (prompt, fallback)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::domain::graph::{EntityType, ExtractedEntity, ExtractedRelation};
    use crate::rag::embedding::LexicalEmbedder;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct ScriptedExtractor;

    #[async_trait]
    impl RelationshipExtractor for ScriptedExtractor {
        async fn extract(&self, text: &str) -> Result<ExtractionResult> {
            if text.contains("BROKEN") {
                return Err(RagError::BackendFatal("cannot parse".into()));
            }
            let mut result = ExtractionResult::default();
            for name in ["Alice", "Bob", "Acme"] {
                if text.contains(name) {
                    result.entities.push(ExtractedEntity {
                        name: name.to_string(),
                        entity_type: if name == "Acme" {
                            EntityType::Organization
                        } else {
                            EntityType::Person
                        },
                        description: format!("{name} appears in the corpus."),
                    });
                }
            }
            if text.contains("Alice") && text.contains("Bob") {
                result.relations.push(ExtractedRelation {
                    source: "Alice".into(),
                    target: "bob".into(),
                    relation_type: "collaborates_with".into(),
                    weight: Some(0.9),
                    description: String::new(),
                });
            }
            Ok(result)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[derive(Debug)]
    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
            Err(RagError::BackendTransient("offline".into()))
        }
    }

    fn indexer() -> Indexer {
        Indexer::new(
            Arc::new(ScriptedExtractor),
            Arc::new(LexicalEmbedder::default()),
            Arc::new(EchoGenerator),
            IndexerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_merges_duplicates_and_provenance() {
        let docs = vec![
            Document::new("d1", "Alice collaborates with Bob."),
            Document::new("d2", "Alice joined Acme."),
        ];
        let snapshot = indexer().build(&docs).await.unwrap();

        assert_eq!(snapshot.entities().len(), 3);
        let alice = snapshot.get("person:alice").unwrap();
        assert_eq!(alice.provenance.len(), 2);
        assert_eq!(alice.embedding.len(), 384);

        assert_eq!(snapshot.relations().len(), 1);
        let rel = &snapshot.relations()[0];
        assert_eq!(rel.source_id, "person:alice");
        assert_eq!(rel.target_id, "person:bob");
    }

    #[tokio::test]
    async fn test_failed_document_is_skipped() {
        let docs = vec![
            Document::new("good", "Alice and Bob."),
            Document::new("bad", "BROKEN Acme."),
        ];
        let snapshot = indexer().build(&docs).await.unwrap();
        assert!(snapshot.get("organization:acme").is_err());
        assert_eq!(snapshot.entities().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_entities_is_indexing_failure() {
        let docs = vec![Document::new("d", "Nothing to see here.")];
        let err = indexer().build(&docs).await.unwrap_err();
        assert!(matches!(err, RagError::IndexingFailure(_)));
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_listing() {
        let docs = vec![Document::new("d1", "Alice collaborates with Bob.")];
        let snapshot = indexer().build(&docs).await.unwrap();
        let level0 = snapshot.communities(0);
        assert_eq!(level0.len(), 1);
        assert!(level0[0].summary.contains("Alice"));
        assert!(level0[0].summary.contains("Bob"));
        assert!(!level0[0].embedding.is_empty());
    }
}
