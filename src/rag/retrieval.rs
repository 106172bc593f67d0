//! Graph Retriever
//!
//! Combines a local strategy (vector-similar entities expanded through
//! their graph neighbourhood) with a global strategy (community summaries)
//! and fuses both into one bounded, score-ordered [`RetrievalResult`].

use crate::error::{RagError, Result};
use crate::rag::domain::answer::{
    ContextItem, ItemKind, QueryMode, Question, RetrievalResult, ScoredItem,
};
use crate::rag::embedding::{Embedder, cosine_similarity};
use crate::rag::store::GraphSnapshot;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for graph retrieval.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Seed entities taken by vector similarity
    pub top_k: usize,
    /// Neighbourhood expansion depth (0 disables expansion)
    pub hops: usize,
    /// Score multiplier applied per hop
    pub hop_decay: f32,
    /// Communities taken by the global strategy
    pub community_top_k: usize,
    /// Questions with at least this many words use the global strategy
    pub global_min_words: usize,
    /// Lowercase cue words that trigger the global strategy
    pub global_keywords: Vec<String>,
    /// Relation lines attached to each entity's context text
    pub relation_lines: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            hops: 2,
            hop_decay: 0.5,
            community_top_k: 3,
            global_min_words: 12,
            global_keywords: [
                "overall",
                "summary",
                "summarize",
                "main",
                "themes",
                "trends",
                "all",
                "overview",
                "general",
                "across",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            relation_lines: 10,
        }
    }
}

// =============================================================================
// Retriever
// =============================================================================

/// Selects relevant entities and communities for a question.
#[derive(Debug, Clone)]
pub struct GraphRetriever {
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

/// Scored candidates in discovery order, deduplicated by `(kind, id)`.
#[derive(Debug, Default)]
struct Candidates {
    order: Vec<(ItemKind, String, f32)>,
    index: HashMap<(ItemKind, String), usize>,
}

impl Candidates {
    /// Record a candidate, keeping the maximum score and the first position.
    fn offer(&mut self, kind: ItemKind, id: &str, score: f32) -> bool {
        match self.index.get(&(kind, id.to_string())) {
            Some(&i) => {
                if score > self.order[i].2 {
                    self.order[i].2 = score;
                    true
                } else {
                    false
                }
            }
            None => {
                self.index.insert((kind, id.to_string()), self.order.len());
                self.order.push((kind, id.to_string(), score));
                true
            }
        }
    }
}

impl GraphRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, config: RetrieverConfig) -> Self {
        Self { embedder, config }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve at most `max_items` context items for `question`.
    ///
    /// The snapshot is only read. Fails with [`RagError::InvalidArgument`]
    /// when `max_items` is zero.
    pub async fn retrieve(
        &self,
        question: &Question,
        snapshot: &GraphSnapshot,
        max_items: usize,
    ) -> Result<RetrievalResult> {
        if max_items == 0 {
            return Err(RagError::InvalidArgument(
                "max_items must be greater than zero".to_string(),
            ));
        }
        let mut result = RetrievalResult {
            items: Vec::new(),
            snapshot_version: snapshot.version(),
        };
        if snapshot.is_empty() || question.text.trim().is_empty() {
            return Ok(result);
        }

        let query = self
            .embedder
            .embed(vec![question.text.clone()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut candidates = Candidates::default();
        self.local(&query, snapshot, &mut candidates)?;
        let global = self.wants_global(question);
        if global {
            self.global(&query, snapshot, &mut candidates);
        }

        let mut scored: Vec<(ItemKind, String, f32)> = candidates.order;
        // Stable: equal scores keep discovery order.
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));
        scored.truncate(max_items);

        for (kind, id, score) in scored {
            let text = match kind {
                ItemKind::Entity => snapshot.describe(&id, self.config.relation_lines)?,
                ItemKind::Community => {
                    let summary = snapshot
                        .all_communities()
                        .iter()
                        .find(|c| c.id == id)
                        .map(|c| c.summary.as_str())
                        .unwrap_or_default();
                    format!("Community summary: {summary}")
                }
            };
            result.items.push(ScoredItem {
                item: ContextItem { kind, id, text },
                score,
            });
        }

        tracing::debug!(
            question_id = %question.id,
            items = result.items.len(),
            global,
            snapshot_version = result.snapshot_version,
            "Retrieved context"
        );
        Ok(result)
    }

    /// Whether the global strategy should run for this question.
    pub fn wants_global(&self, question: &Question) -> bool {
        match question.mode {
            QueryMode::Local => false,
            QueryMode::Global => true,
            QueryMode::Auto => {
                let words: Vec<String> = question
                    .text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase)
                    .collect();
                words.len() >= self.config.global_min_words
                    || words
                        .iter()
                        .any(|w| self.config.global_keywords.iter().any(|k| k == w))
            }
        }
    }

    /// Top-k similar entities, then hop expansion with decayed scores.
    fn local(
        &self,
        query: &[f32],
        snapshot: &GraphSnapshot,
        candidates: &mut Candidates,
    ) -> Result<()> {
        let mut seeds: Vec<(&str, f32)> = snapshot
            .entities()
            .iter()
            .map(|e| (e.id.as_str(), cosine_similarity(query, &e.embedding)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        seeds.sort_by(|a, b| b.1.total_cmp(&a.1));
        seeds.truncate(self.config.top_k);

        let mut frontier: Vec<(String, f32)> = Vec::new();
        for (id, score) in seeds {
            candidates.offer(ItemKind::Entity, id, score);
            frontier.push((id.to_string(), score));
        }

        for _ in 0..self.config.hops {
            let mut next = Vec::new();
            for (id, score) in &frontier {
                let decayed = score * self.config.hop_decay;
                for neighbor in snapshot.neighbors(id, None)? {
                    if candidates.offer(ItemKind::Entity, &neighbor.id, decayed) {
                        next.push((neighbor.id.clone(), decayed));
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(())
    }

    /// Communities ranked by summary similarity.
    fn global(&self, query: &[f32], snapshot: &GraphSnapshot, candidates: &mut Candidates) {
        let mut ranked: Vec<(&str, f32)> = snapshot
            .all_communities()
            .iter()
            .map(|c| (c.id.as_str(), cosine_similarity(query, &c.embedding)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (id, score) in ranked.into_iter().take(self.config.community_top_k) {
            candidates.offer(ItemKind::Community, id, score);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::domain::graph::{Community, Entity, EntityType, Relation};
    use crate::rag::embedding::LexicalEmbedder;

    fn entity(id: &str, name: &str, description: &str) -> Entity {
        let embedder = LexicalEmbedder::default();
        let mut e = Entity {
            id: id.to_string(),
            name: name.to_string(),
            entity_type: EntityType::Person,
            description: description.to_string(),
            provenance: Vec::new(),
            embedding: Vec::new(),
        };
        e.embedding = embedder.embed_one(&e.text());
        e
    }

    fn relation(s: &str, t: &str, ty: &str) -> Relation {
        Relation {
            source_id: s.to_string(),
            target_id: t.to_string(),
            relation_type: ty.to_string(),
            weight: None,
            description: String::new(),
            provenance: Vec::new(),
        }
    }

    fn snapshot() -> GraphSnapshot {
        let summary = "Research group of Alice and Bob studying graph algorithms";
        GraphSnapshot::new(
            vec![
                entity("alice", "Alice", "Alice is a graph researcher."),
                entity("bob", "Bob", "Bob writes compilers."),
                entity("carol", "Carol", "Carol manages Bob."),
                entity("dave", "Dave", "Dave bakes bread."),
            ],
            vec![
                relation("alice", "bob", "collaborates_with"),
                relation("carol", "bob", "manages"),
            ],
            vec![Community {
                id: "c0-0".to_string(),
                level: 0,
                entity_ids: vec!["alice".into(), "bob".into()],
                summary: summary.to_string(),
                embedding: LexicalEmbedder::default().embed_one(summary),
            }],
        )
    }

    fn retriever(config: RetrieverConfig) -> GraphRetriever {
        GraphRetriever::new(Arc::new(LexicalEmbedder::default()), config)
    }

    #[tokio::test]
    async fn test_zero_max_items_is_invalid() {
        let err = retriever(RetrieverConfig::default())
            .retrieve(&Question::new("Alice?"), &snapshot(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_local_expansion_reaches_neighbors() {
        let config = RetrieverConfig {
            top_k: 1,
            ..RetrieverConfig::default()
        };
        let result = retriever(config)
            .retrieve(&Question::new("Tell me about Alice"), &snapshot(), 10)
            .await
            .unwrap();

        let ids: Vec<&str> = result.ids().collect();
        assert_eq!(ids[0], "alice");
        assert!(ids.contains(&"bob"));
        assert!(ids.contains(&"carol"));
        assert!(!ids.contains(&"dave"));

        let score = |id: &str| result.items.iter().find(|s| s.item.id == id).unwrap().score;
        assert!((score("bob") - score("alice") * 0.5).abs() < 1e-6);
        assert!((score("carol") - score("alice") * 0.25).abs() < 1e-6);
        assert!(result.items[0].item.text.contains("Alice collaborates_with Bob"));
    }

    #[tokio::test]
    async fn test_sorted_and_bounded() {
        let r = retriever(RetrieverConfig::default());
        for max in 1..5 {
            let result = r
                .retrieve(
                    &Question::with_mode("Alice Bob Carol graph", QueryMode::Global),
                    &snapshot(),
                    max,
                )
                .await
                .unwrap();
            assert!(result.len() <= max);
            assert!(result.items.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_global_selection() {
        let r = retriever(RetrieverConfig::default());
        assert!(!r.wants_global(&Question::new("Who does Alice collaborate with?")));
        assert!(r.wants_global(&Question::new("Give an overview of the research")));
        assert!(!r.wants_global(&Question::with_mode("Give an overview", QueryMode::Local)));

        let result = r
            .retrieve(
                &Question::new("What are the main research themes of the graph group?"),
                &snapshot(),
                10,
            )
            .await
            .unwrap();
        assert!(
            result
                .items
                .iter()
                .any(|s| s.item.kind == ItemKind::Community && s.item.id == "c0-0")
        );
    }

    #[tokio::test]
    async fn test_empty_snapshot_yields_empty_result() {
        let result = retriever(RetrieverConfig::default())
            .retrieve(&Question::new("Alice?"), &GraphSnapshot::empty(), 5)
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
