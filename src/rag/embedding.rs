//! Text embedding capability.
//!
//! [`FastEmbedder`] runs a local fastembed model; [`LexicalEmbedder`] is a
//! deterministic feature-hashing embedder used offline and in tests.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Turns texts into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Cosine similarity clamped to `[0, 1]` so it can serve as a relevance score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(0.0, 1.0)
}

// =============================================================================
// FastEmbed
// =============================================================================

pub struct FastEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model", &"BGESmallENV15")
            .finish()
    }
}

impl FastEmbedder {
    /// Load the BGE-Small-En-V1.5 model (downloads on first use).
    pub async fn initialize() -> Result<Self> {
        info!("Initializing fastembed model (BG-Small-En-V1.5)...");
        let model = tokio::task::spawn_blocking(|| {
            let mut options = InitOptions::new(EmbeddingModel::BGESmallENV15);
            options.show_download_progress = false;
            TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| RagError::BackendFatal(format!("embedding init panicked: {e}")))?
        .map_err(|e| RagError::BackendFatal(format!("embedding init failed: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(Some(model))),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model_guard = self.model.lock().await;
        let mut owned_model = model_guard
            .take()
            .ok_or_else(|| RagError::BackendFatal("embedding model unavailable".to_string()))?;

        // Inference is CPU-bound; run it off the async workers and hand the model back.
        let (embeddings_res, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await
        .map_err(|e| RagError::BackendFatal(format!("embedding task panicked: {e}")))?;

        *model_guard = Some(returned_model);
        embeddings_res.map_err(|e| RagError::BackendFatal(e.to_string()))
    }
}

// =============================================================================
// Lexical (feature hashing)
// =============================================================================

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "whom", "why", "with",
];

/// Hashes unigrams and bigrams of normalized terms into a fixed number of buckets.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimensions: usize,
}

impl LexicalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Lowercased alphanumeric terms with stop words removed and a light suffix strip.
    pub fn terms(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .filter(|w| !STOP_WORDS.contains(&w.as_str()))
            .map(|w| stem(&w))
            .collect()
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let terms = Self::terms(text);

        for term in &terms {
            vector[self.bucket(term)] += 1.0;
        }
        for pair in terms.windows(2) {
            vector[self.bucket(&format!("{} {}", pair[0], pair[1]))] += 0.5;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn bucket(&self, term: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn stem(word: &str) -> String {
    if word.len() <= 4 {
        return word.to_string();
    }
    if let Some(stripped) = word.strip_suffix("ing")
        && stripped.len() >= 4
    {
        return stripped.to_string();
    }
    if word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn test_terms_strip_stop_words_and_suffixes() {
        let terms = LexicalEmbedder::terms("Who does Alice collaborate with?");
        assert_eq!(terms, vec!["alice", "collaborate"]);
        assert_eq!(
            LexicalEmbedder::terms("collaborates_with"),
            vec!["collaborate"]
        );
    }

    #[tokio::test]
    async fn test_lexical_is_deterministic_and_discriminative() {
        let embedder = LexicalEmbedder::new(256);
        let vecs = embedder
            .embed(vec![
                "Alice collaborates with Bob".to_string(),
                "Alice collaborates with Bob".to_string(),
                "Quarterly revenue of the bakery".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(vecs[0], vecs[1]);
        assert_eq!(vecs[0].len(), 256);

        let query = embedder.embed_one("Who does Alice collaborate with?");
        assert!(cosine_similarity(&query, &vecs[0]) > cosine_similarity(&query, &vecs[2]));
    }
}
