//! Entity and Relationship Extraction Strategies
//!
//! Provides the trait interface and implementations for extracting
//! entities and relationships from document chunks.

pub mod external_nlp;
pub mod leiden;
pub mod llm;

pub use external_nlp::ExternalNlpExtractor;
pub use leiden::{LeidenCommunityDetector, LeidenConfig};
pub use llm::LlmExtractor;

use crate::error::Result;
use crate::rag::domain::graph::ExtractionResult;
use async_trait::async_trait;

// =============================================================================
// Extraction Strategy Trait
// =============================================================================

/// Strategy for extracting entities and relationships from text.
#[async_trait]
pub trait RelationshipExtractor: Send + Sync + std::fmt::Debug {
    /// Extract entities and relationships from a chunk of text.
    async fn extract(&self, text: &str) -> Result<ExtractionResult>;

    /// Get the name of this extraction strategy.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Extraction Configuration
// =============================================================================

/// Configuration for extraction strategies.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Minimum confidence for entities and relations
    pub min_confidence: f32,
    /// Maximum entities per chunk
    pub max_entities: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_entities: 50,
        }
    }
}
