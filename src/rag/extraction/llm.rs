//! LLM-backed extraction.
//!
//! Prompts the text generator for a JSON object of entities and relations
//! and tolerates the usual wrapping (markdown fences, leading prose).

use super::{ExtractionConfig, RelationshipExtractor};
use crate::error::{RagError, Result};
use crate::llm::{Message, TextGenerator};
use crate::rag::domain::graph::{
    EntityType, ExtractedEntity, ExtractedRelation, ExtractionResult, normalize_relation_type,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const EXTRACTION_PROMPT: &str = r#"Extract the named entities and the relations between them from the text below.

Respond with a single JSON object and nothing else:
{"entities": [{"name": "...", "type": "person|organization|location|event|concept|product|temporal|quantity", "description": "one sentence"}],
 "relations": [{"source": "entity name", "target": "entity name", "type": "snake_case_relation", "description": "one sentence", "weight": 0.0-1.0}]}

Only use entity names that appear in the entities list as relation endpoints."#;

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relations: Vec<LlmRelation>,
}

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(default, rename = "type")]
    entity_type: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct LlmRelation {
    source: String,
    target: String,
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    weight: Option<f32>,
}

/// Extractor that asks an LLM for structured output.
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    generator: Arc<dyn TextGenerator>,
    config: ExtractionConfig,
}

impl LlmExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            config: ExtractionConfig::default(),
        }
    }

    pub fn with_config(generator: Arc<dyn TextGenerator>, config: ExtractionConfig) -> Self {
        Self { generator, config }
    }

    fn parse(&self, raw: &str) -> Result<ExtractionResult> {
        let json = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                return Err(RagError::BackendFatal(
                    "extraction response contained no JSON object".to_string(),
                ));
            }
        };
        let parsed: LlmExtraction = serde_json::from_str(json)
            .map_err(|e| RagError::BackendFatal(format!("invalid extraction JSON: {e}")))?;

        let entities = parsed
            .entities
            .into_iter()
            .filter(|e| !e.name.trim().is_empty())
            .take(self.config.max_entities)
            .map(|e| ExtractedEntity {
                name: e.name.trim().to_string(),
                entity_type: EntityType::parse(&e.entity_type),
                description: e.description,
            })
            .collect();

        let relations = parsed
            .relations
            .into_iter()
            .filter(|r| r.weight.unwrap_or(1.0) >= self.config.min_confidence)
            .map(|r| ExtractedRelation {
                source: r.source,
                target: r.target,
                relation_type: normalize_relation_type(&r.relation_type),
                weight: r.weight,
                description: r.description,
            })
            .collect();

        Ok(ExtractionResult {
            entities,
            relations,
        })
    }
}

#[async_trait]
impl RelationshipExtractor for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        let messages = vec![
            Message::system(EXTRACTION_PROMPT),
            Message::user(format!("Text:\n{text}")),
        ];
        let raw = self.generator.complete(messages).await?;
        self.parse(&raw)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}
