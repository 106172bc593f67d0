//! External NLP Service Client
//!
//! REST client for external NLP services (SpaCy, Stanza, etc.) exposing a
//! `POST /extract` endpoint.

use super::{ExtractionConfig, RelationshipExtractor};
use crate::error::{RagError, Result};
use crate::rag::domain::graph::{
    EntityType, ExtractedEntity, ExtractedRelation, ExtractionResult, normalize_name,
    normalize_relation_type,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// =============================================================================
// REST API Request/Response Types
// =============================================================================

/// Request body for the /extract endpoint.
#[derive(Debug, Serialize)]
pub struct ExtractRequest<'a> {
    pub text: &'a str,
    pub options: ExtractOptions,
}

/// Options for extraction.
#[derive(Debug, Serialize)]
pub struct ExtractOptions {
    pub extract_entities: bool,
    pub extract_relations: bool,
    pub coreference: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            extract_entities: true,
            extract_relations: true,
            coreference: false,
        }
    }
}

/// Response from the /extract endpoint.
#[derive(Debug, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub entities: Vec<EntityDto>,
    #[serde(default)]
    pub relations: Vec<RelationDto>,
}

/// Entity as returned by the external service.
#[derive(Debug, Deserialize)]
pub struct EntityDto {
    pub text: String,
    pub label: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Relation as returned by the external service.
#[derive(Debug, Deserialize)]
pub struct RelationDto {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

// =============================================================================
// External NLP Extractor
// =============================================================================

/// Client for external NLP extraction services.
#[derive(Debug, Clone)]
pub struct ExternalNlpExtractor {
    client: Client,
    base_url: String,
    config: ExtractionConfig,
}

impl ExternalNlpExtractor {
    /// Create a new external NLP extractor.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the NLP service (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(base_url, ExtractionConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(base_url: impl Into<String>, config: ExtractionConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
        }
    }

    /// Convert a service response to extractor output.
    ///
    /// Relations whose endpoints were not recognised as entities are dropped.
    fn convert(&self, response: ExtractResponse) -> ExtractionResult {
        let entities: Vec<ExtractedEntity> = response
            .entities
            .into_iter()
            .filter(|e| e.confidence.unwrap_or(1.0) >= self.config.min_confidence)
            .take(self.config.max_entities)
            .map(|e| ExtractedEntity {
                name: e.text,
                entity_type: EntityType::parse(&e.label),
                description: String::new(),
            })
            .collect();

        let known: HashSet<String> = entities.iter().map(|e| normalize_name(&e.name)).collect();

        let relations = response
            .relations
            .into_iter()
            .filter(|r| r.confidence.unwrap_or(1.0) >= self.config.min_confidence)
            .filter(|r| {
                known.contains(&normalize_name(&r.subject))
                    && known.contains(&normalize_name(&r.object))
            })
            .map(|r| ExtractedRelation {
                description: format!("{} {} {}", r.subject, r.predicate, r.object),
                relation_type: normalize_relation_type(&r.predicate),
                source: r.subject,
                target: r.object,
                weight: r.confidence,
            })
            .collect();

        ExtractionResult {
            entities,
            relations,
        }
    }
}

#[async_trait]
impl RelationshipExtractor for ExternalNlpExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        let url = format!("{}/extract", self.base_url);

        let request = ExtractRequest {
            text,
            options: ExtractOptions::default(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("NLP service returned error: {status}");
            return Err(if crate::error::is_transient_status(status.as_u16()) {
                RagError::BackendTransient(message)
            } else {
                RagError::BackendFatal(message)
            });
        }

        let extract_response: ExtractResponse = response
            .json()
            .await
            .map_err(|e| RagError::BackendFatal(format!("Failed to parse NLP response: {e}")))?;

        Ok(self.convert(extract_response))
    }

    fn name(&self) -> &'static str {
        "external_nlp"
    }
}

// =============================================================================
// Tests
// =============================================================================
