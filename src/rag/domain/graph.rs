//! GraphRAG Domain Models
//!
//! Entity, relation, community, and document structures for
//! knowledge graph-enhanced retrieval.

use serde::{Deserialize, Serialize};

// =============================================================================
// Documents
// =============================================================================

/// A raw corpus document handed to the indexer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier (file name relative to the corpus root)
    pub id: String,
    /// Full document text
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Where a graph element was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Provenance {
    /// Source document ID
    pub document_id: String,
    /// Byte offset of the chunk the element was extracted from
    pub offset: usize,
}

// =============================================================================
// Entity Types
// =============================================================================

/// Types of entities that can be extracted from documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A person or individual
    Person,
    /// An organization, company, or institution
    Organization,
    /// A geographical or political location
    Location,
    /// An event or occurrence
    Event,
    /// A technical or abstract concept
    #[default]
    Concept,
    /// A product, technology, or artifact
    Product,
    /// Date or time reference
    Temporal,
    /// Numeric or quantitative data
    Quantity,
    /// Custom entity type
    Custom(String),
}

impl EntityType {
    /// Parse a free-form label as emitted by extractors (spaCy labels or plain words).
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" | "ORGANISATION" | "INSTITUTION" => Self::Organization,
            "GPE" | "LOC" | "LOCATION" | "PLACE" | "COUNTRY" | "CITY" => Self::Location,
            "EVENT" => Self::Event,
            "CONCEPT" | "" => Self::Concept,
            "PRODUCT" | "WORK_OF_ART" => Self::Product,
            "DATE" | "TIME" | "TEMPORAL" => Self::Temporal,
            "MONEY" | "PERCENT" | "QUANTITY" | "CARDINAL" | "ORDINAL" => Self::Quantity,
            _ => Self::Custom(label.trim().to_lowercase()),
        }
    }

    /// Human-readable label used in context text.
    pub fn label(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Event => "event",
            Self::Concept => "concept",
            Self::Product => "product",
            Self::Temporal => "temporal",
            Self::Quantity => "quantity",
            Self::Custom(label) => label,
        }
    }
}

// =============================================================================
// Entity
// =============================================================================

/// An entity extracted from document content.
///
/// Entities are immutable once indexed; a reindex replaces them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Identifier, unique within a snapshot (derived from normalized name + type)
    pub id: String,
    /// Display name as first seen in the corpus
    pub name: String,
    /// Entity type classification
    pub entity_type: EntityType,
    /// Merged description of the entity
    pub description: String,
    /// Every chunk this entity was extracted from
    pub provenance: Vec<Provenance>,
    /// Vector embedding for similarity search
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Entity {
    /// Deduplication key: normalized name plus type.
    pub fn key(name: &str, entity_type: &EntityType) -> String {
        format!("{}:{}", entity_type.label(), normalize_name(name))
    }

    /// Text used for embedding and context composition.
    pub fn text(&self) -> String {
        if self.description.is_empty() {
            format!("{} ({})", self.name, self.entity_type.label())
        } else {
            format!(
                "{} ({}): {}",
                self.name,
                self.entity_type.label(),
                self.description
            )
        }
    }
}

/// Lowercase, collapse whitespace, strip surrounding punctuation.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Relation
// =============================================================================

/// A typed, directed relation between two entities.
///
/// Several relations of different types may connect the same pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    /// Source entity ID
    pub source_id: String,
    /// Target entity ID
    pub target_id: String,
    /// Relation type (e.g., "collaborates_with", "works_at")
    pub relation_type: String,
    /// Confidence/weight of the relation (0.0 - 1.0)
    pub weight: Option<f32>,
    /// Free-text description of the relation
    pub description: String,
    /// Every chunk this relation was extracted from
    pub provenance: Vec<Provenance>,
}

impl Relation {
    /// Identity of a relation inside a snapshot.
    pub fn key(&self) -> (String, String, String) {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.relation_type.clone(),
        )
    }

    /// Weight used by graph algorithms when none was extracted.
    pub fn effective_weight(&self) -> f32 {
        self.weight.unwrap_or(1.0)
    }
}

/// Normalize a relation label to snake case ("Collaborates With" -> "collaborates_with").
pub fn normalize_relation_type(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

// =============================================================================
// Community
// =============================================================================

/// A community (cluster) of related entities detected via graph algorithms.
///
/// Derived data: recomputed on every index build, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Community {
    /// Identifier, unique within a snapshot
    pub id: String,
    /// Hierarchy level (0 = leaf, higher = more abstract)
    pub level: u32,
    /// IDs of entities in this community
    pub entity_ids: Vec<String>,
    /// Generated summary of the community
    pub summary: String,
    /// Vector embedding of the summary for search
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

// =============================================================================
// Extraction Result
// =============================================================================

/// An entity as produced by an extractor, before deduplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub description: String,
}

/// A relation as produced by an extractor, referencing entities by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default)]
    pub description: String,
}

/// Result of entity/relation extraction from one chunk of text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    /// Extracted entities
    pub entities: Vec<ExtractedEntity>,
    /// Extracted relations
    pub relations: Vec<ExtractedRelation>,
}
