//! Graph Store
//!
//! An immutable [`GraphSnapshot`] answers structural queries; the
//! [`GraphStore`] holds the current snapshot and swaps it atomically on
//! reindex. Readers clone the `Arc` and keep a consistent view for as long
//! as they hold it.

use crate::error::{RagError, Result};
use crate::rag::domain::graph::{Community, Entity, Relation};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// =============================================================================
// Snapshot
// =============================================================================

/// The versioned aggregate of entities, relations, and communities.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    version: u64,
    created_at: DateTime<Utc>,
    entities: Vec<Entity>,
    entity_index: HashMap<String, usize>,
    relations: Vec<Relation>,
    /// entity id -> indices into `relations` touching it (either direction)
    adjacency: HashMap<String, Vec<usize>>,
    communities: Vec<Community>,
}

/// Counts reported by health and reindex endpoints.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SnapshotStats {
    pub version: u64,
    pub entities: usize,
    pub relations: usize,
    pub communities: usize,
}

impl GraphSnapshot {
    /// Build a snapshot. Relations referencing unknown entities are dropped.
    pub fn new(
        mut entities: Vec<Entity>,
        relations: Vec<Relation>,
        communities: Vec<Community>,
    ) -> Self {
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        let entity_index: HashMap<String, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        let relations: Vec<Relation> = relations
            .into_iter()
            .filter(|r| {
                entity_index.contains_key(&r.source_id) && entity_index.contains_key(&r.target_id)
            })
            .collect();

        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, rel) in relations.iter().enumerate() {
            adjacency.entry(rel.source_id.clone()).or_default().push(i);
            if rel.target_id != rel.source_id {
                adjacency.entry(rel.target_id.clone()).or_default().push(i);
            }
        }

        Self {
            version: 0,
            created_at: Utc::now(),
            entities,
            entity_index,
            relations,
            adjacency,
            communities,
        }
    }

    /// An empty snapshot, served until the first index build is published.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            version: self.version,
            entities: self.entities.len(),
            relations: self.relations.len(),
            communities: self.communities.len(),
        }
    }

    /// Look up an entity by ID.
    pub fn get(&self, entity_id: &str) -> Result<&Entity> {
        self.entity_index
            .get(entity_id)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| RagError::NotFound(entity_id.to_string()))
    }

    /// Entities one hop away, in either direction, optionally filtered by relation type.
    ///
    /// Each neighbour appears once, in relation discovery order.
    pub fn neighbors(&self, entity_id: &str, relation_types: Option<&[&str]>) -> Result<Vec<&Entity>> {
        self.get(entity_id)?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for rel in self.relations_of(entity_id) {
            if let Some(types) = relation_types
                && !types.contains(&rel.relation_type.as_str())
            {
                continue;
            }
            let other = if rel.source_id == entity_id {
                &rel.target_id
            } else {
                &rel.source_id
            };
            if other != entity_id && seen.insert(other.as_str()) {
                out.push(self.get(other)?);
            }
        }
        Ok(out)
    }

    /// Relations touching an entity, in insertion order.
    pub fn relations_of<'a>(&'a self, entity_id: &str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.adjacency
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.relations[i])
    }

    /// Communities at a hierarchy level.
    pub fn communities(&self, level: u32) -> Vec<&Community> {
        self.communities.iter().filter(|c| c.level == level).collect()
    }

    pub fn all_communities(&self) -> &[Community] {
        &self.communities
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity text followed by up to `max_relations` relation lines
    /// (`- Alice collaborates_with Bob`), used for embedding and context.
    pub fn describe(&self, entity_id: &str, max_relations: usize) -> Result<String> {
        let entity = self.get(entity_id)?;
        let mut text = entity.text();
        for rel in self.relations_of(entity_id).take(max_relations) {
            let source = self.get(&rel.source_id)?;
            let target = self.get(&rel.target_id)?;
            text.push_str(&format!(
                "\n- {} {} {}",
                source.name, rel.relation_type, target.name
            ));
            if !rel.description.is_empty() {
                text.push_str(&format!(": {}", rel.description));
            }
        }
        Ok(text)
    }

    /// Consume the snapshot, returning its entities, relations, and communities.
    pub fn into_parts(self) -> (Vec<Entity>, Vec<Relation>, Vec<Community>) {
        (self.entities, self.relations, self.communities)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Holder of the current snapshot.
///
/// The lock is only held to clone or replace the `Arc`, never across I/O.
#[derive(Debug)]
pub struct GraphStore {
    current: RwLock<Arc<GraphSnapshot>>,
}

impl GraphStore {
    pub fn new(initial: GraphSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current snapshot, assigning it the next version.
    ///
    /// In-flight readers keep the snapshot they already hold.
    pub fn publish(&self, mut snapshot: GraphSnapshot) -> Arc<GraphSnapshot> {
        let mut guard = self.current.write();
        snapshot.version = guard.version + 1;
        let published = Arc::new(snapshot);
        *guard = Arc::clone(&published);
        drop(guard);

        metrics::gauge!("snapshot_version").set(published.version as f64);
        tracing::info!(
            version = published.version,
            entities = published.entities.len(),
            relations = published.relations.len(),
            communities = published.communities.len(),
            "Published graph snapshot"
        );
        published
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(GraphSnapshot::empty())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::domain::graph::EntityType;

    fn entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: id.to_string(),
            entity_type: EntityType::Person,
            description: String::new(),
            provenance: Vec::new(),
            embedding: Vec::new(),
        }
    }

    fn relation(source: &str, target: &str, ty: &str) -> Relation {
        Relation {
            source_id: source.to_string(),
            target_id: target.to_string(),
            relation_type: ty.to_string(),
            weight: None,
            description: String::new(),
            provenance: Vec::new(),
        }
    }

    fn sample() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![entity("a"), entity("b"), entity("c")],
            vec![
                relation("a", "b", "knows"),
                relation("a", "b", "works_with"),
                relation("c", "a", "manages"),
                relation("a", "ghost", "knows"),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let snap = sample();
        assert!(snap.get("a").is_ok());
        assert_eq!(
            snap.get("zzz").unwrap_err(),
            RagError::NotFound("zzz".to_string())
        );
    }

    #[test]
    fn test_dangling_relations_dropped() {
        assert_eq!(sample().relations().len(), 3);
    }

    #[test]
    fn test_neighbors_dedup_and_filter() {
        let snap = sample();
        let ids: Vec<&str> = snap
            .neighbors("a", None)
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);

        let managed: Vec<&str> = snap
            .neighbors("a", Some(&["manages"]))
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(managed, vec!["c"]);
    }

    #[test]
    fn test_describe_lists_relations() {
        let snap = sample();
        let text = snap.describe("a", 10).unwrap();
        assert!(text.starts_with("a (person)"));
        assert!(text.contains("- a knows b"));
        assert!(text.contains("- c manages a"));
        assert_eq!(snap.describe("a", 1).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_publish_bumps_version_and_keeps_old_readers() {
        let store = GraphStore::default();
        assert_eq!(store.snapshot().version(), 0);

        let before = store.snapshot();
        store.publish(sample());
        assert_eq!(store.snapshot().version(), 1);
        assert!(before.is_empty());
        assert_eq!(store.snapshot().entities().len(), 3);
    }
}
