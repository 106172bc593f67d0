//! Leiden Community Detection Algorithm
//!
//! Local moving of nodes by modularity gain, followed by a refinement step
//! that splits every community into its connected parts. Higher hierarchy
//! levels come from running the same procedure over the aggregated
//! community graph. Node visiting order is fixed, so results are
//! deterministic for a given input.

use crate::rag::domain::graph::{Community, Entity, Relation};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, VecDeque};

// =============================================================================
// Leiden Community Detector
// =============================================================================

/// Parameters for community detection.
#[derive(Debug, Clone)]
pub struct LeidenConfig {
    /// Resolution parameter (higher = smaller communities)
    pub resolution: f64,
    /// Maximum local-moving sweeps per level
    pub max_iterations: usize,
    /// Minimum improvement threshold to move a node
    pub min_improvement: f64,
    /// Number of hierarchy levels to produce (at least 1)
    pub levels: u32,
}

impl Default for LeidenConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 100,
            min_improvement: 1e-6,
            levels: 2,
        }
    }
}

/// Community detector using the Leiden algorithm.
#[derive(Debug, Default)]
pub struct LeidenCommunityDetector {
    config: LeidenConfig,
}

impl LeidenCommunityDetector {
    /// Create with custom configuration.
    pub fn with_config(config: LeidenConfig) -> Self {
        Self { config }
    }

    /// Detect hierarchical communities in a knowledge graph.
    ///
    /// Level 0 partitions the entities; each higher level partitions the
    /// communities of the level below. A level is only emitted if it merged
    /// something. Summaries and embeddings are left empty for the indexer.
    pub fn detect_communities(&self, entities: &[Entity], relations: &[Relation]) -> Vec<Community> {
        if entities.is_empty() {
            return Vec::new();
        }

        let mut ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut graph: UnGraph<(), f64> = UnGraph::with_capacity(ids.len(), relations.len());
        for _ in &ids {
            graph.add_node(());
        }
        for rel in relations {
            if let (Some(&s), Some(&t)) = (
                index.get(rel.source_id.as_str()),
                index.get(rel.target_id.as_str()),
            ) && s != t
            {
                graph.add_edge(
                    NodeIndex::new(s),
                    NodeIndex::new(t),
                    f64::from(rel.effective_weight()),
                );
            }
        }

        // Members (as entity indices) of each community at the current level.
        let mut members: Vec<Vec<usize>> = (0..ids.len()).map(|i| vec![i]).collect();
        // Edge weight collapsed inside each node by aggregation.
        let mut internal: Vec<f64> = vec![0.0; ids.len()];
        let mut result = Vec::new();

        for level in 0..self.config.levels.max(1) {
            let assignment = self.partition(&graph, &internal);
            let group_count = assignment.iter().copied().max().map_or(0, |m| m + 1);
            if level > 0 && group_count >= graph.node_count() {
                break;
            }

            let mut grouped: Vec<Vec<usize>> = vec![Vec::new(); group_count];
            for (node, &group) in assignment.iter().enumerate() {
                grouped[group].extend(members[node].iter().copied());
            }
            for group in &mut grouped {
                group.sort_unstable();
            }

            for (i, group) in grouped.iter().enumerate() {
                result.push(Community {
                    id: format!("c{level}-{i}"),
                    level,
                    entity_ids: group.iter().map(|&e| ids[e].to_string()).collect(),
                    summary: String::new(),
                    embedding: Vec::new(),
                });
            }

            (graph, internal) = aggregate(&graph, &internal, &assignment, group_count);
            members = grouped;
        }

        tracing::info!(
            communities = result.len(),
            entities = ids.len(),
            "Leiden community detection complete"
        );
        result
    }

    /// Assign each node a community label in `0..n`, labels ordered by first member.
    ///
    /// `internal[i]` is the weight already inside node `i`; it counts twice
    /// towards the node's degree, as an ordinary edge would.
    fn partition(&self, graph: &UnGraph<(), f64>, internal: &[f64]) -> Vec<usize> {
        let n = graph.node_count();
        let mut community: Vec<usize> = (0..n).collect();

        let degree: Vec<f64> = graph
            .node_indices()
            .map(|node| {
                graph.edges(node).map(|e| *e.weight()).sum::<f64>() + 2.0 * internal[node.index()]
            })
            .collect();
        let two_m: f64 = degree.iter().sum();
        if two_m == 0.0 {
            return community;
        }
        let mut total: Vec<f64> = degree.clone();

        for _ in 0..self.config.max_iterations {
            let mut moved = false;
            for node in graph.node_indices() {
                let i = node.index();
                let current = community[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for edge in graph.edges(node) {
                    let other = if edge.source() == node {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    if other != node {
                        *links.entry(community[other.index()]).or_default() += *edge.weight();
                    }
                }

                total[current] -= degree[i];
                let gain = |c: usize, k_in: f64| {
                    k_in - self.config.resolution * total[c] * degree[i] / two_m
                };
                let stay = gain(current, links.get(&current).copied().unwrap_or(0.0));

                let mut best = current;
                let mut best_gain = stay;
                for (&c, &k_in) in &links {
                    let g = gain(c, k_in);
                    if g > best_gain + self.config.min_improvement {
                        best = c;
                        best_gain = g;
                    }
                }

                total[best] += degree[i];
                if best != current {
                    community[i] = best;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }

        refine(graph, &community)
    }
}

/// Split every community into connected components and relabel densely.
fn refine(graph: &UnGraph<(), f64>, community: &[usize]) -> Vec<usize> {
    let n = community.len();
    let mut label = vec![usize::MAX; n];
    let mut next = 0;

    for start in 0..n {
        if label[start] != usize::MAX {
            continue;
        }
        label[start] = next;
        let mut queue = VecDeque::from([NodeIndex::new(start)]);
        while let Some(node) = queue.pop_front() {
            for other in graph.neighbors(node) {
                let j = other.index();
                if label[j] == usize::MAX && community[j] == community[start] {
                    label[j] = next;
                    queue.push_back(other);
                }
            }
        }
        next += 1;
    }
    label
}

/// Collapse each community into one node.
///
/// Weights between communities become edges; weights inside a community
/// are kept as that node's internal weight.
fn aggregate(
    graph: &UnGraph<(), f64>,
    internal: &[f64],
    assignment: &[usize],
    groups: usize,
) -> (UnGraph<(), f64>, Vec<f64>) {
    let mut collapsed = vec![0.0; groups];
    for (node, &group) in assignment.iter().enumerate() {
        collapsed[group] += internal[node];
    }

    let mut weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for edge in graph.edge_references() {
        let a = assignment[edge.source().index()];
        let b = assignment[edge.target().index()];
        if a == b {
            collapsed[a] += *edge.weight();
        } else {
            *weights.entry((a.min(b), a.max(b))).or_default() += *edge.weight();
        }
    }

    let mut out = UnGraph::with_capacity(groups, weights.len());
    for _ in 0..groups {
        out.add_node(());
    }
    for ((a, b), w) in weights {
        out.add_edge(NodeIndex::new(a), NodeIndex::new(b), w);
    }
    (out, collapsed)
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
            entity_type: EntityType::Concept,
            description: String::new(),
            provenance: Vec::new(),
            embedding: Vec::new(),
        }
    }

    fn relation(s: &str, t: &str) -> Relation {
        Relation {
            source_id: s.to_string(),
            target_id: t.to_string(),
            relation_type: "related_to".to_string(),
            weight: None,
            description: String::new(),
            provenance: Vec::new(),
        }
    }

    #[test]
    fn test_empty_graph() {
        let detector = LeidenCommunityDetector::default();
        assert!(detector.detect_communities(&[], &[]).is_empty());
    }

    #[test]
    fn test_single_entity() {
        let detector = LeidenCommunityDetector::default();
        let result = detector.detect_communities(&[entity("e1")], &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].level, 0);
        assert_eq!(result[0].entity_ids, vec!["e1"]);
    }

    #[test]
    fn test_two_cliques_separate() {
        let entities: Vec<Entity> = ["a1", "a2", "a3", "b1", "b2", "b3"]
            .iter()
            .map(|id| entity(id))
            .collect();
        let relations = vec![
            relation("a1", "a2"),
            relation("a2", "a3"),
            relation("a1", "a3"),
            relation("b1", "b2"),
            relation("b2", "b3"),
            relation("b1", "b3"),
            relation("a3", "b1"),
        ];

        let detector = LeidenCommunityDetector::with_config(LeidenConfig {
            levels: 1,
            ..LeidenConfig::default()
        });
        let result = detector.detect_communities(&entities, &relations);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].entity_ids, vec!["a1", "a2", "a3"]);
        assert_eq!(result[1].entity_ids, vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_communities_are_connected() {
        let entities: Vec<Entity> = ["x", "y", "z"].iter().map(|id| entity(id)).collect();
        let relations = vec![relation("x", "y")];
        let detector = LeidenCommunityDetector::default();
        let level0: Vec<Community> = detector
            .detect_communities(&entities, &relations)
            .into_iter()
            .filter(|c| c.level == 0)
            .collect();
        assert_eq!(level0.len(), 2);
        assert_eq!(level0[0].entity_ids, vec!["x", "y"]);
        assert_eq!(level0[1].entity_ids, vec!["z"]);
    }

    fn clique(prefix: &str, size: usize) -> (Vec<Entity>, Vec<Relation>) {
        let ids: Vec<String> = (0..size).map(|i| format!("{prefix}{i}")).collect();
        let entities = ids.iter().map(|id| entity(id)).collect();
        let mut relations = Vec::new();
        for (i, s) in ids.iter().enumerate() {
            for t in &ids[i + 1..] {
                relations.push(relation(s, t));
            }
        }
        (entities, relations)
    }

    #[test]
    fn test_weakly_joined_cliques_stay_apart_at_higher_levels() {
        let (mut entities, mut relations) = clique("a", 5);
        let (b_entities, b_relations) = clique("b", 5);
        entities.extend(b_entities);
        relations.extend(b_relations);
        relations.push(relation("a4", "b0"));

        let detector = LeidenCommunityDetector::with_config(LeidenConfig {
            levels: 3,
            ..LeidenConfig::default()
        });
        let result = detector.detect_communities(&entities, &relations);

        let level0: Vec<&Community> = result.iter().filter(|c| c.level == 0).collect();
        assert_eq!(level0.len(), 2);
        for community in &result {
            let has_a = community.entity_ids.iter().any(|id| id.starts_with('a'));
            let has_b = community.entity_ids.iter().any(|id| id.starts_with('b'));
            assert!(
                !(has_a && has_b),
                "level {} merged both cliques: {:?}",
                community.level,
                community.entity_ids
            );
        }
    }

    #[test]
    fn test_aggregate_keeps_internal_weight() {
        let mut graph: UnGraph<(), f64> = UnGraph::new_undirected();
        let nodes: Vec<NodeIndex> = (0..4).map(|_| graph.add_node(())).collect();
        graph.add_edge(nodes[0], nodes[1], 1.0);
        graph.add_edge(nodes[2], nodes[3], 2.0);
        graph.add_edge(nodes[1], nodes[2], 0.5);

        let (out, internal) = aggregate(&graph, &[0.0, 0.25, 0.0, 0.0], &[0, 0, 1, 1], 2);
        assert_eq!(out.node_count(), 2);
        assert_eq!(out.edge_count(), 1);
        assert!((internal[0] - 1.25).abs() < 1e-12);
        assert!((internal[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let entities: Vec<Entity> = ["a", "b", "c", "d"].iter().map(|id| entity(id)).collect();
        let relations = vec![relation("a", "b"), relation("c", "d"), relation("b", "c")];
        let detector = LeidenCommunityDetector::default();
        let first = detector.detect_communities(&entities, &relations);
        let second = detector.detect_communities(&entities, &relations);
        assert_eq!(first, second);
    }
}
