use std::collections::HashMap;

use graphrag_primitives::tables::{EntityRow, RelationshipRow};
use petgraph::{
    graph::{NodeIndex, UnGraph},
    visit::EdgeRef,
};
use serde::{Deserialize, Serialize};

pub mod clustering;
pub mod embedding;
pub mod utils;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: Option<String>,
    pub description: Option<String>,
    pub text_unit_ids: Vec<String>,
}

impl GraphNode {
    pub fn new(id: &str) -> Self {
        GraphNode {
            id: id.to_string(),
            ..Default::default()
        }
    }
}

/// Serializable view of a graph in its iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<(String, String, f64)>,
}

/// Undirected weighted entity graph. Nodes are addressed by their string id
/// and stored in a petgraph arena; parallel edges are merged by summing
/// weights and self loops are dropped.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: UnGraph<GraphNode, f64>,
    index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(entities: &[EntityRow], relationships: &[RelationshipRow]) -> Self {
        let mut graph = KnowledgeGraph::new();

        for entity in entities {
            graph.upsert_node(GraphNode {
                id: entity.name.clone(),
                node_type: entity.entity_type.clone(),
                description: entity.description.clone(),
                text_unit_ids: entity.text_unit_ids.clone(),
            });
        }

        for relationship in relationships {
            graph.add_edge(
                &relationship.source,
                &relationship.target,
                relationship.weight.unwrap_or(1.0),
            );
        }

        graph
    }

    /// Returns the index of `id`, inserting a bare node if it is missing.
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(index) = self.index.get(id) {
            return *index;
        }
        let index = self.graph.add_node(GraphNode::new(id));
        self.index.insert(id.to_string(), index);
        index
    }

    /// Inserts a node or merges its attributes into the existing one. Existing
    /// type and description win; text unit ids are unioned in order.
    pub fn upsert_node(&mut self, node: GraphNode) -> NodeIndex {
        let index = self.add_node(&node.id);
        let existing = &mut self.graph[index];

        if existing.node_type.is_none() {
            existing.node_type = node.node_type;
        }
        if existing.description.is_none() {
            existing.description = node.description;
        }
        for text_unit_id in node.text_unit_ids {
            if !existing.text_unit_ids.contains(&text_unit_id) {
                existing.text_unit_ids.push(text_unit_id);
            }
        }

        index
    }

    /// Adds an undirected edge, summing into an existing edge between the same
    /// pair. Returns false for self loops, which are not stored.
    pub fn add_edge(&mut self, source: &str, target: &str, weight: f64) -> bool {
        if source == target {
            return false;
        }

        let source = self.add_node(source);
        let target = self.add_node(target);
        match self.graph.find_edge(source, target) {
            Some(edge) => {
                if let Some(existing) = self.graph.edge_weight_mut(edge) {
                    *existing += weight;
                }
            }
            None => {
                self.graph.add_edge(source, target, weight);
            }
        }
        true
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|index| &self.graph[*index])
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(move |index| &self.graph[index])
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes().map(|node| node.id.clone()).collect()
    }

    /// Edges in insertion order as (source, target, weight).
    pub fn edges(&self) -> Vec<(String, String, f64)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].id.clone(),
                    self.graph[edge.target()].id.clone(),
                    *edge.weight(),
                )
            })
            .collect()
    }

    /// Number of distinct neighbours.
    pub fn degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|index| self.graph.edges(*index).count())
            .unwrap_or(0)
    }

    /// Neighbours of `id` with edge weights, sorted by neighbour id.
    pub fn neighbors(&self, id: &str) -> Vec<(String, f64)> {
        let Some(index) = self.index.get(id) else {
            return Vec::new();
        };

        let mut neighbors: Vec<(String, f64)> = self
            .graph
            .edges(*index)
            .map(|edge| {
                let other = if edge.source() == *index {
                    edge.target()
                } else {
                    edge.source()
                };
                (self.graph[other].id.clone(), *edge.weight())
            })
            .collect();
        neighbors.sort_by(|a, b| a.0.cmp(&b.0));
        neighbors
    }

    /// Induced subgraph over `ids`. Nodes keep the order of `ids`, edges keep
    /// this graph's edge order.
    pub fn subgraph(&self, ids: &[String]) -> KnowledgeGraph {
        let mut subgraph = KnowledgeGraph::new();
        for id in ids {
            if let Some(node) = self.node(id) {
                subgraph.upsert_node(node.clone());
            }
        }

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()].id;
            let target = &self.graph[edge.target()].id;
            if subgraph.contains_node(source) && subgraph.contains_node(target) {
                subgraph.add_edge(source, target, *edge.weight());
            }
        }

        subgraph
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges(),
        }
    }

    pub(crate) fn inner(&self) -> &UnGraph<GraphNode, f64> {
        &self.graph
    }
}
