use std::collections::BTreeMap;

use petgraph::{unionfind::UnionFind, visit::EdgeRef};

use super::super::KnowledgeGraph;

/// Connected components as sorted member lists, ordered by their smallest member.
pub(crate) fn connected_components(graph: &KnowledgeGraph) -> Vec<Vec<String>> {
    let inner = graph.inner();
    let mut union_find = UnionFind::<usize>::new(inner.node_count());
    for edge in inner.edge_references() {
        union_find.union(edge.source().index(), edge.target().index());
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for index in inner.node_indices() {
        groups
            .entry(union_find.find(index.index()))
            .or_default()
            .push(inner[index].id.clone());
    }

    let mut components: Vec<Vec<String>> = groups
        .into_values()
        .map(|mut members| {
            members.sort();
            members
        })
        .collect();
    components.sort();
    components
}

/// Copy of `graph` with nodes sorted by id and every edge written as
/// (smaller id, larger id), sorted.
pub fn stabilize_graph(graph: &KnowledgeGraph) -> KnowledgeGraph {
    let mut nodes: Vec<_> = graph.nodes().cloned().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut edges: Vec<(String, String, f64)> = graph
        .edges()
        .into_iter()
        .map(|(source, target, weight)| {
            if source <= target {
                (source, target, weight)
            } else {
                (target, source, weight)
            }
        })
        .collect();
    edges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    let mut stable = KnowledgeGraph::new();
    for node in nodes {
        stable.upsert_node(node);
    }
    for (source, target, weight) in edges {
        stable.add_edge(&source, &target, weight);
    }
    stable
}

/// The connected component with the most nodes, in canonical order. Ties go to
/// the component whose sorted member list is lexicographically smallest.
pub fn stable_largest_connected_component(graph: &KnowledgeGraph) -> KnowledgeGraph {
    let largest = connected_components(graph)
        .into_iter()
        .fold(None::<Vec<String>>, |best, component| match best {
            Some(best) if best.len() >= component.len() => Some(best),
            _ => Some(component),
        });

    match largest {
        Some(members) => stabilize_graph(&graph.subgraph(&members)),
        None => KnowledgeGraph::new(),
    }
}
