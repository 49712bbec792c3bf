use graphrag_primitives::{models::CommunityHierarchy, tables::NodeRow};

use crate::graph::KnowledgeGraph;

/// One `nodes` row per (node, level) of the hierarchy, ordered by level then
/// title. Graph nodes that were left out of clustering get a single level 0
/// row without a community.
pub fn create_final_nodes(graph: &KnowledgeGraph, hierarchy: &CommunityHierarchy) -> Vec<NodeRow> {
    let row = |title: &str, level: u32, community: Option<i64>| NodeRow {
        title: title.to_string(),
        node_type: graph.node(title).and_then(|node| node.node_type.clone()),
        level,
        degree: graph.degree(title) as i32,
        community,
    };

    let assignments = hierarchy.assignments();
    let mut rows: Vec<NodeRow> = assignments
        .iter()
        .map(|assignment| row(&assignment.node, assignment.level, Some(assignment.community as i64)))
        .collect();

    for node in graph.nodes() {
        if !assignments.iter().any(|a| a.level == 0 && a.node == node.id) {
            rows.push(row(&node.id, 0, None));
        }
    }

    rows.sort_by(|a, b| (a.level, &a.title).cmp(&(b.level, &b.title)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_node_and_level() {
        let mut graph = KnowledgeGraph::new();
        graph.add_edge("A", "B", 1.0);
        graph.add_edge("B", "C", 1.0);
        graph.add_node("D");

        let mut hierarchy = CommunityHierarchy::new();
        let root = hierarchy.push(0, None, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        hierarchy.push(1, Some(root), vec!["A".to_string(), "B".to_string()]);
        hierarchy.push(1, Some(root), vec!["C".to_string()]);

        let rows = create_final_nodes(&graph, &hierarchy);
        let summary: Vec<(u32, &str, Option<i64>, i32)> = rows
            .iter()
            .map(|r| (r.level, r.title.as_str(), r.community, r.degree))
            .collect();

        assert_eq!(
            summary,
            vec![
                (0, "A", Some(0), 1),
                (0, "B", Some(0), 2),
                (0, "C", Some(0), 1),
                (0, "D", None, 0),
                (1, "A", Some(1), 1),
                (1, "B", Some(1), 2),
                (1, "C", Some(2), 1),
            ]
        );
    }
}
