use std::collections::VecDeque;

use graphrag_primitives::{
    models::CommunityHierarchy,
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::louvain::louvain_partition;
use crate::graph::{
    utils::{stabilize_graph, stable_largest_connected_component},
    KnowledgeGraph,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGraphConfig {
    pub max_cluster_size: usize,
    pub seed: u64,
    pub use_lcc: bool,
    pub resolution: f64,
    pub max_passes: usize,
}

impl Default for ClusterGraphConfig {
    fn default() -> Self {
        ClusterGraphConfig {
            max_cluster_size: 10,
            seed: 0xDEADBEEF,
            use_lcc: false,
            resolution: 1.0,
            max_passes: 100,
        }
    }
}

/// Builds the community hierarchy of `graph`.
///
/// Level 0 is the Louvain partition of the whole graph. Any community larger
/// than `max_cluster_size` is re-clustered on its induced subgraph and its
/// parts become communities one level deeper. A community whose subgraph does
/// not split further stays a leaf. Communities are numbered breadth first, so
/// ids grow with level.
#[instrument(skip_all, fields(nodes = graph.node_count(), edges = graph.edge_count()))]
pub fn cluster_graph(graph: &KnowledgeGraph, config: &ClusterGraphConfig) -> CommunityHierarchy {
    let graph = if config.use_lcc {
        stable_largest_connected_component(graph)
    } else {
        stabilize_graph(graph)
    };

    let mut hierarchy = CommunityHierarchy::new();
    if graph.is_empty() {
        return hierarchy;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut pending: VecDeque<u32> = VecDeque::new();

    for members in louvain_partition(&graph, config.resolution, config.max_passes, &mut rng) {
        pending.push_back(hierarchy.push(0, None, members));
    }

    while let Some(community_id) = pending.pop_front() {
        let Some(community) = hierarchy.community(community_id) else {
            continue;
        };
        if community.members.len() <= config.max_cluster_size {
            continue;
        }

        let level = community.level;
        let subgraph = stabilize_graph(&graph.subgraph(&community.members));
        let parts = louvain_partition(&subgraph, config.resolution, config.max_passes, &mut rng);
        if parts.len() <= 1 {
            graphrag_log(
                GraphRagLogOption::Clustering,
                GraphRagLogLevel::Debug,
                &format!(
                    "Community {} with {} members cannot be split further",
                    community_id,
                    subgraph.node_count()
                ),
            );
            continue;
        }

        for members in parts {
            pending.push_back(hierarchy.push(level + 1, Some(community_id), members));
        }
    }

    graphrag_log(
        GraphRagLogOption::Clustering,
        GraphRagLogLevel::Info,
        &format!(
            "Clustered {} nodes into {} communities over {} levels",
            graph.node_count(),
            hierarchy.communities.len(),
            hierarchy.levels().len()
        ),
    );

    hierarchy
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use proptest::prelude::*;

    use super::*;

    fn clique(graph: &mut KnowledgeGraph, prefix: &str, size: usize, weight: f64) {
        for i in 0..size {
            for j in (i + 1)..size {
                graph.add_edge(&format!("{}{}", prefix, i), &format!("{}{}", prefix, j), weight);
            }
        }
    }

    fn ring_of_cliques() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for prefix in ["A", "B", "C", "D"] {
            clique(&mut graph, prefix, 4, 5.0);
        }
        graph.add_edge("A0", "B0", 1.0);
        graph.add_edge("B1", "C1", 1.0);
        graph.add_edge("C2", "D2", 1.0);
        graph.add_edge("D3", "A3", 1.0);
        graph
    }

    /// Every child is a subset of its parent, levels are contiguous and each
    /// node appears at most once per level.
    fn assert_valid_hierarchy(hierarchy: &CommunityHierarchy) {
        for community in &hierarchy.communities {
            if let Some(parent_id) = community.parent {
                let parent = hierarchy.community(parent_id).unwrap();
                assert_eq!(parent.level + 1, community.level);
                assert!(community.members.iter().all(|m| parent.members.binary_search(m).is_ok()));
            } else {
                assert_eq!(community.level, 0);
            }
        }

        let mut seen: HashMap<(u32, String), u32> = HashMap::new();
        for assignment in hierarchy.assignments() {
            assert!(seen.insert((assignment.level, assignment.node.clone()), assignment.community).is_none());
        }
    }

    #[test]
    fn test_small_graph_is_a_single_level() {
        let hierarchy = cluster_graph(&ring_of_cliques(), &ClusterGraphConfig::default());

        assert_valid_hierarchy(&hierarchy);
        assert_eq!(hierarchy.levels(), vec![0]);
        let covered: usize = hierarchy.communities.iter().map(|c| c.members.len()).sum();
        assert_eq!(covered, 16);
    }

    /// Two loosely bridged groups, each made of two tightly linked cliques.
    fn nested_groups() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for prefix in ["A", "B", "C", "D"] {
            clique(&mut graph, prefix, 4, 5.0);
        }
        for i in 0..4 {
            graph.add_edge(&format!("A{}", i), &format!("B{}", i), 7.5);
            graph.add_edge(&format!("C{}", i), &format!("D{}", i), 7.5);
        }
        graph.add_edge("A0", "C0", 1.0);
        graph
    }

    #[test]
    fn test_oversized_communities_are_split_recursively() {
        let config = ClusterGraphConfig {
            max_cluster_size: 4,
            ..Default::default()
        };
        let hierarchy = cluster_graph(&nested_groups(), &config);

        assert_valid_hierarchy(&hierarchy);
        assert!(hierarchy.max_level().unwrap() >= 1);
        for community in hierarchy.communities_at_level(0) {
            if community.members.len() > 4 {
                assert!(!community.children.is_empty());
            }
        }
    }

    #[test]
    fn test_same_seed_same_hierarchy() {
        let config = ClusterGraphConfig {
            max_cluster_size: 3,
            ..Default::default()
        };
        assert_eq!(
            cluster_graph(&ring_of_cliques(), &config),
            cluster_graph(&ring_of_cliques(), &config)
        );
    }

    #[test]
    fn test_disconnected_graph_clusters_every_component() {
        let mut graph = ring_of_cliques();
        graph.add_edge("X", "Y", 1.0);
        graph.add_node("Z");
        let hierarchy = cluster_graph(&graph, &ClusterGraphConfig::default());
        assert_valid_hierarchy(&hierarchy);
        assert_eq!(hierarchy.node_communities("Z").len(), 1);
        assert_eq!(hierarchy.node_communities("X"), hierarchy.node_communities("Y"));

        let with_lcc = cluster_graph(
            &graph,
            &ClusterGraphConfig {
                use_lcc: true,
                ..Default::default()
            },
        );
        assert!(with_lcc.node_communities("Z").is_empty());
    }

    #[test]
    fn test_empty_graph_has_no_communities() {
        assert!(cluster_graph(&KnowledgeGraph::new(), &ClusterGraphConfig::default()).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_hierarchy_is_valid(
            edges in proptest::collection::vec((0u8..14, 0u8..14, 1u8..4), 1..40),
            seed in any::<u64>(),
            max_cluster_size in 1usize..6,
        ) {
            let mut graph = KnowledgeGraph::new();
            for (source, target, weight) in &edges {
                graph.add_edge(&format!("N{}", source), &format!("N{}", target), *weight as f64);
            }
            let config = ClusterGraphConfig {
                max_cluster_size,
                seed,
                use_lcc: false,
                ..Default::default()
            };

            let hierarchy = cluster_graph(&graph, &config);
            assert_valid_hierarchy(&hierarchy);

            let level_zero: BTreeSet<String> = hierarchy
                .communities_at_level(0)
                .flat_map(|c| c.members.iter().cloned())
                .collect();
            prop_assert_eq!(level_zero.len(), graph.node_count());
            prop_assert_eq!(cluster_graph(&graph, &config), hierarchy);
        }
    }
}
