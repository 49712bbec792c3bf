use std::collections::{BTreeMap, HashMap};

use rand::{rngs::StdRng, seq::SliceRandom};

use crate::graph::{utils::connected_components, KnowledgeGraph};

const MIN_GAIN: f64 = 1e-12;

/// Weighted graph over dense indices, as seen by one Louvain pass. Aggregated
/// nodes carry their internal weight as a self loop.
struct LevelGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl LevelGraph {
    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    fn strength(&self, node: usize) -> f64 {
        self.adjacency[node].iter().map(|(_, weight)| weight).sum::<f64>() + 2.0 * self.self_loops[node]
    }

    /// Collapses each community into a single node.
    fn aggregate(&self, community: &[usize], community_count: usize) -> LevelGraph {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); community_count];
        let mut self_loops = vec![0.0; community_count];

        for node in 0..self.node_count() {
            let from = community[node];
            self_loops[from] += self.self_loops[node];
            for (neighbor, weight) in &self.adjacency[node] {
                let to = community[*neighbor];
                if from == to {
                    // Each internal edge is seen from both endpoints.
                    self_loops[from] += weight / 2.0;
                } else {
                    *links[from].entry(to).or_insert(0.0) += weight;
                }
            }
        }

        LevelGraph {
            adjacency: links.into_iter().map(|l| l.into_iter().collect()).collect(),
            self_loops,
        }
    }
}

/// Moves nodes between neighbouring communities while modularity improves.
/// Returns dense community labels and whether any node moved.
fn local_moving(graph: &LevelGraph, resolution: f64, max_sweeps: usize, rng: &mut StdRng) -> (Vec<usize>, bool) {
    let node_count = graph.node_count();
    let strengths: Vec<f64> = (0..node_count).map(|node| graph.strength(node)).collect();
    let total_weight: f64 = strengths.iter().sum();
    let mut community: Vec<usize> = (0..node_count).collect();

    if total_weight <= 0.0 {
        return (community, false);
    }

    let mut totals = strengths.clone();
    let mut order: Vec<usize> = (0..node_count).collect();
    order.shuffle(rng);

    let mut improved = false;
    for _ in 0..max_sweeps.max(1) {
        let mut moved = false;

        for &node in &order {
            let current = community[node];
            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (neighbor, weight) in &graph.adjacency[node] {
                *links.entry(community[*neighbor]).or_insert(0.0) += weight;
            }

            totals[current] -= strengths[node];
            let gain = |community_id: usize, weight: f64| {
                weight - resolution * totals[community_id] * strengths[node] / total_weight
            };

            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (candidate, weight) in &links {
                let candidate_gain = gain(*candidate, *weight);
                if candidate_gain > best_gain + MIN_GAIN {
                    best = *candidate;
                    best_gain = candidate_gain;
                }
            }

            totals[best] += strengths[node];
            if best != current {
                community[node] = best;
                moved = true;
                improved = true;
            }
        }

        if !moved {
            break;
        }
    }

    (renumber(&community), improved)
}

/// Relabels communities to 0..k in order of first appearance.
fn renumber(community: &[usize]) -> Vec<usize> {
    let mut labels: HashMap<usize, usize> = HashMap::new();
    community
        .iter()
        .map(|c| {
            let next = labels.len();
            *labels.entry(*c).or_insert(next)
        })
        .collect()
}

fn louvain_component(graph: &KnowledgeGraph, members: &[String], resolution: f64, max_passes: usize, rng: &mut StdRng) -> Vec<Vec<String>> {
    let position: HashMap<&str, usize> = members.iter().enumerate().map(|(i, m)| (m.as_str(), i)).collect();
    let mut level = LevelGraph {
        adjacency: members
            .iter()
            .map(|member| {
                graph
                    .neighbors(member)
                    .into_iter()
                    .filter_map(|(neighbor, weight)| position.get(neighbor.as_str()).map(|i| (*i, weight)))
                    .collect()
            })
            .collect(),
        self_loops: vec![0.0; members.len()],
    };

    // Community of every original member.
    let mut membership: Vec<usize> = (0..members.len()).collect();

    for _ in 0..max_passes.max(1) {
        let (community, improved) = local_moving(&level, resolution, max_passes, rng);
        if !improved {
            break;
        }

        let community_count = community.iter().max().map(|c| c + 1).unwrap_or(0);
        for assigned in membership.iter_mut() {
            *assigned = community[*assigned];
        }
        if community_count == level.node_count() {
            break;
        }
        level = level.aggregate(&community, community_count);
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (index, community) in membership.into_iter().enumerate() {
        groups.entry(community).or_default().push(members[index].clone());
    }
    groups.into_values().collect()
}

/// Partitions `graph` into communities by Louvain modularity optimisation,
/// one connected component at a time. Members are sorted and communities are
/// ordered by their smallest member.
pub fn louvain_partition(graph: &KnowledgeGraph, resolution: f64, max_passes: usize, rng: &mut StdRng) -> Vec<Vec<String>> {
    let mut communities = Vec::new();

    for component in connected_components(graph) {
        if component.len() == 1 {
            communities.push(component);
            continue;
        }
        communities.extend(louvain_component(graph, &component, resolution, max_passes, rng));
    }

    for members in communities.iter_mut() {
        members.sort();
    }
    communities.sort();
    communities
}
