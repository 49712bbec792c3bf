use std::collections::HashMap;

use graphrag_primitives::utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption};
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    seq::SliceRandom,
    Rng, SeedableRng,
};
use serde::{Deserialize, Serialize};

use crate::graph::{
    utils::{stabilize_graph, stable_largest_connected_component},
    KnowledgeGraph,
};

const INITIAL_LEARNING_RATE: f32 = 0.025;
const MIN_LEARNING_RATE: f32 = 0.0001;
const NOISE_EXPONENT: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedGraphConfig {
    pub dimensions: usize,
    pub num_walks: usize,
    pub walk_length: usize,
    pub window_size: usize,
    pub iterations: usize,
    pub random_seed: u64,
    /// Return parameter `p`: likelihood of revisiting the previous node.
    pub return_param: f64,
    /// In-out parameter `q`: inward versus outward exploration.
    pub in_out_param: f64,
    pub negative_samples: usize,
    pub use_lcc: bool,
}

impl Default for EmbedGraphConfig {
    fn default() -> Self {
        EmbedGraphConfig {
            dimensions: 1536,
            num_walks: 10,
            walk_length: 40,
            window_size: 2,
            iterations: 3,
            random_seed: 86,
            return_param: 1.0,
            in_out_param: 1.0,
            negative_samples: 5,
            use_lcc: true,
        }
    }
}

/// Node vectors in canonical (sorted) node order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeEmbeddings {
    pub nodes: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
}

impl NodeEmbeddings {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node: &str) -> Option<&[f32]> {
        self.nodes
            .binary_search_by(|n| n.as_str().cmp(node))
            .ok()
            .map(|index| self.embeddings[index].as_slice())
    }

    pub fn to_map(&self) -> HashMap<String, Vec<f32>> {
        self.nodes.iter().cloned().zip(self.embeddings.iter().cloned()).collect()
    }
}

/// Embeds graph nodes with node2vec: biased random walks followed by
/// skip-gram training with negative sampling.
pub fn embed_graph(graph: &KnowledgeGraph, config: &EmbedGraphConfig) -> NodeEmbeddings {
    let graph = if config.use_lcc {
        stable_largest_connected_component(graph)
    } else {
        stabilize_graph(graph)
    };

    if graph.is_empty() || config.dimensions == 0 {
        return NodeEmbeddings::default();
    }

    let nodes = graph.node_ids();
    let position: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
    let adjacency: Vec<Vec<(usize, f64)>> = nodes
        .iter()
        .map(|node| {
            graph
                .neighbors(node)
                .into_iter()
                .filter_map(|(neighbor, weight)| position.get(neighbor.as_str()).map(|i| (*i, weight)))
                .collect()
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let walks = simulate_walks(&adjacency, config, &mut rng);
    let embeddings = train_skip_gram(nodes.len(), &walks, config, &mut rng);

    graphrag_log(
        GraphRagLogOption::Embedding,
        GraphRagLogLevel::Info,
        &format!("Embedded {} nodes from {} walks", nodes.len(), walks.len()),
    );

    NodeEmbeddings {
        nodes,
        embeddings: embeddings.chunks(config.dimensions).map(|c| c.to_vec()).collect(),
    }
}

fn simulate_walks(adjacency: &[Vec<(usize, f64)>], config: &EmbedGraphConfig, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut walks = Vec::with_capacity(adjacency.len() * config.num_walks);
    let mut starts: Vec<usize> = (0..adjacency.len()).collect();

    for _ in 0..config.num_walks {
        starts.shuffle(rng);
        for &start in &starts {
            walks.push(walk_from(adjacency, start, config, rng));
        }
    }

    walks
}

fn walk_from(adjacency: &[Vec<(usize, f64)>], start: usize, config: &EmbedGraphConfig, rng: &mut StdRng) -> Vec<usize> {
    let mut walk = vec![start];

    while walk.len() < config.walk_length.max(1) {
        let current = walk[walk.len() - 1];
        let neighbors = &adjacency[current];
        if neighbors.is_empty() {
            break;
        }

        let weights: Vec<f64> = match walk.len().checked_sub(2).map(|i| walk[i]) {
            None => neighbors.iter().map(|(_, weight)| *weight).collect(),
            Some(previous) => neighbors
                .iter()
                .map(|(next, weight)| {
                    if *next == previous {
                        weight / config.return_param
                    } else if adjacency[previous].binary_search_by(|(n, _)| n.cmp(next)).is_ok() {
                        *weight
                    } else {
                        weight / config.in_out_param
                    }
                })
                .collect(),
        };

        let choice = match WeightedIndex::new(&weights) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => rng.gen_range(0..neighbors.len()),
        };
        walk.push(neighbors[choice].0);
    }

    walk
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Returns a flat `node_count * dimensions` matrix of input vectors.
fn train_skip_gram(node_count: usize, walks: &[Vec<usize>], config: &EmbedGraphConfig, rng: &mut StdRng) -> Vec<f32> {
    let dimensions = config.dimensions;
    let mut input: Vec<f32> = (0..node_count * dimensions)
        .map(|_| (rng.gen::<f32>() - 0.5) / dimensions as f32)
        .collect();
    let mut output = vec![0.0f32; node_count * dimensions];

    let mut counts = vec![0usize; node_count];
    for walk in walks {
        for &node in walk {
            counts[node] += 1;
        }
    }
    let noise = WeightedIndex::new(counts.iter().map(|c| (*c as f64).powf(NOISE_EXPONENT))).ok();

    let total_steps = (config.iterations * walks.iter().map(|w| w.len()).sum::<usize>()).max(1);
    let mut step = 0usize;
    let mut gradient = vec![0.0f32; dimensions];

    for _ in 0..config.iterations {
        for walk in walks {
            for (position, &center) in walk.iter().enumerate() {
                let progress = step as f32 / total_steps as f32;
                let learning_rate =
                    (INITIAL_LEARNING_RATE - (INITIAL_LEARNING_RATE - MIN_LEARNING_RATE) * progress).max(MIN_LEARNING_RATE);
                step += 1;

                let from = position.saturating_sub(config.window_size);
                let to = (position + config.window_size + 1).min(walk.len());
                for (context_position, &context) in walk.iter().enumerate().take(to).skip(from) {
                    if context_position == position {
                        continue;
                    }

                    gradient.iter_mut().for_each(|g| *g = 0.0);
                    let center_offset = center * dimensions;

                    for sample in 0..=config.negative_samples {
                        let (target, label) = if sample == 0 {
                            (context, 1.0)
                        } else {
                            let target = match &noise {
                                Some(noise) => noise.sample(rng),
                                None => rng.gen_range(0..node_count),
                            };
                            if target == context {
                                continue;
                            }
                            (target, 0.0)
                        };

                        let target_offset = target * dimensions;
                        let dot: f32 = (0..dimensions)
                            .map(|d| input[center_offset + d] * output[target_offset + d])
                            .sum();
                        let g = (label - sigmoid(dot)) * learning_rate;

                        for d in 0..dimensions {
                            gradient[d] += g * output[target_offset + d];
                            output[target_offset + d] += g * input[center_offset + d];
                        }
                    }

                    for d in 0..dimensions {
                        input[center_offset + d] += gradient[d];
                    }
                }
            }
        }
    }

    input
}
