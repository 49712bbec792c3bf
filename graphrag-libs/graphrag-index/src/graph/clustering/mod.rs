mod hierarchical;
mod louvain;

pub use hierarchical::{cluster_graph, ClusterGraphConfig};
pub use louvain::louvain_partition;
