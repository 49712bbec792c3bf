mod node2vec;

pub use node2vec::{embed_graph, EmbedGraphConfig, NodeEmbeddings};
