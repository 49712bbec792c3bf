mod normalize_node_names;
mod stable_lcc;

pub use normalize_node_names::{normalize_node_name, normalize_node_names};
pub(crate) use stable_lcc::connected_components;
pub use stable_lcc::{stabilize_graph, stable_largest_connected_component};
