mod create_final_nodes;

pub use create_final_nodes::create_final_nodes;
