pub mod extractors;
pub mod flows;
pub mod graph;
