pub mod loaders;
pub mod retrieval;
