pub mod context_builder;
pub mod indexer_adapters;
pub mod input;
pub mod search;
pub mod vector_stores;
