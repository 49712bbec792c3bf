pub mod errors;
pub mod llm;
pub mod models;
pub mod tables;
pub mod utils;
