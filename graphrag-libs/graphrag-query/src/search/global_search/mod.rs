pub mod callbacks;
pub mod prompts;
pub mod search;
