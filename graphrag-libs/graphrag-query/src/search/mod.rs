pub mod base;
pub mod global_search;
pub mod local_search;
