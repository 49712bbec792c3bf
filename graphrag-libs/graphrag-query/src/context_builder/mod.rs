pub mod community_context;
pub mod entity_extraction;
pub mod local_context;
pub mod source_context;
