pub mod community;
pub mod community_report;
pub mod covariate;
pub mod entity;
pub mod relationship;
pub mod text_unit;

pub use community::{CommunityAssignment, CommunityHierarchy, CommunityNode};
pub use community_report::CommunityReport;
pub use covariate::Covariate;
pub use entity::Entity;
pub use relationship::Relationship;
pub use text_unit::TextUnit;
