mod context;
mod extractor;
mod generator;
pub mod prompts;

pub use context::{build_community_context, build_hierarchical_context, CommunityContext, ReportInputs};
pub use extractor::{
    CommunityReportContent, CommunityReportResult, CommunityReportsConfig, CommunityReportsExtractor, ExtractionState,
    Finding, ReportStatus,
};
pub use generator::{generate_community_reports, CommunityReportsOutput, IncompleteCommunityReport};
