use std::collections::HashMap;

use graphrag_primitives::{
    models::{CommunityHierarchy, CommunityNode},
    tables::CommunityReportRow,
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use tracing::instrument;

use super::{
    context::{build_hierarchical_context, ReportInputs},
    extractor::{CommunityReportContent, CommunityReportsExtractor, ReportStatus},
};

#[derive(Debug, Clone, PartialEq)]
pub struct IncompleteCommunityReport {
    pub community: u32,
    pub level: u32,
    pub reason: String,
    pub partial: Option<CommunityReportContent>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityReportsOutput {
    /// Complete reports ordered by level, then community.
    pub reports: Vec<CommunityReportRow>,
    pub incomplete: Vec<IncompleteCommunityReport>,
}

fn report_row(community: &CommunityNode, report: &CommunityReportContent) -> CommunityReportRow {
    CommunityReportRow {
        community_id: community.id.to_string(),
        title: report.title.clone(),
        summary: report.summary.clone(),
        full_content: report.to_markdown(),
        rank: Some(report.rating),
        rank_explanation: Some(report.rating_explanation.clone()),
        level: community.level,
    }
}

/// Summarises every community, finest level first so that coarser
/// communities can reuse the reports of their sub-communities.
#[instrument(skip_all, fields(communities = hierarchy.communities.len()))]
pub async fn generate_community_reports(
    extractor: &CommunityReportsExtractor,
    hierarchy: &CommunityHierarchy,
    inputs: &ReportInputs<'_>,
) -> CommunityReportsOutput {
    let max_input_length = extractor.config().max_input_length;
    let mut generated: HashMap<u32, CommunityReportContent> = HashMap::new();
    let mut rows: Vec<(u32, u32, CommunityReportRow)> = Vec::new();
    let mut incomplete = Vec::new();

    for level in hierarchy.levels().into_iter().rev() {
        for community in hierarchy.communities_at_level(level) {
            let context = build_hierarchical_context(inputs, hierarchy, community, &generated, max_input_length);
            let result = extractor.extract(&context.text).await;

            match result.status {
                ReportStatus::Complete => {
                    if let Some(report) = result.report {
                        rows.push((community.level, community.id, report_row(community, &report)));
                        generated.insert(community.id, report);
                    }
                }
                ReportStatus::Incomplete { reason } => {
                    graphrag_log(
                        GraphRagLogOption::Reports,
                        GraphRagLogLevel::Error,
                        &format!("No report for community {} at level {}: {}", community.id, level, reason),
                    );
                    incomplete.push(IncompleteCommunityReport {
                        community: community.id,
                        level,
                        reason,
                        partial: result.report,
                    });
                }
            }
        }
    }

    rows.sort_by_key(|(level, id, _)| (*level, *id));
    incomplete.sort_by_key(|report| (report.level, report.community));

    graphrag_log(
        GraphRagLogOption::Reports,
        GraphRagLogLevel::Info,
        &format!("Generated {} community reports, {} incomplete", rows.len(), incomplete.len()),
    );

    CommunityReportsOutput {
        reports: rows.into_iter().map(|(_, _, row)| row).collect(),
        incomplete,
    }
}
