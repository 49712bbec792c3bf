use std::collections::HashSet;

use graphrag_primitives::models::{CommunityReport, Entity};
use polars::frame::DataFrame;

use super::{attribute_columns, records_to_dataframe};

pub fn get_candidate_communities(
    selected_entities: &[Entity],
    community_reports: &[CommunityReport],
    include_community_rank: bool,
    use_community_summary: bool,
) -> anyhow::Result<DataFrame> {
    let selected_community_ids: HashSet<&str> = selected_entities
        .iter()
        .filter_map(|entity| entity.community_ids.as_ref())
        .flatten()
        .map(|id| id.as_str())
        .collect();

    let selected_reports: Vec<CommunityReport> = community_reports
        .iter()
        .filter(|report| selected_community_ids.contains(report.community_id.as_str()))
        .cloned()
        .collect();

    to_community_report_dataframe(&selected_reports, include_community_rank, use_community_summary)
}

pub fn to_community_report_dataframe(
    reports: &[CommunityReport],
    include_community_rank: bool,
    use_community_summary: bool,
) -> anyhow::Result<DataFrame> {
    if reports.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut header = vec!["id".to_string(), "title".to_string()];
    let attribute_cols = attribute_columns(reports[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());
    header.push(if use_community_summary { "summary" } else { "content" }.to_string());
    if include_community_rank {
        header.push("rank".to_string());
    }

    let records: Vec<Vec<String>> = reports
        .iter()
        .map(|report| {
            let mut record = vec![report.short_id.clone().unwrap_or_default(), report.title.clone()];
            for field in &attribute_cols {
                record.push(
                    report
                        .attributes
                        .as_ref()
                        .and_then(|attrs| attrs.get(field))
                        .cloned()
                        .unwrap_or_default(),
                );
            }
            record.push(if use_community_summary {
                report.summary.clone()
            } else {
                report.full_content.clone()
            });
            if include_community_rank {
                record.push(report.rank.map(|r| r.to_string()).unwrap_or_default());
            }
            record
        })
        .collect();

    records_to_dataframe(&header, &records, &["rank"])
}
