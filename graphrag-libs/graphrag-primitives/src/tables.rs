//! Typed rows of the tables persisted by the indexing pipeline and read back by
//! the query engines.

use serde::{Deserialize, Serialize};

/// `entities` table: one row per extracted entity, carrying its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub human_readable_id: Option<String>,
    pub name: String,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub description_embedding: Option<Vec<f32>>,
    pub text_unit_ids: Vec<String>,
}

/// `nodes` table: one row per (node, hierarchy level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub title: String,
    pub node_type: Option<String>,
    pub level: u32,
    pub degree: i32,
    pub community: Option<i64>,
}

/// `relationships` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub id: String,
    pub human_readable_id: Option<String>,
    pub source: String,
    pub target: String,
    pub description: Option<String>,
    pub weight: Option<f64>,
    /// Comma-delimited list of source text unit ids.
    pub text_unit_ids: String,
}

/// `community_reports` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportRow {
    pub community_id: String,
    pub title: String,
    pub summary: String,
    pub full_content: String,
    pub rank: Option<f64>,
    pub rank_explanation: Option<String>,
    pub level: u32,
}

/// `text_units` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnitRow {
    pub id: String,
    pub text: String,
    pub n_tokens: Option<usize>,
    pub document_ids: Vec<String>,
    pub entity_ids: Vec<String>,
    pub relationship_ids: Vec<String>,
    pub covariate_ids: Vec<String>,
}

/// `covariates` table (claims).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateRow {
    pub id: String,
    pub subject_id: Option<String>,
    pub object_id: Option<String>,
    pub covariate_type: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub text_unit_ids: Vec<String>,
}

/// Parses a hierarchy level stored either as `"level_N"` or as a bare integer.
pub fn parse_level(value: &str) -> Option<u32> {
    let value = value.trim();
    value.strip_prefix("level_").unwrap_or(value).parse::<u32>().ok()
}

/// Splits a comma-delimited id list, dropping empty entries.
pub fn split_id_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}
