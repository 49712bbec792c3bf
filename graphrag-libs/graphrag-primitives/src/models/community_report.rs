use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,
    pub short_id: Option<String>,
    pub title: String,
    pub community_id: String,
    pub summary: String,
    pub full_content: String,
    pub rank: Option<f64>,
    pub level: Option<u32>,
    pub summary_embedding: Option<Vec<f32>>,
    pub full_content_embedding: Option<Vec<f32>>,
    pub attributes: Option<HashMap<String, String>>,
}

impl CommunityReport {
    pub fn new(community_id: &str, title: &str, summary: &str, full_content: &str) -> Self {
        CommunityReport {
            id: community_id.to_string(),
            short_id: Some(community_id.to_string()),
            title: title.to_string(),
            community_id: community_id.to_string(),
            summary: summary.to_string(),
            full_content: full_content.to_string(),
            rank: None,
            level: None,
            summary_embedding: None,
            full_content_embedding: None,
            attributes: None,
        }
    }
}
