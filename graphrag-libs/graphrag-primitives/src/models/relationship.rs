use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub short_id: Option<String>,
    pub source: String,
    pub target: String,
    pub description: Option<String>,
    pub description_embedding: Option<Vec<f32>>,
    pub weight: Option<f64>,
    /// Combined rank derived from the ranks of both endpoint entities.
    pub rank: Option<i32>,
    pub text_unit_ids: Option<Vec<String>>,
    pub document_ids: Option<Vec<String>>,
    pub attributes: Option<HashMap<String, String>>,
}

impl Relationship {
    pub fn new(id: &str, source: &str, target: &str) -> Self {
        Relationship {
            id: id.to_string(),
            short_id: None,
            source: source.to_string(),
            target: target.to_string(),
            description: None,
            description_embedding: None,
            weight: None,
            rank: None,
            text_unit_ids: None,
            document_ids: None,
            attributes: None,
        }
    }
}
