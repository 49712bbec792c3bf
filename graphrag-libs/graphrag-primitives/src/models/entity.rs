use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A node of the knowledge graph as seen by the query engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub short_id: Option<String>,
    pub title: String,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub description_embedding: Option<Vec<f32>>,
    pub name_embedding: Option<Vec<f32>>,
    pub graph_embedding: Option<Vec<f32>>,
    pub community_ids: Option<Vec<String>>,
    pub text_unit_ids: Option<Vec<String>>,
    pub document_ids: Option<Vec<String>>,
    pub rank: Option<i32>,
    pub attributes: Option<HashMap<String, String>>,
}

impl Entity {
    pub fn new(id: &str, title: &str) -> Self {
        Entity {
            id: id.to_string(),
            short_id: None,
            title: title.to_string(),
            entity_type: None,
            description: None,
            description_embedding: None,
            name_embedding: None,
            graph_embedding: None,
            community_ids: None,
            text_unit_ids: None,
            document_ids: None,
            rank: None,
            attributes: None,
        }
    }
}
