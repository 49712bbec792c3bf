use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub short_id: Option<String>,
    pub text: String,
    pub entity_ids: Option<Vec<String>>,
    pub relationship_ids: Option<Vec<String>>,
    /// Covariate ids keyed by covariate type (e.g. "claims").
    pub covariate_ids: Option<HashMap<String, Vec<String>>>,
    pub n_tokens: Option<usize>,
    pub document_ids: Option<Vec<String>>,
    pub attributes: Option<HashMap<String, String>>,
}

impl TextUnit {
    pub fn new(id: &str, text: &str) -> Self {
        TextUnit {
            id: id.to_string(),
            short_id: None,
            text: text.to_string(),
            entity_ids: None,
            relationship_ids: None,
            covariate_ids: None,
            n_tokens: None,
            document_ids: None,
            attributes: None,
        }
    }
}
