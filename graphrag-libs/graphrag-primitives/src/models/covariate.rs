use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A claim (or other covariate) attached to a subject entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariate {
    pub id: String,
    pub short_id: Option<String>,
    pub subject_id: String,
    pub subject_type: Option<String>,
    pub covariate_type: Option<String>,
    pub text_unit_ids: Option<Vec<String>>,
    pub document_ids: Option<Vec<String>>,
    pub attributes: Option<HashMap<String, String>>,
}

impl Covariate {
    pub fn new(id: &str, subject_id: &str) -> Self {
        Covariate {
            id: id.to_string(),
            short_id: None,
            subject_id: subject_id.to_string(),
            subject_type: Some("entity".to_string()),
            covariate_type: Some("claim".to_string()),
            text_unit_ids: None,
            document_ids: None,
            attributes: None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .as_ref()
            .and_then(|attributes| attributes.get(key))
            .map(|value| value.as_str())
    }
}
