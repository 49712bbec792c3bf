use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graphrag_primitives::{
    errors::LLMProviderError,
    llm::base::{BaseLLM, BaseLLMCallback, GlobalSearchPhase, LLMParams, LLMResponse, MessageType},
    tables::{EntityRow, RelationshipRow},
};

/// Answers every request with a valid report and records the prompts it saw.
#[derive(Clone, Default)]
pub struct ReportLLM {
    pub prompts: Arc<Mutex<Vec<String>>>,
    /// Titles containing any of these names get an incomplete answer.
    pub fail_for: Vec<String>,
}

#[async_trait]
impl BaseLLM for ReportLLM {
    async fn agenerate(
        &self,
        messages: MessageType,
        _streaming: bool,
        _callbacks: Option<Vec<BaseLLMCallback>>,
        _llm_params: LLMParams,
        _search_phase: Option<GlobalSearchPhase>,
    ) -> Result<LLMResponse, LLMProviderError> {
        let prompt = messages.joined_content();
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.clone());
        let call = prompts.len();

        if self.fail_for.iter().any(|name| prompt.contains(name.as_str())) {
            return Ok(LLMResponse::new(r#"{"title": "partial"}"#));
        }

        Ok(LLMResponse::new(&format!(
            r#"{{"title": "Report {}", "summary": "Summary {}", "rating": {}, "rating_explanation": "ok", "findings": [{{"summary": "s", "explanation": "e"}}]}}"#,
            call, call, call
        )))
    }
}

pub fn entity(name: &str) -> EntityRow {
    EntityRow {
        id: format!("id-{}", name),
        human_readable_id: None,
        name: name.to_string(),
        entity_type: Some("ORGANIZATION".to_string()),
        description: Some(format!("{} is an organization", name)),
        description_embedding: None,
        text_unit_ids: vec![format!("unit-{}", name)],
    }
}

pub fn relationship(source: &str, target: &str, weight: f64) -> RelationshipRow {
    RelationshipRow {
        id: format!("{}->{}", source, target),
        human_readable_id: None,
        source: source.to_string(),
        target: target.to_string(),
        description: Some(format!("{} works with {}", source, target)),
        weight: Some(weight),
        text_unit_ids: format!("unit-{},unit-{}", source, target),
    }
}

/// Two groups of four tightly linked entities joined by one weak edge, with
/// names written inconsistently.
pub fn two_group_tables() -> (Vec<EntityRow>, Vec<RelationshipRow>) {
    let left = ["alpha", "BETA", "Gamma ", "delta"];
    let right = ["EPSILON", "zeta", "eta", "theta"];

    let entities = left.iter().chain(right.iter()).map(|name| entity(name)).collect();

    let mut relationships = Vec::new();
    for group in [left, right] {
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                relationships.push(relationship(group[i], group[j], 5.0));
            }
        }
    }
    relationships.push(relationship("delta", "EPSILON", 1.0));

    (entities, relationships)
}
