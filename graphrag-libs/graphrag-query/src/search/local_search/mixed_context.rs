use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use graphrag_primitives::{
    errors::GraphRagError,
    llm::base::BaseTextEmbedding,
    models::{CommunityReport, Covariate, Entity, Relationship, TextUnit},
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

use crate::{
    context_builder::{
        community_context::{build_community_context, CommunityContextBuilderParams},
        entity_extraction::map_query_to_entities,
        local_context::{build_covariates_context, build_entity_context, build_relationship_context, get_candidate_context},
        source_context::{build_text_unit_context, count_relationships},
    },
    input::retrieval::{
        community_reports::get_candidate_communities, entities::EntityKey, relationships::RelationshipRanking,
        text_units::get_candidate_text_units,
    },
    vector_stores::vector_store::VectorStore,
};

#[derive(Debug, Clone)]
pub struct MixedContextBuilderParams {
    pub include_entity_names: Vec<String>,
    pub exclude_entity_names: Vec<String>,
    pub max_tokens: usize,
    pub text_unit_prop: f32,
    pub community_prop: f32,
    pub top_k_mapped_entities: usize,
    pub top_k_relationships: usize,
    pub include_community_rank: bool,
    pub include_entity_rank: bool,
    pub rank_description: String,
    pub include_relationship_weight: bool,
    pub relationship_ranking_attribute: RelationshipRanking,
    pub return_candidate_context: bool,
    pub use_community_summary: bool,
    pub min_community_rank: u32,
    pub community_context_name: String,
    pub column_delimiter: String,
    /// Entities whose description similarity is below this are not selected.
    pub similarity_threshold: Option<f64>,
}

impl Default for MixedContextBuilderParams {
    fn default() -> Self {
        MixedContextBuilderParams {
            include_entity_names: Vec::new(),
            exclude_entity_names: Vec::new(),
            max_tokens: 12_000,
            text_unit_prop: 0.5,
            community_prop: 0.1,
            top_k_mapped_entities: 10,
            top_k_relationships: 10,
            include_community_rank: false,
            include_entity_rank: true,
            rank_description: "number of relationships".to_string(),
            include_relationship_weight: true,
            relationship_ranking_attribute: RelationshipRanking::Rank,
            return_candidate_context: false,
            use_community_summary: false,
            min_community_rank: 0,
            community_context_name: "Reports".to_string(),
            column_delimiter: "|".to_string(),
            similarity_threshold: None,
        }
    }
}

/// Result of assembling the local search context.
#[derive(Debug, Clone)]
pub enum MixedContext {
    Context {
        context_text: String,
        context_records: HashMap<String, DataFrame>,
        selected_entities: Vec<Entity>,
    },
    /// Nothing relevant was retrieved, so there is nothing to answer from.
    Empty { reason: String },
}

/// Context builder combining community reports, entities, relationships,
/// claims and source text units around the entities closest to a query.
pub struct LocalSearchMixedContext {
    entities: Vec<Entity>,
    entity_text_embeddings: Arc<dyn VectorStore>,
    text_embedder: Arc<dyn BaseTextEmbedding>,
    text_units: HashMap<String, TextUnit>,
    community_reports: HashMap<String, CommunityReport>,
    relationships: Vec<Relationship>,
    relationships_by_id: HashMap<String, Relationship>,
    covariates: Vec<Covariate>,
    num_tokens_fn: fn(&str) -> usize,
    embedding_vectorstore_key: EntityKey,
}

impl LocalSearchMixedContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entities: Vec<Entity>,
        entity_text_embeddings: Arc<dyn VectorStore>,
        text_embedder: Arc<dyn BaseTextEmbedding>,
        text_units: Option<Vec<TextUnit>>,
        community_reports: Option<Vec<CommunityReport>>,
        relationships: Option<Vec<Relationship>>,
        covariates: Option<Vec<Covariate>>,
        num_tokens_fn: fn(&str) -> usize,
        embedding_vectorstore_key: EntityKey,
    ) -> Self {
        let text_units = text_units
            .unwrap_or_default()
            .into_iter()
            .map(|unit| (unit.id.clone(), unit))
            .collect();

        let community_reports = community_reports
            .unwrap_or_default()
            .into_iter()
            .map(|report| (report.community_id.clone(), report))
            .collect();

        let relationships = relationships.unwrap_or_default();
        let relationships_by_id = relationships
            .iter()
            .map(|relationship| (relationship.id.clone(), relationship.clone()))
            .collect();

        LocalSearchMixedContext {
            entities,
            entity_text_embeddings,
            text_embedder,
            text_units,
            community_reports,
            relationships,
            relationships_by_id,
            covariates: covariates.unwrap_or_default(),
            num_tokens_fn,
            embedding_vectorstore_key,
        }
    }

    /// Builds the context for `query`: a community section within
    /// `community_prop` of the budget, an entity/relationship/claim section
    /// within what the other two proportions leave, then source text units
    /// within `text_unit_prop`.
    pub async fn build_context(
        &self,
        query: &str,
        params: &MixedContextBuilderParams,
    ) -> Result<MixedContext, GraphRagError> {
        if params.community_prop + params.text_unit_prop > 1.0 {
            return Err(GraphRagError::InvalidParameters(
                "The sum of community_prop and text_unit_prop must be less than or equal to 1.0".to_string(),
            ));
        }

        let selected_entities = match map_query_to_entities(
            query,
            self.entity_text_embeddings.as_ref(),
            self.text_embedder.as_ref(),
            &self.entities,
            self.embedding_vectorstore_key,
            &params.include_entity_names,
            &params.exclude_entity_names,
            params.top_k_mapped_entities,
            2,
            params.similarity_threshold,
        )
        .await
        {
            Ok(selected_entities) => selected_entities,
            Err(e) => {
                return Ok(MixedContext::Empty {
                    reason: format!("Query embedding failed: {}", e),
                })
            }
        };

        if selected_entities.is_empty() {
            return Ok(MixedContext::Empty {
                reason: "No entities matched the query".to_string(),
            });
        }

        let mut final_context = Vec::new();
        let mut final_context_data = HashMap::new();

        // build community context
        let community_tokens = (params.max_tokens as f32 * params.community_prop) as usize;
        let (community_context, community_context_data) =
            self.build_community_context(&selected_entities, community_tokens, params)?;
        if !community_context.trim().is_empty() {
            final_context.push(community_context);
        }
        final_context_data.extend(community_context_data);

        // build local (i.e. entity-relationship-covariate) context
        let local_prop = 1.0 - params.community_prop - params.text_unit_prop;
        let local_tokens = (params.max_tokens as f32 * local_prop).max(0.0) as usize;
        let (local_context, local_context_data) = self.build_local_context(&selected_entities, local_tokens, params)?;
        if !local_context.trim().is_empty() {
            final_context.push(local_context);
        }
        final_context_data.extend(local_context_data);

        // build text unit context
        let text_unit_tokens = (params.max_tokens as f32 * params.text_unit_prop) as usize;
        let (text_unit_context, text_unit_context_data) =
            self.build_text_unit_context(&selected_entities, text_unit_tokens, params)?;
        if !text_unit_context.trim().is_empty() {
            final_context.push(text_unit_context);
        }
        final_context_data.extend(text_unit_context_data);

        Ok(MixedContext::Context {
            context_text: final_context.join("\n\n"),
            context_records: final_context_data,
            selected_entities,
        })
    }

    fn build_community_context(
        &self,
        selected_entities: &[Entity],
        max_tokens: usize,
        params: &MixedContextBuilderParams,
    ) -> anyhow::Result<(String, HashMap<String, DataFrame>)> {
        let context_name = params.community_context_name.as_str();
        if selected_entities.is_empty() || self.community_reports.is_empty() {
            return Ok((String::new(), HashMap::new()));
        }

        let mut community_matches: HashMap<&str, usize> = HashMap::new();
        for entity in selected_entities {
            for community_id in entity.community_ids.iter().flatten() {
                *community_matches.entry(community_id.as_str()).or_insert(0) += 1;
            }
        }

        let mut selected_communities: Vec<(usize, &CommunityReport)> = community_matches
            .iter()
            .filter_map(|(community_id, matches)| {
                self.community_reports
                    .get(*community_id)
                    .map(|report| (*matches, report))
            })
            .collect();

        selected_communities.sort_by(|(a_matches, a), (b_matches, b)| {
            b_matches
                .cmp(a_matches)
                .then(
                    b.rank
                        .unwrap_or(0.0)
                        .partial_cmp(&a.rank.unwrap_or(0.0))
                        .unwrap_or(Ordering::Equal),
                )
                .then(a.community_id.cmp(&b.community_id))
        });

        let selected_communities: Vec<CommunityReport> =
            selected_communities.into_iter().map(|(_, report)| report.clone()).collect();

        let community_params = CommunityContextBuilderParams {
            use_community_summary: params.use_community_summary,
            column_delimiter: params.column_delimiter.clone(),
            shuffle_data: false,
            include_community_rank: params.include_community_rank,
            min_community_rank: params.min_community_rank,
            include_community_weight: false,
            normalize_community_weight: false,
            max_tokens,
            context_name: context_name.to_string(),
            ..Default::default()
        };

        let (context_text, mut context_data) = build_community_context(
            &selected_communities,
            None,
            self.num_tokens_fn,
            &community_params,
            true,
        )?;

        if params.return_candidate_context {
            let all_reports: Vec<CommunityReport> = self.community_reports.values().cloned().collect();
            let candidate_context_data = get_candidate_communities(
                selected_entities,
                &all_reports,
                params.include_community_rank,
                params.use_community_summary,
            )?;

            let context_key = context_name.to_lowercase();
            let marked = mark_in_context(candidate_context_data, context_data.get(&context_key))?;
            context_data.insert(context_key, marked);
        }

        Ok((context_text.join("\n\n"), context_data))
    }

    /// Entities are added one at a time; each step rebuilds the relationship
    /// and claim sections for the entities added so far and the last state
    /// that fits the budget is kept.
    fn build_local_context(
        &self,
        selected_entities: &[Entity],
        max_tokens: usize,
        params: &MixedContextBuilderParams,
    ) -> anyhow::Result<(String, HashMap<String, DataFrame>)> {
        let column_delimiter = params.column_delimiter.as_str();
        let (entity_context, entity_context_data) = build_entity_context(
            selected_entities,
            self.num_tokens_fn,
            max_tokens,
            params.include_entity_rank,
            &params.rank_description,
            column_delimiter,
            "Entities",
        )?;
        let entity_tokens = (self.num_tokens_fn)(&entity_context);

        let mut added_entities: Vec<Entity> = Vec::new();
        let mut final_context: Vec<String> = Vec::new();
        let mut final_context_data: HashMap<String, DataFrame> = HashMap::new();

        for entity in selected_entities {
            let mut current_context: Vec<String> = Vec::new();
            let mut current_context_data: HashMap<String, DataFrame> = HashMap::new();
            added_entities.push(entity.clone());

            // build relationship context
            let (relationship_context, relationship_context_data) = build_relationship_context(
                &added_entities,
                &self.relationships,
                self.num_tokens_fn,
                params.include_relationship_weight,
                max_tokens,
                params.top_k_relationships,
                &params.relationship_ranking_attribute,
                column_delimiter,
                "Relationships",
            )?;
            let mut total_tokens = entity_tokens + (self.num_tokens_fn)(&relationship_context);
            current_context.push(relationship_context);
            current_context_data.insert("relationships".to_string(), relationship_context_data);

            // build covariate context
            let (covariate_context, covariate_context_data) = build_covariates_context(
                &added_entities,
                &self.covariates,
                self.num_tokens_fn,
                max_tokens,
                column_delimiter,
                "Claims",
            )?;
            total_tokens += (self.num_tokens_fn)(&covariate_context);
            current_context.push(covariate_context);
            current_context_data.insert("claims".to_string(), covariate_context_data);

            if total_tokens > max_tokens {
                graphrag_log(
                    GraphRagLogOption::Search,
                    GraphRagLogLevel::Debug,
                    &format!("Local context reached its token limit after {} entities", added_entities.len() - 1),
                );
                break;
            }

            final_context = current_context;
            final_context_data = current_context_data;
        }

        let mut sections = vec![entity_context];
        sections.extend(final_context.into_iter().filter(|section| !section.trim().is_empty()));
        let final_context_text = sections.join("\n\n");
        final_context_data.insert("entities".to_string(), entity_context_data);

        if params.return_candidate_context {
            let candidate_context_data = get_candidate_context(
                selected_entities,
                &self.entities,
                &self.relationships,
                &self.covariates,
                params.include_entity_rank,
                &params.rank_description,
                params.include_relationship_weight,
            )?;

            for (key, candidate_df) in candidate_context_data {
                let marked = mark_in_context(candidate_df, final_context_data.get(&key))?;
                final_context_data.insert(key, marked);
            }
        }

        Ok((final_context_text, final_context_data))
    }

    fn build_text_unit_context(
        &self,
        selected_entities: &[Entity],
        max_tokens: usize,
        params: &MixedContextBuilderParams,
    ) -> anyhow::Result<(String, HashMap<String, DataFrame>)> {
        if selected_entities.is_empty() || self.text_units.is_empty() {
            return Ok((String::new(), HashMap::new()));
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut selected_text_units: Vec<(usize, usize, &TextUnit)> = Vec::new();
        for (entity_order, entity) in selected_entities.iter().enumerate() {
            for text_id in entity.text_unit_ids.iter().flatten() {
                let Some(text_unit) = self.text_units.get(text_id) else {
                    continue;
                };
                if !seen_ids.insert(text_unit.id.as_str()) {
                    continue;
                }
                let num_relationships = count_relationships(text_unit, entity, &self.relationships_by_id);
                selected_text_units.push((entity_order, num_relationships, text_unit));
            }
        }

        selected_text_units.sort_by(|(a_order, a_count, _), (b_order, b_count, _)| {
            a_order.cmp(b_order).then(b_count.cmp(a_count))
        });

        let selected_text_units: Vec<TextUnit> =
            selected_text_units.into_iter().map(|(_, _, unit)| unit.clone()).collect();

        let (context_text, mut context_data) = build_text_unit_context(
            &selected_text_units,
            self.num_tokens_fn,
            &params.column_delimiter,
            false,
            max_tokens,
            "Sources",
            86,
        )?;

        if params.return_candidate_context {
            let all_text_units: Vec<TextUnit> = self.text_units.values().cloned().collect();
            let candidate_context_data = get_candidate_text_units(selected_entities, &all_text_units)?;
            let marked = mark_in_context(candidate_context_data, context_data.get("sources"))?;
            context_data.insert("sources".to_string(), marked);
        }

        Ok((context_text, context_data))
    }
}

/// Adds an `in_context` column to the candidate records telling which of them
/// made it into the context.
fn mark_in_context(mut candidate: DataFrame, context: Option<&DataFrame>) -> anyhow::Result<DataFrame> {
    if candidate.width() == 0 {
        return Ok(candidate);
    }

    let context_ids: HashSet<String> = match context.map(|df| df.column("id")) {
        Some(Ok(ids)) => ids.str()?.into_iter().flatten().map(|id| id.to_string()).collect(),
        _ => HashSet::new(),
    };

    let in_context: Vec<bool> = candidate
        .column("id")?
        .str()?
        .into_iter()
        .map(|id| id.map(|id| context_ids.contains(id)).unwrap_or(false))
        .collect();

    candidate.with_column(Series::new("in_context", in_context))?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use graphrag_primitives::errors::LLMProviderError;

    use super::*;
    use crate::vector_stores::in_memory::InMemoryVectorStore;

    struct FixedEmbedder;

    #[async_trait]
    impl BaseTextEmbedding for FixedEmbedder {
        async fn aembed(&self, _text: &str) -> Result<Vec<f32>, LLMProviderError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn count_words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn context(entities: Vec<Entity>, text_units: Vec<TextUnit>, relationships: Vec<Relationship>) -> LocalSearchMixedContext {
        LocalSearchMixedContext::new(
            entities,
            Arc::new(InMemoryVectorStore::new("entities")),
            Arc::new(FixedEmbedder),
            Some(text_units),
            None,
            Some(relationships),
            None,
            count_words,
            EntityKey::Id,
        )
    }

    #[tokio::test]
    async fn test_proportions_over_one_are_rejected() {
        let context = context(Vec::new(), Vec::new(), Vec::new());
        let params = MixedContextBuilderParams {
            community_prop: 0.6,
            text_unit_prop: 0.6,
            ..Default::default()
        };

        let result = context.build_context("query", &params).await;
        assert!(matches!(result, Err(GraphRagError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_no_matching_entities_is_empty_context() {
        let context = context(vec![Entity::new("a", "A")], Vec::new(), Vec::new());

        let result = context
            .build_context("query", &MixedContextBuilderParams::default())
            .await
            .unwrap();
        assert!(matches!(result, MixedContext::Empty { .. }));
    }

    #[test]
    fn test_text_units_follow_entity_order_then_relationship_count() {
        let mut first = Entity::new("a", "A");
        first.text_unit_ids = Some(vec!["t1".to_string(), "t2".to_string()]);
        let mut second = Entity::new("b", "B");
        second.text_unit_ids = Some(vec!["t3".to_string(), "t1".to_string()]);

        let mut units = Vec::new();
        for id in ["t1", "t2", "t3"] {
            let mut unit = TextUnit::new(id, &format!("text {}", id));
            unit.short_id = Some(id.to_string());
            units.push(unit);
        }

        let mut relationship = Relationship::new("r1", "A", "C");
        relationship.text_unit_ids = Some(vec!["t2".to_string()]);

        let context = context(vec![first.clone(), second.clone()], units, vec![relationship]);
        let params = MixedContextBuilderParams {
            return_candidate_context: true,
            ..Default::default()
        };

        let (text, data) = context
            .build_text_unit_context(&[first, second], 100, &params)
            .unwrap();

        assert_eq!(text, "-----Sources-----\nid|text\nt2|text t2\nt1|text t1\nt3|text t3");
        assert_eq!(data["sources"].height(), 3);
        assert!(data["sources"].column("in_context").is_ok());
    }
}
