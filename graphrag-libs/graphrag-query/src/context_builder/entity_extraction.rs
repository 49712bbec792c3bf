use std::collections::HashSet;

use graphrag_primitives::{llm::base::BaseTextEmbedding, models::Entity};

use crate::{
    input::retrieval::entities::{get_entity_by_key, get_entity_by_name, EntityKey},
    vector_stores::vector_store::VectorStore,
};

/// Entities to build a local context around.
///
/// A non-empty query is embedded and matched against the entity description
/// store, oversampling by `oversample_scaler` so exclusions still leave `k`
/// candidates. Hits scoring under `similarity_threshold` are dropped. An empty
/// query falls back to the `k` highest-ranked entities. Entities named in
/// `include_entity_names` always come first.
#[allow(clippy::too_many_arguments)]
pub async fn map_query_to_entities(
    query: &str,
    text_embedding_vectorstore: &dyn VectorStore,
    text_embedder: &dyn BaseTextEmbedding,
    all_entities: &[Entity],
    embedding_vectorstore_key: EntityKey,
    include_entity_names: &[String],
    exclude_entity_names: &[String],
    k: usize,
    oversample_scaler: usize,
    similarity_threshold: Option<f64>,
) -> anyhow::Result<Vec<Entity>> {
    let exclude_entity_names: HashSet<&str> = exclude_entity_names.iter().map(|name| name.as_str()).collect();
    let mut matched_entities: Vec<Entity> = Vec::new();

    if !query.is_empty() {
        let search_results = text_embedding_vectorstore
            .similarity_search_by_text(query, text_embedder, k * oversample_scaler)
            .await?;

        for result in search_results {
            if similarity_threshold.map(|threshold| result.score < threshold).unwrap_or(false) {
                continue;
            }
            if let Some(matched) = get_entity_by_key(all_entities, embedding_vectorstore_key, &result.document.id) {
                matched_entities.push(matched.clone());
            }
        }
    } else {
        let mut all_entities: Vec<&Entity> = all_entities.iter().collect();
        all_entities.sort_by(|a, b| b.rank.unwrap_or(0).cmp(&a.rank.unwrap_or(0)));
        matched_entities = all_entities.into_iter().take(k).cloned().collect();
    }

    matched_entities.retain(|entity| !exclude_entity_names.contains(entity.title.as_str()));

    let mut included_entities: Vec<Entity> = Vec::new();
    for entity_name in include_entity_names {
        included_entities.extend(get_entity_by_name(all_entities, entity_name).into_iter().cloned());
    }

    let included_ids: HashSet<String> = included_entities.iter().map(|e| e.id.clone()).collect();
    included_entities.extend(matched_entities.into_iter().filter(|e| !included_ids.contains(&e.id)));
    Ok(included_entities)
}
