use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use graphrag_primitives::models::{Covariate, Entity, Relationship};
use polars::frame::DataFrame;

use crate::input::retrieval::{
    attribute_columns,
    covariates::{get_candidate_covariates, to_covariate_dataframe},
    entities::to_entity_dataframe,
    records_to_dataframe,
    relationships::{
        get_candidate_relationships, get_entities_from_relationships, get_in_network_relationships,
        get_out_network_relationships, to_relationship_dataframe, RelationshipRanking,
    },
};

pub fn build_entity_context(
    selected_entities: &[Entity],
    num_tokens_fn: fn(&str) -> usize,
    max_tokens: usize,
    include_entity_rank: bool,
    rank_description: &str,
    column_delimiter: &str,
    context_name: &str,
) -> anyhow::Result<(String, DataFrame)> {
    if selected_entities.is_empty() {
        return Ok((String::new(), DataFrame::default()));
    }

    let mut current_context_text = format!("-----{}-----\n", context_name);
    let mut header = vec!["id".to_string(), "entity".to_string(), "description".to_string()];
    if include_entity_rank {
        header.push(rank_description.to_string());
    }

    let attribute_cols = attribute_columns(selected_entities[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());
    current_context_text += &header.join(column_delimiter);

    let mut current_tokens = num_tokens_fn(&current_context_text);
    let mut records = Vec::new();

    for entity in selected_entities {
        let mut new_context = vec![
            entity.short_id.clone().unwrap_or_default(),
            entity.title.clone(),
            entity.description.clone().unwrap_or_default(),
        ];
        if include_entity_rank {
            new_context.push(entity.rank.unwrap_or(0).to_string());
        }
        for field in &attribute_cols {
            new_context.push(
                entity
                    .attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(field))
                    .cloned()
                    .unwrap_or_default(),
            );
        }

        let new_context_text = format!("\n{}", new_context.join(column_delimiter));
        let new_tokens = num_tokens_fn(&new_context_text);

        if current_tokens + new_tokens > max_tokens {
            break;
        }

        current_context_text += &new_context_text;
        current_tokens += new_tokens;
        records.push(new_context);
    }

    let numeric: Vec<&str> = if include_entity_rank { vec![rank_description] } else { vec![] };
    let record_df = records_to_dataframe(&header, &records, &numeric)?;

    Ok((current_context_text, record_df))
}

#[allow(clippy::too_many_arguments)]
pub fn build_relationship_context(
    selected_entities: &[Entity],
    relationships: &[Relationship],
    num_tokens_fn: fn(&str) -> usize,
    include_relationship_weight: bool,
    max_tokens: usize,
    top_k_relationships: usize,
    relationship_ranking_attribute: &RelationshipRanking,
    column_delimiter: &str,
    context_name: &str,
) -> anyhow::Result<(String, DataFrame)> {
    let selected_relationships = filter_relationships(
        selected_entities,
        relationships,
        top_k_relationships,
        relationship_ranking_attribute,
    );

    if selected_entities.is_empty() || selected_relationships.is_empty() {
        return Ok((String::new(), DataFrame::default()));
    }

    let mut current_context_text = format!("-----{}-----\n", context_name);
    let mut header = vec![
        "id".to_string(),
        "source".to_string(),
        "target".to_string(),
        "description".to_string(),
    ];
    if include_relationship_weight {
        header.push("weight".to_string());
    }
    header.push("rank".to_string());

    let attribute_cols = attribute_columns(selected_relationships[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());
    current_context_text += &header.join(column_delimiter);

    let mut current_tokens = num_tokens_fn(&current_context_text);
    let mut records = Vec::new();

    for rel in &selected_relationships {
        let mut new_context = vec![
            rel.short_id.clone().unwrap_or_default(),
            rel.source.clone(),
            rel.target.clone(),
            rel.description.clone().unwrap_or_default(),
        ];
        if include_relationship_weight {
            new_context.push(rel.weight.map(|w| w.to_string()).unwrap_or_default());
        }
        new_context.push(rel.rank.map(|r| r.to_string()).unwrap_or_default());
        for field in &attribute_cols {
            new_context.push(
                rel.attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(field))
                    .cloned()
                    .unwrap_or_default(),
            );
        }

        let new_context_text = format!("\n{}", new_context.join(column_delimiter));
        let new_tokens = num_tokens_fn(&new_context_text);

        if current_tokens + new_tokens > max_tokens {
            break;
        }

        current_context_text += &new_context_text;
        current_tokens += new_tokens;
        records.push(new_context);
    }

    let record_df = records_to_dataframe(&header, &records, &["weight", "rank"])?;

    Ok((current_context_text, record_df))
}

pub fn build_covariates_context(
    selected_entities: &[Entity],
    covariates: &[Covariate],
    num_tokens_fn: fn(&str) -> usize,
    max_tokens: usize,
    column_delimiter: &str,
    context_name: &str,
) -> anyhow::Result<(String, DataFrame)> {
    if selected_entities.is_empty() || covariates.is_empty() {
        return Ok((String::new(), DataFrame::default()));
    }

    let mut selected_covariates: Vec<&Covariate> = Vec::new();
    for entity in selected_entities {
        selected_covariates.extend(covariates.iter().filter(|c| c.subject_id == entity.title));
    }

    if selected_covariates.is_empty() {
        return Ok((String::new(), DataFrame::default()));
    }

    let mut current_context_text = format!("-----{}-----\n", context_name);
    let mut header = vec!["id".to_string(), "entity".to_string()];
    let attribute_cols = attribute_columns(selected_covariates[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());
    current_context_text += &header.join(column_delimiter);

    let mut current_tokens = num_tokens_fn(&current_context_text);
    let mut records = Vec::new();

    for covariate in selected_covariates {
        let mut new_context = vec![covariate.short_id.clone().unwrap_or_default(), covariate.subject_id.clone()];
        for field in &attribute_cols {
            new_context.push(covariate.attribute(field).unwrap_or_default().to_string());
        }

        let new_context_text = format!("\n{}", new_context.join(column_delimiter));
        let new_tokens = num_tokens_fn(&new_context_text);

        if current_tokens + new_tokens > max_tokens {
            break;
        }

        current_context_text += &new_context_text;
        current_tokens += new_tokens;
        records.push(new_context);
    }

    let record_df = records_to_dataframe(&header, &records, &[])?;

    Ok((current_context_text, record_df))
}

/// In-network relationships first, then out-of-network ones ranked by how many
/// selected entities their outside endpoint links to, capped at
/// `top_k_relationships` per selected entity.
fn filter_relationships(
    selected_entities: &[Entity],
    relationships: &[Relationship],
    top_k_relationships: usize,
    relationship_ranking_attribute: &RelationshipRanking,
) -> Vec<Relationship> {
    let in_network_relationships =
        get_in_network_relationships(selected_entities, relationships, relationship_ranking_attribute);

    let out_network_relationships =
        get_out_network_relationships(selected_entities, relationships, relationship_ranking_attribute);

    if out_network_relationships.len() <= 1 {
        return [in_network_relationships, out_network_relationships].concat();
    }

    let selected_entity_names: HashSet<&str> = selected_entities.iter().map(|e| e.title.as_str()).collect();

    // distinct selected entities each outside entity is linked to
    let mut out_network_entity_links: HashMap<&str, HashSet<&str>> = HashMap::new();
    for relationship in &out_network_relationships {
        let (outside, inside) = if selected_entity_names.contains(relationship.source.as_str()) {
            (relationship.target.as_str(), relationship.source.as_str())
        } else {
            (relationship.source.as_str(), relationship.target.as_str())
        };
        out_network_entity_links.entry(outside).or_default().insert(inside);
    }

    let links = |relationship: &Relationship| -> usize {
        [relationship.source.as_str(), relationship.target.as_str()]
            .iter()
            .filter_map(|name| out_network_entity_links.get(name))
            .map(|linked| linked.len())
            .max()
            .unwrap_or(0)
    };

    let link_counts: Vec<usize> = out_network_relationships.iter().map(links).collect();

    let mut ranked: Vec<(usize, f64, Relationship)> = out_network_relationships
        .into_iter()
        .zip(link_counts)
        .map(|(relationship, links)| {
            (
                links,
                relationship_ranking_attribute.value(&relationship),
                relationship,
            )
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)));

    let relationship_budget = top_k_relationships * selected_entities.len();
    let out_network_relationships = ranked
        .into_iter()
        .take(relationship_budget)
        .map(|(_, _, relationship)| relationship);

    in_network_relationships
        .into_iter()
        .chain(out_network_relationships)
        .collect()
}

/// Every entity, relationship and claim reachable from the selection, for
/// callers that want to see what was left out of the context.
pub fn get_candidate_context(
    selected_entities: &[Entity],
    entities: &[Entity],
    relationships: &[Relationship],
    covariates: &[Covariate],
    include_entity_rank: bool,
    entity_rank_description: &str,
    include_relationship_weight: bool,
) -> anyhow::Result<HashMap<String, DataFrame>> {
    let mut candidate_context = HashMap::new();

    let candidate_relationships = get_candidate_relationships(selected_entities, relationships);
    candidate_context.insert(
        "relationships".to_string(),
        to_relationship_dataframe(&candidate_relationships, include_relationship_weight)?,
    );

    let candidate_entities = get_entities_from_relationships(&candidate_relationships, entities);
    candidate_context.insert(
        "entities".to_string(),
        to_entity_dataframe(&candidate_entities, include_entity_rank, entity_rank_description)?,
    );

    let candidate_covariates = get_candidate_covariates(selected_entities, covariates);
    candidate_context.insert("claims".to_string(), to_covariate_dataframe(&candidate_covariates)?);

    Ok(candidate_context)
}
