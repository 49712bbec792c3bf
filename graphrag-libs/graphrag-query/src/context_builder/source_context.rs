use std::collections::{HashMap, HashSet};

use graphrag_primitives::models::{Entity, Relationship, TextUnit};
use polars::frame::DataFrame;
use rand::prelude::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::input::retrieval::{attribute_columns, records_to_dataframe};

/// Renders text units as a delimited table, stopping before the unit that
/// would push the section over `max_tokens`.
pub fn build_text_unit_context(
    text_units: &[TextUnit],
    num_tokens_fn: fn(&str) -> usize,
    column_delimiter: &str,
    shuffle_data: bool,
    max_tokens: usize,
    context_name: &str,
    random_state: u64,
) -> anyhow::Result<(String, HashMap<String, DataFrame>)> {
    if text_units.is_empty() {
        return Ok((String::new(), HashMap::new()));
    }

    let mut unique_ids = HashSet::new();
    let mut text_units: Vec<&TextUnit> = text_units.iter().filter(|&unit| unique_ids.insert(unit.id.as_str())).collect();

    if shuffle_data {
        let mut rng = StdRng::seed_from_u64(random_state);
        text_units.shuffle(&mut rng);
    }

    let mut current_context_text = format!("-----{}-----\n", context_name);
    let mut header = vec!["id".to_string(), "text".to_string()];
    let attribute_cols = attribute_columns(text_units[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());
    current_context_text += &header.join(column_delimiter);

    let mut current_tokens = num_tokens_fn(&current_context_text);
    let mut records = Vec::new();

    for unit in text_units {
        let mut new_context = vec![unit.short_id.clone().unwrap_or_default(), unit.text.clone()];
        for field in &attribute_cols {
            new_context.push(
                unit.attributes
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

    let record_df = records_to_dataframe(&header, &records, &[])?;

    Ok((
        current_context_text,
        HashMap::from([(context_name.to_lowercase(), record_df)]),
    ))
}

/// Number of the entity's relationships that are mentioned in the text unit.
pub fn count_relationships(
    text_unit: &TextUnit,
    entity: &Entity,
    relationships: &HashMap<String, Relationship>,
) -> usize {
    let involves_entity = |rel: &Relationship| rel.source == entity.title || rel.target == entity.title;

    match &text_unit.relationship_ids {
        Some(relationship_ids) if !relationship_ids.is_empty() => relationship_ids
            .iter()
            .filter_map(|rel_id| relationships.get(rel_id))
            .filter(|rel| involves_entity(rel))
            .count(),
        _ => relationships
            .values()
            .filter(|rel| involves_entity(rel))
            .filter(|rel| {
                rel.text_unit_ids
                    .as_ref()
                    .map(|ids| ids.contains(&text_unit.id))
                    .unwrap_or(false)
            })
            .count(),
    }
}
