use graphrag_primitives::models::Entity;
use polars::frame::DataFrame;
use uuid::Uuid;

use super::{attribute_columns, records_to_dataframe};

/// Entity field used to resolve vector store hits back to entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityKey {
    #[default]
    Id,
    ShortId,
    Title,
}

pub fn get_entity_by_key<'a>(entities: &'a [Entity], key: EntityKey, value: &str) -> Option<&'a Entity> {
    let simple_uuid = Uuid::parse_str(value).ok().map(|uuid| uuid.simple().to_string());
    let matches = |candidate: &str| candidate == value || simple_uuid.as_deref() == Some(candidate);

    entities.iter().find(|entity| match key {
        EntityKey::Id => matches(&entity.id),
        EntityKey::ShortId => entity.short_id.as_deref().map(matches).unwrap_or(false),
        EntityKey::Title => entity.title == value,
    })
}

pub fn get_entity_by_name<'a>(entities: &'a [Entity], entity_name: &str) -> Vec<&'a Entity> {
    entities.iter().filter(|entity| entity.title == entity_name).collect()
}

pub fn to_entity_dataframe(
    entities: &[Entity],
    include_entity_rank: bool,
    rank_description: &str,
) -> anyhow::Result<DataFrame> {
    if entities.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut header = vec!["id".to_string(), "entity".to_string(), "description".to_string()];
    if include_entity_rank {
        header.push(rank_description.to_string());
    }

    let attribute_cols = attribute_columns(entities[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());

    let records: Vec<Vec<String>> = entities
        .iter()
        .map(|entity| {
            let mut record = vec![
                entity.short_id.clone().unwrap_or_default(),
                entity.title.clone(),
                entity.description.clone().unwrap_or_default(),
            ];
            if include_entity_rank {
                record.push(entity.rank.map(|r| r.to_string()).unwrap_or_default());
            }
            for field in &attribute_cols {
                record.push(
                    entity
                        .attributes
                        .as_ref()
                        .and_then(|attrs| attrs.get(field))
                        .cloned()
                        .unwrap_or_default(),
                );
            }
            record
        })
        .collect();

    let numeric: Vec<&str> = if include_entity_rank { vec![rank_description] } else { vec![] };
    records_to_dataframe(&header, &records, &numeric)
}
