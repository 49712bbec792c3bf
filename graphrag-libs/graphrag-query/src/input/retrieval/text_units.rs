use std::collections::HashSet;

use graphrag_primitives::models::{Entity, TextUnit};
use polars::frame::DataFrame;

use super::{attribute_columns, records_to_dataframe};

pub fn get_candidate_text_units(selected_entities: &[Entity], text_units: &[TextUnit]) -> anyhow::Result<DataFrame> {
    let selected_text_ids: HashSet<&str> = selected_entities
        .iter()
        .filter_map(|entity| entity.text_unit_ids.as_ref())
        .flatten()
        .map(|id| id.as_str())
        .collect();

    let selected_text_units: Vec<TextUnit> = text_units
        .iter()
        .filter(|unit| selected_text_ids.contains(unit.id.as_str()))
        .cloned()
        .collect();

    to_text_unit_dataframe(&selected_text_units)
}

pub fn to_text_unit_dataframe(text_units: &[TextUnit]) -> anyhow::Result<DataFrame> {
    if text_units.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut header = vec!["id".to_string(), "text".to_string()];
    let attribute_cols = attribute_columns(text_units[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());

    let records: Vec<Vec<String>> = text_units
        .iter()
        .map(|unit| {
            let mut record = vec![unit.short_id.clone().unwrap_or_default(), unit.text.clone()];
            for field in &attribute_cols {
                record.push(
                    unit.attributes
                        .as_ref()
                        .and_then(|attrs| attrs.get(field))
                        .cloned()
                        .unwrap_or_default(),
                );
            }
            record
        })
        .collect();

    records_to_dataframe(&header, &records, &[])
}
