use std::collections::HashSet;

use graphrag_primitives::models::{Covariate, Entity};
use polars::frame::DataFrame;

use super::{attribute_columns, records_to_dataframe};

pub fn get_candidate_covariates(selected_entities: &[Entity], covariates: &[Covariate]) -> Vec<Covariate> {
    let selected_entity_names: HashSet<&str> = selected_entities.iter().map(|e| e.title.as_str()).collect();

    covariates
        .iter()
        .filter(|covariate| selected_entity_names.contains(covariate.subject_id.as_str()))
        .cloned()
        .collect()
}

pub fn to_covariate_dataframe(covariates: &[Covariate]) -> anyhow::Result<DataFrame> {
    if covariates.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut header = vec!["id".to_string(), "entity".to_string()];
    let attribute_cols = attribute_columns(covariates[0].attributes.as_ref(), &header);
    header.extend(attribute_cols.iter().cloned());

    let records: Vec<Vec<String>> = covariates
        .iter()
        .map(|covariate| {
            let mut record = vec![covariate.short_id.clone().unwrap_or_default(), covariate.subject_id.clone()];
            for field in &attribute_cols {
                record.push(covariate.attribute(field).unwrap_or_default().to_string());
            }
            record
        })
        .collect();

    records_to_dataframe(&header, &records, &[])
}
