use std::{collections::HashMap, fs::File, path::Path};

use anyhow::Context;
use graphrag_primitives::{
    models::Entity,
    tables::{
        parse_level, split_id_list, CommunityReportRow, CovariateRow, EntityRow, NodeRow, RelationshipRow, TextUnitRow,
    },
};
use polars::{
    frame::DataFrame,
    prelude::{AnyValue, DataType, ParquetReader, SerReader},
    series::Series,
};

use crate::vector_stores::vector_store::{VectorStore, VectorStoreDocument};

pub async fn store_entity_semantic_embeddings(
    entities: &[Entity],
    vectorstore: &mut dyn VectorStore,
) -> anyhow::Result<()> {
    let documents: Vec<VectorStoreDocument> = entities
        .iter()
        .map(|entity| {
            let mut attributes = HashMap::new();
            attributes.insert("title".to_string(), entity.title.clone());
            if let Some(entity_attributes) = &entity.attributes {
                attributes.extend(entity_attributes.clone());
            }

            VectorStoreDocument {
                id: entity.id.clone(),
                text: entity.description.clone(),
                vector: entity.description_embedding.clone(),
                attributes,
            }
        })
        .collect();

    vectorstore.load_documents(documents, true).await
}

pub fn read_parquet(path: &Path) -> anyhow::Result<DataFrame> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let df = ParquetReader::new(&mut file)
        .finish()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(df)
}

pub fn read_entity_rows(df: &DataFrame) -> anyhow::Result<Vec<EntityRow>> {
    let id = df.column("id")?;
    let name = df.column("name")?;
    let human_readable_id = df.column("human_readable_id").ok();
    let entity_type = df.column("type").ok();
    let description = df.column("description").ok();
    let description_embedding = df.column("description_embedding").ok();
    let text_unit_ids = df.column("text_unit_ids").ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        rows.push(EntityRow {
            id: required_string(id, idx)?,
            human_readable_id: optional_string(human_readable_id, idx)?,
            name: required_string(name, idx)?,
            entity_type: optional_string(entity_type, idx)?,
            description: optional_string(description, idx)?,
            description_embedding: optional_vector(description_embedding, idx)?,
            text_unit_ids: string_list(text_unit_ids, idx)?,
        });
    }

    Ok(rows)
}

pub fn read_node_rows(df: &DataFrame) -> anyhow::Result<Vec<NodeRow>> {
    let title = df.column("title")?;
    let level = df.column("level")?;
    let node_type = df.column("type").ok();
    let degree = df.column("degree").ok();
    let community = df.column("community").ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let level_value = required_string(level, idx)?;
        let level = parse_level(&level_value)
            .ok_or_else(|| anyhow::anyhow!("Invalid level {:?} in row {}", level_value, idx))?;

        rows.push(NodeRow {
            title: required_string(title, idx)?,
            node_type: optional_string(node_type, idx)?,
            level,
            degree: optional_number(degree, idx)?.map(|d| d as i32).unwrap_or(0),
            community: optional_number(community, idx)?.map(|c| c as i64),
        });
    }

    Ok(rows)
}

pub fn read_relationship_rows(df: &DataFrame) -> anyhow::Result<Vec<RelationshipRow>> {
    let id = df.column("id")?;
    let source = df.column("source")?;
    let target = df.column("target")?;
    let human_readable_id = df.column("human_readable_id").ok();
    let description = df.column("description").ok();
    let weight = df.column("weight").ok();
    let text_unit_ids = df.column("text_unit_ids").ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        rows.push(RelationshipRow {
            id: required_string(id, idx)?,
            human_readable_id: optional_string(human_readable_id, idx)?,
            source: required_string(source, idx)?,
            target: required_string(target, idx)?,
            description: optional_string(description, idx)?,
            weight: optional_number(weight, idx)?,
            text_unit_ids: string_list(text_unit_ids, idx)?.join(","),
        });
    }

    Ok(rows)
}

pub fn read_community_report_rows(df: &DataFrame) -> anyhow::Result<Vec<CommunityReportRow>> {
    let community = df
        .column("community_id")
        .or_else(|_| df.column("community"))
        .context("Missing community_id column")?;
    let level = df.column("level")?;
    let title = df.column("title").ok();
    let summary = df.column("summary").ok();
    let full_content = df.column("full_content").ok();
    let rank = df.column("rank").ok();
    let rank_explanation = df.column("rank_explanation").ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let level_value = required_string(level, idx)?;
        let level = parse_level(&level_value)
            .ok_or_else(|| anyhow::anyhow!("Invalid level {:?} in row {}", level_value, idx))?;

        rows.push(CommunityReportRow {
            community_id: required_string(community, idx)?,
            title: optional_string(title, idx)?.unwrap_or_default(),
            summary: optional_string(summary, idx)?.unwrap_or_default(),
            full_content: optional_string(full_content, idx)?.unwrap_or_default(),
            rank: optional_number(rank, idx)?,
            rank_explanation: optional_string(rank_explanation, idx)?,
            level,
        });
    }

    Ok(rows)
}

pub fn read_text_unit_rows(df: &DataFrame) -> anyhow::Result<Vec<TextUnitRow>> {
    let id = df.column("id")?;
    let text = df.column("text")?;
    let n_tokens = df.column("n_tokens").ok();
    let document_ids = df.column("document_ids").ok();
    let entity_ids = df.column("entity_ids").ok();
    let relationship_ids = df.column("relationship_ids").ok();
    let covariate_ids = df.column("covariate_ids").ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        rows.push(TextUnitRow {
            id: required_string(id, idx)?,
            text: required_string(text, idx)?,
            n_tokens: optional_number(n_tokens, idx)?.map(|n| n as usize),
            document_ids: string_list(document_ids, idx)?,
            entity_ids: string_list(entity_ids, idx)?,
            relationship_ids: string_list(relationship_ids, idx)?,
            covariate_ids: string_list(covariate_ids, idx)?,
        });
    }

    Ok(rows)
}

pub fn read_covariate_rows(df: &DataFrame) -> anyhow::Result<Vec<CovariateRow>> {
    let id = df.column("id")?;
    let subject_id = df.column("subject_id").ok();
    let object_id = df.column("object_id").ok();
    let covariate_type = df.column("type").or_else(|_| df.column("covariate_type")).ok();
    let status = df.column("status").ok();
    let start_date = df.column("start_date").ok();
    let end_date = df.column("end_date").ok();
    let description = df.column("description").ok();
    let text_unit_ids = df.column("text_unit_id").or_else(|_| df.column("text_unit_ids")).ok();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        rows.push(CovariateRow {
            id: required_string(id, idx)?,
            subject_id: optional_string(subject_id, idx)?,
            object_id: optional_string(object_id, idx)?,
            covariate_type: optional_string(covariate_type, idx)?,
            status: optional_string(status, idx)?,
            start_date: optional_string(start_date, idx)?,
            end_date: optional_string(end_date, idx)?,
            description: optional_string(description, idx)?,
            text_unit_ids: string_list(text_unit_ids, idx)?,
        });
    }

    Ok(rows)
}

fn value_to_string(value: &AnyValue) -> Option<String> {
    match value {
        AnyValue::Null => None,
        value => Some(
            value
                .get_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| value.to_string()),
        ),
    }
}

fn required_string(series: &Series, idx: usize) -> anyhow::Result<String> {
    let value = series.get(idx)?;
    value_to_string(&value).ok_or_else(|| anyhow::anyhow!("Null value in column {} row {}", series.name(), idx))
}

fn optional_string(series: Option<&Series>, idx: usize) -> anyhow::Result<Option<String>> {
    match series {
        Some(series) => Ok(value_to_string(&series.get(idx)?)),
        None => Ok(None),
    }
}

fn optional_number(series: Option<&Series>, idx: usize) -> anyhow::Result<Option<f64>> {
    let Some(series) = series else {
        return Ok(None);
    };

    let value = series.get(idx)?;
    let number = match &value {
        AnyValue::Null => None,
        value => match value.extract::<f64>() {
            Some(number) => Some(number),
            None => value_to_string(value).and_then(|s| s.trim().parse::<f64>().ok()),
        },
    };
    Ok(number)
}

/// Id lists are stored either as list columns or as comma-delimited strings.
fn string_list(series: Option<&Series>, idx: usize) -> anyhow::Result<Vec<String>> {
    let Some(series) = series else {
        return Ok(Vec::new());
    };

    match series.get(idx)? {
        AnyValue::Null => Ok(Vec::new()),
        AnyValue::List(inner) => {
            let mut values = Vec::with_capacity(inner.len());
            for i in 0..inner.len() {
                if let Some(value) = value_to_string(&inner.get(i)?) {
                    values.push(value);
                }
            }
            Ok(values)
        }
        value => Ok(value_to_string(&value).map(|s| split_id_list(&s)).unwrap_or_default()),
    }
}

fn optional_vector(series: Option<&Series>, idx: usize) -> anyhow::Result<Option<Vec<f32>>> {
    let Some(series) = series else {
        return Ok(None);
    };

    match series.get(idx)? {
        AnyValue::List(inner) => {
            let inner = inner.cast(&DataType::Float64)?;
            let values = inner.f64()?.into_iter().map(|v| v.unwrap_or(0.0) as f32).collect();
            Ok(Some(values))
        }
        _ => Ok(None),
    }
}
