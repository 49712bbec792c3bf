use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use graphrag_primitives::models::{CommunityReport, Entity};
use polars::frame::DataFrame;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::input::retrieval::records_to_dataframe;

#[derive(Debug, Clone)]
pub struct CommunityContextBuilderParams {
    pub use_community_summary: bool,
    pub column_delimiter: String,
    pub shuffle_data: bool,
    pub include_community_rank: bool,
    pub min_community_rank: u32,
    pub community_rank_name: String,
    pub include_community_weight: bool,
    pub community_weight_name: String,
    pub normalize_community_weight: bool,
    pub max_tokens: usize,
    pub context_name: String,
    pub random_state: u64,
}

impl Default for CommunityContextBuilderParams {
    fn default() -> Self {
        CommunityContextBuilderParams {
            use_community_summary: false,
            column_delimiter: "|".to_string(),
            shuffle_data: true,
            include_community_rank: true,
            min_community_rank: 0,
            community_rank_name: "rank".to_string(),
            include_community_weight: true,
            community_weight_name: "occurrence weight".to_string(),
            normalize_community_weight: true,
            max_tokens: 12_000,
            context_name: "Reports".to_string(),
            random_state: 86,
        }
    }
}

/// Community report context for global search: every report, split into
/// batches that each fit the token budget.
pub struct GlobalCommunityContext {
    community_reports: Vec<CommunityReport>,
    entities: Option<Vec<Entity>>,
    num_tokens_fn: fn(&str) -> usize,
}

impl GlobalCommunityContext {
    pub fn new(
        community_reports: Vec<CommunityReport>,
        entities: Option<Vec<Entity>>,
        num_tokens_fn: fn(&str) -> usize,
    ) -> Self {
        GlobalCommunityContext {
            community_reports,
            entities,
            num_tokens_fn,
        }
    }

    pub fn build_context(
        &self,
        context_builder_params: &CommunityContextBuilderParams,
    ) -> anyhow::Result<(Vec<String>, HashMap<String, DataFrame>)> {
        build_community_context(
            &self.community_reports,
            self.entities.as_deref(),
            self.num_tokens_fn,
            context_builder_params,
            false,
        )
    }
}

struct ReportRecord {
    fields: Vec<String>,
    weight: f64,
    rank: f64,
}

/// Packs community reports into delimited text batches under
/// `params.max_tokens`. With `single_batch` only the first batch is produced.
/// Rows inside a batch are ordered by weight then rank, both descending.
pub fn build_community_context(
    community_reports: &[CommunityReport],
    entities: Option<&[Entity]>,
    num_tokens_fn: fn(&str) -> usize,
    params: &CommunityContextBuilderParams,
    single_batch: bool,
) -> anyhow::Result<(Vec<String>, HashMap<String, DataFrame>)> {
    let CommunityContextBuilderParams {
        use_community_summary,
        column_delimiter,
        shuffle_data,
        include_community_rank,
        min_community_rank,
        community_rank_name,
        include_community_weight,
        community_weight_name,
        normalize_community_weight,
        max_tokens,
        context_name,
        random_state,
    } = params;
    let column_delimiter = column_delimiter.as_str();

    let mut community_reports = community_reports.to_vec();

    let compute_community_weights = entities.map(|e| !e.is_empty()).unwrap_or(false)
        && !community_reports.is_empty()
        && *include_community_weight
        && community_reports[0]
            .attributes
            .as_ref()
            .map(|attrs| !attrs.contains_key(community_weight_name))
            .unwrap_or(true);

    if let (true, Some(entities)) = (compute_community_weights, entities) {
        compute_weights(
            &mut community_reports,
            entities,
            community_weight_name,
            *normalize_community_weight,
        );
    }

    let min_rank = *min_community_rank as f64;
    let mut selected_reports: Vec<CommunityReport> = community_reports
        .iter()
        .filter(|report| report.rank.map(|rank| rank >= min_rank).unwrap_or(false))
        .cloned()
        .collect();

    if selected_reports.is_empty() {
        return Ok((Vec::new(), HashMap::new()));
    }

    if *shuffle_data {
        let mut rng = StdRng::seed_from_u64(*random_state);
        selected_reports.shuffle(&mut rng);
    }

    let mut header = vec!["id".to_string(), "title".to_string()];
    let mut attribute_cols: Vec<String> = selected_reports[0]
        .attributes
        .as_ref()
        .map(|attrs| attrs.keys().filter(|key| !header.contains(*key)).cloned().collect())
        .unwrap_or_default();
    attribute_cols.sort();
    if !include_community_weight {
        attribute_cols.retain(|col| col != community_weight_name);
    }
    header.extend(attribute_cols.iter().cloned());
    header.push(if *use_community_summary { "summary" } else { "content" }.to_string());
    if *include_community_rank {
        header.push(community_rank_name.clone());
    }

    let batch_header = format!("-----{}-----\n{}\n", context_name, header.join(column_delimiter));
    let header_tokens = num_tokens_fn(&batch_header);

    let mut all_context_text: Vec<String> = Vec::new();
    let mut all_context_records: Vec<Vec<String>> = Vec::new();

    let mut batch_records: Vec<ReportRecord> = Vec::new();
    let mut batch_tokens = header_tokens;
    let mut stopped_early = false;

    let mut cut_batch = |batch_records: &mut Vec<ReportRecord>| {
        if batch_records.is_empty() {
            return;
        }

        batch_records.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then(b.rank.partial_cmp(&a.rank).unwrap_or(Ordering::Equal))
        });

        let mut batch_text = batch_header.clone();
        for record in batch_records.drain(..) {
            batch_text.push_str(&record.fields.join(column_delimiter));
            batch_text.push('\n');
            all_context_records.push(record.fields);
        }
        all_context_text.push(batch_text);
    };

    for report in &selected_reports {
        let mut fields = vec![report.short_id.clone().unwrap_or_default(), report.title.clone()];
        for field in &attribute_cols {
            fields.push(
                report
                    .attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(field))
                    .cloned()
                    .unwrap_or_default(),
            );
        }
        fields.push(if *use_community_summary {
            report.summary.clone()
        } else {
            report.full_content.clone()
        });
        if *include_community_rank {
            fields.push(report.rank.unwrap_or_default().to_string());
        }

        let new_context_text = format!("{}\n", fields.join(column_delimiter));
        let new_tokens = num_tokens_fn(&new_context_text);

        if batch_tokens + new_tokens > *max_tokens && !batch_records.is_empty() {
            cut_batch(&mut batch_records);
            if single_batch {
                stopped_early = true;
                break;
            }
            batch_tokens = header_tokens;
        }

        let weight = if *include_community_weight {
            report
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get(community_weight_name))
                .and_then(|w| w.parse::<f64>().ok())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let rank = if *include_community_rank {
            report.rank.unwrap_or(0.0)
        } else {
            0.0
        };

        batch_records.push(ReportRecord { fields, weight, rank });
        batch_tokens += new_tokens;
    }

    if !stopped_early {
        cut_batch(&mut batch_records);
    }

    let mut numeric_columns = vec![community_weight_name.as_str()];
    if *include_community_rank {
        numeric_columns.push(community_rank_name.as_str());
    }
    let record_df = records_to_dataframe(&header, &all_context_records, &numeric_columns)?;

    Ok((
        all_context_text,
        HashMap::from([(context_name.to_lowercase(), record_df)]),
    ))
}

/// A community's weight is the number of distinct text units mentioning its
/// entities, optionally divided by the largest weight.
fn compute_weights(
    community_reports: &mut [CommunityReport],
    entities: &[Entity],
    weight_attribute: &str,
    normalize: bool,
) {
    let mut community_text_units: HashMap<&str, HashSet<&str>> = HashMap::new();
    for entity in entities {
        let (Some(community_ids), Some(text_unit_ids)) = (&entity.community_ids, &entity.text_unit_ids) else {
            continue;
        };
        for community_id in community_ids {
            community_text_units
                .entry(community_id.as_str())
                .or_default()
                .extend(text_unit_ids.iter().map(|id| id.as_str()));
        }
    }

    let weights: Vec<f64> = community_reports
        .iter()
        .map(|report| {
            community_text_units
                .get(report.community_id.as_str())
                .map(|units| units.len() as f64)
                .unwrap_or(0.0)
        })
        .collect();

    let max_weight = weights.iter().cloned().fold(0.0f64, f64::max);

    for (report, weight) in community_reports.iter_mut().zip(weights) {
        let weight = if normalize && max_weight > 0.0 {
            weight / max_weight
        } else {
            weight
        };
        report
            .attributes
            .get_or_insert_with(HashMap::new)
            .insert(weight_attribute.to_string(), weight.to_string());
    }
}
