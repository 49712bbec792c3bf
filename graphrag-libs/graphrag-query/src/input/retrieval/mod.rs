pub mod community_reports;
pub mod covariates;
pub mod entities;
pub mod relationships;
pub mod text_units;

use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

/// Builds a frame from row records laid out in `header` order. Columns named in
/// `numeric_columns` are parsed as floats, empty cells become nulls.
pub fn records_to_dataframe(
    header: &[String],
    records: &[Vec<String>],
    numeric_columns: &[&str],
) -> anyhow::Result<DataFrame> {
    if records.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut data_series = Vec::with_capacity(header.len());
    for (column, name) in header.iter().enumerate() {
        let values = records.iter().map(|record| record.get(column).cloned().unwrap_or_default());

        let series = if numeric_columns.contains(&name.as_str()) {
            let values: Vec<Option<f64>> = values.map(|v| v.parse::<f64>().ok()).collect();
            Series::new(name, values)
        } else {
            let values: Vec<String> = values.collect();
            Series::new(name, values)
        };
        data_series.push(series);
    }

    Ok(DataFrame::new(data_series)?)
}

/// Attribute keys of the first record that don't clash with the fixed header.
pub(crate) fn attribute_columns(
    attributes: Option<&std::collections::HashMap<String, String>>,
    header: &[String],
) -> Vec<String> {
    let mut columns: Vec<String> = attributes
        .map(|attributes| attributes.keys().filter(|key| !header.contains(*key)).cloned().collect())
        .unwrap_or_default();
    columns.sort();
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_to_dataframe_keeps_header_order() {
        let header = vec!["id".to_string(), "title".to_string(), "rank".to_string()];
        let records = vec![
            vec!["1".to_string(), "A".to_string(), "2.5".to_string()],
            vec!["2".to_string(), "B".to_string(), String::new()],
        ];

        let df = records_to_dataframe(&header, &records, &["rank"]).unwrap();
        assert_eq!(df.get_column_names(), vec!["id", "title", "rank"]);
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("rank").unwrap().null_count(), 1);
    }

    #[test]
    fn test_empty_records_give_empty_frame() {
        let df = records_to_dataframe(&["id".to_string()], &[], &[]).unwrap();
        assert_eq!(df.height(), 0);
    }
}
