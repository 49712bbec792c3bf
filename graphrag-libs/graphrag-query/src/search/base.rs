use std::collections::HashMap;

use polars::frame::DataFrame;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseType {
    String(String),
    KeyPoints(Vec<KeyPoint>),
}

impl ResponseType {
    pub fn text(&self) -> String {
        match self {
            ResponseType::String(text) => text.clone(),
            ResponseType::KeyPoints(points) => points
                .iter()
                .map(|point| point.answer.clone())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContextData {
    String(String),
    DataFrames(Vec<DataFrame>),
    Dictionary(HashMap<String, DataFrame>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextText {
    String(String),
    Strings(Vec<String>),
    Dictionary(HashMap<String, String>),
}

impl ContextText {
    /// Single string form, batches separated by blank lines.
    pub fn joined(&self) -> String {
        match self {
            ContextText::String(text) => text.clone(),
            ContextText::Strings(texts) => texts.join("\n\n"),
            ContextText::Dictionary(texts) => {
                let mut keys: Vec<&String> = texts.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|key| texts[key].as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
    }
}

/// A rated partial answer produced by one map call.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPoint {
    /// Index of the batch (analyst) that produced the point.
    pub analyst: usize,
    pub answer: String,
    pub score: f64,
}
