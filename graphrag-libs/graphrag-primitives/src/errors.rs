use thiserror::Error;

/// Failure kinds reported by completion and embedding providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LLMProviderError {
    #[error("Transient provider error: {0}")]
    Transient(String),
    #[error("Fatal provider error: {0}")]
    Fatal(String),
}

impl LLMProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LLMProviderError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum GraphRagError {
    #[error("Provider error: {0}")]
    Provider(#[from] LLMProviderError),
    #[error("Malformed structured output: {0}")]
    MalformedStructuredOutput(String),
    #[error("All {attempted} map calls failed")]
    AllMapCallsFailed { attempted: usize },
    #[error("Search cancelled")]
    SearchCancelled,
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Table error: {0}")]
    Table(String),
}

impl From<serde_json::Error> for GraphRagError {
    fn from(error: serde_json::Error) -> Self {
        GraphRagError::MalformedStructuredOutput(error.to_string())
    }
}

impl From<anyhow::Error> for GraphRagError {
    fn from(error: anyhow::Error) -> Self {
        GraphRagError::Table(error.to_string())
    }
}
