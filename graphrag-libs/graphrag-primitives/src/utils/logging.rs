#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRagLogOption {
    Graph,
    Embedding,
    Clustering,
    Reports,
    Adapters,
    Search,
    LLM,
    Tests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRagLogLevel {
    Error,
    Info,
    Debug,
}

pub fn graphrag_log(option: GraphRagLogOption, level: GraphRagLogLevel, message: &str) {
    let span = tracing::span!(tracing::Level::INFO, "graphrag", option = tracing::field::debug(option));
    let _enter = span.enter();
    match level {
        GraphRagLogLevel::Error => tracing::error!("{}", message),
        GraphRagLogLevel::Info => tracing::info!("{}", message),
        GraphRagLogLevel::Debug => tracing::debug!("{}", message),
    };
}
