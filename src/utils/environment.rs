use std::{env, path::PathBuf, str::FromStr, time::Duration};

use graphrag_index::{extractors::community_reports::CommunityReportsConfig, graph::clustering::ClusterGraphConfig};

#[derive(Debug, Clone)]
pub struct GraphRagEnvironment {
    pub input_dir: PathBuf,
    pub community_level: u32,
    pub response_type: String,
    /// Map calls in flight at once during a global search.
    pub concurrency: usize,
    pub global_context_max_tokens: usize,
    pub global_data_max_tokens: usize,
    pub map_max_tokens: u32,
    pub reduce_max_tokens: u32,
    pub local_context_max_tokens: usize,
    pub local_max_tokens: u32,
    pub search_timeout: Option<Duration>,
    pub cluster_graph: ClusterGraphConfig,
    pub community_reports: CommunityReportsConfig,
}

impl Default for GraphRagEnvironment {
    fn default() -> Self {
        GraphRagEnvironment {
            input_dir: PathBuf::from("./output"),
            community_level: 2,
            response_type: "multiple paragraphs".to_string(),
            concurrency: 32,
            global_context_max_tokens: 12_000,
            global_data_max_tokens: 12_000,
            map_max_tokens: 1000,
            reduce_max_tokens: 2000,
            local_context_max_tokens: 12_000,
            local_max_tokens: 2000,
            search_timeout: None,
            cluster_graph: ClusterGraphConfig::default(),
            community_reports: CommunityReportsConfig::default(),
        }
    }
}

impl GraphRagEnvironment {
    /// Builds the environment from `lookup`, keeping the default for every
    /// variable that is absent or doesn't parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = GraphRagEnvironment::default();
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        fn parsed<T: FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|value| value.parse().ok()).unwrap_or(default)
        }

        GraphRagEnvironment {
            input_dir: read("GRAPHRAG_INPUT_DIR").map(PathBuf::from).unwrap_or(defaults.input_dir),
            community_level: parsed(read("GRAPHRAG_COMMUNITY_LEVEL"), defaults.community_level),
            response_type: read("GRAPHRAG_RESPONSE_TYPE").unwrap_or(defaults.response_type),
            concurrency: parsed(read("GRAPHRAG_CONCURRENCY"), defaults.concurrency),
            global_context_max_tokens: parsed(
                read("GRAPHRAG_GLOBAL_CONTEXT_MAX_TOKENS"),
                defaults.global_context_max_tokens,
            ),
            global_data_max_tokens: parsed(read("GRAPHRAG_GLOBAL_DATA_MAX_TOKENS"), defaults.global_data_max_tokens),
            map_max_tokens: parsed(read("GRAPHRAG_MAP_MAX_TOKENS"), defaults.map_max_tokens),
            reduce_max_tokens: parsed(read("GRAPHRAG_REDUCE_MAX_TOKENS"), defaults.reduce_max_tokens),
            local_context_max_tokens: parsed(
                read("GRAPHRAG_LOCAL_CONTEXT_MAX_TOKENS"),
                defaults.local_context_max_tokens,
            ),
            local_max_tokens: parsed(read("GRAPHRAG_LOCAL_MAX_TOKENS"), defaults.local_max_tokens),
            search_timeout: read("GRAPHRAG_SEARCH_TIMEOUT_SECS")
                .and_then(|secs| secs.parse::<u64>().ok())
                .map(Duration::from_secs)
                .or(defaults.search_timeout),
            cluster_graph: ClusterGraphConfig {
                max_cluster_size: parsed(read("GRAPHRAG_MAX_CLUSTER_SIZE"), defaults.cluster_graph.max_cluster_size),
                seed: parsed(read("GRAPHRAG_CLUSTER_SEED"), defaults.cluster_graph.seed),
                ..defaults.cluster_graph
            },
            community_reports: CommunityReportsConfig {
                max_gleanings: parsed(read("GRAPHRAG_MAX_GLEANINGS"), defaults.community_reports.max_gleanings),
                ..defaults.community_reports
            },
        }
    }
}

pub fn fetch_graphrag_environment() -> GraphRagEnvironment {
    GraphRagEnvironment::from_lookup(|key| env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_environment_overrides_and_defaults() {
        let vars = HashMap::from([
            ("GRAPHRAG_INPUT_DIR", "/data/index"),
            ("GRAPHRAG_COMMUNITY_LEVEL", "1"),
            ("GRAPHRAG_CONCURRENCY", "not a number"),
            ("GRAPHRAG_SEARCH_TIMEOUT_SECS", "30"),
            ("GRAPHRAG_MAX_GLEANINGS", "3"),
        ]);

        let environment = GraphRagEnvironment::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(environment.input_dir, PathBuf::from("/data/index"));
        assert_eq!(environment.community_level, 1);
        assert_eq!(environment.concurrency, 32);
        assert_eq!(environment.search_timeout, Some(Duration::from_secs(30)));
        assert_eq!(environment.community_reports.max_gleanings, 3);
        assert_eq!(environment.community_reports.max_input_length, 8000);
        assert_eq!(environment.cluster_graph.seed, 0xDEADBEEF);
    }
}
