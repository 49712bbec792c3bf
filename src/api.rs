use std::{path::Path, sync::Arc};

use anyhow::Context;
use graphrag_primitives::{
    errors::GraphRagError,
    llm::{
        base::{BaseLLM, BaseTextEmbedding, LLMParams},
        utils::num_tokens,
    },
    tables::{CommunityReportRow, CovariateRow, EntityRow, NodeRow, RelationshipRow, TextUnitRow},
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use graphrag_query::{
    context_builder::community_context::{CommunityContextBuilderParams, GlobalCommunityContext},
    indexer_adapters::{
        read_indexer_covariates, read_indexer_entities, read_indexer_relationships, read_indexer_reports,
        read_indexer_text_units,
    },
    input::{
        loaders::dfs::{
            read_community_report_rows, read_covariate_rows, read_entity_rows, read_node_rows, read_parquet,
            read_relationship_rows, read_text_unit_rows, store_entity_semantic_embeddings,
        },
        retrieval::{entities::EntityKey, relationships::RankAggregation},
    },
    search::{
        global_search::search::{GlobalSearch, GlobalSearchParams},
        local_search::{
            mixed_context::{LocalSearchMixedContext, MixedContextBuilderParams},
            search::{LocalSearch, LocalSearchState},
        },
    },
    vector_stores::in_memory::InMemoryVectorStore,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::utils::environment::{fetch_graphrag_environment, GraphRagEnvironment};

const ENTITIES_TABLE: &str = "create_final_entities.parquet";
const NODES_TABLE: &str = "create_final_nodes.parquet";
const RELATIONSHIPS_TABLE: &str = "create_final_relationships.parquet";
const COMMUNITY_REPORTS_TABLE: &str = "create_final_community_reports.parquet";
const TEXT_UNITS_TABLE: &str = "create_final_text_units.parquet";
const COVARIATES_TABLE: &str = "create_final_covariates.parquet";

/// Indexer output tables read back from a directory of parquet files.
#[derive(Debug, Clone, Default)]
pub struct SearchTables {
    pub entities: Vec<EntityRow>,
    pub nodes: Vec<NodeRow>,
    pub relationships: Vec<RelationshipRow>,
    pub community_reports: Vec<CommunityReportRow>,
    pub text_units: Option<Vec<TextUnitRow>>,
    pub covariates: Option<Vec<CovariateRow>>,
}

impl SearchTables {
    /// Text units and covariates are optional; the other four tables must exist.
    pub fn load(input_dir: &Path) -> anyhow::Result<Self> {
        let required = |name: &str| read_parquet(&input_dir.join(name));
        let optional = |name: &str| -> anyhow::Result<Option<_>> {
            let path = input_dir.join(name);
            if path.exists() {
                Ok(Some(read_parquet(&path)?))
            } else {
                Ok(None)
            }
        };

        let tables = SearchTables {
            entities: read_entity_rows(&required(ENTITIES_TABLE)?).context("entities table")?,
            nodes: read_node_rows(&required(NODES_TABLE)?).context("nodes table")?,
            relationships: read_relationship_rows(&required(RELATIONSHIPS_TABLE)?).context("relationships table")?,
            community_reports: read_community_report_rows(&required(COMMUNITY_REPORTS_TABLE)?)
                .context("community reports table")?,
            text_units: optional(TEXT_UNITS_TABLE)?
                .map(|df| read_text_unit_rows(&df))
                .transpose()
                .context("text units table")?,
            covariates: optional(COVARIATES_TABLE)?
                .map(|df| read_covariate_rows(&df))
                .transpose()
                .context("covariates table")?,
        };

        graphrag_log(
            GraphRagLogOption::Adapters,
            GraphRagLogLevel::Info,
            &format!(
                "Loaded {} entities, {} relationships and {} community reports from {}",
                tables.entities.len(),
                tables.relationships.len(),
                tables.community_reports.len(),
                input_dir.display()
            ),
        );

        Ok(tables)
    }
}

pub struct SearchContext {
    pub tables: SearchTables,
    pub llm: Arc<dyn BaseLLM>,
    pub text_embedder: Arc<dyn BaseTextEmbedding>,
    pub environment: GraphRagEnvironment,
    pub cancellation_token: CancellationToken,
}

impl SearchContext {
    /// Builds the context from the `GRAPHRAG_*` process environment.
    pub fn from_process_environment(
        llm: Arc<dyn BaseLLM>,
        text_embedder: Arc<dyn BaseTextEmbedding>,
        cancellation_token: CancellationToken,
    ) -> Result<Self, GraphRagError> {
        SearchContext::from_environment(fetch_graphrag_environment(), llm, text_embedder, cancellation_token)
    }

    /// Loads the tables from `environment.input_dir`.
    pub fn from_environment(
        environment: GraphRagEnvironment,
        llm: Arc<dyn BaseLLM>,
        text_embedder: Arc<dyn BaseTextEmbedding>,
        cancellation_token: CancellationToken,
    ) -> Result<Self, GraphRagError> {
        let tables = SearchTables::load(&environment.input_dir)?;

        Ok(SearchContext {
            tables,
            llm,
            text_embedder,
            environment,
            cancellation_token,
        })
    }

    /// Global search at the configured community level and response type.
    pub async fn global_search(&self, query: &str) -> Result<SearchResponse, GraphRagError> {
        search_global(
            self,
            query,
            self.environment.community_level,
            &self.environment.response_type,
        )
        .await
    }

    /// Local search at the configured community level and response type.
    pub async fn local_search(&self, query: &str) -> Result<SearchResponse, GraphRagError> {
        search_local(
            self,
            query,
            self.environment.community_level,
            &self.environment.response_type,
        )
        .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub response_text: String,
    pub context_text: String,
    /// Set when local search found nothing to answer from.
    pub empty_context: Option<String>,
    /// Map batches of a global search that produced no points because their
    /// call failed, timed out or was cancelled.
    pub failed_map_calls: usize,
}

/// Map-reduce search over the community reports at or below `community_level`.
#[instrument(skip(ctx))]
pub async fn search_global(
    ctx: &SearchContext,
    query: &str,
    community_level: u32,
    response_type: &str,
) -> Result<SearchResponse, GraphRagError> {
    let environment = &ctx.environment;
    let tables = &ctx.tables;

    let entities = read_indexer_entities(&tables.nodes, &tables.entities, community_level);
    let reports = read_indexer_reports(&tables.community_reports, &tables.nodes, community_level);

    let context_builder = GlobalCommunityContext::new(reports, Some(entities), num_tokens);
    let context_builder_params = CommunityContextBuilderParams {
        max_tokens: environment.global_context_max_tokens,
        ..Default::default()
    };

    let search_engine = GlobalSearch::new(GlobalSearchParams {
        llm: ctx.llm.clone(),
        context_builder,
        num_tokens_fn: num_tokens,
        map_system_prompt: None,
        reduce_system_prompt: None,
        response_type: response_type.to_string(),
        allow_general_knowledge: false,
        general_knowledge_inclusion_prompt: None,
        callbacks: None,
        max_data_tokens: environment.global_data_max_tokens,
        map_llm_params: LLMParams {
            max_tokens: environment.map_max_tokens,
            temperature: 0.0,
            json_mode: true,
        },
        reduce_llm_params: LLMParams {
            max_tokens: environment.reduce_max_tokens,
            temperature: 0.0,
            json_mode: false,
        },
        context_builder_params,
        concurrent_coroutines: environment.concurrency,
        map_timeout: environment.search_timeout,
    });

    let result = search_engine.asearch(query, &ctx.cancellation_token).await?;

    let failed_map_calls = result.map_responses.iter().filter(|response| response.is_failed()).count();
    if failed_map_calls > 0 {
        graphrag_log(
            GraphRagLogOption::Search,
            GraphRagLogLevel::Info,
            &format!(
                "Global search answered from {} of {} batches",
                result.map_responses.len() - failed_map_calls,
                result.map_responses.len()
            ),
        );
    }

    Ok(SearchResponse {
        response_text: result.response.text(),
        context_text: result.reduce_context_text.joined(),
        empty_context: None,
        failed_map_calls,
    })
}

/// Entity-anchored search mixing reports, entities, relationships, claims and
/// source text units.
#[instrument(skip(ctx))]
pub async fn search_local(
    ctx: &SearchContext,
    query: &str,
    community_level: u32,
    response_type: &str,
) -> Result<SearchResponse, GraphRagError> {
    let environment = &ctx.environment;
    let tables = &ctx.tables;

    let entities = read_indexer_entities(&tables.nodes, &tables.entities, community_level);
    let reports = read_indexer_reports(&tables.community_reports, &tables.nodes, community_level);
    let relationships = read_indexer_relationships(&tables.relationships, &entities, RankAggregation::Sum);
    let text_units = tables.text_units.as_deref().map(read_indexer_text_units);
    let covariates = tables.covariates.as_deref().map(read_indexer_covariates);

    let mut description_embedding_store = InMemoryVectorStore::new("entity_description_embeddings");
    store_entity_semantic_embeddings(&entities, &mut description_embedding_store).await?;

    let context_builder = LocalSearchMixedContext::new(
        entities,
        Arc::new(description_embedding_store),
        ctx.text_embedder.clone(),
        text_units,
        Some(reports),
        Some(relationships),
        covariates,
        num_tokens,
        EntityKey::Id,
    );

    let context_builder_params = MixedContextBuilderParams {
        max_tokens: environment.local_context_max_tokens,
        ..Default::default()
    };

    let search_engine = LocalSearch::new(
        ctx.llm.clone(),
        context_builder,
        num_tokens,
        LLMParams {
            max_tokens: environment.local_max_tokens,
            temperature: 0.0,
            json_mode: false,
        },
        context_builder_params,
        response_type.to_string(),
        None,
    );

    let search = search_engine.asearch(query, &ctx.cancellation_token);
    let result = match environment.search_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, search).await {
            Ok(result) => result?,
            Err(_) => {
                graphrag_log(
                    GraphRagLogOption::Search,
                    GraphRagLogLevel::Error,
                    &format!("Local search timed out after {:?}", timeout),
                );
                return Err(GraphRagError::SearchCancelled);
            }
        },
        None => search.await?,
    };

    let empty_context = match result.state {
        LocalSearchState::Answered => None,
        LocalSearchState::EmptyContext { reason } => Some(reason),
    };

    Ok(SearchResponse {
        response_text: result.response.text(),
        context_text: result.context_text.joined(),
        empty_context,
        failed_map_calls: 0,
    })
}
