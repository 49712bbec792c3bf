use std::{
    fs::File,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use graphrag::{
    api::{search_global, search_local, SearchContext, SearchTables},
    utils::environment::GraphRagEnvironment,
};
use graphrag_primitives::{
    errors::LLMProviderError,
    llm::base::{BaseLLM, BaseLLMCallback, BaseTextEmbedding, GlobalSearchPhase, LLMParams, LLMResponse, MessageType},
};
use polars::{df, frame::DataFrame, prelude::ParquetWriter};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct HarborLLM {
    calls: Arc<Mutex<Vec<Option<GlobalSearchPhase>>>>,
    /// Map prompts containing this text fail.
    fail_map_on: Option<&'static str>,
}

#[async_trait]
impl BaseLLM for HarborLLM {
    async fn agenerate(
        &self,
        messages: MessageType,
        _streaming: bool,
        _callbacks: Option<Vec<BaseLLMCallback>>,
        _llm_params: LLMParams,
        search_phase: Option<GlobalSearchPhase>,
    ) -> Result<LLMResponse, LLMProviderError> {
        self.calls.lock().unwrap().push(search_phase);
        let prompt = messages.joined_content();
        match search_phase {
            Some(GlobalSearchPhase::Map) if self.fail_map_on.is_some_and(|text| prompt.contains(text)) => {
                Err(LLMProviderError::Fatal("map call refused".to_string()))
            }
            Some(GlobalSearchPhase::Map) => Ok(LLMResponse::new(
                r#"{"points": [{"description": "The harbor drives the town economy", "score": 80}]}"#,
            )),
            _ => Ok(LLMResponse::new("Final answer")),
        }
    }
}

struct FixedEmbedder;

#[async_trait]
impl BaseTextEmbedding for FixedEmbedder {
    async fn aembed(&self, _text: &str) -> Result<Vec<f32>, LLMProviderError> {
        Ok(vec![1.0, 0.0])
    }
}

fn write_parquet(dir: &Path, name: &str, mut df: DataFrame) {
    let mut file = File::create(dir.join(name)).unwrap();
    ParquetWriter::new(&mut file).finish(&mut df).unwrap();
}

fn write_index(dir: &Path) {
    write_parquet(
        dir,
        "create_final_entities.parquet",
        df!(
            "id" => ["e-harbor", "e-fleet", "e-market"],
            "name" => ["HARBOR", "FLEET", "MARKET"],
            "type" => ["PLACE", "ORGANIZATION", "PLACE"],
            "description" => ["The town harbor", "The fishing fleet", "The fish market"],
            "text_unit_ids" => ["t1", "t1", "t2"],
        )
        .unwrap(),
    );
    write_parquet(
        dir,
        "create_final_nodes.parquet",
        df!(
            "title" => ["HARBOR", "FLEET", "MARKET"],
            "level" => ["level_0", "level_0", "level_0"],
            "degree" => [2i64, 1, 1],
            "community" => [0i64, 0, 1],
        )
        .unwrap(),
    );
    write_parquet(
        dir,
        "create_final_relationships.parquet",
        df!(
            "id" => ["r1", "r2"],
            "source" => ["HARBOR", "HARBOR"],
            "target" => ["FLEET", "MARKET"],
            "description" => ["The fleet docks at the harbor", "The market sits by the harbor"],
            "weight" => [2.0, 1.0],
            "text_unit_ids" => ["t1", "t2"],
        )
        .unwrap(),
    );
    write_parquet(
        dir,
        "create_final_community_reports.parquet",
        df!(
            "community_id" => ["0", "1"],
            "title" => ["Harbor and fleet", "Market"],
            "summary" => ["The harbor hosts the fleet", "The market trades fish"],
            "full_content" => ["# Harbor and fleet\n\nThe harbor hosts the fleet.", "# Market\n\nThe market trades fish."],
            "rank" => [7.0, 3.0],
            "level" => ["level_0", "level_0"],
        )
        .unwrap(),
    );
}

fn search_context(tables: SearchTables, llm: &HarborLLM) -> SearchContext {
    SearchContext {
        tables,
        llm: Arc::new(llm.clone()),
        text_embedder: Arc::new(FixedEmbedder),
        environment: GraphRagEnvironment::default(),
        cancellation_token: CancellationToken::new(),
    }
}

#[test]
fn test_load_requires_the_core_tables() {
    let dir = tempfile::tempdir().unwrap();
    assert!(SearchTables::load(dir.path()).is_err());

    write_index(dir.path());
    let tables = SearchTables::load(dir.path()).unwrap();
    assert_eq!(tables.entities.len(), 3);
    assert_eq!(tables.community_reports.len(), 2);
    assert!(tables.text_units.is_none());
    assert!(tables.covariates.is_none());
}

#[tokio::test]
async fn test_global_search_over_loaded_tables() {
    graphrag::utils::logging::init_default_tracing();
    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path());

    let llm = HarborLLM::default();
    let ctx = search_context(SearchTables::load(dir.path()).unwrap(), &llm);

    let response = search_global(&ctx, "What drives the town?", 0, "multiple paragraphs")
        .await
        .unwrap();

    assert_eq!(response.response_text, "Final answer");
    assert!(response.context_text.contains("The harbor drives the town economy"));
    assert!(response.empty_context.is_none());
    assert_eq!(response.failed_map_calls, 0);

    let calls = llm.calls.lock().unwrap();
    assert!(calls.iter().any(|phase| *phase == Some(GlobalSearchPhase::Map)));
    assert_eq!(
        calls.iter().filter(|phase| **phase == Some(GlobalSearchPhase::Reduce)).count(),
        1
    );
}

#[tokio::test]
async fn test_local_search_without_embeddings_reports_empty_context() {
    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path());

    let llm = HarborLLM::default();
    let ctx = search_context(SearchTables::load(dir.path()).unwrap(), &llm);

    let response = search_local(&ctx, "Who docks at the harbor?", 0, "multiple paragraphs")
        .await
        .unwrap();

    assert!(response.empty_context.is_some());
    assert!(llm.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_global_search_counts_failed_map_calls() {
    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path());

    let llm = HarborLLM {
        fail_map_on: Some("The market trades fish"),
        ..Default::default()
    };
    let mut ctx = search_context(SearchTables::load(dir.path()).unwrap(), &llm);
    // One report per batch.
    ctx.environment.global_context_max_tokens = 1;

    let response = search_global(&ctx, "What drives the town?", 0, "multiple paragraphs")
        .await
        .unwrap();

    assert_eq!(response.response_text, "Final answer");
    assert_eq!(response.failed_map_calls, 1);
    let map_calls = llm
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|phase| **phase == Some(GlobalSearchPhase::Map))
        .count();
    assert_eq!(map_calls, 2);
}

#[tokio::test]
async fn test_search_context_from_process_environment() {
    let dir = tempfile::tempdir().unwrap();
    write_index(dir.path());

    std::env::set_var("GRAPHRAG_INPUT_DIR", dir.path());
    std::env::set_var("GRAPHRAG_COMMUNITY_LEVEL", "0");
    std::env::set_var("GRAPHRAG_RESPONSE_TYPE", "single paragraph");

    let llm = HarborLLM::default();
    let ctx = SearchContext::from_process_environment(
        Arc::new(llm.clone()),
        Arc::new(FixedEmbedder),
        CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(ctx.environment.input_dir, dir.path());
    assert_eq!(ctx.environment.community_level, 0);
    assert_eq!(ctx.tables.community_reports.len(), 2);

    let global = ctx.global_search("What drives the town?").await.unwrap();
    assert_eq!(global.response_text, "Final answer");

    let local = ctx.local_search("Who docks at the harbor?").await.unwrap();
    assert!(local.empty_context.is_some());
}
