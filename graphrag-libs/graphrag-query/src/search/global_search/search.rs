use std::{cmp::Ordering, sync::Arc, time::Duration};

use futures::future::join_all;
use graphrag_primitives::{
    errors::GraphRagError,
    llm::base::{BaseLLM, GlobalSearchPhase, LLMParams, MessageType},
    utils::{
        json::parse_json_object,
        logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
    },
};
use tokio::{
    sync::Semaphore,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    context_builder::community_context::{CommunityContextBuilderParams, GlobalCommunityContext},
    search::base::{ContextData, ContextText, KeyPoint, ResponseType},
};

use super::{
    callbacks::GlobalSearchCallback,
    prompts::{GENERAL_KNOWLEDGE_INSTRUCTION, MAP_SYSTEM_PROMPT, NO_DATA_ANSWER, REDUCE_SYSTEM_PROMPT},
};

#[derive(Debug, Clone, PartialEq)]
pub enum MapStatus {
    Succeeded,
    Failed { reason: String },
}

/// Outcome of one map call over one batch of community reports.
#[derive(Debug, Clone)]
pub struct MapResponse {
    pub batch: usize,
    pub key_points: Vec<KeyPoint>,
    pub context_text: String,
    pub status: MapStatus,
    pub completion_time: f64,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
}

impl MapResponse {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, MapStatus::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct GlobalSearchResult {
    pub response: ResponseType,
    pub context_data: ContextData,
    pub context_text: ContextText,
    pub completion_time: f64,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
    pub map_responses: Vec<MapResponse>,
    pub reduce_context_data: ContextData,
    pub reduce_context_text: ContextText,
}

struct ReduceResponse {
    response: String,
    context_text: String,
    llm_calls: usize,
    prompt_tokens: usize,
}

pub struct GlobalSearchParams {
    pub llm: Arc<dyn BaseLLM>,
    pub context_builder: GlobalCommunityContext,
    pub num_tokens_fn: fn(&str) -> usize,
    pub map_system_prompt: Option<String>,
    pub reduce_system_prompt: Option<String>,
    pub response_type: String,
    pub allow_general_knowledge: bool,
    pub general_knowledge_inclusion_prompt: Option<String>,
    pub callbacks: Option<Vec<Arc<dyn GlobalSearchCallback>>>,
    pub max_data_tokens: usize,
    pub map_llm_params: LLMParams,
    pub reduce_llm_params: LLMParams,
    pub context_builder_params: CommunityContextBuilderParams,
    pub concurrent_coroutines: usize,
    /// Map calls still pending when this elapses count as failed.
    pub map_timeout: Option<Duration>,
}

/// Map-reduce search over community reports.
///
/// Holds only configuration and read-only report data, so one engine can
/// serve concurrent requests. The concurrency limit applies per request.
pub struct GlobalSearch {
    llm: Arc<dyn BaseLLM>,
    context_builder: GlobalCommunityContext,
    num_tokens_fn: fn(&str) -> usize,
    map_system_prompt: String,
    reduce_system_prompt: String,
    response_type: String,
    allow_general_knowledge: bool,
    general_knowledge_inclusion_prompt: String,
    callbacks: Vec<Arc<dyn GlobalSearchCallback>>,
    max_data_tokens: usize,
    map_llm_params: LLMParams,
    reduce_llm_params: LLMParams,
    context_builder_params: CommunityContextBuilderParams,
    concurrent_coroutines: usize,
    map_timeout: Option<Duration>,
}

impl GlobalSearch {
    pub fn new(global_search_params: GlobalSearchParams) -> Self {
        let GlobalSearchParams {
            llm,
            context_builder,
            num_tokens_fn,
            map_system_prompt,
            reduce_system_prompt,
            response_type,
            allow_general_knowledge,
            general_knowledge_inclusion_prompt,
            callbacks,
            max_data_tokens,
            map_llm_params,
            reduce_llm_params,
            context_builder_params,
            concurrent_coroutines,
            map_timeout,
        } = global_search_params;

        GlobalSearch {
            llm,
            context_builder,
            num_tokens_fn,
            map_system_prompt: map_system_prompt.unwrap_or(MAP_SYSTEM_PROMPT.to_string()),
            reduce_system_prompt: reduce_system_prompt.unwrap_or(REDUCE_SYSTEM_PROMPT.to_string()),
            response_type,
            allow_general_knowledge,
            general_knowledge_inclusion_prompt: general_knowledge_inclusion_prompt
                .unwrap_or(GENERAL_KNOWLEDGE_INSTRUCTION.to_string()),
            callbacks: callbacks.unwrap_or_default(),
            max_data_tokens,
            map_llm_params,
            reduce_llm_params,
            context_builder_params,
            concurrent_coroutines: concurrent_coroutines.max(1),
            map_timeout,
        }
    }

    #[instrument(skip(self, cancellation_token))]
    pub async fn asearch(
        &self,
        query: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<GlobalSearchResult, GraphRagError> {
        // Step 1: Generate answers for each batch of community reports
        let start_time = std::time::Instant::now();
        let (context_chunks, context_records) = self.context_builder.build_context(&self.context_builder_params)?;

        for callback in &self.callbacks {
            callback.on_map_response_start(&context_chunks);
        }

        let semaphore = Semaphore::new(self.concurrent_coroutines);
        let deadline = self.map_timeout.map(|timeout| Instant::now() + timeout);

        let map_responses: Vec<MapResponse> = join_all(
            context_chunks
                .iter()
                .enumerate()
                .map(|(batch, data)| self.map_response_single_batch(batch, data, query, &semaphore, cancellation_token, deadline)),
        )
        .await;

        for callback in &self.callbacks {
            callback.on_map_response_end(&map_responses);
        }

        // Batches still pending at cancellation are already marked failed.
        if cancellation_token.is_cancelled() {
            graphrag_log(
                GraphRagLogOption::Search,
                GraphRagLogLevel::Info,
                "Search cancelled during the map phase",
            );
        }

        let failed = map_responses.iter().filter(|response| response.is_failed()).count();
        if !map_responses.is_empty() && failed == map_responses.len() {
            graphrag_log(
                GraphRagLogOption::Search,
                GraphRagLogLevel::Error,
                &format!("All {} map calls failed", failed),
            );
            return Err(GraphRagError::AllMapCallsFailed { attempted: failed });
        }

        let map_llm_calls: usize = map_responses.iter().map(|response| response.llm_calls).sum();
        let map_prompt_tokens: usize = map_responses.iter().map(|response| response.prompt_tokens).sum();

        // Step 2: Combine the intermediate answers into the final answer
        let reduce_response = self.reduce_response(&map_responses, query, cancellation_token).await?;

        Ok(GlobalSearchResult {
            response: ResponseType::String(reduce_response.response),
            context_data: ContextData::Dictionary(context_records),
            context_text: ContextText::Strings(context_chunks),
            completion_time: start_time.elapsed().as_secs_f64(),
            llm_calls: map_llm_calls + reduce_response.llm_calls,
            prompt_tokens: map_prompt_tokens + reduce_response.prompt_tokens,
            map_responses,
            reduce_context_data: ContextData::String(reduce_response.context_text.clone()),
            reduce_context_text: ContextText::String(reduce_response.context_text),
        })
    }

    async fn map_response_single_batch(
        &self,
        batch: usize,
        context_data: &str,
        query: &str,
        semaphore: &Semaphore,
        cancellation_token: &CancellationToken,
        deadline: Option<Instant>,
    ) -> MapResponse {
        let start_time = std::time::Instant::now();
        let search_prompt = self.map_system_prompt.replace("{context_data}", context_data);
        let prompt_tokens = (self.num_tokens_fn)(&search_prompt);
        let search_messages = MessageType::system_and_user(&search_prompt, query);

        let call = async {
            let _permit = semaphore.acquire().await.map_err(|e| e.to_string())?;
            self.llm
                .agenerate(
                    search_messages,
                    false,
                    None,
                    self.map_llm_params.clone(),
                    Some(GlobalSearchPhase::Map),
                )
                .await
                .map_err(|e| e.to_string())
        };

        let timeout = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => Err("search cancelled".to_string()),
            _ = timeout => Err("map call timed out".to_string()),
            response = call => response,
        };

        let (key_points, status, llm_calls) = match outcome {
            Ok(response) => (parse_search_response(batch, &response.text), MapStatus::Succeeded, 1),
            Err(reason) => {
                graphrag_log(
                    GraphRagLogOption::Search,
                    GraphRagLogLevel::Error,
                    &format!("Map call for batch {} failed: {}", batch, reason),
                );
                (Vec::new(), MapStatus::Failed { reason }, 0)
            }
        };

        MapResponse {
            batch,
            key_points,
            context_text: context_data.to_string(),
            status,
            completion_time: start_time.elapsed().as_secs_f64(),
            llm_calls,
            prompt_tokens,
        }
    }

    async fn reduce_response(
        &self,
        map_responses: &[MapResponse],
        query: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<ReduceResponse, GraphRagError> {
        let mut key_points: Vec<KeyPoint> = map_responses
            .iter()
            .flat_map(|response| response.key_points.iter())
            .filter(|point| point.score > 0.0)
            .cloned()
            .collect();

        if key_points.is_empty() && !self.allow_general_knowledge {
            graphrag_log(
                GraphRagLogOption::Search,
                GraphRagLogLevel::Info,
                "No key points with a positive score, returning the no-data answer",
            );
            return Ok(ReduceResponse {
                response: NO_DATA_ANSWER.to_string(),
                context_text: String::new(),
                llm_calls: 0,
                prompt_tokens: 0,
            });
        }

        key_points.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let text_data = pack_key_points(&key_points, self.num_tokens_fn, self.max_data_tokens);

        let mut search_prompt = self
            .reduce_system_prompt
            .replace("{report_data}", &text_data)
            .replace("{response_type}", &self.response_type);
        if self.allow_general_knowledge {
            search_prompt.push('\n');
            search_prompt.push_str(&self.general_knowledge_inclusion_prompt);
        }
        let prompt_tokens = (self.num_tokens_fn)(&search_prompt);
        let search_messages = MessageType::system_and_user(&search_prompt, query);

        let response = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => return Err(GraphRagError::SearchCancelled),
            response = self.llm.agenerate(
                search_messages,
                false,
                None,
                self.reduce_llm_params.clone(),
                Some(GlobalSearchPhase::Reduce),
            ) => response?,
        };

        Ok(ReduceResponse {
            response: response.text,
            context_text: text_data,
            llm_calls: 1,
            prompt_tokens,
        })
    }
}

/// Renders key points best first until `max_data_tokens` is reached.
pub fn pack_key_points(key_points: &[KeyPoint], num_tokens_fn: fn(&str) -> usize, max_data_tokens: usize) -> String {
    let mut data = Vec::new();
    let mut total_tokens = 0;

    for point in key_points {
        let formatted_response_data = format!(
            "----Analyst {}----\nImportance Score: {}\n{}",
            point.analyst + 1,
            point.score,
            point.answer
        );
        let formatted_response_tokens = num_tokens_fn(&formatted_response_data);
        if total_tokens + formatted_response_tokens > max_data_tokens {
            break;
        }
        data.push(formatted_response_data);
        total_tokens += formatted_response_tokens;
    }

    data.join("\n\n")
}

/// Key points of a map response. Anything that doesn't parse yields no points.
pub fn parse_search_response(analyst: usize, search_response: &str) -> Vec<KeyPoint> {
    let parsed = match parse_json_object(search_response) {
        Ok(parsed) => parsed,
        Err(e) => {
            graphrag_log(
                GraphRagLogOption::Search,
                GraphRagLogLevel::Debug,
                &format!("Unparsable map response for batch {}: {}", analyst, e),
            );
            return Vec::new();
        }
    };

    let Some(points) = parsed.get("points").and_then(|points| points.as_array()) else {
        return Vec::new();
    };

    points
        .iter()
        .filter_map(|point| {
            let answer = point.get("description")?.as_str()?.to_string();
            let score = match point.get("score")? {
                serde_json::Value::Number(score) => score.as_f64()?,
                serde_json::Value::String(score) => score.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            Some(KeyPoint { analyst, answer, score })
        })
        .collect()
}
