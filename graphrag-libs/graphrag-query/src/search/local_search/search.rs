use std::{collections::HashMap, sync::Arc, time::Instant};

use graphrag_primitives::{
    errors::GraphRagError,
    llm::base::{BaseLLM, LLMParams, MessageType},
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::search::base::{ContextData, ContextText, ResponseType};

use super::{
    mixed_context::{LocalSearchMixedContext, MixedContext, MixedContextBuilderParams},
    prompts::{EMPTY_CONTEXT_ANSWER, LOCAL_SEARCH_SYSTEM_PROMPT},
};

#[derive(Debug, Clone, PartialEq)]
pub enum LocalSearchState {
    Answered,
    /// No context could be assembled; the model was not called.
    EmptyContext { reason: String },
}

#[derive(Debug, Clone)]
pub struct LocalSearchResult {
    pub state: LocalSearchState,
    pub response: ResponseType,
    pub context_data: ContextData,
    pub context_text: ContextText,
    pub completion_time: f64,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
}

pub struct LocalSearch {
    llm: Arc<dyn BaseLLM>,
    context_builder: LocalSearchMixedContext,
    num_tokens_fn: fn(&str) -> usize,
    system_prompt: String,
    response_type: String,
    llm_params: LLMParams,
    context_builder_params: MixedContextBuilderParams,
}

impl LocalSearch {
    pub fn new(
        llm: Arc<dyn BaseLLM>,
        context_builder: LocalSearchMixedContext,
        num_tokens_fn: fn(&str) -> usize,
        llm_params: LLMParams,
        context_builder_params: MixedContextBuilderParams,
        response_type: String,
        system_prompt: Option<String>,
    ) -> Self {
        let system_prompt = system_prompt.unwrap_or(LOCAL_SEARCH_SYSTEM_PROMPT.to_string());

        LocalSearch {
            llm,
            context_builder,
            num_tokens_fn,
            system_prompt,
            response_type,
            llm_params,
            context_builder_params,
        }
    }

    #[instrument(skip(self, cancellation_token))]
    pub async fn asearch(
        &self,
        query: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<LocalSearchResult, GraphRagError> {
        let start_time = Instant::now();

        let context = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => return Err(GraphRagError::SearchCancelled),
            context = self.context_builder.build_context(query, &self.context_builder_params) => context?,
        };

        let (context_text, context_records) = match context {
            MixedContext::Context {
                context_text,
                context_records,
                ..
            } => (context_text, context_records),
            MixedContext::Empty { reason } => {
                graphrag_log(
                    GraphRagLogOption::Search,
                    GraphRagLogLevel::Info,
                    &format!("Local search has no context: {}", reason),
                );
                return Ok(LocalSearchResult {
                    state: LocalSearchState::EmptyContext { reason },
                    response: ResponseType::String(EMPTY_CONTEXT_ANSWER.to_string()),
                    context_data: ContextData::Dictionary(HashMap::new()),
                    context_text: ContextText::String(String::new()),
                    completion_time: start_time.elapsed().as_secs_f64(),
                    llm_calls: 0,
                    prompt_tokens: 0,
                });
            }
        };

        let search_prompt = self
            .system_prompt
            .replace("{context_data}", &context_text)
            .replace("{response_type}", &self.response_type);
        let search_messages = MessageType::system_and_user(&search_prompt, query);

        let search_response = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => return Err(GraphRagError::SearchCancelled),
            response = self.llm.agenerate(search_messages, false, None, self.llm_params.clone(), None) => response?,
        };

        Ok(LocalSearchResult {
            state: LocalSearchState::Answered,
            response: ResponseType::String(search_response.text),
            context_data: ContextData::Dictionary(context_records),
            context_text: ContextText::String(context_text),
            completion_time: start_time.elapsed().as_secs_f64(),
            llm_calls: 1,
            prompt_tokens: (self.num_tokens_fn)(&search_prompt),
        })
    }
}
