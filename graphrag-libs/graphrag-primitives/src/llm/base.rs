use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LLMProviderError;

#[derive(Debug, Clone, Default)]
pub struct BaseLLMCallback {
    pub response: Vec<String>,
}

impl BaseLLMCallback {
    pub fn on_llm_new_token(&mut self, token: &str) {
        self.response.push(token.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageType {
    String(String),
    Strings(Vec<String>),
    Dictionary(Vec<HashMap<String, String>>),
}

impl MessageType {
    /// A system prompt followed by a user turn.
    pub fn system_and_user(system_prompt: &str, user_message: &str) -> Self {
        MessageType::Dictionary(vec![
            HashMap::from([
                ("role".to_string(), "system".to_string()),
                ("content".to_string(), system_prompt.to_string()),
            ]),
            HashMap::from([
                ("role".to_string(), "user".to_string()),
                ("content".to_string(), user_message.to_string()),
            ]),
        ])
    }

    /// All message contents concatenated, used for token accounting.
    pub fn joined_content(&self) -> String {
        match self {
            MessageType::String(message) => message.clone(),
            MessageType::Strings(messages) => messages.join("\n"),
            MessageType::Dictionary(messages) => messages
                .iter()
                .filter_map(|message| message.get("content").cloned())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LLMParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider for a JSON object response when it supports it.
    pub json_mode: bool,
}

impl Default for LLMParams {
    fn default() -> Self {
        LLMParams {
            max_tokens: 2000,
            temperature: 0.0,
            json_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    /// Output was cut at the token limit.
    Length,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LLMResponse {
    pub text: String,
    pub finish_reason: FinishReason,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl LLMResponse {
    pub fn new(text: &str) -> Self {
        LLMResponse {
            text: text.to_string(),
            finish_reason: FinishReason::Stop,
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    pub fn truncated(text: &str) -> Self {
        LLMResponse {
            finish_reason: FinishReason::Length,
            ..LLMResponse::new(text)
        }
    }
}

#[async_trait]
pub trait BaseLLM: Send + Sync {
    async fn agenerate(
        &self,
        messages: MessageType,
        streaming: bool,
        callbacks: Option<Vec<BaseLLMCallback>>,
        llm_params: LLMParams,
        search_phase: Option<GlobalSearchPhase>,
    ) -> Result<LLMResponse, LLMProviderError>;
}

#[async_trait]
pub trait BaseTextEmbedding: Send + Sync {
    async fn aembed(&self, text: &str) -> Result<Vec<f32>, LLMProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalSearchPhase {
    Map,
    Reduce,
}
