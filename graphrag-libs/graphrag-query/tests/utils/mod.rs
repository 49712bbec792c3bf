#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graphrag_primitives::{
    errors::LLMProviderError,
    llm::base::{BaseLLM, BaseLLMCallback, BaseTextEmbedding, GlobalSearchPhase, LLMParams, LLMResponse, MessageType},
};

pub enum MapBehavior {
    Answer(String),
    Fail,
    /// Never returns.
    Hang,
}

/// Chat model whose map answers are computed from the prompt. Every call is
/// recorded with its search phase.
#[derive(Clone)]
pub struct ScriptedLLM {
    map: Arc<dyn Fn(&str) -> MapBehavior + Send + Sync>,
    answer: String,
    pub calls: Arc<Mutex<Vec<(Option<GlobalSearchPhase>, String)>>>,
}

impl ScriptedLLM {
    pub fn new(map: impl Fn(&str) -> MapBehavior + Send + Sync + 'static, answer: &str) -> Self {
        ScriptedLLM {
            map: Arc::new(map),
            answer: answer.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self, phase: Option<GlobalSearchPhase>) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call_phase, _)| *call_phase == phase)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl BaseLLM for ScriptedLLM {
    async fn agenerate(
        &self,
        messages: MessageType,
        _streaming: bool,
        _callbacks: Option<Vec<BaseLLMCallback>>,
        _llm_params: LLMParams,
        search_phase: Option<GlobalSearchPhase>,
    ) -> Result<LLMResponse, LLMProviderError> {
        let prompt = messages.joined_content();
        self.calls.lock().unwrap().push((search_phase, prompt.clone()));

        match search_phase {
            Some(GlobalSearchPhase::Map) => match (self.map)(&prompt) {
                MapBehavior::Answer(answer) => Ok(LLMResponse::new(&answer)),
                MapBehavior::Fail => Err(LLMProviderError::Fatal("map call refused".to_string())),
                MapBehavior::Hang => std::future::pending().await,
            },
            _ => Ok(LLMResponse::new(&self.answer)),
        }
    }
}

/// Embeds text as a bag of the vocabulary words it contains.
pub struct KeywordEmbedder {
    pub vocabulary: Vec<String>,
    pub fail: bool,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        KeywordEmbedder {
            vocabulary: vocabulary.iter().map(|word| word.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing(vocabulary: &[&str]) -> Self {
        KeywordEmbedder {
            fail: true,
            ..KeywordEmbedder::new(vocabulary)
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|word| if text.contains(word.as_str()) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl BaseTextEmbedding for KeywordEmbedder {
    async fn aembed(&self, text: &str) -> Result<Vec<f32>, LLMProviderError> {
        if self.fail {
            return Err(LLMProviderError::Transient("embedding service unavailable".to_string()));
        }
        Ok(self.embed(text))
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Reads the number following `marker` in `text`.
pub fn number_after(text: &str, marker: &str) -> Option<u32> {
    let start = text.find(marker)? + marker.len();
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
