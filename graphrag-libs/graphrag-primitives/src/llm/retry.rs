use std::time::Duration;

use async_trait::async_trait;

use crate::{
    errors::LLMProviderError,
    utils::logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
};

use super::base::{BaseLLM, BaseLLMCallback, BaseTextEmbedding, GlobalSearchPhase, LLMParams, LLMResponse, MessageType};

/// Wraps a provider and retries transient failures with exponential backoff.
/// Fatal failures are returned on the first occurrence.
pub struct RetryingLLM<L> {
    inner: L,
    max_retries: usize,
    base_delay: Duration,
}

impl<L> RetryingLLM<L> {
    pub fn new(inner: L, max_retries: usize, base_delay: Duration) -> Self {
        RetryingLLM {
            inner,
            max_retries,
            base_delay,
        }
    }
}

fn backoff_delay(base_delay: Duration, retry_count: usize) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(16) as u32;
    base_delay.saturating_mul(2u32.saturating_pow(exponent))
}

#[async_trait]
impl<L: BaseLLM> BaseLLM for RetryingLLM<L> {
    async fn agenerate(
        &self,
        messages: MessageType,
        streaming: bool,
        callbacks: Option<Vec<BaseLLMCallback>>,
        llm_params: LLMParams,
        search_phase: Option<GlobalSearchPhase>,
    ) -> Result<LLMResponse, LLMProviderError> {
        let mut retry_count = 0;

        loop {
            match self
                .inner
                .agenerate(
                    messages.clone(),
                    streaming,
                    callbacks.clone(),
                    llm_params.clone(),
                    search_phase,
                )
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && retry_count < self.max_retries => {
                    retry_count += 1;
                    graphrag_log(
                        GraphRagLogOption::LLM,
                        GraphRagLogLevel::Debug,
                        &format!("Retrying completion ({}/{}): {}", retry_count, self.max_retries, e),
                    );
                    tokio::time::sleep(backoff_delay(self.base_delay, retry_count)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<L: BaseTextEmbedding> BaseTextEmbedding for RetryingLLM<L> {
    async fn aembed(&self, text: &str) -> Result<Vec<f32>, LLMProviderError> {
        let mut retry_count = 0;

        loop {
            match self.inner.aembed(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if e.is_transient() && retry_count < self.max_retries => {
                    retry_count += 1;
                    graphrag_log(
                        GraphRagLogOption::LLM,
                        GraphRagLogLevel::Debug,
                        &format!("Retrying embedding ({}/{}): {}", retry_count, self.max_retries, e),
                    );
                    tokio::time::sleep(backoff_delay(self.base_delay, retry_count)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyLLM {
        calls: AtomicUsize,
        failures_before_success: usize,
        error: LLMProviderError,
    }

    #[async_trait]
    impl BaseLLM for FlakyLLM {
        async fn agenerate(
            &self,
            _messages: MessageType,
            _streaming: bool,
            _callbacks: Option<Vec<BaseLLMCallback>>,
            _llm_params: LLMParams,
            _search_phase: Option<GlobalSearchPhase>,
        ) -> Result<LLMResponse, LLMProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(self.error.clone())
            } else {
                Ok(LLMResponse::new("ok"))
            }
        }
    }

    fn flaky(failures_before_success: usize, error: LLMProviderError) -> FlakyLLM {
        FlakyLLM {
            calls: AtomicUsize::new(0),
            failures_before_success,
            error,
        }
    }

    async fn generate(llm: &RetryingLLM<FlakyLLM>) -> Result<LLMResponse, LLMProviderError> {
        llm.agenerate(
            MessageType::String("hello".to_string()),
            false,
            None,
            LLMParams::default(),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let llm = RetryingLLM::new(
            flaky(2, LLMProviderError::Transient("rate limited".to_string())),
            3,
            Duration::from_millis(1),
        );

        let response = generate(&llm).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let llm = RetryingLLM::new(
            flaky(10, LLMProviderError::Transient("rate limited".to_string())),
            2,
            Duration::from_millis(1),
        );

        assert!(generate(&llm).await.is_err());
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let llm = RetryingLLM::new(
            flaky(1, LLMProviderError::Fatal("bad key".to_string())),
            5,
            Duration::from_millis(1),
        );

        assert_eq!(
            generate(&llm).await,
            Err(LLMProviderError::Fatal("bad key".to_string()))
        );
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 1);
    }
}
