use std::collections::HashMap;

use graphrag_primitives::{
    llm::base::{BaseLLM, FinishReason, LLMParams, MessageType},
    utils::{
        json::parse_json_object,
        logging::{graphrag_log, GraphRagLogLevel, GraphRagLogOption},
    },
};
use serde::{Deserialize, Serialize};

use super::prompts::{COMMUNITY_REPORT_PROMPT, CONTINUE_PROMPT, GLEANING_PROMPT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportsConfig {
    /// Word limit passed to the model.
    pub max_report_length: usize,
    /// Token budget of the community context.
    pub max_input_length: usize,
    /// Extra attempts after the first response fails to parse.
    pub max_gleanings: usize,
    pub extraction_prompt: Option<String>,
}

impl Default for CommunityReportsConfig {
    fn default() -> Self {
        CommunityReportsConfig {
            max_report_length: 2000,
            max_input_length: 8000,
            max_gleanings: 1,
            extraction_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub summary: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportContent {
    pub title: String,
    pub summary: String,
    pub rating: f64,
    pub rating_explanation: String,
    pub findings: Vec<Finding>,
}

impl CommunityReportContent {
    pub fn to_markdown(&self) -> String {
        let findings = self
            .findings
            .iter()
            .map(|finding| format!("## {}\n\n{}", finding.summary, finding.explanation))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!("# {}\n\n{}\n\n{}", self.title, self.summary, findings)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportStatus {
    Complete,
    Incomplete { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionState {
    AwaitingResponse,
    Parsing,
    Retrying { reason: String },
    Complete,
    Incomplete { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityReportResult {
    pub status: ReportStatus,
    /// The parsed report, or whatever fields could be recovered when incomplete.
    pub report: Option<CommunityReportContent>,
    pub output: String,
    pub llm_calls: usize,
}

impl CommunityReportResult {
    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }
}

/// Asks the model for a structured community report, gleaning when the
/// response is truncated or does not parse.
pub struct CommunityReportsExtractor {
    llm: Box<dyn BaseLLM>,
    config: CommunityReportsConfig,
    llm_params: LLMParams,
}

impl CommunityReportsExtractor {
    pub fn new(llm: Box<dyn BaseLLM>, config: CommunityReportsConfig) -> Self {
        CommunityReportsExtractor {
            llm,
            config,
            llm_params: LLMParams {
                json_mode: true,
                ..Default::default()
            },
        }
    }

    pub fn with_llm_params(mut self, llm_params: LLMParams) -> Self {
        self.llm_params = llm_params;
        self
    }

    pub fn config(&self) -> &CommunityReportsConfig {
        &self.config
    }

    pub async fn extract(&self, input_text: &str) -> CommunityReportResult {
        let prompt = self
            .config
            .extraction_prompt
            .as_deref()
            .unwrap_or(COMMUNITY_REPORT_PROMPT)
            .replace("{max_report_length}", &self.config.max_report_length.to_string())
            .replace("{input_text}", input_text);

        let max_calls = 1 + self.config.max_gleanings;
        let mut history = vec![message("user", &prompt)];
        let mut output = String::new();
        let mut truncated = false;
        let mut llm_calls = 0;
        let mut report = None;
        let mut state = ExtractionState::AwaitingResponse;

        loop {
            state = match state {
                ExtractionState::AwaitingResponse => {
                    llm_calls += 1;
                    match self
                        .llm
                        .agenerate(
                            MessageType::Dictionary(history.clone()),
                            false,
                            None,
                            self.llm_params.clone(),
                            None,
                        )
                        .await
                    {
                        Ok(response) => {
                            truncated = response.finish_reason == FinishReason::Length;
                            history.push(message("assistant", &response.text));
                            output.push_str(&response.text);
                            ExtractionState::Parsing
                        }
                        Err(e) => ExtractionState::Incomplete { reason: e.to_string() },
                    }
                }
                ExtractionState::Parsing => match parse_report(&output) {
                    Ok(parsed) => {
                        report = Some(parsed);
                        ExtractionState::Complete
                    }
                    Err(reason) => ExtractionState::Retrying { reason },
                },
                ExtractionState::Retrying { reason } => {
                    if llm_calls >= max_calls {
                        ExtractionState::Incomplete { reason }
                    } else {
                        graphrag_log(
                            GraphRagLogOption::Reports,
                            GraphRagLogLevel::Debug,
                            &format!("Gleaning community report ({}/{}): {}", llm_calls, max_calls - 1, reason),
                        );
                        if truncated {
                            history.push(message("user", CONTINUE_PROMPT));
                        } else {
                            output.clear();
                            history.push(message("user", GLEANING_PROMPT));
                        }
                        ExtractionState::AwaitingResponse
                    }
                }
                ExtractionState::Complete => {
                    return CommunityReportResult {
                        status: ReportStatus::Complete,
                        report,
                        output,
                        llm_calls,
                    };
                }
                ExtractionState::Incomplete { reason } => {
                    graphrag_log(
                        GraphRagLogOption::Reports,
                        GraphRagLogLevel::Info,
                        &format!("Community report incomplete after {} calls: {}", llm_calls, reason),
                    );
                    return CommunityReportResult {
                        status: ReportStatus::Incomplete { reason },
                        report: partial_report(&output),
                        output,
                        llm_calls,
                    };
                }
            };
        }
    }
}

fn message(role: &str, content: &str) -> HashMap<String, String> {
    HashMap::from([
        ("role".to_string(), role.to_string()),
        ("content".to_string(), content.to_string()),
    ])
}

fn parse_report(output: &str) -> Result<CommunityReportContent, String> {
    let mut value = parse_json_object(output).map_err(|e| e.to_string())?;

    // Ratings sometimes come back as strings.
    if let Some(rating) = value.get("rating").and_then(|r| r.as_str()).and_then(|r| r.trim().parse::<f64>().ok()) {
        value["rating"] = serde_json::json!(rating);
    }

    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Recovers the fields that are present in an otherwise invalid report.
fn partial_report(output: &str) -> Option<CommunityReportContent> {
    let value = parse_json_object(output).ok()?;
    let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(|v| v.to_string());

    let title = text("title")?;
    let findings = value
        .get("findings")
        .and_then(|f| f.as_array())
        .map(|findings| {
            findings
                .iter()
                .filter_map(|finding| serde_json::from_value::<Finding>(finding.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    Some(CommunityReportContent {
        title,
        summary: text("summary").unwrap_or_default(),
        rating: value.get("rating").and_then(|r| r.as_f64()).unwrap_or(0.0),
        rating_explanation: text("rating_explanation").unwrap_or_default(),
        findings,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;
    use graphrag_primitives::{
        errors::LLMProviderError,
        llm::base::{BaseLLMCallback, GlobalSearchPhase, LLMResponse},
    };

    use super::*;

    const VALID_REPORT: &str = r#"{"title": "Acme", "summary": "Acme and partners", "rating": 7.5, "rating_explanation": "Large", "findings": [{"summary": "Acme leads", "explanation": "Acme leads the market."}]}"#;

    struct ScriptedLLM {
        responses: Mutex<Vec<Result<LLMResponse, LLMProviderError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedLLM {
        fn new(responses: Vec<Result<LLMResponse, LLMProviderError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                ScriptedLLM {
                    responses: Mutex::new(responses.into_iter().rev().collect()),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl BaseLLM for ScriptedLLM {
        async fn agenerate(
            &self,
            _messages: MessageType,
            _streaming: bool,
            _callbacks: Option<Vec<BaseLLMCallback>>,
            _llm_params: LLMParams,
            _search_phase: Option<GlobalSearchPhase>,
        ) -> Result<LLMResponse, LLMProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(LLMResponse::new("{}")))
        }
    }

    fn extractor(responses: Vec<Result<LLMResponse, LLMProviderError>>, max_gleanings: usize) -> (CommunityReportsExtractor, Arc<AtomicUsize>) {
        let (llm, calls) = ScriptedLLM::new(responses);
        let config = CommunityReportsConfig {
            max_gleanings,
            ..Default::default()
        };
        (CommunityReportsExtractor::new(Box::new(llm), config), calls)
    }

    #[tokio::test]
    async fn test_valid_report_on_first_call() {
        let (extractor, calls) = extractor(vec![Ok(LLMResponse::new(VALID_REPORT))], 1);
        let result = extractor.extract("entities").await;

        assert!(result.is_complete());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let report = result.report.unwrap();
        assert_eq!(report.title, "Acme");
        assert_eq!(report.rating, 7.5);
        assert!(report.to_markdown().starts_with("# Acme\n\nAcme and partners"));
    }

    #[tokio::test]
    async fn test_missing_fields_glean_once_then_incomplete() {
        let missing_findings = r#"{"title": "Acme", "summary": "Acme", "rating": 3}"#;
        let (extractor, calls) = extractor(
            vec![Ok(LLMResponse::new(missing_findings)), Ok(LLMResponse::new(missing_findings))],
            1,
        );
        let result = extractor.extract("entities").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.llm_calls, 2);
        assert!(matches!(result.status, ReportStatus::Incomplete { .. }));
        let partial = result.report.unwrap();
        assert_eq!(partial.title, "Acme");
        assert_eq!(partial.rating, 3.0);
        assert!(partial.findings.is_empty());
    }

    #[tokio::test]
    async fn test_gleaning_recovers_from_malformed_output() {
        let (extractor, calls) = extractor(
            vec![Ok(LLMResponse::new("not json")), Ok(LLMResponse::new(VALID_REPORT))],
            1,
        );
        let result = extractor.extract("entities").await;

        assert!(result.is_complete());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.output, VALID_REPORT);
    }

    #[tokio::test]
    async fn test_truncated_output_is_continued_and_concatenated() {
        let (head, tail) = VALID_REPORT.split_at(40);
        let (extractor, calls) = extractor(
            vec![Ok(LLMResponse::truncated(head)), Ok(LLMResponse::new(tail))],
            1,
        );
        let result = extractor.extract("entities").await;

        assert!(result.is_complete());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.output, VALID_REPORT);
    }

    #[tokio::test]
    async fn test_no_gleanings_means_single_call() {
        let (extractor, calls) = extractor(vec![Ok(LLMResponse::new("not json"))], 0);
        let result = extractor.extract("entities").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!result.is_complete());
        assert!(result.report.is_none());
    }

    #[tokio::test]
    async fn test_provider_error_is_incomplete_not_raised() {
        let (extractor, calls) = extractor(vec![Err(LLMProviderError::Fatal("bad key".to_string()))], 3);
        let result = extractor.extract("entities").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.status,
            ReportStatus::Incomplete {
                reason: "Fatal provider error: bad key".to_string()
            }
        );
    }

    #[test]
    fn test_string_rating_is_accepted() {
        let report = parse_report(&VALID_REPORT.replace("7.5", "\"8\"")).unwrap();
        assert_eq!(report.rating, 8.0);
    }
}
