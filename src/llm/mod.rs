//! LLM provider integration for agent-evals.
//!
//! Defines the chat-completion request/response types shared by all
//! providers, the [`LlmProvider`] trait, and the [`ModelKind`] selector that
//! maps the CLI's `--model-type` values onto concrete clients.
//!
//! ```ignore
//! use agent_evals::llm::{build_provider, GenerationRequest, Message, ModelKind};
//!
//! let provider = build_provider(ModelKind::LiteLlm, "openai/gpt-4o", None)?;
//! let request = GenerationRequest::new(
//!     "openai/gpt-4o",
//!     vec![Message::system("Answer concisely."), Message::user("2 + 2?")],
//! )
//! .with_temperature(0.0);
//! let response = provider.generate(request).await?;
//! ```

pub mod hf_api;
pub mod litellm;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use hf_api::HfApiClient;
pub use litellm::LiteLlmClient;

/// Maximum number of retry attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds, shared by all HTTP clients.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 - 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the top_p for this request.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Model that generated this response.
    pub model: String,
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length").
    pub finish_reason: String,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens generated.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Provider selector matching the CLI's `--model-type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModelKind {
    /// OpenAI-compatible LiteLLM proxy (configured via LITELLM_* env vars).
    #[default]
    #[value(name = "LiteLLMModel")]
    LiteLlm,
    /// Hugging Face Inference API (configured via HF_TOKEN).
    #[value(name = "HfApiModel")]
    HfApi,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LiteLlm => write!(f, "LiteLLMModel"),
            Self::HfApi => write!(f, "HfApiModel"),
        }
    }
}

/// Build a provider for the given kind and model.
///
/// `api_key` overrides the environment credential for the selected kind
/// (`LITELLM_API_KEY` for LiteLLM, `HF_TOKEN` for the HF Inference API).
pub fn build_provider(
    kind: ModelKind,
    model_id: &str,
    api_key: Option<String>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match kind {
        ModelKind::LiteLlm => {
            let client = LiteLlmClient::from_env_with(api_key, model_id)?;
            Ok(Arc::new(client))
        }
        ModelKind::HfApi => {
            let client = HfApiClient::from_env_with(api_key, model_id)?;
            Ok(Arc::new(client))
        }
    }
}

/// Check if an error is transient and should be retried.
fn is_transient_error(error: &LlmError) -> bool {
    match error {
        LlmError::RequestFailed(msg) => {
            // Network errors, timeouts, connection issues
            msg.contains("timeout")
                || msg.contains("connection")
                || msg.contains("temporarily")
                || msg.contains("Connection refused")
        }
        LlmError::RateLimited(_) => true,
        LlmError::ModelLoading(_) => true,
        LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
        _ => false,
    }
}

/// Run a chat-completion call with exponential backoff on transient errors.
pub(crate) async fn retry_transient<F, Fut>(mut call: F) -> Result<GenerationResponse, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<GenerationResponse, LlmError>>,
{
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s
            let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay_ms,
                "Retrying LLM request after transient failure"
            );
        }

        match call().await {
            Ok(response) => return Ok(response),
            Err(err) => {
                if is_transient_error(&err) {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        error = %err,
                        "Transient error, will retry"
                    );
                    last_error = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        LlmError::RequestFailed("Max retries exceeded with no error captured".to_string())
    }))
}

/// Internal request structure for OpenAI-compatible chat endpoints.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl ApiRequest {
    /// Build the wire request, substituting `default_model` when the caller
    /// left the model empty.
    pub fn from_generation(request: GenerationRequest, default_model: &str) -> Self {
        let model = if request.model.is_empty() {
            default_model.to_string()
        } else {
            request.model
        };
        Self {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        }
    }
}

/// Internal response structure from OpenAI-compatible chat endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ApiChoice>,
    #[serde(default)]
    pub usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ApiMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Error response body from the API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
}

impl From<ApiResponse> for GenerationResponse {
    fn from(api: ApiResponse) -> Self {
        let choices = api
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content,
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        Self {
            id: api.id,
            model: api.model,
            choices,
            usage: Usage {
                prompt_tokens: api.usage.prompt_tokens,
                completion_tokens: api.usage.completion_tokens,
                total_tokens: api.usage.total_tokens,
            },
        }
    }
}

/// Map a non-success HTTP status plus body text to an [`LlmError`].
///
/// Parses structured error bodies when present and falls back to raw text.
/// 429 maps to [`LlmError::RateLimited`] so retry logic can single it out.
pub(crate) fn error_from_status(status_code: u16, body: &str) -> LlmError {
    let message = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.to_string(),
    };

    if status_code == 429 {
        return LlmError::RateLimited(message);
    }

    LlmError::ApiError {
        code: status_code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("openai/gpt-4o", vec![Message::user("test")])
            .with_temperature(0.7)
            .with_max_tokens(1000)
            .with_top_p(0.9);

        assert_eq!(request.model, "openai/gpt-4o");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.top_p, Some(0.9));
    }

    #[test]
    fn test_generation_response_first_content() {
        let response = GenerationResponse {
            id: "test-id".to_string(),
            model: "openai/gpt-4o".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("Hello!"),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        assert_eq!(response.first_content(), Some("Hello!"));

        let empty = GenerationResponse {
            id: "test-id".to_string(),
            model: "openai/gpt-4o".to_string(),
            choices: vec![],
            usage: Usage::default(),
        };
        assert_eq!(empty.first_content(), None);
    }

    #[test]
    fn test_model_kind_value_names() {
        assert_eq!(
            ModelKind::LiteLlm.to_possible_value().unwrap().get_name(),
            "LiteLLMModel"
        );
        assert_eq!(
            ModelKind::HfApi.to_possible_value().unwrap().get_name(),
            "HfApiModel"
        );
        assert_eq!(ModelKind::LiteLlm.to_string(), "LiteLLMModel");
        assert_eq!(ModelKind::HfApi.to_string(), "HfApiModel");
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            model: "openai/gpt-4o".to_string(),
            messages: vec![Message::user("test")],
            temperature: Some(0.7),
            max_tokens: Some(1000),
            top_p: None, // Should be skipped in JSON
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"openai/gpt-4o\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"max_tokens\":1000"));
        assert!(!json.contains("top_p"));
    }

    #[test]
    fn test_api_request_default_model_substitution() {
        let request = GenerationRequest::new("", vec![Message::user("test")]);
        let api = ApiRequest::from_generation(request, "fallback/model");
        assert_eq!(api.model, "fallback/model");

        let request = GenerationRequest::new("explicit/model", vec![Message::user("test")]);
        let api = ApiRequest::from_generation(request, "fallback/model");
        assert_eq!(api.model, "explicit/model");
    }

    #[test]
    fn test_is_transient_error_rate_limited() {
        let error = LlmError::RateLimited("Too many requests".to_string());
        assert!(is_transient_error(&error));
    }

    #[test]
    fn test_is_transient_error_server_error() {
        let error = LlmError::ApiError {
            code: 500,
            message: "Internal server error".to_string(),
        };
        assert!(is_transient_error(&error));
    }

    #[test]
    fn test_is_transient_error_client_error() {
        let error = LlmError::ApiError {
            code: 400,
            message: "Bad request".to_string(),
        };
        assert!(!is_transient_error(&error));
    }

    #[test]
    fn test_is_transient_error_model_loading() {
        let error = LlmError::ModelLoading("loading".to_string());
        assert!(is_transient_error(&error));
    }

    #[test]
    fn test_is_transient_error_timeout() {
        let error = LlmError::RequestFailed("Request timeout".to_string());
        assert!(is_transient_error(&error));
    }

    #[test]
    fn test_is_transient_error_parse_error() {
        let error = LlmError::ParseError("Invalid JSON".to_string());
        assert!(!is_transient_error(&error));
    }

    #[test]
    fn test_error_from_status_structured_body() {
        let body = r#"{"error": {"message": "model overloaded"}}"#;
        match error_from_status(503, body) {
            LlmError::ApiError { code, message } => {
                assert_eq!(code, 503);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_status_rate_limit() {
        let body = r#"{"error": {"message": "slow down"}}"#;
        assert!(matches!(
            error_from_status(429, body),
            LlmError::RateLimited(msg) if msg == "slow down"
        ));
    }

    #[test]
    fn test_error_from_status_raw_body() {
        match error_from_status(502, "bad gateway") {
            LlmError::ApiError { code, message } => {
                assert_eq!(code, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_transient_gives_up_after_max_retries() {
        let mut attempts = 0u32;
        let result = retry_transient(|| {
            attempts += 1;
            async { Err(LlmError::RateLimited("always".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::RateLimited(_))));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_transient_stops_on_permanent_error() {
        let mut attempts = 0u32;
        let result = retry_transient(|| {
            attempts += 1;
            async { Err(LlmError::ParseError("bad json".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::ParseError(_))));
        assert_eq!(attempts, 1);
    }
}
