//! Hugging Face Inference API client.
//!
//! Uses the OpenAI-compatible chat completion route exposed per model:
//! `{base}/models/{model_id}/v1/chat/completions`. Requires an `HF_TOKEN`
//! environment variable (or an explicit token); `HF_API_BASE` overrides the
//! default serverless endpoint.
//!
//! Cold models answer 503 while they spin up. That maps to
//! [`LlmError::ModelLoading`], which the shared retry loop treats as
//! transient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;

use super::{
    error_from_status, retry_transient, ApiRequest, ApiResponse, GenerationRequest,
    GenerationResponse, LlmProvider, REQUEST_TIMEOUT_SECS,
};

/// Default serverless inference endpoint.
const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";

/// Client for the Hugging Face Inference API.
#[derive(Debug, Clone)]
pub struct HfApiClient {
    api_base: String,
    token: String,
    default_model: String,
    http_client: Client,
}

/// Error body shape used by the Inference API (distinct from the
/// OpenAI-style `{"error": {"message": ...}}` envelope).
#[derive(Debug, Deserialize)]
struct HfErrorBody {
    error: String,
}

impl HfApiClient {
    /// Create a new client with explicit configuration.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();

        Self {
            api_base,
            token: token.into(),
            default_model: default_model.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingToken` if `HF_TOKEN` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let token = std::env::var("HF_TOKEN")
            .map_err(|_| LlmError::MissingToken("HF_TOKEN".to_string()))?;
        let api_base =
            std::env::var("HF_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let default_model = std::env::var("HF_DEFAULT_MODEL").unwrap_or_default();

        Ok(Self::new(api_base, token, default_model))
    }

    /// Create a client from the environment with explicit overrides.
    ///
    /// `token` takes precedence over `HF_TOKEN` when set.
    pub fn from_env_with(
        token: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let token = match token {
            Some(t) => t,
            None => std::env::var("HF_TOKEN")
                .map_err(|_| LlmError::MissingToken("HF_TOKEN".to_string()))?,
        };
        let api_base =
            std::env::var("HF_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self::new(api_base, token, default_model))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Chat completion URL for a model. Model ids keep their `/` as a path
    /// segment, matching the Inference API routing.
    fn chat_url(&self, model: &str) -> String {
        format!("{}/models/{}/v1/chat/completions", self.api_base, model)
    }

    async fn execute_request(
        &self,
        url: &str,
        api_request: &ApiRequest,
    ) -> Result<GenerationResponse, LlmError> {
        let http_response = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .json(api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(hf_error_from_status(status.as_u16(), &error_text));
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        Ok(api_response.into())
    }
}

/// Map a non-success Inference API status to an [`LlmError`].
///
/// 503 means the model is still loading onto a worker, not a server fault.
fn hf_error_from_status(status_code: u16, body: &str) -> LlmError {
    if status_code == 503 {
        let message = match serde_json::from_str::<HfErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) => body.to_string(),
        };
        return LlmError::ModelLoading(message);
    }

    if let Ok(parsed) = serde_json::from_str::<HfErrorBody>(body) {
        if status_code == 429 {
            return LlmError::RateLimited(parsed.error);
        }
        return LlmError::ApiError {
            code: status_code,
            message: parsed.error,
        };
    }

    error_from_status(status_code, body)
}

#[async_trait]
impl LlmProvider for HfApiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let api_request = ApiRequest::from_generation(request, &self.default_model);
        let url = self.chat_url(&api_request.model);

        debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            "Sending HF Inference API chat completion request"
        );

        retry_transient(|| self.execute_request(&url, &api_request)).await
    }
}
