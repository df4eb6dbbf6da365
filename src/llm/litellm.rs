//! LiteLLM proxy client.
//!
//! Talks to an OpenAI-compatible LiteLLM deployment configured through
//! environment variables:
//!
//! - `LITELLM_API_BASE` (required): base URL of the proxy
//! - `LITELLM_API_KEY` (optional): bearer token, if the proxy requires one
//! - `LITELLM_DEFAULT_MODEL` (optional): model used when a request leaves
//!   the model field empty

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::LlmError;

use super::{
    error_from_status, retry_transient, ApiRequest, ApiResponse, GenerationRequest,
    GenerationResponse, LlmProvider, REQUEST_TIMEOUT_SECS,
};

/// Default model when neither the request nor the environment names one.
const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Client for an OpenAI-compatible LiteLLM proxy.
#[derive(Debug, Clone)]
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new client with explicit configuration.
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();

        Self {
            api_base,
            api_key,
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
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = std::env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = std::env::var("LITELLM_API_KEY").ok();
        let default_model =
            std::env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_base, api_key, default_model))
    }

    /// Create a client from the environment with explicit overrides.
    ///
    /// `api_key` takes precedence over `LITELLM_API_KEY` when set, and
    /// `default_model` is used instead of `LITELLM_DEFAULT_MODEL`.
    pub fn from_env_with(
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_base = std::env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = api_key.or_else(|| std::env::var("LITELLM_API_KEY").ok());

        Ok(Self::new(api_base, api_key, default_model))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Masked API key suitable for logging.
    pub fn api_key_masked(&self) -> String {
        match &self.api_key {
            Some(key) if key.len() > 8 => format!("{}...", &key[..8]),
            Some(_) => "***".to_string(),
            None => "(none)".to_string(),
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        api_request: &ApiRequest,
    ) -> Result<GenerationResponse, LlmError> {
        let mut http_request = self.http_client.post(url).json(api_request);
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let http_response = http_request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(error_from_status(status.as_u16(), &error_text));
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        Ok(api_response.into())
    }
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);
        let api_request = ApiRequest::from_generation(request, &self.default_model);

        debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            api_key = %self.api_key_masked(),
            "Sending LiteLLM chat completion request"
        );

        retry_transient(|| self.execute_request(&url, &api_request)).await
    }
}
