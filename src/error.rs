//! Error types for agent-evals operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Task dataset / frame loading
//! - Agent execution
//! - Autograding

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Missing API token: {0} environment variable not set")]
    MissingToken(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not ready: {0}")]
    ModelLoading(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading task files or tabular frames.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Column '{column}' not found in '{path}'")]
    MissingColumn { path: String, column: String },

    #[error("No rows found in '{0}'")]
    Empty(String),

    #[error("Unsupported file format '{extension}' for '{path}': expected .csv or .jsonl")]
    UnsupportedFormat { path: String, extension: String },

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Column length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while running an agent trial.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),

    #[error("No final answer after {0} steps")]
    MaxStepsExceeded(u32),

    #[error("Trial timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors that can occur during autograding.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("Frame has no '{0}' column (and no accepted fallback)")]
    MissingColumn(String),

    #[error("Frame has no rows to grade")]
    EmptyFrame,

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
