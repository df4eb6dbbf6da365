//! agent-evals: parallel evaluation harness for LLM agents on QA benchmarks.
//!
//! This library provides tools for running LLM agents against tabular task
//! files, recording per-trial answers, and autograding prediction files.

// Core modules
pub mod agents;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod grader;
pub mod llm;
pub mod runner;

// Re-export commonly used error types
pub use error::{AgentError, DatasetError, GradeError, LlmError};
