//! Tools available to tool-using agents.
//!
//! The toolbox is deliberately small: a `search` tool backed by an auxiliary
//! LLM, and the `final_answer` terminator that the agent loop intercepts
//! directly. Tool failures are reported back to the agent as observations so
//! a single bad call does not sink the trial.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Name of the terminator pseudo-tool recognized by the agent loop.
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// Max tokens for a single search response.
const SEARCH_MAX_TOKENS: u32 = 1024;

/// System prompt for the search model.
const SEARCH_SYSTEM_PROMPT: &str = "You are a factual search engine. \
Given a query, return the most relevant facts you know as a short list of \
plain-text passages. Include names, dates, and numbers when you know them. \
Do not editorialize and do not answer questions that were not asked.";

/// A callable tool exposed to an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as the agent must write it.
    fn name(&self) -> &str;

    /// One-line description shown in the agent's system prompt.
    fn description(&self) -> &str;

    /// Execute the tool with a single string input.
    async fn call(&self, input: &str) -> Result<String, AgentError>;
}

/// Search tool backed by an auxiliary LLM.
///
/// Stands in for a web search index: the query goes to the search model
/// (`--search-model-id`) and its answer is returned verbatim as the
/// observation.
pub struct SearchTool {
    client: Arc<dyn LlmProvider>,
    model_id: String,
}

impl SearchTool {
    /// Create a search tool that queries `model_id` through `client`.
    pub fn new(client: Arc<dyn LlmProvider>, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "search(query: str) -> str: look up facts about a topic and return relevant passages"
    }

    async fn call(&self, input: &str) -> Result<String, AgentError> {
        debug!(query = %input, model = %self.model_id, "Running search tool");

        let request = GenerationRequest::new(
            self.model_id.clone(),
            vec![
                Message::system(SEARCH_SYSTEM_PROMPT),
                Message::user(input.to_string()),
            ],
        )
        .with_temperature(0.0)
        .with_max_tokens(SEARCH_MAX_TOKENS);

        let response = self.client.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| AgentError::MalformedAction("Search returned no content".to_string()))?;

        Ok(content.trim().to_string())
    }
}

/// Render the toolbox section of an agent system prompt.
///
/// Lists each tool plus the `final_answer` terminator, one per line.
pub fn toolbox_description(tools: &[Arc<dyn Tool>]) -> String {
    let mut lines: Vec<String> = tools
        .iter()
        .map(|tool| format!("- {}", tool.description()))
        .collect();
    lines.push(format!(
        "- {FINAL_ANSWER_TOOL}(answer: str): submit your final answer and stop"
    ));
    lines.join("\n")
}

/// Find a tool by name.
pub fn find_tool<'a>(tools: &'a [Arc<dyn Tool>], name: &str) -> Option<&'a Arc<dyn Tool>> {
    tools.iter().find(|tool| tool.name() == name)
}
