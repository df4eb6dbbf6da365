//! Question-answering agents.
//!
//! Three interchangeable agent styles answer evaluation questions:
//!
//! - [`codeact`]: emits tool calls as Python-style code in a
//!   ` ```tool_code ` fenced block
//! - [`tool_calling`]: emits tool calls as JSON in a ` ```json ` fenced
//!   block
//! - [`vanilla`]: no tools, answers directly with a `FINAL ANSWER:` marker
//!
//! The two tool-using styles share one step loop: generate, parse the
//! action, run the tool, feed the observation back. Unparseable actions get
//! a corrective observation instead of failing the trial.

pub mod codeact;
pub mod tool_calling;
pub mod tools;
pub mod vanilla;

use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

pub use codeact::CodeActAgent;
pub use tool_calling::ToolCallingAgent;
pub use tools::{SearchTool, Tool};
pub use vanilla::VanillaAgent;

use tools::find_tool;

/// Agent style selector matching the CLI's `--agent-action-type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentActionType {
    /// Tool calls written as code in a `tool_code` fenced block.
    #[default]
    Codeact,
    /// Tool calls written as JSON objects.
    ToolCalling,
    /// No tools; the model answers in one shot.
    Vanilla,
}

impl AgentActionType {
    /// Stable string form used in output paths and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codeact => "codeact",
            Self::ToolCalling => "tool-calling",
            Self::Vanilla => "vanilla",
        }
    }
}

impl std::fmt::Display for AgentActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared by all agent styles.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum reasoning steps before the trial is cut off. Default: 10.
    pub max_steps: u32,
    /// Sampling temperature. Default: 0.0 for reproducible evals.
    pub temperature: f64,
    /// Maximum tokens per generation. Default: 2048.
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

impl AgentConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of steps.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set the maximum tokens per generation.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of one agent run on one question.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The agent's answer (best effort when the step cap was hit).
    pub prediction: String,
    /// Number of generation steps taken.
    pub steps: u32,
    /// Total prompt tokens across all steps.
    pub prompt_tokens: u32,
    /// Total completion tokens across all steps.
    pub completion_tokens: u32,
    /// Set when the run ended without a proper final answer.
    pub error: Option<String>,
}

/// One parsed agent action.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    /// Invoke a tool with a string input.
    ToolCall { name: String, input: String },
    /// Submit the final answer and stop.
    FinalAnswer(String),
}

/// An agent that can answer a single question.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The action style this agent implements.
    fn action_type(&self) -> AgentActionType;

    /// Answer one question.
    async fn run(&self, question: &str) -> Result<AgentOutcome, AgentError>;
}

/// Build an agent of the requested style.
///
/// `llm_client` answers the question; `search_client` backs the search tool
/// (unused by the vanilla style).
pub fn build_agent(
    action_type: AgentActionType,
    llm_client: Arc<dyn LlmProvider>,
    search_client: Arc<dyn LlmProvider>,
    model_id: impl Into<String>,
    search_model_id: impl Into<String>,
    config: AgentConfig,
) -> Arc<dyn Agent> {
    let model_id = model_id.into();
    match action_type {
        AgentActionType::Codeact => Arc::new(CodeActAgent::new(
            llm_client,
            model_id,
            vec![Arc::new(SearchTool::new(search_client, search_model_id))],
            config,
        )),
        AgentActionType::ToolCalling => Arc::new(ToolCallingAgent::new(
            llm_client,
            model_id,
            vec![Arc::new(SearchTool::new(search_client, search_model_id))],
            config,
        )),
        AgentActionType::Vanilla => Arc::new(VanillaAgent::new(llm_client, model_id, config)),
    }
}

/// Drive the generate / parse / observe loop shared by tool-using agents.
///
/// `parse_action` extracts the action from raw model output;
/// `retry_instruction` is fed back verbatim when parsing fails. Tool
/// failures and unknown tool names become observations rather than errors.
pub(crate) async fn run_tool_loop(
    llm_client: &Arc<dyn LlmProvider>,
    model_id: &str,
    tools: &[Arc<dyn Tool>],
    config: &AgentConfig,
    system_prompt: String,
    question: &str,
    parse_action: fn(&str) -> Result<AgentAction, AgentError>,
    retry_instruction: &str,
) -> Result<AgentOutcome, AgentError> {
    let mut messages = vec![Message::system(system_prompt), Message::user(question)];
    let mut prompt_tokens = 0u32;
    let mut completion_tokens = 0u32;
    let mut last_content = String::new();

    for step in 1..=config.max_steps {
        let request = GenerationRequest::new(model_id, messages.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);

        let response = llm_client.generate(request).await?;
        prompt_tokens += response.usage.prompt_tokens;
        completion_tokens += response.usage.completion_tokens;

        let content = response.first_content().unwrap_or_default().to_string();
        last_content.clone_from(&content);
        messages.push(Message::assistant(content.clone()));

        match parse_action(&content) {
            Ok(AgentAction::FinalAnswer(answer)) => {
                debug!(step, "Agent submitted final answer");
                return Ok(AgentOutcome {
                    prediction: answer,
                    steps: step,
                    prompt_tokens,
                    completion_tokens,
                    error: None,
                });
            }
            Ok(AgentAction::ToolCall { name, input }) => {
                let observation = match find_tool(tools, &name) {
                    Some(tool) => {
                        debug!(step, tool = %name, "Agent called tool");
                        match tool.call(&input).await {
                            Ok(result) => result,
                            Err(err) => format!("Tool '{name}' failed: {err}"),
                        }
                    }
                    None => {
                        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
                        format!(
                            "{}. Available tools: {}, {}.",
                            AgentError::UnknownTool(name),
                            names.join(", "),
                            tools::FINAL_ANSWER_TOOL
                        )
                    }
                };
                messages.push(Message::user(format!("Observation: {observation}")));
            }
            Err(err) => {
                debug!(step, error = %err, "Could not parse agent action");
                messages.push(Message::user(retry_instruction.to_string()));
            }
        }
    }

    // Step cap reached; keep the last content so grading can still try it.
    Ok(AgentOutcome {
        prediction: last_content.trim().to_string(),
        steps: config.max_steps,
        prompt_tokens,
        completion_tokens,
        error: Some(AgentError::MaxStepsExceeded(config.max_steps).to_string()),
    })
}
