//! Tool-calling agent: actions as structured JSON.
//!
//! The model emits one action per turn as a JSON object, preferably in a
//! ` ```json ` fenced block:
//!
//! ```text
//! {"tool": "search", "input": "first ascent of Annapurna"}
//! ```
//!
//! `{"tool": "final_answer", "input": "..."}` ends the run. The
//! `name`/`arguments` key spelling some models prefer is accepted too.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::AgentError;
use crate::llm::LlmProvider;

use super::tools::{toolbox_description, Tool, FINAL_ANSWER_TOOL};
use super::{run_tool_loop, Agent, AgentAction, AgentActionType, AgentConfig, AgentOutcome};

/// System prompt for the JSON tool-calling agent.
const TOOL_CALLING_SYSTEM_PROMPT: &str = r#"You are an expert research assistant answering questions step by step.

On each turn, think briefly in plain text, then take exactly one action by writing a JSON object in a fenced block:

```json
{"tool": "search", "input": "your query here"}
```

Available tools:
{tools}

Rules:
- Exactly one JSON action per turn, with string values for "tool" and "input".
- The result of your call arrives as an Observation in the next message.
- When you are confident, submit with:

```json
{"tool": "final_answer", "input": "your answer"}
```

- Final answers must be as short as possible: a number, a name, or a few words.
- Do not attach units, punctuation, or explanations to the final answer unless the question asks for them."#;

/// Correction sent back when a reply had no usable JSON action.
const TOOL_CALLING_RETRY_INSTRUCTION: &str = "Your reply did not contain a valid JSON action. \
Write exactly one object like {\"tool\": \"search\", \"input\": \"query\"} \
or {\"tool\": \"final_answer\", \"input\": \"answer\"} inside a ```json fenced block.";

/// JSON payload shape for one tool call.
#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    #[serde(alias = "name")]
    tool: String,
    #[serde(alias = "arguments", alias = "args")]
    input: serde_json::Value,
}

/// Agent that emits tool calls as JSON objects.
pub struct ToolCallingAgent {
    llm_client: Arc<dyn LlmProvider>,
    model_id: String,
    tools: Vec<Arc<dyn Tool>>,
    config: AgentConfig,
}

impl ToolCallingAgent {
    /// Create a new tool-calling agent.
    pub fn new(
        llm_client: Arc<dyn LlmProvider>,
        model_id: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm_client,
            model_id: model_id.into(),
            tools,
            config,
        }
    }

    fn system_prompt(&self) -> String {
        TOOL_CALLING_SYSTEM_PROMPT.replace("{tools}", &toolbox_description(&self.tools))
    }
}

#[async_trait]
impl Agent for ToolCallingAgent {
    fn action_type(&self) -> AgentActionType {
        AgentActionType::ToolCalling
    }

    async fn run(&self, question: &str) -> Result<AgentOutcome, AgentError> {
        run_tool_loop(
            &self.llm_client,
            &self.model_id,
            &self.tools,
            &self.config,
            self.system_prompt(),
            question,
            parse_tool_calling_action,
            TOOL_CALLING_RETRY_INSTRUCTION,
        )
        .await
    }
}

/// Extract the JSON object payload from a reply.
///
/// Tries the last ` ```json ` fence, then any fenced block, then the first
/// balanced `{...}` in the raw text.
fn extract_json_payload(content: &str) -> Option<String> {
    if let Ok(re) = Regex::new(r"```json\s*\n?([\s\S]*?)\n?```") {
        if let Some(block) = re.captures_iter(content).last().and_then(|caps| caps.get(1)) {
            if let Some(object) = first_json_object(block.as_str().trim()) {
                return Some(object);
            }
        }
    }

    if let Ok(re) = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```") {
        if let Some(block) = re.captures_iter(content).last().and_then(|caps| caps.get(1)) {
            if let Some(object) = first_json_object(block.as_str().trim()) {
                return Some(object);
            }
        }
    }

    first_json_object(content)
}

/// First balanced `{...}` span in `content`, string-literal aware.
fn first_json_object(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let span = &content[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in span.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(span[..i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a tool-calling reply into an action.
pub(crate) fn parse_tool_calling_action(content: &str) -> Result<AgentAction, AgentError> {
    let payload = extract_json_payload(content).ok_or_else(|| {
        AgentError::MalformedAction(format!(
            "No JSON object found in reply starting with: '{}'",
            content.chars().take(80).collect::<String>()
        ))
    })?;

    let call: ToolCallPayload = serde_json::from_str(&payload)
        .map_err(|e| AgentError::MalformedAction(format!("Invalid tool call JSON: {e}")))?;

    let input = match call.input {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };

    if call.tool == FINAL_ANSWER_TOOL {
        Ok(AgentAction::FinalAnswer(input))
    } else {
        Ok(AgentAction::ToolCall {
            name: call.tool,
            input,
        })
    }
}
