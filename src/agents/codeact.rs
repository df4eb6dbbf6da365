//! CodeAct-style agent: tool calls written as code.
//!
//! The model expresses each action as a single Python-style call inside a
//! ` ```tool_code ` fenced block:
//!
//! ```text
//! search("first ascent of Annapurna")
//! ```
//!
//! and finishes with `final_answer("...")`. One call per turn; when a reply
//! holds several fenced blocks the last one counts.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::error::AgentError;
use crate::llm::LlmProvider;

use super::tools::{toolbox_description, Tool, FINAL_ANSWER_TOOL};
use super::{run_tool_loop, Agent, AgentAction, AgentActionType, AgentConfig, AgentOutcome};

/// System prompt for the code-writing agent.
const CODEACT_SYSTEM_PROMPT: &str = r#"You are an expert research assistant answering questions step by step.

On each turn, think briefly in plain text, then take exactly one action by writing a fenced code block:

```tool_code
search("your query here")
```

Available tools:
{tools}

Rules:
- Exactly one tool call per turn, with the argument in double quotes.
- The result of your call arrives as an Observation in the next message.
- When you are confident, submit with:

```tool_code
final_answer("your answer")
```

- Final answers must be as short as possible: a number, a name, or a few words.
- Do not attach units, punctuation, or explanations to the final answer unless the question asks for them."#;

/// Correction sent back when a reply had no usable call.
const CODEACT_RETRY_INSTRUCTION: &str = "Your reply did not contain a valid tool call. \
Write exactly one call such as search(\"query\") or final_answer(\"answer\") \
inside a ```tool_code``` fenced block.";

/// Agent that emits tool calls as code blocks.
pub struct CodeActAgent {
    llm_client: Arc<dyn LlmProvider>,
    model_id: String,
    tools: Vec<Arc<dyn Tool>>,
    config: AgentConfig,
}

impl CodeActAgent {
    /// Create a new CodeAct agent.
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
        CODEACT_SYSTEM_PROMPT.replace("{tools}", &toolbox_description(&self.tools))
    }
}

#[async_trait]
impl Agent for CodeActAgent {
    fn action_type(&self) -> AgentActionType {
        AgentActionType::Codeact
    }

    async fn run(&self, question: &str) -> Result<AgentOutcome, AgentError> {
        run_tool_loop(
            &self.llm_client,
            &self.model_id,
            &self.tools,
            &self.config,
            self.system_prompt(),
            question,
            parse_codeact_action,
            CODEACT_RETRY_INSTRUCTION,
        )
        .await
    }
}

/// Extract the last `tool_code` (or generic) fenced block from a reply.
fn extract_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok()?;
    re.captures_iter(content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Parse a `name("arg")` call, accepting single or double quotes.
fn parse_call(code: &str) -> Option<(String, String)> {
    let re = Regex::new(r#"(\w+)\(\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')\s*\)"#).ok()?;
    let caps = re.captures(code)?;
    let name = caps.get(1)?.as_str().to_string();
    let arg = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| unescape(m.as_str()))
        .unwrap_or_default();
    Some((name, arg))
}

/// Resolve the backslash escapes Python string literals use.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a CodeAct reply into an action.
///
/// Prefers the last fenced block; falls back to a bare call when the model
/// skipped the fence entirely.
pub(crate) fn parse_codeact_action(content: &str) -> Result<AgentAction, AgentError> {
    let code = match extract_code_block(content) {
        Some(block) => block,
        None => content.trim().to_string(),
    };

    let (name, input) = parse_call(&code).ok_or_else(|| {
        AgentError::MalformedAction(format!(
            "No tool call found in reply starting with: '{}'",
            content.chars().take(80).collect::<String>()
        ))
    })?;

    if name == FINAL_ANSWER_TOOL {
        Ok(AgentAction::FinalAnswer(input))
    } else {
        Ok(AgentAction::ToolCall { name, input })
    }
}
