//! Vanilla agent: one-shot answering without tools.
//!
//! The model gets the question and must close with a `FINAL ANSWER:` line.
//! Everything after the last marker is the prediction; if the model forgot
//! the marker the whole reply is used, leaving it to the grader.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

use super::{Agent, AgentActionType, AgentConfig, AgentOutcome};

/// System prompt for the no-tools agent.
const VANILLA_SYSTEM_PROMPT: &str = "Answer the question using your own knowledge. \
Think step by step, then finish with a line in exactly this form:\n\n\
FINAL ANSWER: [your answer]\n\n\
Your final answer must be as short as possible: a number, a name, or a \
comma separated list of values. Do not use articles, abbreviations, or \
units unless the question asks for them.";

/// Agent that answers in a single generation.
pub struct VanillaAgent {
    llm_client: Arc<dyn LlmProvider>,
    model_id: String,
    config: AgentConfig,
}

impl VanillaAgent {
    /// Create a new vanilla agent.
    pub fn new(
        llm_client: Arc<dyn LlmProvider>,
        model_id: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm_client,
            model_id: model_id.into(),
            config,
        }
    }
}

#[async_trait]
impl Agent for VanillaAgent {
    fn action_type(&self) -> AgentActionType {
        AgentActionType::Vanilla
    }

    async fn run(&self, question: &str) -> Result<AgentOutcome, AgentError> {
        let request = GenerationRequest::new(
            self.model_id.clone(),
            vec![
                Message::system(VANILLA_SYSTEM_PROMPT),
                Message::user(question.to_string()),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm_client.generate(request).await?;
        let content = response.first_content().unwrap_or_default();

        let prediction = match extract_final_answer(content) {
            Some(answer) => answer,
            None => {
                debug!("Reply had no FINAL ANSWER marker, using full content");
                content.trim().to_string()
            }
        };

        Ok(AgentOutcome {
            prediction,
            steps: 1,
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            error: None,
        })
    }
}

/// Text after the last `FINAL ANSWER:` marker, if any.
pub(crate) fn extract_final_answer(content: &str) -> Option<String> {
    let re = Regex::new(r"(?i)final\s+answer\s*:").ok()?;
    let last = re.find_iter(content).last()?;
    Some(content[last.end()..].trim().to_string())
}
