//! Answer records and the append-only JSONL answer store.
//!
//! Every (task row, trial) pair produces one [`AnswerRecord`] line in a
//! per-configuration JSONL file. Re-running the same configuration loads the
//! existing file and skips pairs that already have a line, so interrupted
//! runs resume where they stopped.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AgentActionType, AgentOutcome};
use crate::dataset::TaskRecord;
use crate::error::DatasetError;

/// One evaluated trial, serialized as a single JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// The task question, verbatim.
    pub question: String,
    /// The agent's final answer (empty when the trial failed outright).
    pub prediction: String,
    /// Ground-truth answer carried over from the task file.
    pub true_answer: String,
    /// Task provenance (source column or task file stem).
    pub source: String,
    /// Main model identifier used for this trial.
    pub model_id: String,
    /// Agent loop the trial ran under.
    pub agent_action: AgentActionType,
    /// 1-based trial index.
    pub trial: u32,
    /// Model round-trips consumed by the trial.
    pub steps: u32,
    /// Prompt tokens accumulated across all steps.
    pub prompt_tokens: u32,
    /// Completion tokens accumulated across all steps.
    pub completion_tokens: u32,
    /// Wall-clock duration of the trial in seconds.
    pub duration_secs: f64,
    /// Timestamp when the trial started.
    pub started_at: DateTime<Utc>,
    /// Error message, if the trial errored or hit its step cap.
    pub error: Option<String>,
}

impl AnswerRecord {
    /// Build a record from a completed agent outcome.
    ///
    /// The outcome may still carry an error (step-cap exhaustion keeps the
    /// best-effort last text as the prediction); it is preserved as-is.
    pub fn answered(
        task: &TaskRecord,
        trial: u32,
        model_id: impl Into<String>,
        agent_action: AgentActionType,
        outcome: AgentOutcome,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            question: task.question.clone(),
            prediction: outcome.prediction,
            true_answer: task.true_answer.clone(),
            source: task.source.clone(),
            model_id: model_id.into(),
            agent_action,
            trial,
            steps: outcome.steps,
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            duration_secs: duration.as_secs_f64(),
            started_at: now - chrono::Duration::from_std(duration).unwrap_or_default(),
            error: outcome.error,
        }
    }

    /// Build a record for a trial that produced no answer at all.
    pub fn failed(
        task: &TaskRecord,
        trial: u32,
        model_id: impl Into<String>,
        agent_action: AgentActionType,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            question: task.question.clone(),
            prediction: String::new(),
            true_answer: task.true_answer.clone(),
            source: task.source.clone(),
            model_id: model_id.into(),
            agent_action,
            trial,
            steps: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            duration_secs: duration.as_secs_f64(),
            started_at: now - chrono::Duration::from_std(duration).unwrap_or_default(),
            error: Some(error.into()),
        }
    }

    /// True when the trial errored or timed out without an answer.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() && self.prediction.is_empty()
    }

    /// Resume key: a (question, trial) pair identifies a job.
    pub fn resume_key(&self) -> (String, u32) {
        (self.question.clone(), self.trial)
    }
}

/// Model ids contain `/` (e.g. `openai/gpt-4o`); flatten for path components.
pub fn sanitize_model_id(model_id: &str) -> String {
    model_id.replace('/', "__")
}

/// Path of the answers file for one run configuration:
/// `<output_dir>/answers/<model_id>/<date>__<agent-action>__<task>.jsonl`.
pub fn answers_path(
    output_dir: &Path,
    model_id: &str,
    date: &str,
    agent_action: AgentActionType,
    task_name: &str,
) -> PathBuf {
    output_dir
        .join("answers")
        .join(sanitize_model_id(model_id))
        .join(format!("{date}__{}__{task_name}.jsonl", agent_action.as_str()))
}

/// Append records to the answers file, creating parent directories and the
/// file itself on first use. One JSON object per line, flushed per batch.
pub fn append_records(path: &Path, records: &[AnswerRecord]) -> Result<(), DatasetError> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Load the (question, trial) pairs already present in an answers file.
///
/// A missing file yields an empty set. Unparseable lines (e.g. a torn final
/// line from a killed run) are logged and skipped rather than failing the
/// whole resume.
pub fn load_answered_keys(path: &Path) -> Result<HashSet<(String, u32)>, DatasetError> {
    let mut keys = HashSet::new();
    if !path.exists() {
        return Ok(keys);
    }

    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AnswerRecord>(&line) {
            Ok(record) => {
                keys.insert(record.resume_key());
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    "Skipping unparseable answer record: {e}"
                );
            }
        }
    }
    Ok(keys)
}
