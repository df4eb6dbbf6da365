//! Parallel evaluation runner.
//!
//! Expands task files into (task row, trial) jobs, dispatches the jobs across
//! a bounded pool of tokio tasks, and appends one JSONL answer record per job
//! to a per-configuration answers file.
//!
//! # Flow
//!
//! ```text
//! task CSVs → TaskRecord rows × trials → worker pool → answers JSONL
//! ```
//!
//! Re-running the same configuration resumes: (question, trial) pairs already
//! present in the answers file are skipped, so an interrupted run picks up
//! where it stopped.

pub mod progress;
pub mod records;

pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use records::{answers_path, append_records, load_answered_keys, AnswerRecord};

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{build_agent, Agent, AgentActionType, AgentConfig};
use crate::dataset::{load_task_records, task_name, TaskRecord};
use crate::error::AgentError;
use crate::llm::LlmProvider;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Settings for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalRunConfig {
    /// Run date used in answer file names (`YYYY-MM-DD`).
    pub date: String,
    /// Main model identifier, recorded on every answer.
    pub model_id: String,
    /// Agent loop the trials run under.
    pub agent_action: AgentActionType,
    /// Upper bound on concurrently running trials.
    pub parallel_workers: usize,
    /// Trials per task row (1-based trial indices).
    pub num_trials: usize,
    /// Root of the output tree (answers land under `<output_dir>/answers/`).
    pub output_dir: PathBuf,
    /// Wall-clock cap per trial.
    pub task_timeout: Duration,
    /// Step cap and sampling settings forwarded to the agent.
    pub agent: AgentConfig,
}

impl Default for EvalRunConfig {
    fn default() -> Self {
        Self {
            date: Utc::now().format("%Y-%m-%d").to_string(),
            model_id: "openai/gpt-4o".to_string(),
            agent_action: AgentActionType::default(),
            parallel_workers: 8,
            num_trials: 1,
            output_dir: PathBuf::from("./evals"),
            task_timeout: Duration::from_secs(600),
            agent: AgentConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

/// Per-task-file results of a run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFileReport {
    /// Task file stem.
    pub task_name: String,
    /// Where this file's answers were appended.
    pub answers_path: PathBuf,
    /// Rows × trials for this file.
    pub total_jobs: usize,
    /// Jobs that produced an answer.
    pub answered: usize,
    /// Jobs that errored, timed out, or panicked.
    pub failed: usize,
    /// Jobs skipped because of an existing answer record.
    pub skipped: usize,
    /// Wall-clock seconds spent on this file.
    pub duration_secs: f64,
}

/// Aggregate results of a run across all task files.
#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub model_id: String,
    pub agent_action: AgentActionType,
    pub date: String,
    pub answered: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_secs: f64,
    pub task_files: Vec<TaskFileReport>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// One (task row, trial) unit of work.
#[derive(Debug, Clone)]
struct TrialJob {
    task: TaskRecord,
    trial: u32,
}

/// Jobs and bookkeeping for one task file, after resume filtering.
struct TaskFilePlan {
    name: String,
    answers_path: PathBuf,
    jobs: Vec<TrialJob>,
    skipped: usize,
}

/// Runs evaluation jobs against a model/agent pair.
pub struct EvalRunner {
    llm_client: Arc<dyn LlmProvider>,
    search_client: Arc<dyn LlmProvider>,
    search_model_id: String,
    config: EvalRunConfig,
}

impl EvalRunner {
    /// Create a runner. `search_client` backs the `search` tool and may be
    /// the same provider as `llm_client`.
    pub fn new(
        llm_client: Arc<dyn LlmProvider>,
        search_client: Arc<dyn LlmProvider>,
        search_model_id: impl Into<String>,
        config: EvalRunConfig,
    ) -> Self {
        Self {
            llm_client,
            search_client,
            search_model_id: search_model_id.into(),
            config,
        }
    }

    /// Evaluate every (row, trial) job in the given task files.
    ///
    /// Records are appended to the per-file answers JSONL after each chunk of
    /// parallel trials, so partial progress survives interruption.
    pub async fn run(&self, task_files: &[PathBuf]) -> Result<EvalSummary> {
        if task_files.is_empty() {
            anyhow::bail!("No task files given");
        }

        let agent = build_agent(
            self.config.agent_action,
            self.llm_client.clone(),
            self.search_client.clone(),
            &self.config.model_id,
            &self.search_model_id,
            self.config.agent.clone(),
        );

        let mut plans = Vec::new();
        for path in task_files {
            let plan = self
                .plan_task_file(path)
                .with_context(|| format!("Loading task file {}", path.display()))?;
            plans.push(plan);
        }

        let total_jobs: usize = plans.iter().map(|p| p.jobs.len()).sum();
        let total_skipped: usize = plans.iter().map(|p| p.skipped).sum();
        info!(
            model_id = %self.config.model_id,
            agent_action = %self.config.agent_action,
            task_files = plans.len(),
            jobs = total_jobs,
            skipped = total_skipped,
            workers = self.config.parallel_workers,
            trials = self.config.num_trials,
            "Starting evaluation run"
        );

        let counters = ProgressCounters::new();
        counters.skipped.fetch_add(total_skipped, Ordering::Relaxed);
        let monitor = ProgressMonitor::start(counters.clone(), total_jobs, Duration::from_secs(30));

        let started = Instant::now();
        let mut task_reports = Vec::new();
        for plan in plans {
            let report = self.run_plan(&agent, plan, &counters).await?;
            task_reports.push(report);
        }
        monitor.stop().await;

        let summary = EvalSummary {
            model_id: self.config.model_id.clone(),
            agent_action: self.config.agent_action,
            date: self.config.date.clone(),
            answered: task_reports.iter().map(|r| r.answered).sum(),
            failed: task_reports.iter().map(|r| r.failed).sum(),
            skipped: task_reports.iter().map(|r| r.skipped).sum(),
            duration_secs: started.elapsed().as_secs_f64(),
            task_files: task_reports,
        };
        info!(
            answered = summary.answered,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_secs = format!("{:.1}", summary.duration_secs),
            "Evaluation run finished"
        );
        Ok(summary)
    }

    /// Load a task file and expand it into jobs, dropping (question, trial)
    /// pairs the answers file already covers.
    fn plan_task_file(&self, path: &Path) -> Result<TaskFilePlan> {
        let tasks = load_task_records(path)?;
        let name = task_name(path);
        let answers_path = answers_path(
            &self.config.output_dir,
            &self.config.model_id,
            &self.config.date,
            self.config.agent_action,
            &name,
        );
        let answered_keys = load_answered_keys(&answers_path)?;

        let trials = self.config.num_trials.max(1) as u32;
        let mut jobs = Vec::new();
        let mut skipped = 0usize;
        for task in tasks {
            for trial in 1..=trials {
                if answered_keys.contains(&(task.question.clone(), trial)) {
                    skipped += 1;
                } else {
                    jobs.push(TrialJob {
                        task: task.clone(),
                        trial,
                    });
                }
            }
        }

        info!(
            task = %name,
            jobs = jobs.len(),
            skipped,
            answers = %answers_path.display(),
            "Planned task file"
        );
        Ok(TaskFilePlan {
            name,
            answers_path,
            jobs,
            skipped,
        })
    }

    /// Run one task file's jobs in chunks of `parallel_workers`, appending
    /// each chunk's records before starting the next.
    async fn run_plan(
        &self,
        agent: &Arc<dyn Agent>,
        plan: TaskFilePlan,
        counters: &ProgressCounters,
    ) -> Result<TaskFileReport> {
        let started = Instant::now();
        let total_jobs = plan.jobs.len() + plan.skipped;
        let workers = self.config.parallel_workers.max(1);

        let mut answered = 0usize;
        let mut failed = 0usize;
        for chunk in plan.jobs.chunks(workers) {
            let mut handles = Vec::new();
            for job in chunk {
                let agent = agent.clone();
                let job = job.clone();
                let model_id = self.config.model_id.clone();
                let action = self.config.agent_action;
                let timeout = self.config.task_timeout;
                handles.push(tokio::spawn(async move {
                    run_trial(agent, job, model_id, action, timeout).await
                }));
            }

            let mut batch = Vec::new();
            for joined in futures::future::join_all(handles).await {
                match joined {
                    Ok(record) => batch.push(record),
                    Err(e) => {
                        warn!("Trial panicked: {e}");
                        failed += 1;
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            for record in &batch {
                if record.is_failed() {
                    failed += 1;
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                } else {
                    answered += 1;
                    counters.answered.fetch_add(1, Ordering::Relaxed);
                }
            }
            append_records(&plan.answers_path, &batch)
                .with_context(|| format!("Appending to {}", plan.answers_path.display()))?;
        }

        Ok(TaskFileReport {
            task_name: plan.name,
            answers_path: plan.answers_path,
            total_jobs,
            answered,
            failed,
            skipped: plan.skipped,
            duration_secs: started.elapsed().as_secs_f64(),
        })
    }
}

/// Run one trial under the per-trial timeout and turn the result into a
/// record. Errors and timeouts become failure records, never panics.
async fn run_trial(
    agent: Arc<dyn Agent>,
    job: TrialJob,
    model_id: String,
    action: AgentActionType,
    timeout: Duration,
) -> AnswerRecord {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, agent.run(&job.task.question)).await;
    let duration = started.elapsed();

    match result {
        Ok(Ok(outcome)) => {
            AnswerRecord::answered(&job.task, job.trial, model_id, action, outcome, duration)
        }
        Ok(Err(e)) => {
            warn!(trial = job.trial, "Trial failed: {e}");
            AnswerRecord::failed(&job.task, job.trial, model_id, action, e.to_string(), duration)
        }
        Err(_) => {
            let err = AgentError::Timeout {
                secs: timeout.as_secs(),
            };
            warn!(trial = job.trial, "{err}");
            AnswerRecord::failed(&job.task, job.trial, model_id, action, err.to_string(), duration)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedProvider;
    use crate::llm::{GenerationRequest, GenerationResponse};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Provider that never answers within a test-sized timeout.
    struct StalledProvider;

    #[async_trait]
    impl LlmProvider for StalledProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, crate::error::LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep outlives every test timeout")
        }
    }

    /// Provider that panics instead of answering.
    struct PanickingProvider;

    #[async_trait]
    impl LlmProvider for PanickingProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, crate::error::LlmError> {
            panic!("provider crashed")
        }
    }

    fn write_task_csv(dir: &TempDir, name: &str, rows: &[(&str, &str)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = String::from("question,true_answer\n");
        for (q, a) in rows {
            content.push_str(&format!("{q},{a}\n"));
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn vanilla_config(dir: &TempDir) -> EvalRunConfig {
        EvalRunConfig {
            date: "2026-01-01".to_string(),
            model_id: "test/model".to_string(),
            agent_action: AgentActionType::Vanilla,
            parallel_workers: 1,
            num_trials: 1,
            output_dir: dir.path().join("evals"),
            task_timeout: Duration::from_secs(30),
            agent: AgentConfig::default(),
        }
    }

    #[test]
    fn test_eval_run_config_default() {
        let config = EvalRunConfig::default();
        assert_eq!(config.parallel_workers, 8);
        assert_eq!(config.num_trials, 1);
        assert_eq!(config.output_dir, PathBuf::from("./evals"));
        assert_eq!(config.task_timeout, Duration::from_secs(600));
        assert_eq!(config.date.len(), 10);
    }

    #[tokio::test]
    async fn test_run_answers_all_tasks() {
        let dir = TempDir::new().unwrap();
        let task_file = write_task_csv(
            &dir,
            "frames_test.csv",
            &[("What is 2+2?", "4"), ("Capital of France?", "Paris")],
        );

        let provider = Arc::new(ScriptedProvider::new(&[
            "FINAL ANSWER: 4",
            "FINAL ANSWER: Paris",
        ]));
        let config = vanilla_config(&dir);
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config.clone());

        let summary = runner.run(&[task_file]).await.unwrap();
        assert_eq!(summary.answered, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);

        let path = answers_path(
            &config.output_dir,
            "test/model",
            "2026-01-01",
            AgentActionType::Vanilla,
            "frames_test",
        );
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        let records: Vec<AnswerRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prediction, "4");
        assert_eq!(records[1].prediction, "Paris");
        assert_eq!(records[0].source, "frames_test");
    }

    #[tokio::test]
    async fn test_run_resumes_existing_answers() {
        let dir = TempDir::new().unwrap();
        let task_file = write_task_csv(
            &dir,
            "frames_test.csv",
            &[("What is 2+2?", "4"), ("Capital of France?", "Paris")],
        );

        let config = vanilla_config(&dir);
        let path = answers_path(
            &config.output_dir,
            "test/model",
            "2026-01-01",
            AgentActionType::Vanilla,
            "frames_test",
        );
        let existing = AnswerRecord {
            question: "What is 2+2?".to_string(),
            prediction: "4".to_string(),
            true_answer: "4".to_string(),
            source: "frames_test".to_string(),
            model_id: "test/model".to_string(),
            agent_action: AgentActionType::Vanilla,
            trial: 1,
            steps: 1,
            prompt_tokens: 10,
            completion_tokens: 5,
            duration_secs: 0.5,
            started_at: Utc::now(),
            error: None,
        };
        append_records(&path, &[existing]).unwrap();

        // Only the second question still needs an answer.
        let provider = Arc::new(ScriptedProvider::new(&["FINAL ANSWER: Paris"]));
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config);

        let summary = runner.run(&[task_file]).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.answered, 1);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_run_num_trials_expands_jobs() {
        let dir = TempDir::new().unwrap();
        let task_file = write_task_csv(&dir, "tasks.csv", &[("What is 2+2?", "4")]);

        let provider = Arc::new(ScriptedProvider::new(&[
            "FINAL ANSWER: 4",
            "FINAL ANSWER: four",
        ]));
        let mut config = vanilla_config(&dir);
        config.num_trials = 2;
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config.clone());

        let summary = runner.run(&[task_file]).await.unwrap();
        assert_eq!(summary.answered, 2);

        let path = answers_path(
            &config.output_dir,
            "test/model",
            "2026-01-01",
            AgentActionType::Vanilla,
            "tasks",
        );
        let content = fs::read_to_string(&path).unwrap();
        let trials: Vec<u32> = content
            .lines()
            .map(|l| serde_json::from_str::<AnswerRecord>(l).unwrap().trial)
            .collect();
        assert_eq!(trials, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_run_timeout_becomes_failure_record() {
        let dir = TempDir::new().unwrap();
        let task_file = write_task_csv(&dir, "tasks.csv", &[("What is 2+2?", "4")]);

        let provider = Arc::new(StalledProvider);
        let mut config = vanilla_config(&dir);
        config.task_timeout = Duration::from_millis(50);
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config.clone());

        let summary = runner.run(&[task_file]).await.unwrap();
        assert_eq!(summary.answered, 0);
        assert_eq!(summary.failed, 1);

        let path = answers_path(
            &config.output_dir,
            "test/model",
            "2026-01-01",
            AgentActionType::Vanilla,
            "tasks",
        );
        let content = fs::read_to_string(&path).unwrap();
        let record: AnswerRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(record.is_failed());
        assert!(record.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_counts_panicked_worker_as_failed() {
        let dir = TempDir::new().unwrap();
        let task_file = write_task_csv(&dir, "tasks.csv", &[("What is 2+2?", "4")]);

        let provider = Arc::new(PanickingProvider);
        let config = vanilla_config(&dir);
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config.clone());

        // The worker panic must not abort the run.
        let summary = runner.run(&[task_file]).await.unwrap();
        assert_eq!(summary.answered, 0);
        assert_eq!(summary.failed, 1);

        // No record was appended, so a rerun would retry the job.
        let path = answers_path(
            &config.output_dir,
            "test/model",
            "2026-01-01",
            AgentActionType::Vanilla,
            "tasks",
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_run_multiple_task_files() {
        let dir = TempDir::new().unwrap();
        let first = write_task_csv(&dir, "frames_test.csv", &[("What is 2+2?", "4")]);
        let second = write_task_csv(&dir, "simpleqa_test.csv", &[("Capital of France?", "Paris")]);

        let provider = Arc::new(ScriptedProvider::new(&[
            "FINAL ANSWER: 4",
            "FINAL ANSWER: Paris",
        ]));
        let config = vanilla_config(&dir);
        let runner = EvalRunner::new(provider.clone(), provider, "test/search", config);

        let summary = runner.run(&[first, second]).await.unwrap();
        assert_eq!(summary.answered, 2);
        assert_eq!(summary.task_files.len(), 2);
        assert_eq!(summary.task_files[0].task_name, "frames_test");
        assert_eq!(summary.task_files[1].task_name, "simpleqa_test");
    }

    #[tokio::test]
    async fn test_run_rejects_empty_task_list() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(&[]));
        let runner = EvalRunner::new(
            provider.clone(),
            provider,
            "test/search",
            vanilla_config(&dir),
        );
        assert!(runner.run(&[]).await.is_err());
    }
}
