//! Task dataset loading.
//!
//! Evaluation task files are CSV or JSONL tables with a `question` column,
//! a ground-truth column (`true_answer`, falling back to `answer`), and an
//! optional `source` column. [`load_task_records`] flattens a file into
//! [`TaskRecord`]s for the runner.

pub mod frame;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DatasetError;

pub use frame::Frame;

/// A single evaluation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// The question posed to the agent.
    pub question: String,
    /// Ground-truth answer used for grading.
    pub true_answer: String,
    /// Where the task came from (dataset subset or file stem).
    pub source: String,
}

/// Name of a task file: the file stem, e.g. `data/frames_test.csv` ->
/// `frames_test`.
pub fn task_name(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string()
}

/// Load all tasks from a CSV or JSONL file.
///
/// Requires a `question` column. Ground truth comes from `true_answer`,
/// falling back to `answer`. Rows with a null question are skipped; a null
/// ground truth becomes an empty string so grading can still mark the row
/// incorrect rather than abort the run.
pub fn load_task_records(path: impl AsRef<Path>) -> Result<Vec<TaskRecord>, DatasetError> {
    let path = path.as_ref();
    let frame = Frame::read(path)?;

    if frame.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }

    if frame.column_index("question").is_none() {
        return Err(DatasetError::MissingColumn {
            path: path.display().to_string(),
            column: "question".to_string(),
        });
    }

    let truth_column = ["true_answer", "answer"]
        .iter()
        .find(|c| frame.column_index(c).is_some())
        .copied()
        .ok_or_else(|| DatasetError::MissingColumn {
            path: path.display().to_string(),
            column: "true_answer".to_string(),
        })?;

    let default_source = task_name(path);
    let has_source = frame.column_index("source").is_some();

    let mut records = Vec::with_capacity(frame.num_rows());
    for row in 0..frame.num_rows() {
        let Some(question) = frame.get(row, "question") else {
            continue;
        };
        let true_answer = frame.get(row, truth_column).unwrap_or_default().to_string();
        let source = if has_source {
            frame
                .get(row, "source")
                .unwrap_or(default_source.as_str())
                .to_string()
        } else {
            default_source.clone()
        };

        records.push(TaskRecord {
            question: question.to_string(),
            true_answer,
            source,
        });
    }

    info!(
        path = %path.display(),
        tasks = records.len(),
        "Loaded task records"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_task_records_csv() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("frames_test.csv");
        std::fs::write(
            &path,
            "question,true_answer\nHow many legs does a spider have?,8\n",
        )
        .expect("write csv");

        let records = load_task_records(&path).expect("load records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "How many legs does a spider have?");
        assert_eq!(records[0].true_answer, "8");
        assert_eq!(records[0].source, "frames_test");
    }

    #[test]
    fn test_load_task_records_answer_fallback() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("simpleqa_test.jsonl");
        std::fs::write(
            &path,
            "{\"question\": \"Capital of France?\", \"answer\": \"Paris\", \"source\": \"simpleqa\"}\n",
        )
        .expect("write jsonl");

        let records = load_task_records(&path).expect("load records");
        assert_eq!(records[0].true_answer, "Paris");
        assert_eq!(records[0].source, "simpleqa");
    }

    #[test]
    fn test_load_task_records_missing_question_column() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "prompt,true_answer\nhello,world\n").expect("write csv");

        let err = load_task_records(&path).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::MissingColumn { column, .. } if column == "question"
        ));
    }

    #[test]
    fn test_load_task_records_empty_file() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "question,true_answer\n").expect("write csv");

        let err = load_task_records(&path).unwrap_err();
        assert!(matches!(err, DatasetError::Empty(_)));
    }

    #[test]
    fn test_load_task_records_skips_null_questions() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("tasks.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"question\": null, \"true_answer\": \"A\"}\n",
                "{\"question\": \"Q\", \"true_answer\": \"A\"}\n",
            ),
        )
        .expect("write jsonl");

        let records = load_task_records(&path).expect("load records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "Q");
    }

    #[test]
    fn test_task_name() {
        assert_eq!(task_name("data/frames_test.csv"), "frames_test");
        assert_eq!(task_name("simpleqa_test.jsonl"), "simpleqa_test");
    }
}
