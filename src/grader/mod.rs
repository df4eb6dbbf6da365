//! Autograding of answer tables.
//!
//! Takes a frame of predictions and ground truths, scores every row with
//! [`question_scorer`], appends an `is_correct` column, and summarizes
//! accuracy overall and per group (source, model, agent style) where those
//! columns are present.

pub mod scorer;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::dataset::Frame;
use crate::error::GradeError;

pub use scorer::question_scorer;

/// Prediction column candidates, in priority order.
const PREDICTION_COLUMNS: [&str; 2] = ["prediction", "answer"];

/// Ground-truth column candidates, in priority order.
const TRUTH_COLUMNS: [&str; 2] = ["true_answer", "target"];

/// Name of the verdict column appended by grading.
pub const IS_CORRECT_COLUMN: &str = "is_correct";

/// Accuracy of one group of rows.
#[derive(Debug, Clone, Serialize)]
pub struct GroupAccuracy {
    /// Rows in the group.
    pub total: usize,
    /// Rows scored correct.
    pub correct: usize,
    /// correct / total.
    pub accuracy: f64,
}

/// Summary of one grading pass.
#[derive(Debug, Clone, Serialize)]
pub struct GradeReport {
    /// Rows graded.
    pub total: usize,
    /// Rows scored correct.
    pub correct: usize,
    /// correct / total.
    pub accuracy: f64,
    /// Accuracy per `source` value, when the column exists.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_source: BTreeMap<String, GroupAccuracy>,
    /// Accuracy per `model_id` value, when the column exists.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_model: BTreeMap<String, GroupAccuracy>,
    /// Accuracy per `agent_action` value, when the column exists.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_action_type: BTreeMap<String, GroupAccuracy>,
}

fn accuracy(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

fn pick_column<'a>(frame: &Frame, candidates: &'a [&str]) -> Option<&'a str> {
    candidates
        .iter()
        .find(|c| frame.column_index(c).is_some())
        .copied()
}

fn group_breakdown(
    frame: &Frame,
    column: &str,
    verdicts: &[bool],
) -> BTreeMap<String, GroupAccuracy> {
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    if frame.column_index(column).is_none() {
        return BTreeMap::new();
    }

    for (row, correct) in verdicts.iter().enumerate() {
        let key = frame.get(row, column).unwrap_or("unknown").to_string();
        let entry = counts.entry(key).or_default();
        entry.0 += 1;
        if *correct {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|(key, (total, correct))| {
            (
                key,
                GroupAccuracy {
                    total,
                    correct,
                    accuracy: accuracy(correct, total),
                },
            )
        })
        .collect()
}

/// Grade every row of a frame in place.
///
/// Appends (or overwrites) the `is_correct` column with `"true"` /
/// `"false"` strings and returns the accuracy summary. The prediction is
/// read from `prediction` (falling back to `answer`), the ground truth
/// from `true_answer` (falling back to `target`). Null cells grade as
/// empty strings.
pub fn autograde_frame(frame: &mut Frame) -> Result<GradeReport, GradeError> {
    if frame.is_empty() {
        return Err(GradeError::EmptyFrame);
    }

    let prediction_column = pick_column(frame, &PREDICTION_COLUMNS)
        .ok_or_else(|| GradeError::MissingColumn(PREDICTION_COLUMNS[0].to_string()))?;
    let truth_column = pick_column(frame, &TRUTH_COLUMNS)
        .ok_or_else(|| GradeError::MissingColumn(TRUTH_COLUMNS[0].to_string()))?;

    let verdicts: Vec<bool> = (0..frame.num_rows())
        .map(|row| {
            let prediction = frame.get(row, prediction_column).unwrap_or_default();
            let truth = frame.get(row, truth_column).unwrap_or_default();
            question_scorer(prediction, truth)
        })
        .collect();

    let correct = verdicts.iter().filter(|v| **v).count();
    let total = verdicts.len();

    let report = GradeReport {
        total,
        correct,
        accuracy: accuracy(correct, total),
        by_source: group_breakdown(frame, "source", &verdicts),
        by_model: group_breakdown(frame, "model_id", &verdicts),
        by_action_type: group_breakdown(frame, "agent_action", &verdicts),
    };

    let column_values = verdicts
        .iter()
        .map(|v| Some(if *v { "true".to_string() } else { "false".to_string() }))
        .collect();
    frame.upsert_column(IS_CORRECT_COLUMN, column_values)?;

    info!(
        total = report.total,
        correct = report.correct,
        accuracy = format!("{:.1}%", report.accuracy * 100.0),
        "Graded answer frame"
    );
    Ok(report)
}

/// Grade a CSV or JSONL answers file and write the graded copy.
///
/// The output format follows the output path's extension.
pub fn autograde_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<GradeReport, GradeError> {
    let input_path = input_path.as_ref();
    let output_path = output_path.as_ref();

    let mut frame = Frame::read(input_path)?;
    let report = autograde_frame(&mut frame)?;
    frame.write(output_path)?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        "Wrote graded answers"
    );
    Ok(report)
}
