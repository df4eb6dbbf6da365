//! String-typed tabular frame backed by Arrow CSV and JSONL files.
//!
//! Evaluation inputs and grading outputs are small tables of text columns
//! (questions, answers, predictions). [`Frame`] keeps every cell as an
//! optional string so CSV and JSONL files interchange losslessly; numeric
//! interpretation happens in the scorer, not here.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, StringBuilder};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::error::DatasetError;

/// Number of records sampled when inferring CSV column names.
const SCHEMA_INFERENCE_RECORDS: usize = 100;

/// A column-ordered table of optional string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    /// Create an empty frame with the given column names.
    pub fn new(columns: Vec<String>) -> Result<Self, DatasetError> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at `(row, column)`. `None` when the column does not exist
    /// or the cell is null.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// All rows, in order.
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Append a row. Must match the column count.
    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<(), DatasetError> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::LengthMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column with one value per existing row.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<(), DatasetError> {
        let name = name.into();
        if self.columns.contains(&name) {
            return Err(DatasetError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(DatasetError::LengthMismatch {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }

        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Add a column, or overwrite its values when it already exists.
    pub fn upsert_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> Result<(), DatasetError> {
        let name = name.into();
        let Some(idx) = self.column_index(&name) else {
            return self.add_column(name, values);
        };

        if values.len() != self.rows.len() {
            return Err(DatasetError::LengthMismatch {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Read a frame from a `.csv` or `.jsonl` file, dispatching on the
    /// extension.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Self::read_csv(path),
            "jsonl" => Self::read_jsonl(path),
            _ => Err(DatasetError::UnsupportedFormat {
                path: path.display().to_string(),
                extension,
            }),
        }
    }

    /// Write a frame to a `.csv` or `.jsonl` file, dispatching on the
    /// extension.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => self.write_csv(path),
            "jsonl" => self.write_jsonl(path),
            _ => Err(DatasetError::UnsupportedFormat {
                path: path.display().to_string(),
                extension,
            }),
        }
    }

    /// Read a CSV file with a header row.
    ///
    /// The schema is inferred only for column names; every column is then
    /// forced to nullable Utf8 so numeric-looking answer columns stay
    /// strings.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let format = Format::default().with_header(true);
        let (inferred, _) = format.infer_schema(&mut file, Some(SCHEMA_INFERENCE_RECORDS))?;
        file.rewind()?;

        let fields: Vec<Field> = inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let mut frame = Self::new(
            schema
                .fields()
                .iter()
                .map(|f| f.name().to_string())
                .collect(),
        )?;

        let reader = ReaderBuilder::new(schema)
            .with_format(format)
            .build(file)?;

        for batch in reader {
            let batch = batch?;
            frame.extend_from_batch(&batch)?;
        }

        debug!(
            path = %path.display(),
            rows = frame.num_rows(),
            columns = frame.columns.len(),
            "Loaded CSV frame"
        );
        Ok(frame)
    }

    /// Read a JSONL file, one object per line.
    ///
    /// Column order follows first appearance across lines. Missing keys and
    /// JSON nulls become null cells; non-string scalars keep their JSON
    /// rendering.
    pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut columns: Vec<String> = Vec::new();
        let mut objects: Vec<serde_json::Map<String, serde_json::Value>> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)?;
            if let serde_json::Value::Object(map) = value {
                for key in map.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
                objects.push(map);
            }
        }

        let mut frame = Self::new(columns)?;
        for map in objects {
            let row = frame
                .columns
                .iter()
                .map(|col| match map.get(col) {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect();
            frame.rows.push(row);
        }

        debug!(
            path = %path.display(),
            rows = frame.num_rows(),
            columns = frame.columns.len(),
            "Loaded JSONL frame"
        );
        Ok(frame)
    }

    /// Write the frame as CSV with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let batch = self.to_record_batch()?;
        let file = File::create(path)?;
        let mut writer = WriterBuilder::new().with_header(true).build(file);
        writer.write(&batch)?;

        debug!(path = %path.display(), rows = self.num_rows(), "Wrote CSV frame");
        Ok(())
    }

    /// Write the frame as JSONL, one object per line. Null cells become
    /// JSON nulls.
    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        for row in &self.rows {
            let mut map = serde_json::Map::new();
            for (col, cell) in self.columns.iter().zip(row) {
                let value = match cell {
                    Some(s) => serde_json::Value::String(s.clone()),
                    None => serde_json::Value::Null,
                };
                map.insert(col.clone(), value);
            }
            writeln!(writer, "{}", serde_json::Value::Object(map))?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = self.num_rows(), "Wrote JSONL frame");
        Ok(())
    }

    fn extend_from_batch(&mut self, batch: &RecordBatch) -> Result<(), DatasetError> {
        let mut string_columns: Vec<&StringArray> = Vec::with_capacity(self.columns.len());
        for (i, name) in self.columns.iter().enumerate() {
            let array = batch
                .column(i)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    arrow::error::ArrowError::CastError(format!("column '{name}' is not Utf8"))
                })?;
            string_columns.push(array);
        }

        for row_idx in 0..batch.num_rows() {
            let row = string_columns
                .iter()
                .map(|array| {
                    if array.is_null(row_idx) {
                        None
                    } else {
                        Some(array.value(row_idx).to_string())
                    }
                })
                .collect();
            self.rows.push(row);
        }
        Ok(())
    }

    fn to_record_batch(&self) -> Result<RecordBatch, DatasetError> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let mut builders: Vec<StringBuilder> = self
            .columns
            .iter()
            .map(|_| StringBuilder::new())
            .collect();

        for row in &self.rows {
            for (builder, cell) in builders.iter_mut().zip(row) {
                match cell {
                    Some(value) => builder.append_value(value),
                    None => builder.append_null(),
                }
            }
        }

        let arrays: Vec<ArrayRef> = builders
            .into_iter()
            .map(|mut b| Arc::new(b.finish()) as ArrayRef)
            .collect();

        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("write test file");
        path
    }

    #[test]
    fn test_read_csv_keeps_numbers_as_strings() {
        let dir = TempDir::new().expect("create temp dir");
        let path = write_file(
            &dir,
            "tasks.csv",
            "question,true_answer\nHow many moons does Mars have?,2\nWhat is 10% of 50?,5.0\n",
        );

        let frame = Frame::read_csv(&path).expect("read csv");
        assert_eq!(frame.columns(), &["question", "true_answer"]);
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.get(0, "true_answer"), Some("2"));
        assert_eq!(frame.get(1, "true_answer"), Some("5.0"));
    }

    #[test]
    fn test_read_csv_quoted_fields() {
        let dir = TempDir::new().expect("create temp dir");
        let path = write_file(
            &dir,
            "tasks.csv",
            "question,true_answer\n\"Who wrote \"\"Dune\"\", and when?\",\"Frank Herbert, 1965\"\n",
        );

        let frame = Frame::read_csv(&path).expect("read csv");
        assert_eq!(
            frame.get(0, "question"),
            Some("Who wrote \"Dune\", and when?")
        );
        assert_eq!(frame.get(0, "true_answer"), Some("Frank Herbert, 1965"));
    }

    #[test]
    fn test_read_jsonl_column_order_and_missing_keys() {
        let dir = TempDir::new().expect("create temp dir");
        let path = write_file(
            &dir,
            "tasks.jsonl",
            concat!(
                "{\"question\": \"Q1\", \"true_answer\": \"A1\"}\n",
                "\n",
                "{\"question\": \"Q2\", \"source\": \"web\", \"true_answer\": null}\n",
            ),
        );

        let frame = Frame::read_jsonl(&path).expect("read jsonl");
        assert_eq!(frame.columns(), &["question", "true_answer", "source"]);
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.get(0, "source"), None);
        assert_eq!(frame.get(1, "true_answer"), None);
        assert_eq!(frame.get(1, "source"), Some("web"));
    }

    #[test]
    fn test_read_jsonl_renders_non_string_scalars() {
        let dir = TempDir::new().expect("create temp dir");
        let path = write_file(
            &dir,
            "tasks.jsonl",
            "{\"question\": \"Q\", \"true_answer\": 42, \"score\": 0.5}\n",
        );

        let frame = Frame::read_jsonl(&path).expect("read jsonl");
        assert_eq!(frame.get(0, "true_answer"), Some("42"));
        assert_eq!(frame.get(0, "score"), Some("0.5"));
    }

    #[test]
    fn test_read_rejects_unknown_extension() {
        let result = Frame::read("tasks.parquet");
        assert!(matches!(
            result,
            Err(DatasetError::UnsupportedFormat { extension, .. }) if extension == "parquet"
        ));
    }

    #[test]
    fn test_push_row_length_mismatch() {
        let mut frame = Frame::new(vec!["a".to_string(), "b".to_string()]).expect("new frame");
        let err = frame.push_row(vec![Some("1".to_string())]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_add_column() {
        let mut frame = Frame::new(vec!["question".to_string()]).expect("new frame");
        frame
            .push_row(vec![Some("Q1".to_string())])
            .expect("push row");
        frame
            .push_row(vec![Some("Q2".to_string())])
            .expect("push row");

        frame
            .add_column("is_correct", vec![Some("true".to_string()), None])
            .expect("add column");

        assert_eq!(frame.columns(), &["question", "is_correct"]);
        assert_eq!(frame.get(0, "is_correct"), Some("true"));
        assert_eq!(frame.get(1, "is_correct"), None);
    }

    #[test]
    fn test_add_column_rejects_duplicate() {
        let mut frame = Frame::new(vec!["question".to_string()]).expect("new frame");
        let err = frame.add_column("question", vec![]).unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateColumn(name) if name == "question"));
    }

    #[test]
    fn test_upsert_column_overwrites_existing() {
        let mut frame = Frame::new(vec!["question".to_string()]).expect("new frame");
        frame
            .push_row(vec![Some("Q1".to_string())])
            .expect("push row");

        frame
            .upsert_column("is_correct", vec![Some("false".to_string())])
            .expect("insert column");
        frame
            .upsert_column("is_correct", vec![Some("true".to_string())])
            .expect("overwrite column");

        assert_eq!(frame.columns(), &["question", "is_correct"]);
        assert_eq!(frame.get(0, "is_correct"), Some("true"));
    }

    #[test]
    fn test_duplicate_column_on_construction() {
        let err = Frame::new(vec!["a".to_string(), "a".to_string()]).unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_write_csv_then_read_back() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("out").join("graded.csv");

        let mut frame =
            Frame::new(vec!["question".to_string(), "prediction".to_string()]).expect("new frame");
        frame
            .push_row(vec![Some("What is 2+2?".to_string()), Some("4".to_string())])
            .expect("push row");
        frame
            .push_row(vec![Some("Unanswered".to_string()), None])
            .expect("push row");

        frame.write_csv(&path).expect("write csv");
        let read_back = Frame::read_csv(&path).expect("read csv");

        assert_eq!(read_back.columns(), frame.columns());
        assert_eq!(read_back.num_rows(), 2);
        assert_eq!(read_back.get(0, "prediction"), Some("4"));
        assert_eq!(read_back.get(1, "prediction"), None);
    }

    #[test]
    fn test_write_jsonl_includes_nulls() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("answers.jsonl");

        let mut frame =
            Frame::new(vec!["question".to_string(), "prediction".to_string()]).expect("new frame");
        frame
            .push_row(vec![Some("Q".to_string()), None])
            .expect("push row");
        frame.write_jsonl(&path).expect("write jsonl");

        let content = std::fs::read_to_string(&path).expect("read back");
        let value: serde_json::Value =
            serde_json::from_str(content.trim()).expect("parse jsonl line");
        assert_eq!(value["question"], "Q");
        assert!(value["prediction"].is_null());
    }
}
