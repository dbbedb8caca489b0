//! CSV loading and target extraction

use crate::error::{AutoMLError, Result};
use crate::stages::TaskType;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// CSV reader settings
#[derive(Debug, Clone)]
pub struct DataLoader {
    separator: u8,
    has_header: bool,
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            separator: b',',
            has_header: true,
            infer_schema_length: Some(100),
        }
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_infer_schema_length(mut self, n: Option<usize>) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)
            .map_err(|e| AutoMLError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(self.has_header)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(CsvParseOptions::default().with_separator(self.separator))
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| AutoMLError::DataError(e.to_string()))?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded csv"
        );
        Ok(df)
    }

    /// Load a CSV file and split off the target column
    pub fn load_supervised(
        &self,
        path: impl AsRef<Path>,
        target: &str,
        task: Option<TaskType>,
    ) -> Result<LabeledData> {
        let df = self.load_csv(path)?;
        split_target(&df, target, task)
    }
}

/// Features and encoded target
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub x: DataFrame,
    pub y: Array1<f64>,
    pub task_type: TaskType,
    pub classes: Option<ClassMap>,
}

/// Class names by encoded index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    pub names: Vec<String>,
}

impl ClassMap {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of an encoded label, falling back to the number itself
    pub fn decode(&self, label: f64) -> String {
        if label >= 0.0 && label.fract() == 0.0 {
            if let Some(name) = self.names.get(label as usize) {
                return name.clone();
            }
        }
        label.to_string()
    }
}

/// Split `target` from the feature columns.
///
/// Textual targets are always factorized to `0..K` in sorted order. Numeric
/// classification targets are factorized only when they are not already
/// `0..K`.
pub fn split_target(df: &DataFrame, target: &str, task: Option<TaskType>) -> Result<LabeledData> {
    let column = df
        .column(target)
        .map_err(|_| AutoMLError::DataError(format!("target column '{}' not found", target)))?;
    if column.null_count() > 0 {
        return Err(AutoMLError::DataError(format!(
            "target column '{}' has {} missing values",
            target,
            column.null_count()
        )));
    }
    let x = df.drop(target)?;

    let textual = matches!(column.dtype(), DataType::String | DataType::Categorical(_, _));
    let (y, task_type, classes) = if textual {
        if task == Some(TaskType::Regression) {
            return Err(AutoMLError::DataError(format!(
                "target column '{}' is textual, regression needs numbers",
                target
            )));
        }
        let casted = column.cast(&DataType::String)?;
        let values: Vec<String> = casted
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect();
        let (y, classes) = factorize(&values);
        (y, TaskType::Classification, Some(classes))
    } else {
        let casted = column.cast(&DataType::Float64)?;
        let y: Array1<f64> = casted
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let task_type = task.unwrap_or_else(|| TaskType::infer(&y));
        match task_type {
            TaskType::Classification if !is_dense_labels(&y) => {
                let values: Vec<String> = y.iter().map(|v| v.to_string()).collect();
                let mut numeric: Vec<f64> = y.to_vec();
                numeric.sort_by(|a, b| a.total_cmp(b));
                numeric.dedup();
                let names: Vec<String> = numeric.iter().map(|v| v.to_string()).collect();
                let encoded = values
                    .iter()
                    .map(|v| names.iter().position(|n| n == v).unwrap_or(0) as f64)
                    .collect();
                (encoded, task_type, Some(ClassMap { names }))
            }
            _ => (y, task_type, None),
        }
    };

    debug!(
        target,
        task = %task_type,
        rows = x.height(),
        features = x.width(),
        classes = classes.as_ref().map_or(0, ClassMap::len),
        "split target"
    );
    Ok(LabeledData {
        x,
        y,
        task_type,
        classes,
    })
}

/// Labels already equal to `0..K` with every class present
fn is_dense_labels(y: &Array1<f64>) -> bool {
    if !y.iter().all(|v| *v >= 0.0 && v.fract() == 0.0) {
        return false;
    }
    let mut distinct: Vec<i64> = y.iter().map(|v| *v as i64).collect();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.iter().enumerate().all(|(i, v)| i as i64 == *v)
}

/// Sorted distinct values and the index of each entry
fn factorize(values: &[String]) -> (Array1<f64>, ClassMap) {
    let mut names: Vec<String> = values.to_vec();
    names.sort();
    names.dedup();
    let y = values
        .iter()
        .map(|v| names.binary_search(v).unwrap_or(0) as f64)
        .collect();
    (y, ClassMap { names })
}
