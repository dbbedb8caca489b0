//! Pipeline stage roles
//!
//! Every pipeline has six slots, filled in this order:
//! encoder → imputer → balancer → scaler → feature selector → model.
//! Each slot is a trait object implementing one of the role traits below.
//! The built-in implementations live in the submodules.

pub mod balancers;
pub mod encoders;
pub mod imputers;
pub mod models;
mod passthrough;
pub mod scalers;
pub mod selectors;

pub use passthrough::NoProcessing;

use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six pipeline roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Encoder,
    Imputer,
    Balancer,
    Scaler,
    FeatureSelector,
    Model,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 6] = [
        Stage::Encoder,
        Stage::Imputer,
        Stage::Balancer,
        Stage::Scaler,
        Stage::FeatureSelector,
        Stage::Model,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Encoder => "encoder",
            Stage::Imputer => "imputer",
            Stage::Balancer => "balancer",
            Stage::Scaler => "scaler",
            Stage::FeatureSelector => "feature_selector",
            Stage::Model => "model",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        stage.as_str().to_string()
    }
}

/// Learning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }

    /// Tag carried by every config point
    pub fn tag(&self) -> String {
        format!("tabular_{}", self.as_str())
    }

    /// Parse either the bare name or the `tabular_` tag
    pub fn parse(value: &str) -> Result<Self> {
        let bare = value.strip_prefix("tabular_").unwrap_or(value);
        match bare.to_ascii_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "task_type".to_string(),
                value: value.to_string(),
                valid: vec!["classification".to_string(), "regression".to_string()],
            }),
        }
    }

    /// Guess the task from the target: few distinct integral values means classification
    pub fn infer(y: &Array1<f64>) -> Self {
        let integral = y.iter().all(|v| v.is_finite() && v.fract() == 0.0 && *v >= 0.0);
        if !integral {
            return TaskType::Regression;
        }
        let mut distinct: Vec<i64> = y.iter().map(|v| *v as i64).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let limit = 20.max(y.len() / 50).min(50);
        if distinct.len() <= limit {
            TaskType::Classification
        } else {
            TaskType::Regression
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by every stage implementation
pub trait StageComponent: Send + Sync + fmt::Debug {
    /// Whether the stage has learned its state
    fn is_fitted(&self) -> bool;

    /// Serialized fitted state, restorable through the registry
    fn snapshot(&self) -> Result<serde_json::Value>;
}

/// Turns the raw frame into a dense numeric matrix
pub trait Encoder: StageComponent {
    /// Learn the column mapping and encode the training frame
    fn fit(&mut self, x: &DataFrame) -> Result<Array2<f64>>;

    /// Re-apply the learned mapping to new rows
    fn refit(&self, x: &DataFrame) -> Result<Array2<f64>>;
}

/// Replaces missing values (NaN)
pub trait Imputer: StageComponent {
    /// Learn fill statistics and fill; idempotent on data without NaN
    fn fill(&mut self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Fill new rows with the learned statistics
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Training-only resampler; may change the row count
pub trait Balancer: StageComponent {
    fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>)>;
}

/// Column-wise rescaling
pub trait Scaler: StageComponent {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Column subset selection
pub trait FeatureSelector: StageComponent {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Final estimator
pub trait Model: StageComponent {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities, one column per class index
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(AutoMLError::Unsupported(format!(
            "{:?} does not produce class probabilities",
            self
        )))
    }

    fn supports_proba(&self) -> bool {
        false
    }
}

/// Construct a stage from its sampled hyperparameters
pub trait FromParams: Sized {
    fn from_params(params: &Hyperparameters) -> Result<Self>;
}

pub(crate) fn ensure_fitted(fitted: bool, what: &str) -> Result<()> {
    if fitted {
        Ok(())
    } else {
        Err(AutoMLError::NotFitted(what.to_string()))
    }
}

pub(crate) fn ensure_rows(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(AutoMLError::DataError("empty training data".to_string()));
    }
    Ok(())
}

pub(crate) fn ensure_width(x: &Array2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Whether any entry is NaN
pub fn has_missing(x: &Array2<f64>) -> bool {
    x.iter().any(|v| v.is_nan())
}

/// Class labels as non-negative indices
pub(crate) fn class_labels(y: &Array1<f64>) -> Result<Vec<usize>> {
    y.iter()
        .map(|&v| {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                Err(AutoMLError::DataError(format!(
                    "class labels must be non-negative integers, got {}",
                    v
                )))
            }
        })
        .collect()
}

pub(crate) fn snapshot_of<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
