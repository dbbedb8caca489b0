//! Validation metrics and the loss sign convention
//!
//! Every loss is minimized: greater-is-better scores are negated,
//! error metrics are used as they are.

use crate::error::{AutoMLError, Result};
use crate::stages::TaskType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// User metric: `(y_true, y_pred) -> score`
pub type MetricFn = Arc<dyn Fn(&Array1<f64>, &Array1<f64>) -> Result<f64> + Send + Sync>;

/// Metric driving the search
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Objective {
    Accuracy,
    Precision,
    Auc,
    F1,
    Hinge,
    Mse,
    Mae,
    Msle,
    R2,
    MaxError,
    Custom {
        name: String,
        greater_is_better: bool,
        func: MetricFn,
    },
}

impl Objective {
    pub fn custom<F>(name: impl Into<String>, greater_is_better: bool, func: F) -> Self
    where
        F: Fn(&Array1<f64>, &Array1<f64>) -> Result<f64> + Send + Sync + 'static,
    {
        Objective::Custom {
            name: name.into(),
            greater_is_better,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Objective::Accuracy => "accuracy",
            Objective::Precision => "precision",
            Objective::Auc => "auc",
            Objective::F1 => "f1",
            Objective::Hinge => "hinge",
            Objective::Mse => "MSE",
            Objective::Mae => "MAE",
            Objective::Msle => "MSLE",
            Objective::R2 => "R2",
            Objective::MaxError => "MAX",
            Objective::Custom { name, .. } => name,
        }
    }

    /// Parse a built-in metric name, case-insensitively
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Objective::Accuracy),
            "precision" => Ok(Objective::Precision),
            "auc" | "roc_auc" => Ok(Objective::Auc),
            "f1" => Ok(Objective::F1),
            "hinge" => Ok(Objective::Hinge),
            "mse" => Ok(Objective::Mse),
            "mae" => Ok(Objective::Mae),
            "msle" => Ok(Objective::Msle),
            "r2" => Ok(Objective::R2),
            "max" | "max_error" => Ok(Objective::MaxError),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "objective".to_string(),
                value: name.to_string(),
                valid: Self::builtin_names(),
            }),
        }
    }

    pub fn builtin_names() -> Vec<String> {
        [
            "accuracy",
            "precision",
            "auc",
            "f1",
            "hinge",
            "MSE",
            "MAE",
            "MSLE",
            "R2",
            "MAX",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Default metric of a task
    pub fn default_for(task: TaskType) -> Self {
        match task {
            TaskType::Classification => Objective::Accuracy,
            TaskType::Regression => Objective::Mse,
        }
    }

    pub fn greater_is_better(&self) -> bool {
        match self {
            Objective::Accuracy
            | Objective::Precision
            | Objective::Auc
            | Objective::F1
            | Objective::R2 => true,
            Objective::Hinge
            | Objective::Mse
            | Objective::Mae
            | Objective::Msle
            | Objective::MaxError => false,
            Objective::Custom {
                greater_is_better, ..
            } => *greater_is_better,
        }
    }

    /// Task a built-in metric belongs to; `None` for custom metrics
    pub fn task(&self) -> Option<TaskType> {
        match self {
            Objective::Accuracy
            | Objective::Precision
            | Objective::Auc
            | Objective::F1
            | Objective::Hinge => Some(TaskType::Classification),
            Objective::Mse
            | Objective::Mae
            | Objective::Msle
            | Objective::R2
            | Objective::MaxError => Some(TaskType::Regression),
            Objective::Custom { .. } => None,
        }
    }

    pub fn validate(&self, task: TaskType) -> Result<()> {
        match self.task() {
            Some(own) if own != task => Err(AutoMLError::ConfigError(format!(
                "objective '{}' is a {} metric, the task is {}",
                self.name(),
                own,
                task
            ))),
            _ => Ok(()),
        }
    }

    /// Whether class probabilities sharpen the metric
    pub fn uses_proba(&self) -> bool {
        matches!(self, Objective::Auc | Objective::Hinge)
    }

    /// Raw metric value
    pub fn score(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        proba: Option<&Array2<f64>>,
    ) -> Result<f64> {
        check_lengths(y_true, y_pred)?;
        match self {
            Objective::Accuracy => Ok(accuracy(y_true, y_pred)),
            Objective::Precision => Ok(precision(y_true, y_pred)),
            Objective::F1 => Ok(f1(y_true, y_pred)),
            Objective::Auc => {
                let scores = class_scores(y_true, y_pred, proba)?;
                auc(y_true, &scores)
            }
            Objective::Hinge => {
                let scores = class_scores(y_true, y_pred, proba)?;
                hinge(y_true, &scores)
            }
            Objective::Mse => Ok(mse(y_true, y_pred)),
            Objective::Mae => Ok(mae(y_true, y_pred)),
            Objective::Msle => msle(y_true, y_pred),
            Objective::R2 => Ok(r2(y_true, y_pred)),
            Objective::MaxError => Ok(max_error(y_true, y_pred)),
            Objective::Custom { func, .. } => func(y_true, y_pred),
        }
    }

    /// Score under the always-minimize convention
    pub fn loss(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        proba: Option<&Array2<f64>>,
    ) -> Result<f64> {
        let score = self.score(y_true, y_pred, proba)?;
        Ok(if self.greater_is_better() { -score } else { score })
    }
}

impl fmt::Debug for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Custom {
                name,
                greater_is_better,
                ..
            } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("greater_is_better", greater_is_better)
                .finish_non_exhaustive(),
            builtin => f.write_str(builtin.name()),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialEq for Objective {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.greater_is_better() == other.greater_is_better()
    }
}

impl TryFrom<String> for Objective {
    type Error = AutoMLError;

    fn try_from(name: String) -> Result<Self> {
        Objective::parse(&name)
    }
}

impl From<Objective> for String {
    fn from(objective: Objective) -> Self {
        objective.name().to_string()
    }
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(AutoMLError::DataError(
            "cannot score an empty validation set".to_string(),
        ));
    }
    Ok(())
}

fn label(v: f64) -> usize {
    if v.is_finite() && v > 0.0 {
        v.round() as usize
    } else {
        0
    }
}

fn n_labels(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> usize {
    y_true
        .iter()
        .chain(y_pred.iter())
        .map(|&v| label(v))
        .max()
        .unwrap_or(0)
        + 1
}

pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| label(**t) == label(**p))
        .count();
    correct as f64 / y_true.len() as f64
}

/// Per-label (true positives, false positives, false negatives)
fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<(f64, f64, f64)> {
    let mut counts = vec![(0.0, 0.0, 0.0); n_labels(y_true, y_pred)];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (label(t), label(p));
        if t == p {
            counts[t].0 += 1.0;
        } else {
            counts[p].1 += 1.0;
            counts[t].2 += 1.0;
        }
    }
    counts
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Per-label statistic, binary on label 1 for two labels, macro-averaged otherwise
fn averaged<F: Fn((f64, f64, f64)) -> f64>(y_true: &Array1<f64>, y_pred: &Array1<f64>, stat: F) -> f64 {
    let counts = confusion_counts(y_true, y_pred);
    if counts.len() <= 2 {
        return counts.get(1).copied().map_or(0.0, &stat);
    }
    let present: Vec<f64> = counts
        .iter()
        .filter(|(tp, fp, fn_)| tp + fp + fn_ > 0.0)
        .map(|c| stat(*c))
        .collect();
    if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    }
}

pub fn precision(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    averaged(y_true, y_pred, |(tp, fp, _)| ratio(tp, tp + fp))
}

pub fn f1(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    averaged(y_true, y_pred, |(tp, fp, fn_)| ratio(2.0 * tp, 2.0 * tp + fp + fn_))
}

/// Probabilities when available, otherwise one-hot predicted labels
fn class_scores(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    proba: Option<&Array2<f64>>,
) -> Result<Array2<f64>> {
    if let Some(p) = proba {
        if p.nrows() != y_true.len() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} probability rows", y_true.len()),
                actual: format!("{} probability rows", p.nrows()),
            });
        }
        let width = p.ncols().max(n_labels(y_true, y_pred));
        let mut padded = Array2::zeros((p.nrows(), width));
        padded.slice_mut(ndarray::s![.., ..p.ncols()]).assign(p);
        return Ok(padded);
    }
    let width = n_labels(y_true, y_pred).max(2);
    let mut onehot = Array2::zeros((y_pred.len(), width));
    for (i, &p) in y_pred.iter().enumerate() {
        onehot[[i, label(p)]] = 1.0;
    }
    Ok(onehot)
}

/// Rank-based area under the ROC curve of one score column
fn binary_auc(positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positive.iter().filter(|p| **p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // average ranks over ties
    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(positive)
        .filter(|(_, p)| **p)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Binary AUC on the label-1 column, one-vs-rest macro average beyond two labels
pub fn auc(y_true: &Array1<f64>, scores: &Array2<f64>) -> Result<f64> {
    let labels: Vec<usize> = y_true.iter().map(|&v| label(v)).collect();
    let undefined = || {
        AutoMLError::DataError("AUC is undefined when the validation set has one class".to_string())
    };
    if scores.ncols() <= 2 {
        let positive: Vec<bool> = labels.iter().map(|&l| l == 1).collect();
        let column: Vec<f64> = scores.column(scores.ncols() - 1).to_vec();
        return binary_auc(&positive, &column).ok_or_else(undefined);
    }
    let per_class: Vec<f64> = (0..scores.ncols())
        .filter_map(|c| {
            let positive: Vec<bool> = labels.iter().map(|&l| l == c).collect();
            binary_auc(&positive, &scores.column(c).to_vec())
        })
        .collect();
    if per_class.is_empty() {
        return Err(undefined());
    }
    Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
}

/// Multi-class hinge: mean of `max(0, 1 - (s_true - max other s))`;
/// binary scores `2p - 1` against targets `±1`
pub fn hinge(y_true: &Array1<f64>, scores: &Array2<f64>) -> Result<f64> {
    let n = y_true.len() as f64;
    if scores.ncols() <= 2 {
        let column = scores.column(scores.ncols() - 1);
        let total: f64 = y_true
            .iter()
            .zip(column.iter())
            .map(|(&t, &p)| {
                let target = if label(t) == 1 { 1.0 } else { -1.0 };
                (1.0 - target * (2.0 * p - 1.0)).max(0.0)
            })
            .sum();
        return Ok(total / n);
    }
    let total: f64 = y_true
        .iter()
        .zip(scores.rows())
        .map(|(&t, row)| {
            let t = label(t).min(row.len() - 1);
            let other = row
                .iter()
                .enumerate()
                .filter(|(c, _)| *c != t)
                .map(|(_, v)| *v)
                .fold(f64::NEG_INFINITY, f64::max);
            (1.0 - (row[t] - other)).max(0.0)
        })
        .sum();
    Ok(total / n)
}

pub fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(|e| e * e).mean().unwrap_or(0.0)
}

pub fn mae(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(f64::abs).mean().unwrap_or(0.0)
}

pub fn msle(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    if y_true.iter().chain(y_pred.iter()).any(|v| *v < 0.0) {
        return Err(AutoMLError::DataError(
            "MSLE is undefined for negative targets or predictions".to_string(),
        ));
    }
    Ok(mse(&y_true.mapv(f64::ln_1p), &y_pred.mapv(f64::ln_1p)))
}

pub fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = (y_true - y_pred).mapv(|e| e * e).sum();
    let ss_tot: f64 = y_true.mapv(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn max_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(f64::abs).fold(0.0, |a, &b| a.max(b))
}
