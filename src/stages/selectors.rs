//! Feature selectors
//!
//! All selectors rank columns by a score learned at `fit` and keep a
//! fixed subset; `transform` only projects onto the kept columns.

use super::models::LinearSVC;
use super::{
    class_labels, ensure_rows, ensure_width, snapshot_of, FeatureSelector, FromParams, Model,
    StageComponent,
};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Kept column indices plus the width seen at fit time
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Selection {
    n_features: usize,
    kept: Vec<usize>,
}

impl Selection {
    /// Keep the `n_keep` best-scoring columns, preserving column order.
    /// NaN scores rank last; ties keep the earlier column.
    fn top(scores: &[f64], n_keep: usize) -> Self {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        let key = |i: usize| if scores[i].is_nan() { f64::NEG_INFINITY } else { scores[i] };
        order.sort_by(|&a, &b| key(b).total_cmp(&key(a)).then(a.cmp(&b)));
        let mut kept: Vec<usize> = order.into_iter().take(n_keep.clamp(1, scores.len().max(1))).collect();
        kept.sort_unstable();
        Self {
            n_features: scores.len(),
            kept,
        }
    }

    fn apply(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_width(x, self.n_features)?;
        Ok(x.select(Axis(1), &self.kept))
    }
}

fn n_keep(n_features: usize, proportion: f64) -> usize {
    ((n_features as f64 * proportion).round() as usize).max(1)
}

fn pearson(a: ArrayView1<f64>, b: &Array1<f64>) -> f64 {
    let n = a.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    }
}

fn proportion_param(params: &Hyperparameters, name: &str, default: f64) -> Result<f64> {
    let value = params.float(name, default)?;
    if !(value > 0.0 && value <= 1.0) {
        return Err(AutoMLError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must lie in (0, 1]".to_string(),
        });
    }
    Ok(value)
}

/// `FeatureFilter`: keep the `n_prop` share of columns with the strongest
/// absolute Pearson correlation to the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFilter {
    n_prop: f64,
    selection: Option<Selection>,
}

impl FeatureFilter {
    pub fn new(n_prop: f64) -> Self {
        Self {
            n_prop,
            selection: None,
        }
    }
}

impl FromParams for FeatureFilter {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(proportion_param(params, "n_prop", 0.5)?))
    }
}

impl StageComponent for FeatureFilter {
    fn is_fitted(&self) -> bool {
        self.selection.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl FeatureSelector for FeatureFilter {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        let scores: Vec<f64> = x.columns().into_iter().map(|c| pearson(c, y).abs()).collect();
        self.selection = Some(Selection::top(&scores, n_keep(x.ncols(), self.n_prop)));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.selection
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("FeatureFilter".to_string()))?
            .apply(x)
    }
}

/// Univariate score used by [`SelectPercentile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnivariateScore {
    /// One-way ANOVA F statistic across classes
    AnovaF,
    /// F statistic of the univariate linear regression
    RegressionF,
}

/// `select_percentile_classification` / `select_percentile_regression`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectPercentile {
    score: UnivariateScore,
    percentile: f64,
    selection: Option<Selection>,
}

impl SelectPercentile {
    pub fn new(score: UnivariateScore, percentile: f64) -> Self {
        Self {
            score,
            percentile: percentile.clamp(1.0, 100.0),
            selection: None,
        }
    }

    pub fn classification(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(UnivariateScore::AnovaF, params.float("percentile", 50.0)?))
    }

    pub fn regression(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(UnivariateScore::RegressionF, params.float("percentile", 50.0)?))
    }

    fn anova_f(column: ArrayView1<f64>, labels: &[usize]) -> f64 {
        let n = column.len() as f64;
        let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut sums = vec![0.0; k];
        let mut counts = vec![0.0; k];
        for (&v, &l) in column.iter().zip(labels) {
            sums[l] += v;
            counts[l] += 1.0;
        }
        let grand = column.sum() / n;
        let groups = counts.iter().filter(|c| **c > 0.0).count() as f64;
        let mut between = 0.0;
        for c in 0..k {
            if counts[c] > 0.0 {
                between += counts[c] * (sums[c] / counts[c] - grand).powi(2);
            }
        }
        let mut within = 0.0;
        for (&v, &l) in column.iter().zip(labels) {
            within += (v - sums[l] / counts[l]).powi(2);
        }
        if groups < 2.0 || n <= groups {
            return 0.0;
        }
        let df_between = groups - 1.0;
        let df_within = n - groups;
        if within == 0.0 {
            return if between > 0.0 { f64::INFINITY } else { 0.0 };
        }
        (between / df_between) / (within / df_within)
    }

    fn regression_f(column: ArrayView1<f64>, y: &Array1<f64>) -> f64 {
        let r = pearson(column, y);
        let dof = column.len() as f64 - 2.0;
        if dof <= 0.0 {
            return 0.0;
        }
        let r2 = r * r;
        if r2 >= 1.0 {
            f64::INFINITY
        } else {
            r2 / (1.0 - r2) * dof
        }
    }
}

impl StageComponent for SelectPercentile {
    fn is_fitted(&self) -> bool {
        self.selection.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl FeatureSelector for SelectPercentile {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        let scores: Vec<f64> = match self.score {
            UnivariateScore::AnovaF => {
                let labels = class_labels(y)?;
                x.columns().into_iter().map(|c| Self::anova_f(c, &labels)).collect()
            }
            UnivariateScore::RegressionF => x
                .columns()
                .into_iter()
                .map(|c| Self::regression_f(c, y))
                .collect(),
        };
        self.selection = Some(Selection::top(
            &scores,
            n_keep(x.ncols(), self.percentile / 100.0),
        ));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.selection
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("SelectPercentile".to_string()))?
            .apply(x)
    }
}

/// `liblinear_svc_preprocessor`: keep columns whose linear-SVM weight
/// reaches `threshold` times the mean absolute weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibLinearSvcPreprocessor {
    c: f64,
    threshold: f64,
    selection: Option<Selection>,
}

impl LibLinearSvcPreprocessor {
    pub fn new(c: f64, threshold: f64) -> Self {
        Self {
            c,
            threshold: threshold.max(0.0),
            selection: None,
        }
    }
}

impl FromParams for LibLinearSvcPreprocessor {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(params.float("C", 1.0)?, params.float("threshold", 1.0)?))
    }
}

impl StageComponent for LibLinearSvcPreprocessor {
    fn is_fitted(&self) -> bool {
        self.selection.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl FeatureSelector for LibLinearSvcPreprocessor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut svc = LinearSVC::new(self.c, 100);
        svc.fit(x, y)?;
        let weights = svc
            .feature_weights()
            .ok_or_else(|| AutoMLError::DataError("linear SVM produced no weights".to_string()))?;
        let cutoff = self.threshold * weights.mean().unwrap_or(0.0);
        let n_selected = weights.iter().filter(|w| **w >= cutoff).count();
        self.selection = Some(Selection::top(&weights.to_vec(), n_selected));
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.selection
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("liblinear_svc_preprocessor".to_string()))?
            .apply(x)
    }
}
