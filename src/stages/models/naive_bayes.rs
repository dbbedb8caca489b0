//! Gaussian Naive Bayes

use super::{ensure_complete, labels_from_proba, n_classes};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use crate::stages::{
    class_labels, ensure_rows, ensure_width, snapshot_of, FromParams, Model, StageComponent,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-class Gaussian statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// `GaussianNB`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNB {
    /// Fraction of the largest feature variance added to every variance
    var_smoothing: f64,
    /// Indexed by class label; `None` for labels absent from training
    classes: Vec<Option<ClassStats>>,
    n_features: usize,
}

impl GaussianNB {
    pub fn new(var_smoothing: f64) -> Self {
        Self {
            var_smoothing: var_smoothing.max(0.0),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    fn joint_log_likelihood(&self, row: &[f64]) -> Vec<f64> {
        self.classes
            .iter()
            .map(|stats| match stats {
                None => f64::NEG_INFINITY,
                Some(s) => {
                    let mut ll = s.log_prior;
                    for ((&x, &mean), &var) in row.iter().zip(&s.means).zip(&s.variances) {
                        ll += -0.5 * (2.0 * PI * var).ln() - (x - mean).powi(2) / (2.0 * var);
                    }
                    ll
                }
            })
            .collect()
    }
}

impl Default for GaussianNB {
    fn default() -> Self {
        Self::new(1e-9)
    }
}

impl FromParams for GaussianNB {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(params.float("var_smoothing", 1e-9)?))
    }
}

impl StageComponent for GaussianNB {
    fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for GaussianNB {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        let labels = class_labels(y)?;
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();

        let max_var = x
            .columns()
            .into_iter()
            .map(|c| c.var(0.0))
            .fold(0.0, f64::max);
        let epsilon = (self.var_smoothing * max_var).max(1e-12);

        self.classes = (0..n_classes(&labels))
            .map(|class| {
                // Welford's online mean/variance
                let mut count = 0.0;
                let mut means = vec![0.0; n_features];
                let mut m2 = vec![0.0; n_features];
                for (row, _) in x.rows().into_iter().zip(&labels).filter(|(_, &l)| l == class) {
                    count += 1.0;
                    for (j, &v) in row.iter().enumerate() {
                        let delta = v - means[j];
                        means[j] += delta / count;
                        m2[j] += delta * (v - means[j]);
                    }
                }
                if count == 0.0 {
                    return None;
                }
                Some(ClassStats {
                    log_prior: (count / n_samples).ln(),
                    means,
                    variances: m2.iter().map(|v| v / count + epsilon).collect(),
                })
            })
            .collect();
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(labels_from_proba(&self.predict_proba(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(AutoMLError::NotFitted("GaussianNB".to_string()));
        }
        ensure_width(x, self.n_features)?;
        ensure_complete(x)?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let jll = self.joint_log_likelihood(&row.to_vec());
            // log-sum-exp normalization
            let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let total: f64 = jll.iter().map(|v| (v - max).exp()).sum();
            for (c, v) in jll.iter().enumerate() {
                proba[[i, c]] = (v - max).exp() / total;
            }
        }
        Ok(proba)
    }

    fn supports_proba(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gaussian_nb() {
        let x = array![[1.0, 2.0], [1.2, 1.8], [6.0, 7.0], [6.2, 7.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = GaussianNB::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_absent_label_gets_zero_probability() {
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        let y = array![0.0, 0.0, 2.0, 2.0];
        let mut model = GaussianNB::default();
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&array![[0.05]]).unwrap();
        assert_eq!(proba.ncols(), 3);
        assert_eq!(proba[[0, 1]], 0.0);
    }
}
