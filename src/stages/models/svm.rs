//! Linear support vector machines (liblinear-style primal solvers)
//!
//! Both are trained by averaged subgradient descent on standardized
//! inputs. Training cost grows with rows × features × epochs, so the
//! registry flags them as quadratic-cost methods.

use super::{ensure_complete, n_classes};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use crate::stages::{
    class_labels, ensure_rows, ensure_width, snapshot_of, FromParams, Model, StageComponent,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standardization learned at fit time
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Standardizer {
    center: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    fn fit(x: &Array2<f64>) -> Result<Self> {
        let center = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AutoMLError::DataError("empty training data".to_string()))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 { s } else { 1.0 });
        Ok(Self { center, scale })
    }

    fn apply(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_width(x, self.center.len())?;
        Ok((x - &self.center) / &self.scale)
    }
}

/// Hyperplane `w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hyperplane {
    weights: Array1<f64>,
    bias: f64,
}

impl Hyperplane {
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

/// Subgradient descent on `lambda/2 |w|^2 + mean(loss)` with a decaying step
/// and iterate averaging. `margin_grad` returns dLoss/dPrediction.
fn train_hyperplane<F>(x: &Array2<f64>, y: &Array1<f64>, c: f64, epochs: usize, margin_grad: F) -> Hyperplane
where
    F: Fn(f64, f64) -> f64,
{
    let n = x.nrows();
    let lambda = 1.0 / (c * n as f64);
    let mut w = Array1::<f64>::zeros(x.ncols());
    let mut b = 0.0;
    let mut w_avg = w.clone();
    let mut b_avg = 0.0;

    for epoch in 0..epochs {
        let eta = 1.0 / (1.0 + epoch as f64).sqrt();
        let pred = x.dot(&w) + b;
        let grads: Array1<f64> = pred
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| margin_grad(p, t))
            .collect();
        let gw = x.t().dot(&grads) / n as f64 + lambda * &w;
        let gb = grads.mean().unwrap_or(0.0);
        w = w - eta * gw;
        b -= eta * gb;

        let k = (epoch + 1) as f64;
        w_avg = w_avg * ((k - 1.0) / k) + &w / k;
        b_avg = b_avg * ((k - 1.0) / k) + b / k;
    }
    Hyperplane {
        weights: w_avg,
        bias: b_avg,
    }
}

/// `LibLinear_SVC`: hinge-loss linear classifier, one-vs-rest beyond two classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSVC {
    c: f64,
    max_iter: usize,
    n_classes: usize,
    standardizer: Option<Standardizer>,
    planes: Vec<Hyperplane>,
}

impl LinearSVC {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c: c.max(1e-8),
            max_iter: max_iter.max(1),
            n_classes: 0,
            standardizer: None,
            planes: Vec::new(),
        }
    }

    /// Decision values, one column per hyperplane
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let standardizer = self
            .standardizer
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("LibLinear_SVC".to_string()))?;
        let xs = standardizer.apply(x)?;
        let mut out = Array2::zeros((x.nrows(), self.planes.len()));
        for (j, plane) in self.planes.iter().enumerate() {
            out.column_mut(j).assign(&plane.decision(&xs));
        }
        Ok(out)
    }

    /// Largest absolute weight per feature across hyperplanes,
    /// on the standardized scale
    pub fn feature_weights(&self) -> Option<Array1<f64>> {
        let first = self.planes.first()?;
        let mut out = first.weights.mapv(f64::abs);
        for plane in &self.planes[1..] {
            out.zip_mut_with(&plane.weights, |o, w| *o = o.max(w.abs()));
        }
        Some(out)
    }
}

impl FromParams for LinearSVC {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(params.float("C", 1.0)?, params.usize("max_iter", 200)?))
    }
}

impl StageComponent for LinearSVC {
    fn is_fitted(&self) -> bool {
        !self.planes.is_empty()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for LinearSVC {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        let labels = class_labels(y)?;
        self.n_classes = n_classes(&labels).max(2);
        let standardizer = Standardizer::fit(x)?;
        let xs = standardizer.apply(x)?;

        let targets: Vec<usize> = if self.n_classes == 2 {
            vec![1]
        } else {
            (0..self.n_classes).collect()
        };
        let hinge = |p: f64, t: f64| if t * p < 1.0 { -t } else { 0.0 };
        self.planes = targets
            .iter()
            .map(|&class| {
                let signs: Array1<f64> = labels
                    .iter()
                    .map(|&l| if l == class { 1.0 } else { -1.0 })
                    .collect();
                train_hyperplane(&xs, &signs, self.c, self.max_iter, hinge)
            })
            .collect();
        self.standardizer = Some(standardizer);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let decision = self.decision_function(x)?;
        if self.n_classes == 2 {
            return Ok(decision.column(0).mapv(|d| if d > 0.0 { 1.0 } else { 0.0 }));
        }
        Ok(decision
            .rows()
            .into_iter()
            .map(|r| super::argmax(r) as f64)
            .collect())
    }
}

/// `LibLinear_SVR`: epsilon-insensitive linear regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSVR {
    c: f64,
    epsilon: f64,
    max_iter: usize,
    standardizer: Option<Standardizer>,
    /// Target mean and scale; the solver works on a standardized target
    y_center: f64,
    y_scale: f64,
    plane: Option<Hyperplane>,
}

impl LinearSVR {
    pub fn new(c: f64, epsilon: f64, max_iter: usize) -> Self {
        Self {
            c: c.max(1e-8),
            epsilon: epsilon.max(0.0),
            max_iter: max_iter.max(1),
            standardizer: None,
            y_center: 0.0,
            y_scale: 1.0,
            plane: None,
        }
    }
}

impl FromParams for LinearSVR {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(
            params.float("C", 1.0)?,
            params.float("epsilon", 0.1)?,
            params.usize("max_iter", 200)?,
        ))
    }
}

impl StageComponent for LinearSVR {
    fn is_fitted(&self) -> bool {
        self.plane.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for LinearSVR {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        let standardizer = Standardizer::fit(x)?;
        let xs = standardizer.apply(x)?;
        self.y_center = y.mean().unwrap_or(0.0);
        let std = y.std(0.0);
        self.y_scale = if std > 0.0 { std } else { 1.0 };
        let ys = y.mapv(|v| (v - self.y_center) / self.y_scale);

        let epsilon = self.epsilon;
        let insensitive = move |p: f64, t: f64| {
            let r = p - t;
            if r > epsilon {
                1.0
            } else if r < -epsilon {
                -1.0
            } else {
                0.0
            }
        };
        self.plane = Some(train_hyperplane(&xs, &ys, self.c, self.max_iter, insensitive));
        self.standardizer = Some(standardizer);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (Some(standardizer), Some(plane)) = (&self.standardizer, &self.plane) else {
            return Err(AutoMLError::NotFitted("LibLinear_SVR".to_string()));
        };
        let xs = standardizer.apply(x)?;
        Ok(plane.decision(&xs).mapv(|v| v * self.y_scale + self.y_center))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_svc_separable() {
        let x = array![[0.0, 0.0], [0.5, 0.2], [1.0, 0.4], [5.0, 5.0], [5.5, 5.2], [6.0, 5.4]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LinearSVC::new(1.0, 300);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.feature_weights().unwrap().len(), 2);
    }

    #[test]
    fn test_linear_svr_tracks_trend() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let mut model = LinearSVR::new(10.0, 0.01, 500);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[5.0], [15.0]]).unwrap();
        assert!(pred[1] > pred[0]);
    }

    #[test]
    fn test_svc_has_no_probabilities() {
        let mut model = LinearSVC::new(1.0, 10);
        model.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]).unwrap();
        assert!(!model.supports_proba());
        assert!(model.predict_proba(&array![[0.0]]).is_err());
    }
}
