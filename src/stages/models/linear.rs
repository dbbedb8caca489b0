//! Linear model implementations

use super::{cholesky_solve, ensure_complete, labels_from_proba, n_classes};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use crate::stages::{
    class_labels, ensure_fitted, ensure_rows, ensure_width, snapshot_of, FromParams, Model,
    StageComponent,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted coefficients and intercept
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearFit {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

/// Solve centered (ridge) least squares: `(Xc^T Xc + alpha I) w = Xc^T yc`
fn fit_least_squares(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<LinearFit> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| AutoMLError::DataError("empty training data".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut xtx = xc.t().dot(&xc);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    let xty = xc.t().dot(&yc);
    let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
        AutoMLError::DataError("normal equations are singular".to_string())
    })?;
    let intercept = y_mean - x_mean.dot(&coefficients);
    Ok(LinearFit {
        coefficients,
        intercept,
    })
}

/// `LinearRegression`: ordinary least squares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    fit: Option<LinearFit>,
}

impl FromParams for LinearRegression {
    fn from_params(_params: &Hyperparameters) -> Result<Self> {
        Ok(Self::default())
    }
}

impl StageComponent for LinearRegression {
    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        self.fit = Some(fit_least_squares(x, y, 0.0)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("LinearRegression".to_string()))?;
        ensure_width(x, fit.coefficients.len())?;
        Ok(fit.decision(x))
    }
}

/// `RidgeRegression`: L2-penalised least squares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    /// Regularization strength
    alpha: f64,
    fit: Option<LinearFit>,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.max(0.0),
            fit: None,
        }
    }
}

impl FromParams for RidgeRegression {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(params.float("alpha", 1.0)?))
    }
}

impl StageComponent for RidgeRegression {
    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        self.fit = Some(fit_least_squares(x, y, self.alpha)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("RidgeRegression".to_string()))?;
        ensure_width(x, fit.coefficients.len())?;
        Ok(fit.decision(x))
    }
}

/// `LogisticRegression`: L2-penalised, one-vs-rest for more than two
/// classes, trained by gradient descent on internally standardized inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    c: f64,
    max_iter: usize,
    tol: f64,
    learning_rate: f64,
    n_classes: usize,
    /// Feature mean and std learned at fit time
    center: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    /// One fit for binary problems, one per class otherwise
    fits: Vec<LinearFit>,
    is_fitted: bool,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c: c.max(1e-8),
            max_iter: max_iter.max(1),
            tol: 1e-6,
            learning_rate: 0.1,
            n_classes: 0,
            center: None,
            scale: None,
            fits: Vec::new(),
            is_fitted: false,
        }
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn fit_binary(&self, x: &Array2<f64>, target: &Array1<f64>) -> LinearFit {
        let n_samples = x.nrows() as f64;
        let alpha = 1.0 / (self.c * n_samples);
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let predictions = Self::sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - target;
            let dw = x.t().dot(&errors) / n_samples + alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }
        LinearFit {
            coefficients: weights,
            intercept: bias,
        }
    }

    fn standardized(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match (&self.center, &self.scale) {
            (Some(center), Some(scale)) => {
                ensure_width(x, center.len())?;
                Ok((x - center) / scale)
            }
            _ => Err(AutoMLError::NotFitted("LogisticRegression".to_string())),
        }
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1.0, 200)
    }
}

impl FromParams for LogisticRegression {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(
            params.float("C", 1.0)?,
            params.usize("max_iter", 200)?,
        ))
    }
}

impl StageComponent for LogisticRegression {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        let labels = class_labels(y)?;
        self.n_classes = n_classes(&labels).max(2);

        let center = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AutoMLError::DataError("empty training data".to_string()))?;
        let scale = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 0.0 { s } else { 1.0 });
        self.center = Some(center);
        self.scale = Some(scale);
        let xs = self.standardized(x)?;

        let targets: Vec<usize> = if self.n_classes == 2 {
            vec![1]
        } else {
            (0..self.n_classes).collect()
        };
        self.fits = targets
            .iter()
            .map(|&class| {
                let target: Array1<f64> = labels
                    .iter()
                    .map(|&l| if l == class { 1.0 } else { 0.0 })
                    .collect();
                self.fit_binary(&xs, &target)
            })
            .collect();
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(labels_from_proba(&self.predict_proba(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_fitted(self.is_fitted, "LogisticRegression")?;
        let xs = self.standardized(x)?;
        let n = xs.nrows();
        let mut proba = Array2::zeros((n, self.n_classes));

        if self.n_classes == 2 {
            let p = Self::sigmoid(&self.fits[0].decision(&xs));
            for i in 0..n {
                proba[[i, 0]] = 1.0 - p[i];
                proba[[i, 1]] = p[i];
            }
        } else {
            for (class, fit) in self.fits.iter().enumerate() {
                let p = Self::sigmoid(&fit.decision(&xs));
                proba.column_mut(class).assign(&p);
            }
            for mut row in proba.rows_mut() {
                let total = row.sum();
                if total > 0.0 {
                    row.mapv_inplace(|v| v / total);
                }
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
    fn test_linear_regression_recovers_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let mut model = LinearRegression::default();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[5.0]]).unwrap();
        assert!((pred[0] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut ols = RidgeRegression::new(0.0);
        let mut ridge = RidgeRegression::new(100.0);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();
        let slope = |m: &RidgeRegression| {
            let p = m.predict(&array![[0.0], [1.0]]).unwrap();
            p[1] - p[0]
        };
        assert!(slope(&ridge) < slope(&ols));
    }

    #[test]
    fn test_logistic_binary_separates() {
        let x = array![[0.0], [0.5], [1.0], [4.0], [4.5], [5.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (6, 2));
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_multiclass() {
        let x = array![[0.0], [0.2], [5.0], [5.2], [10.0], [10.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new(10.0, 2000);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[0.1], [10.1]]).unwrap();
        assert_eq!(pred, array![0.0, 2.0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::default();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(AutoMLError::NotFitted(_))
        ));
    }
}
