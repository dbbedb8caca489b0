//! Feature scaling implementations

use super::imputers::median;
use super::{ensure_fitted, ensure_width, snapshot_of, FromParams, Scaler, StageComponent};
use crate::error::Result;
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column affine parameters: `(x - center) / scale`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: Array1<f64>,
    scale: Array1<f64>,
}

impl ScalerParams {
    fn apply(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_width(x, self.center.len())?;
        Ok((x - &self.center) / &self.scale)
    }
}

fn safe_scale(v: f64) -> f64 {
    if v == 0.0 || !v.is_finite() {
        1.0
    } else {
        v
    }
}

fn observed(col: ndarray::ArrayView1<f64>) -> Vec<f64> {
    col.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// `Standardize`: z-score per column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardize {
    with_mean: bool,
    with_std: bool,
    params: Option<ScalerParams>,
}

impl Standardize {
    pub fn new(with_mean: bool, with_std: bool) -> Self {
        Self {
            with_mean,
            with_std,
            params: None,
        }
    }
}

impl FromParams for Standardize {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(
            params.bool("with_mean", true)?,
            params.bool("with_std", true)?,
        ))
    }
}

impl StageComponent for Standardize {
    fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Scaler for Standardize {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let values = observed(col);
                let n = values.len().max(1) as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                (
                    if self.with_mean { mean } else { 0.0 },
                    if self.with_std { safe_scale(var.sqrt()) } else { 1.0 },
                )
            })
            .unzip();
        self.params = Some(ScalerParams {
            center: Array1::from_vec(center),
            scale: Array1::from_vec(scale),
        });
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.params {
            Some(p) => p.apply(x),
            None => ensure_fitted(false, "Standardize").map(|_| x.clone()),
        }
    }
}

/// `MinMaxScale`: map each column onto [0, 1]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScale {
    params: Option<ScalerParams>,
}

impl FromParams for MinMaxScale {
    fn from_params(_params: &Hyperparameters) -> Result<Self> {
        Ok(Self::default())
    }
}

impl StageComponent for MinMaxScale {
    fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Scaler for MinMaxScale {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let values = observed(col);
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if values.is_empty() {
                    (0.0, 1.0)
                } else {
                    (min, safe_scale(max - min))
                }
            })
            .unzip();
        self.params = Some(ScalerParams {
            center: Array1::from_vec(center),
            scale: Array1::from_vec(scale),
        });
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.params {
            Some(p) => p.apply(x),
            None => ensure_fitted(false, "MinMaxScale").map(|_| x.clone()),
        }
    }
}

/// `RobustScale`: center on the median, scale by an inter-quantile range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustScale {
    lower_quantile: f64,
    upper_quantile: f64,
    params: Option<ScalerParams>,
}

impl RobustScale {
    pub fn new(lower_quantile: f64, upper_quantile: f64) -> Self {
        Self {
            lower_quantile: lower_quantile.clamp(0.0, 0.5),
            upper_quantile: upper_quantile.clamp(0.5, 1.0),
            params: None,
        }
    }

    fn quantile(sorted: &[f64], q: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let pos = q * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

impl FromParams for RobustScale {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(
            params.float("quantile_lower", 0.25)?,
            params.float("quantile_upper", 0.75)?,
        ))
    }
}

impl StageComponent for RobustScale {
    fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Scaler for RobustScale {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mut values = observed(col);
                values.sort_by(|a, b| a.total_cmp(b));
                let med = if values.is_empty() { 0.0 } else { median(&values) };
                let iqr = Self::quantile(&values, self.upper_quantile)
                    - Self::quantile(&values, self.lower_quantile);
                (med, safe_scale(iqr))
            })
            .unzip();
        self.params = Some(ScalerParams {
            center: Array1::from_vec(center),
            scale: Array1::from_vec(scale),
        });
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.params {
            Some(p) => p.apply(x),
            None => ensure_fitted(false, "RobustScale").map(|_| x.clone()),
        }
    }
}

/// `Normalize`: rescale each row to unit L2 norm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Normalize {
    n_features: Option<usize>,
}

impl FromParams for Normalize {
    fn from_params(_params: &Hyperparameters) -> Result<Self> {
        Ok(Self::default())
    }
}

impl StageComponent for Normalize {
    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Scaler for Normalize {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n_features = self
            .n_features
            .ok_or_else(|| crate::error::AutoMLError::NotFitted("Normalize".to_string()))?;
        ensure_width(x, n_features)?;
        let mut result = x.clone();
        for mut row in result.rows_mut() {
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn y() -> Array1<f64> {
        Array1::zeros(3)
    }

    #[test]
    fn test_standardize() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let mut s = Standardize::new(true, true);
        s.fit(&x, &y()).unwrap();
        let t = s.transform(&x).unwrap();
        assert!(t.column(0).sum().abs() < 1e-12);
        // constant column keeps unit scale
        assert_eq!(t[[0, 1]], 0.0);
    }

    #[test]
    fn test_minmax() {
        let x = array![[1.0], [3.0], [5.0]];
        let mut s = MinMaxScale::default();
        s.fit(&x, &y()).unwrap();
        assert_eq!(s.transform(&x).unwrap(), array![[0.0], [0.5], [1.0]]);
    }

    #[test]
    fn test_robust_centers_on_median() {
        let x = array![[1.0], [2.0], [100.0]];
        let mut s = RobustScale::new(0.25, 0.75);
        s.fit(&x, &y()).unwrap();
        assert_eq!(s.transform(&x).unwrap()[[1, 0]], 0.0);
    }

    #[test]
    fn test_normalize_rows() {
        let x = array![[3.0, 4.0], [0.0, 0.0]];
        let mut s = Normalize::default();
        s.fit(&x, &Array1::zeros(2)).unwrap();
        let t = s.transform(&x).unwrap();
        assert_eq!(t.row(0).to_vec(), vec![0.6, 0.8]);
        assert_eq!(t.row(1).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        assert!(MinMaxScale::default().transform(&array![[1.0]]).is_err());
        assert!(Standardize::new(true, true).transform(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_width_mismatch() {
        let mut s = MinMaxScale::default();
        s.fit(&array![[1.0, 2.0]], &Array1::zeros(1)).unwrap();
        assert!(s.transform(&array![[1.0]]).is_err());
    }
}
