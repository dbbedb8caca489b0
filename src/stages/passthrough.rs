//! Pass-through stage shared by the optional roles

use super::{
    snapshot_of, Balancer, FeatureSelector, FromParams, Imputer, Scaler, StageComponent,
};
use crate::error::Result;
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// `no_processing`: returns its input unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoProcessing {
    is_fitted: bool,
}

impl NoProcessing {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromParams for NoProcessing {
    fn from_params(_params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new())
    }
}

impl StageComponent for NoProcessing {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Imputer for NoProcessing {
    fn fill(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.is_fitted = true;
        Ok(x.clone())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(x.clone())
    }
}

impl Balancer for NoProcessing {
    fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        self.is_fitted = true;
        Ok((x.clone(), y.clone()))
    }
}

impl Scaler for NoProcessing {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        self.is_fitted = true;
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(x.clone())
    }
}

impl FeatureSelector for NoProcessing {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        self.is_fitted = true;
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(x.clone())
    }
}
