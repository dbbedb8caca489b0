//! Six-slot pipeline
//!
//! Slots are filled in order encoder → imputer → balancer → scaler →
//! feature selector → model. `fit` fits only the slots that are not
//! fitted yet and applies the fitted ones. The balancer runs during
//! training only; inference never sees it.

mod artifact;

pub use artifact::{ArtifactStore, PipelineBundle, StageArtifact};
pub(crate) use artifact::{read_json, write_json_atomic};

use crate::error::{AutoMLError, Result};
use crate::stages::encoders::frame_to_array;
use crate::stages::{Balancer, Encoder, FeatureSelector, Imputer, Model, Scaler, Stage};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use tracing::debug;

/// Ordered, stateful wrapper around six stage instances
#[derive(Debug, Default)]
pub struct Pipeline {
    encoder: Option<Box<dyn Encoder>>,
    imputer: Option<Box<dyn Imputer>>,
    balancer: Option<Box<dyn Balancer>>,
    scaler: Option<Box<dyn Scaler>>,
    feature_selector: Option<Box<dyn FeatureSelector>>,
    model: Option<Box<dyn Model>>,
    fitted: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoder(mut self, encoder: Box<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_imputer(mut self, imputer: Box<dyn Imputer>) -> Self {
        self.imputer = Some(imputer);
        self
    }

    pub fn with_balancer(mut self, balancer: Box<dyn Balancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    pub fn with_scaler(mut self, scaler: Box<dyn Scaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_feature_selector(mut self, selector: Box<dyn FeatureSelector>) -> Self {
        self.feature_selector = Some(selector);
        self
    }

    pub fn with_model(mut self, model: Box<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn encoder(&self) -> Option<&dyn Encoder> {
        self.encoder.as_deref()
    }

    pub fn imputer(&self) -> Option<&dyn Imputer> {
        self.imputer.as_deref()
    }

    pub fn balancer(&self) -> Option<&dyn Balancer> {
        self.balancer.as_deref()
    }

    pub fn scaler(&self) -> Option<&dyn Scaler> {
        self.scaler.as_deref()
    }

    pub fn feature_selector(&self) -> Option<&dyn FeatureSelector> {
        self.feature_selector.as_deref()
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    /// Whole-pipeline fitted flag, set by a successful `fit`
    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Per-slot fitted flags, `None` for empty slots
    pub fn slot_status(&self) -> [(Stage, Option<bool>); 6] {
        [
            (Stage::Encoder, self.encoder.as_ref().map(|s| s.is_fitted())),
            (Stage::Imputer, self.imputer.as_ref().map(|s| s.is_fitted())),
            (Stage::Balancer, self.balancer.as_ref().map(|s| s.is_fitted())),
            (Stage::Scaler, self.scaler.as_ref().map(|s| s.is_fitted())),
            (
                Stage::FeatureSelector,
                self.feature_selector.as_ref().map(|s| s.is_fitted()),
            ),
            (Stage::Model, self.model.as_ref().map(|s| s.is_fitted())),
        ]
    }

    /// Every present slot reports fitted
    pub fn is_fully_fitted(&self) -> bool {
        self.slot_status()
            .iter()
            .all(|(_, fitted)| fitted.unwrap_or(true))
    }

    /// Fit the unfitted slots in pipeline order
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<()> {
        if self.model.is_none() {
            return Err(AutoMLError::MissingModel);
        }
        if x.height() != y.len() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} target values", x.height()),
                actual: format!("{} target values", y.len()),
            });
        }

        let mut data = match self.encoder.as_mut() {
            Some(encoder) if encoder.is_fitted() => encoder.refit(x),
            Some(encoder) => encoder.fit(x),
            None => frame_to_array(x),
        }
        .map_err(|e| e.in_stage(Stage::Encoder))?;
        let mut target = y.clone();

        if let Some(imputer) = self.imputer.as_mut() {
            data = if imputer.is_fitted() {
                imputer.transform(&data)
            } else {
                imputer.fill(&data)
            }
            .map_err(|e| e.in_stage(Stage::Imputer))?;
        }

        if let Some(balancer) = self.balancer.as_mut() {
            if !balancer.is_fitted() {
                let before = data.nrows();
                let (xb, yb) = balancer
                    .fit_transform(&data, &target)
                    .map_err(|e| e.in_stage(Stage::Balancer))?;
                debug!(before, after = xb.nrows(), "balanced training rows");
                data = xb;
                target = yb;
            }
        }

        if let Some(scaler) = self.scaler.as_mut() {
            if !scaler.is_fitted() {
                scaler
                    .fit(&data, &target)
                    .map_err(|e| e.in_stage(Stage::Scaler))?;
            }
            data = scaler
                .transform(&data)
                .map_err(|e| e.in_stage(Stage::Scaler))?;
        }

        if let Some(selector) = self.feature_selector.as_mut() {
            if !selector.is_fitted() {
                selector
                    .fit(&data, &target)
                    .map_err(|e| e.in_stage(Stage::FeatureSelector))?;
            }
            data = selector
                .transform(&data)
                .map_err(|e| e.in_stage(Stage::FeatureSelector))?;
        }

        if let Some(model) = self.model.as_mut() {
            if !model.is_fitted() {
                model
                    .fit(&data, &target)
                    .map_err(|e| e.in_stage(Stage::Model))?;
            }
        }

        self.fitted = true;
        Ok(())
    }

    /// Model input for new rows: every fitted slot except the balancer
    pub fn transform_features(&self, x: &DataFrame) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AutoMLError::NotFitted("Pipeline".to_string()));
        }
        let mut data = match self.encoder.as_ref() {
            Some(encoder) => encoder.refit(x),
            None => frame_to_array(x),
        }
        .map_err(|e| e.in_stage(Stage::Encoder))?;
        if let Some(imputer) = self.imputer.as_ref() {
            data = imputer
                .transform(&data)
                .map_err(|e| e.in_stage(Stage::Imputer))?;
        }
        if let Some(scaler) = self.scaler.as_ref() {
            data = scaler
                .transform(&data)
                .map_err(|e| e.in_stage(Stage::Scaler))?;
        }
        if let Some(selector) = self.feature_selector.as_ref() {
            data = selector
                .transform(&data)
                .map_err(|e| e.in_stage(Stage::FeatureSelector))?;
        }
        Ok(data)
    }

    fn fitted_model(&self) -> Result<&dyn Model> {
        if !self.fitted {
            return Err(AutoMLError::NotFitted("Pipeline".to_string()));
        }
        self.model.as_deref().ok_or(AutoMLError::MissingModel)
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        let model = self.fitted_model()?;
        let features = self.transform_features(x)?;
        model.predict(&features)
    }

    pub fn predict_proba(&self, x: &DataFrame) -> Result<Array2<f64>> {
        let model = self.fitted_model()?;
        let features = self.transform_features(x)?;
        model.predict_proba(&features)
    }

    pub fn supports_proba(&self) -> bool {
        self.model.as_ref().map_or(false, |m| m.supports_proba())
    }

    /// Mark a pipeline rebuilt from fitted artifacts as fitted
    pub(crate) fn into_restored(mut self) -> Result<Self> {
        let model = self.model.as_ref().ok_or(AutoMLError::MissingModel)?;
        if !model.is_fitted() {
            return Err(AutoMLError::NotFitted(format!("restored {:?}", model)));
        }
        self.fitted = true;
        Ok(self)
    }
}
