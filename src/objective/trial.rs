//! Evaluation of one config point

use super::metrics::Objective;
use super::split::{holdout_split, take_rows, take_targets, ValidationConfig};
use crate::error::{AutoMLError, Result};
use crate::pipeline::{ArtifactStore, PipelineBundle};
use crate::registry::Registries;
use crate::search::CancelToken;
use crate::space::{decode, encode, ConfigPoint, FlatConfig};
use crate::stages::TaskType;
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Training status reported by a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingStatus {
    #[serde(rename = "fitted")]
    Fitted,
    #[serde(rename = "not fitted")]
    NotFitted,
}

/// Result record of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialReport {
    pub trial_id: usize,
    pub loss: f64,
    pub status: TrainingStatus,
    /// Full config echo, present in full-status mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FlatConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Anything the search controller can ask to score a config point
pub trait TrialEvaluator: Sync {
    fn task_type(&self) -> TaskType;

    fn evaluate(&self, trial_id: usize, point: &ConfigPoint, cancel: &CancelToken)
        -> Result<TrialReport>;

    /// Artifact store holding the fitted pipelines, if any
    fn artifacts(&self) -> Option<&ArtifactStore> {
        None
    }
}

/// Builds, fits and scores the pipeline of a config point
#[derive(Debug, Clone)]
pub struct TrialObjective {
    x: Arc<DataFrame>,
    y: Arc<Array1<f64>>,
    registries: Arc<Registries>,
    task_type: TaskType,
    objective: Objective,
    validation: ValidationConfig,
    full_status: bool,
    store: Option<ArtifactStore>,
}

impl TrialObjective {
    pub fn new(
        x: Arc<DataFrame>,
        y: Arc<Array1<f64>>,
        registries: Arc<Registries>,
        task_type: TaskType,
    ) -> Result<Self> {
        if x.height() != y.len() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} target values", x.height()),
                actual: format!("{} target values", y.len()),
            });
        }
        Ok(Self {
            x,
            y,
            registries,
            task_type,
            objective: Objective::default_for(task_type),
            validation: ValidationConfig::default(),
            full_status: false,
            store: None,
        })
    }

    pub fn with_objective(mut self, objective: Objective) -> Result<Self> {
        objective.validate(self.task_type)?;
        self.objective = objective;
        Ok(self)
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Result<Self> {
        validation.validate()?;
        self.validation = validation;
        Ok(self)
    }

    pub fn with_full_status(mut self, full_status: bool) -> Self {
        self.full_status = full_status;
        self
    }

    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Train/validation data under the validation policy
    fn partitions(&self) -> Result<(DataFrame, Array1<f64>, DataFrame, Array1<f64>)> {
        if !self.validation.enabled {
            return Ok((
                (*self.x).clone(),
                (*self.y).clone(),
                (*self.x).clone(),
                (*self.y).clone(),
            ));
        }
        let (train, valid) =
            holdout_split(self.x.height(), self.validation.valid_size, self.validation.seed)?;
        Ok((
            take_rows(&self.x, &train)?,
            take_targets(&self.y, &train),
            take_rows(&self.x, &valid)?,
            take_targets(&self.y, &valid),
        ))
    }

    /// Identifies the data and scoring setup a loss was measured under
    fn fingerprint(&self) -> String {
        let columns = self
            .x
            .get_column_names()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let target = self
            .y
            .iter()
            .fold(0u64, |acc, v| acc.rotate_left(5) ^ v.to_bits());
        let validation = if self.validation.enabled {
            format!("holdout({}, seed {})", self.validation.valid_size, self.validation.seed)
        } else {
            "full".to_string()
        };
        format!(
            "{} rows={} cols=[{}] target={:016x} objective={} validation={}",
            self.task_type.tag(),
            self.x.height(),
            columns,
            target,
            self.objective,
            validation
        )
    }

    /// Saved result of a previous run of the same trial, if it was scored on
    /// the same config, data and validation setup
    fn reuse(&self, trial_id: usize, point: &ConfigPoint) -> Option<TrialReport> {
        let store = self.store.as_ref()?;
        if !store.exists(trial_id) {
            return None;
        }
        let bundle = store.load(trial_id).ok()?;
        if bundle.config != *point {
            return None;
        }
        if bundle.fingerprint.as_deref() != Some(self.fingerprint().as_str()) {
            debug!(trial_id, "saved trial was scored under another setup; refitting");
            return None;
        }
        let loss = bundle.loss?;
        debug!(trial_id, loss, "reusing saved trial artifact");
        Some(self.report(trial_id, loss, point, Some(store.bundle_path(trial_id))))
    }

    fn report(
        &self,
        trial_id: usize,
        loss: f64,
        point: &ConfigPoint,
        artifact: Option<PathBuf>,
    ) -> TrialReport {
        TrialReport {
            trial_id,
            loss,
            status: TrainingStatus::Fitted,
            config: self.full_status.then(|| decode(point)),
            artifact,
        }
    }

    /// Wire-form entry point: encode first, then evaluate
    pub fn evaluate_flat(
        &self,
        trial_id: usize,
        flat: &FlatConfig,
        cancel: &CancelToken,
    ) -> Result<TrialReport> {
        let point = encode(flat)?;
        self.evaluate(trial_id, &point, cancel)
    }
}

impl TrialEvaluator for TrialObjective {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    fn evaluate(
        &self,
        trial_id: usize,
        point: &ConfigPoint,
        cancel: &CancelToken,
    ) -> Result<TrialReport> {
        if point.task_type != self.task_type {
            return Err(AutoMLError::ConfigError(format!(
                "trial {} is tagged {}, the objective is {}",
                trial_id,
                point.task_type.tag(),
                self.task_type.tag()
            )));
        }
        // resolves every constructor before any stage runs
        let mut pipeline = self.registries.instantiate(point)?;

        if let Some(report) = self.reuse(trial_id, point) {
            return Ok(report);
        }
        cancel.check()?;

        let (x_train, y_train, x_valid, y_valid) = self.partitions()?;
        debug!(
            trial_id,
            pipeline = %point.summary(),
            train_rows = x_train.height(),
            valid_rows = x_valid.height(),
            "fitting trial"
        );
        pipeline.fit(&x_train, &y_train)?;
        cancel.check()?;

        let y_pred = pipeline.predict(&x_valid)?;
        let proba = if self.objective.uses_proba() && pipeline.supports_proba() {
            Some(pipeline.predict_proba(&x_valid)?)
        } else {
            None
        };
        let loss = self.objective.loss(&y_valid, &y_pred, proba.as_ref())?;
        if !loss.is_finite() {
            return Err(AutoMLError::DataError(format!(
                "{} produced a non-finite loss",
                self.objective
            )));
        }

        // a cancelled trial never leaves an artifact behind
        cancel.check()?;
        let artifact = match &self.store {
            Some(store) => {
                let bundle = PipelineBundle::capture(trial_id, point, &pipeline, Some(loss))?
                    .with_fingerprint(self.fingerprint());
                Some(store.save(&bundle)?)
            }
            None => None,
        };

        info!(
            trial_id,
            loss,
            objective = %self.objective,
            pipeline = %point.summary(),
            "trial fitted"
        );
        Ok(self.report(trial_id, loss, point, artifact))
    }

    fn artifacts(&self) -> Option<&ArtifactStore> {
        self.store.as_ref()
    }
}
