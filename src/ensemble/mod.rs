//! Ensembles of the best fitted pipelines
//!
//! Classification members vote ([`Voting`]); regression members are reduced
//! row by row ([`Aggregation`]). [`EnsembleBuilder`] picks the top-k trials of
//! a search and reloads their persisted bundles.

mod aggregation;
mod voting;

pub use aggregation::{aggregate, Aggregation, AggregationFn, RegressorEnsemble};
pub use voting::{argmax_rows, average_proba, hard_vote, ClassifierEnsemble, Voting};

use crate::error::{AutoMLError, Result};
use crate::pipeline::{ArtifactStore, Pipeline, PipelineBundle};
use crate::registry::Registries;
use crate::search::{SearchResult, TrialRecord};
use crate::stages::TaskType;
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use tracing::{debug, info};

/// A named, fitted pipeline inside an ensemble
#[derive(Debug)]
pub struct EnsembleMember {
    /// `pipe_<rank>`, rank starting at 1
    pub name: String,
    pub trial_id: usize,
    pub loss: Option<f64>,
    pub pipeline: Pipeline,
}

impl EnsembleMember {
    pub fn new(name: impl Into<String>, trial_id: usize, loss: Option<f64>, pipeline: Pipeline) -> Self {
        Self {
            name: name.into(),
            trial_id,
            loss,
            pipeline,
        }
    }
}

pub(crate) fn check_weights(n_members: usize, weights: Option<&[f64]>) -> Result<()> {
    if n_members == 0 {
        return Err(AutoMLError::ConfigError("an ensemble needs at least one member".to_string()));
    }
    if let Some(w) = weights {
        if w.len() != n_members {
            return Err(AutoMLError::WeightMismatch {
                expected: n_members,
                actual: w.len(),
            });
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AutoMLError::InvalidParameter {
                name: "weights".to_string(),
                value: format!("{:?}", w),
                reason: "must be finite and non-negative".to_string(),
            });
        }
    }
    Ok(())
}

/// Either kind of ensemble
#[derive(Debug)]
pub enum Ensemble {
    Classifier(ClassifierEnsemble),
    Regressor(RegressorEnsemble),
}

impl Ensemble {
    pub fn task_type(&self) -> TaskType {
        match self {
            Ensemble::Classifier(_) => TaskType::Classification,
            Ensemble::Regressor(_) => TaskType::Regression,
        }
    }

    pub fn members(&self) -> &[EnsembleMember] {
        match self {
            Ensemble::Classifier(e) => e.members(),
            Ensemble::Regressor(e) => e.members(),
        }
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    pub fn weights(&self) -> Option<&[f64]> {
        match self {
            Ensemble::Classifier(e) => e.weights(),
            Ensemble::Regressor(e) => e.weights(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.members().iter().all(|m| m.pipeline.is_fully_fitted())
    }

    /// Fit only the members that still have unfitted slots
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<()> {
        let members = match self {
            Ensemble::Classifier(e) => e.members_mut(),
            Ensemble::Regressor(e) => e.members_mut(),
        };
        for member in members.iter_mut() {
            if !member.pipeline.is_fully_fitted() {
                debug!(member = %member.name, "fitting ensemble member");
                member.pipeline.fit(x, y)?;
            }
        }
        Ok(())
    }

    /// One prediction per input row
    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        match self {
            Ensemble::Classifier(e) => e.predict(x),
            Ensemble::Regressor(e) => e.predict(x),
        }
    }

    pub fn predict_proba(&self, x: &DataFrame) -> Result<Array2<f64>> {
        match self {
            Ensemble::Classifier(e) => e.predict_proba(x),
            Ensemble::Regressor(_) => Err(AutoMLError::Unsupported(
                "regression ensembles have no class probabilities".to_string(),
            )),
        }
    }
}

/// How members are combined
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Members to keep
    pub k: usize,
    pub voting: Voting,
    pub aggregation: Aggregation,
    pub weights: Option<Vec<f64>>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            k: 1,
            voting: Voting::Hard,
            aggregation: Aggregation::Mean,
            weights: None,
        }
    }
}

impl EnsembleConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn with_voting(mut self, voting: Voting) -> Self {
        self.voting = voting;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }
}

/// Builds ensembles from persisted trial bundles
pub struct EnsembleBuilder<'a> {
    registries: &'a Registries,
}

impl<'a> EnsembleBuilder<'a> {
    pub fn new(registries: &'a Registries) -> Self {
        Self { registries }
    }

    /// Top-k fitted trials of a search, loaded from the store
    pub fn build(
        &self,
        result: &SearchResult,
        store: &ArtifactStore,
        config: &EnsembleConfig,
    ) -> Result<Ensemble> {
        self.build_from_ranking(&result.ranking(), store, config)
    }

    pub fn build_from_ranking(
        &self,
        ranking: &[&TrialRecord],
        store: &ArtifactStore,
        config: &EnsembleConfig,
    ) -> Result<Ensemble> {
        if config.k == 0 {
            return Err(AutoMLError::InvalidParameter {
                name: "k".to_string(),
                value: "0".to_string(),
                reason: "an ensemble needs at least one member".to_string(),
            });
        }
        if ranking.is_empty() {
            return Err(AutoMLError::SearchError(
                "no fitted trial to build an ensemble from".to_string(),
            ));
        }
        let top = &ranking[..config.k.min(ranking.len())];
        // mismatched weights fail before any bundle is read
        check_weights(top.len(), config.weights.as_deref())?;

        let bundles = top
            .iter()
            .map(|record| store.load(record.trial_id))
            .collect::<Result<Vec<_>>>()?;
        self.assemble(bundles, config)
    }

    /// Ensemble from bundles already in rank order
    pub fn assemble(&self, bundles: Vec<PipelineBundle>, config: &EnsembleConfig) -> Result<Ensemble> {
        check_weights(bundles.len(), config.weights.as_deref())?;
        let task_type = bundles
            .first()
            .map(|b| b.config.task_type)
            .ok_or_else(|| AutoMLError::ConfigError("no bundles to assemble".to_string()))?;
        if let Some(other) = bundles.iter().find(|b| b.config.task_type != task_type) {
            return Err(AutoMLError::ConfigError(format!(
                "trial {} is {}, expected {}",
                other.trial_id,
                other.config.task_type.tag(),
                task_type.tag()
            )));
        }

        let members = bundles
            .iter()
            .enumerate()
            .map(|(rank, bundle)| {
                let pipeline = self.registries.restore_pipeline(bundle)?;
                Ok(EnsembleMember::new(
                    format!("pipe_{}", rank + 1),
                    bundle.trial_id,
                    bundle.loss,
                    pipeline,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            members = members.len(),
            trials = ?members.iter().map(|m| m.trial_id).collect::<Vec<_>>(),
            task = %task_type.tag(),
            "ensemble assembled"
        );
        let weights = config.weights.clone();
        Ok(match task_type {
            TaskType::Classification => {
                Ensemble::Classifier(ClassifierEnsemble::new(members, config.voting, weights)?)
            }
            TaskType::Regression => Ensemble::Regressor(RegressorEnsemble::new(
                members,
                config.aggregation.clone(),
                weights,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_weights() {
        assert!(check_weights(2, None).is_ok());
        assert!(check_weights(2, Some(&[1.0, 2.0])).is_ok());
        assert!(matches!(
            check_weights(3, Some(&[1.0, 1.0])),
            Err(AutoMLError::WeightMismatch { expected: 3, actual: 2 })
        ));
        assert!(check_weights(1, Some(&[-1.0])).is_err());
        assert!(check_weights(0, None).is_err());
    }

    #[test]
    fn test_builder_rejects_empty_ranking() {
        let registries = Registries::default();
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let err = EnsembleBuilder::new(&registries)
            .build_from_ranking(&[], &store, &EnsembleConfig::new(2))
            .unwrap_err();
        assert!(matches!(err, AutoMLError::SearchError(_)));
    }
}
