//! Candidate filtering
//!
//! [`candidates`] is a pure function of the registry, the dataset profile
//! and the user restriction; it never mutates the registry.

use super::methods::{
    BalancerMethod, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod, SelectorMethod,
    StageMethod,
};
use super::{Registries, Registry};
use crate::error::{AutoMLError, Result};
use crate::stages::encoders::missing_cells;
use crate::stages::{Stage, TaskType};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shape facts that drive candidate pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub n_rows: usize,
    pub n_cols: usize,
    pub has_missing: bool,
    pub task_type: TaskType,
}

impl DatasetProfile {
    pub fn from_frame(x: &DataFrame, task_type: TaskType) -> Self {
        Self {
            n_rows: x.height(),
            n_cols: x.width(),
            has_missing: missing_cells(x) > 0,
            task_type,
        }
    }

    pub fn n_cells(&self) -> usize {
        self.n_rows.saturating_mul(self.n_cols)
    }
}

/// User restriction on one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    /// Every registered method valid for the task
    #[default]
    Auto,
    /// Exactly these method names
    Only(Vec<String>),
}

impl Restriction {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Restriction::Only(names.into_iter().map(Into::into).collect())
    }
}

/// One restriction per stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageRestrictions {
    pub encoder: Restriction,
    pub imputer: Restriction,
    pub balancer: Restriction,
    pub scaler: Restriction,
    pub feature_selector: Restriction,
    pub model: Restriction,
}

impl StageRestrictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style restriction of one stage
    pub fn with(mut self, stage: Stage, restriction: Restriction) -> Self {
        *self.get_mut(stage) = restriction;
        self
    }

    pub fn get(&self, stage: Stage) -> &Restriction {
        match stage {
            Stage::Encoder => &self.encoder,
            Stage::Imputer => &self.imputer,
            Stage::Balancer => &self.balancer,
            Stage::Scaler => &self.scaler,
            Stage::FeatureSelector => &self.feature_selector,
            Stage::Model => &self.model,
        }
    }

    fn get_mut(&mut self, stage: Stage) -> &mut Restriction {
        match stage {
            Stage::Encoder => &mut self.encoder,
            Stage::Imputer => &mut self.imputer,
            Stage::Balancer => &mut self.balancer,
            Stage::Scaler => &mut self.scaler,
            Stage::FeatureSelector => &mut self.feature_selector,
            Stage::Model => &mut self.model,
        }
    }
}

/// Pruning knobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidatePolicy {
    /// Above `rows * cols` cells, quadratic-cost methods are dropped
    pub large_data_threshold: usize,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self {
            large_data_threshold: 10_000,
        }
    }
}

/// Ordered, non-empty set of methods valid for this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet<M> {
    methods: Vec<M>,
}

impl<M: StageMethod> CandidateSet<M> {
    pub fn methods(&self) -> &[M] {
        &self.methods
    }

    pub fn contains(&self, method: M) -> bool {
        self.methods.contains(&method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.as_str()).collect()
    }
}

/// Methods of one stage valid for this run.
///
/// Filters, in order: task support, the large-data rule, the
/// missing-value rule (imputer only), then the user restriction.
pub fn candidates<M, T>(
    registry: &Registry<M, T>,
    profile: &DatasetProfile,
    restriction: &Restriction,
    policy: &CandidatePolicy,
) -> Result<CandidateSet<M>>
where
    M: StageMethod,
    T: ?Sized,
{
    let mut available: Vec<M> = registry
        .methods()
        .into_iter()
        .filter(|m| m.task_support().supports(profile.task_type))
        .collect();

    if profile.n_cells() > policy.large_data_threshold {
        available.retain(|m| !m.quadratic_cost());
    }

    if M::STAGE == Stage::Imputer && !profile.has_missing {
        if let Some(pass) = M::pass_through().filter(|p| registry.contains(*p)) {
            return Ok(CandidateSet {
                methods: vec![pass],
            });
        }
    }

    let methods = match restriction {
        Restriction::Auto => available,
        Restriction::Only(names) if names.is_empty() => {
            M::pass_through().filter(|p| available.contains(p)).into_iter().collect()
        }
        Restriction::Only(names) => {
            let mut chosen: Vec<M> = Vec::with_capacity(names.len());
            for name in names {
                let method = available
                    .iter()
                    .copied()
                    .find(|m| m.as_str() == name)
                    .ok_or_else(|| AutoMLError::UnknownMethod {
                        stage: M::STAGE.to_string(),
                        value: name.clone(),
                        valid: available.iter().map(|m| m.as_str().to_string()).collect(),
                    })?;
                if !chosen.contains(&method) {
                    chosen.push(method);
                }
            }
            chosen
        }
    };

    if methods.is_empty() {
        return Err(AutoMLError::ConfigError(format!(
            "no {} method is available for a {} task on {} rows x {} columns",
            M::STAGE,
            profile.task_type,
            profile.n_rows,
            profile.n_cols
        )));
    }

    debug!(
        stage = %M::STAGE,
        candidates = ?methods.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "resolved stage candidates"
    );
    Ok(CandidateSet { methods })
}

/// Candidate sets for all six stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCandidates {
    pub encoder: CandidateSet<EncoderMethod>,
    pub imputer: CandidateSet<ImputerMethod>,
    pub balancer: CandidateSet<BalancerMethod>,
    pub scaler: CandidateSet<ScalerMethod>,
    pub feature_selector: CandidateSet<SelectorMethod>,
    pub model: CandidateSet<ModelMethod>,
}

impl StageCandidates {
    pub fn resolve(
        registries: &Registries,
        profile: &DatasetProfile,
        restrictions: &StageRestrictions,
        policy: &CandidatePolicy,
    ) -> Result<Self> {
        Ok(Self {
            encoder: candidates(&registries.encoder, profile, &restrictions.encoder, policy)?,
            imputer: candidates(&registries.imputer, profile, &restrictions.imputer, policy)?,
            balancer: candidates(&registries.balancer, profile, &restrictions.balancer, policy)?,
            scaler: candidates(&registries.scaler, profile, &restrictions.scaler, policy)?,
            feature_selector: candidates(
                &registries.feature_selector,
                profile,
                &restrictions.feature_selector,
                policy,
            )?,
            model: candidates(&registries.model, profile, &restrictions.model, policy)?,
        })
    }

    /// Names per stage, for display
    pub fn summary(&self) -> Vec<(Stage, Vec<&'static str>)> {
        vec![
            (Stage::Encoder, self.encoder.names()),
            (Stage::Imputer, self.imputer.names()),
            (Stage::Balancer, self.balancer.names()),
            (Stage::Scaler, self.scaler.names()),
            (Stage::FeatureSelector, self.feature_selector.names()),
            (Stage::Model, self.model.names()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(n_rows: usize, n_cols: usize, has_missing: bool, task_type: TaskType) -> DatasetProfile {
        DatasetProfile {
            n_rows,
            n_cols,
            has_missing,
            task_type,
        }
    }

    #[test]
    fn test_models_filtered_by_task() {
        let registries = Registries::default();
        let p = profile(100, 4, false, TaskType::Regression);
        let set = candidates(&registries.model, &p, &Restriction::Auto, &CandidatePolicy::default())
            .unwrap();
        assert!(set.contains(ModelMethod::LinearRegression));
        assert!(!set.contains(ModelMethod::GaussianNB));
    }

    #[test]
    fn test_large_data_drops_quadratic_methods() {
        let registries = Registries::default();
        let policy = CandidatePolicy::default();
        let small = profile(100, 10, false, TaskType::Classification);
        let large = profile(2_000, 10, false, TaskType::Classification);

        let set = candidates(&registries.model, &small, &Restriction::Auto, &policy).unwrap();
        assert!(set.contains(ModelMethod::LibLinearSVC));
        let set = candidates(&registries.model, &large, &Restriction::Auto, &policy).unwrap();
        assert!(!set.contains(ModelMethod::LibLinearSVC));
        let set =
            candidates(&registries.feature_selector, &large, &Restriction::Auto, &policy).unwrap();
        assert!(!set.contains(SelectorMethod::LibLinearSvcPreprocessor));
    }

    #[test]
    fn test_imputer_collapses_without_missing_values() {
        let registries = Registries::default();
        let p = profile(10, 2, false, TaskType::Classification);
        let restriction = Restriction::only(["KNNImputer"]);
        let set =
            candidates(&registries.imputer, &p, &restriction, &CandidatePolicy::default()).unwrap();
        assert_eq!(set.methods(), &[ImputerMethod::NoProcessing]);

        let p = profile(10, 2, true, TaskType::Classification);
        let set =
            candidates(&registries.imputer, &p, &restriction, &CandidatePolicy::default()).unwrap();
        assert_eq!(set.methods(), &[ImputerMethod::KNNImputer]);
    }

    #[test]
    fn test_selector_halves_split_by_task() {
        let registries = Registries::default();
        let policy = CandidatePolicy::default();
        let cls = profile(10, 2, false, TaskType::Classification);
        let reg = profile(10, 2, false, TaskType::Regression);
        let set = candidates(&registries.feature_selector, &cls, &Restriction::Auto, &policy).unwrap();
        assert!(set.contains(SelectorMethod::SelectPercentileClassification));
        assert!(!set.contains(SelectorMethod::SelectPercentileRegression));
        let set = candidates(&registries.feature_selector, &reg, &Restriction::Auto, &policy).unwrap();
        assert!(set.contains(SelectorMethod::SelectPercentileRegression));
    }

    #[test]
    fn test_unknown_restriction_names_offender_and_valid_set() {
        let registries = Registries::default();
        let p = profile(10, 2, false, TaskType::Classification);
        let err = candidates(
            &registries.scaler,
            &p,
            &Restriction::only(["Standardize", "Winsorization"]),
            &CandidatePolicy::default(),
        )
        .unwrap_err();
        match err {
            AutoMLError::UnknownMethod { value, valid, .. } => {
                assert_eq!(value, "Winsorization");
                assert!(valid.contains(&"Standardize".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pass_through_always_available() {
        let registries = Registries::empty();
        let p = profile(10, 2, true, TaskType::Classification);
        for set in [
            candidates(&registries.scaler, &p, &Restriction::Auto, &CandidatePolicy::default())
                .unwrap()
                .names(),
            candidates(&registries.balancer, &p, &Restriction::Auto, &CandidatePolicy::default())
                .unwrap()
                .names(),
        ] {
            assert_eq!(set, vec!["no_processing"]);
        }
        assert!(candidates(&registries.model, &p, &Restriction::Auto, &CandidatePolicy::default())
            .is_err());
    }

    #[test]
    fn test_filter_does_not_mutate_registry() {
        let registries = Registries::default();
        let before = registries.model.methods();
        let large = profile(10_000, 10, false, TaskType::Classification);
        let _ = candidates(&registries.model, &large, &Restriction::Auto, &CandidatePolicy::default());
        assert_eq!(registries.model.methods(), before);
    }
}
