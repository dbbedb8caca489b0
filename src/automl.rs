//! AutoTabular: search, ensemble and persist in one call

use crate::ensemble::{
    check_weights, Aggregation, Ensemble, EnsembleBuilder, EnsembleConfig, Voting,
};
use crate::error::{AutoMLError, Result};
use crate::objective::{Objective, TrialObjective, ValidationConfig};
use crate::pipeline::{read_json, write_json_atomic, ArtifactStore, PipelineBundle};
use crate::registry::{
    CandidatePolicy, DatasetProfile, Registries, StageCandidates, StageRestrictions,
};
use crate::search::{
    AlgorithmKind, PlateauConfig, SchedulerKind, SearchConfig, SearchController, SearchResult,
};
use crate::space::{build_space, default_templates, Templates};
use crate::stages::TaskType;
use crate::utils::{ClassMap, LabeledData};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MODEL_FILE: &str = "model.json";
const TRIALS_DIR: &str = "trials";

/// Settings of an [`AutoTabular`] run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTabularConfig {
    /// Inferred from the target when unset
    pub task_type: Option<TaskType>,
    pub time_budget: Option<Duration>,
    pub max_evals: Option<usize>,
    pub allow_error_prop: f64,
    pub temp_dir: PathBuf,
    pub model_name: String,
    /// Remove trial artifacts once the model is saved
    pub delete_temp_after_terminate: bool,
    pub save: bool,
    pub restrictions: StageRestrictions,
    pub candidate_policy: CandidatePolicy,
    pub validation: bool,
    pub valid_size: f64,
    /// Metric name; the task default when unset
    pub objective: Option<String>,
    pub algorithm: AlgorithmKind,
    pub scheduler: SchedulerKind,
    pub plateau: Option<PlateauConfig>,
    /// Ensemble size; 1 keeps the single best pipeline
    pub n_estimators: usize,
    pub voting: Voting,
    pub aggregation: String,
    pub weights: Option<Vec<f64>>,
    pub full_status: bool,
    pub n_jobs: Option<usize>,
    pub seed: u64,
    /// Continue an interrupted search instead of starting over
    pub resume: bool,
}

impl Default for AutoTabularConfig {
    fn default() -> Self {
        Self {
            task_type: None,
            time_budget: Some(Duration::from_secs(360)),
            max_evals: Some(64),
            allow_error_prop: 0.1,
            temp_dir: PathBuf::from("tmp"),
            model_name: "model".to_string(),
            delete_temp_after_terminate: false,
            save: true,
            restrictions: StageRestrictions::default(),
            candidate_policy: CandidatePolicy::default(),
            validation: true,
            valid_size: 0.15,
            objective: None,
            algorithm: AlgorithmKind::default(),
            scheduler: SchedulerKind::default(),
            plateau: Some(PlateauConfig::default()),
            n_estimators: 1,
            voting: Voting::Hard,
            aggregation: "mean".to_string(),
            weights: None,
            full_status: false,
            n_jobs: None,
            seed: 1,
            resume: false,
        }
    }
}

impl AutoTabularConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_max_evals(mut self, max_evals: Option<usize>) -> Self {
        self.max_evals = max_evals;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_restrictions(mut self, restrictions: StageRestrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn with_objective(mut self, name: impl Into<String>) -> Self {
        self.objective = Some(name.into());
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_voting(mut self, voting: Voting) -> Self {
        self.voting = voting;
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_valid_size(mut self, valid_size: f64) -> Self {
        self.valid_size = valid_size;
        self
    }

    pub fn with_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn run_dir(&self) -> PathBuf {
        self.temp_dir.join(&self.model_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.run_dir().join(MODEL_FILE)
    }

    fn search_config(&self) -> SearchConfig {
        let mut config = SearchConfig {
            num_trials: self.max_evals,
            time_budget: self.time_budget,
            allow_error_prop: self.allow_error_prop,
            seed: self.seed,
            plateau: self.plateau,
            algorithm: self.algorithm,
            scheduler: self.scheduler,
            checkpoint: true,
            resume: self.resume,
            ..SearchConfig::default()
        };
        if let Some(n_jobs) = self.n_jobs {
            config.n_jobs = n_jobs;
        }
        config
    }

    fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            enabled: self.validation,
            valid_size: self.valid_size,
            seed: self.seed,
        }
    }
}

/// On-disk form of a fitted [`AutoTabular`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub created_at: DateTime<Utc>,
    pub task_type: TaskType,
    pub voting: Voting,
    pub aggregation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    pub trial_ids: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<ClassMap>,
    /// Fitted pipelines in rank order
    pub bundles: Vec<PipelineBundle>,
}

impl SavedModel {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

/// Automated pipeline search over tabular data
pub struct AutoTabular {
    config: AutoTabularConfig,
    registries: Arc<Registries>,
    templates: Templates,
    objective: Option<Objective>,
    aggregation: Option<Aggregation>,
    classes: Option<ClassMap>,
    task_type: Option<TaskType>,
    bundles: Vec<PipelineBundle>,
    ensemble: Option<Ensemble>,
    result: Option<SearchResult>,
}

impl AutoTabular {
    pub fn new(config: AutoTabularConfig) -> Self {
        Self {
            config,
            registries: Arc::new(Registries::default()),
            templates: default_templates(),
            objective: None,
            aggregation: None,
            classes: None,
            task_type: None,
            bundles: Vec::new(),
            ensemble: None,
            result: None,
        }
    }

    pub fn with_registries(mut self, registries: Registries) -> Self {
        self.registries = Arc::new(registries);
        self
    }

    pub fn with_templates(mut self, templates: Templates) -> Self {
        self.templates = templates;
        self
    }

    /// Objective object; overrides the configured metric name
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = Some(objective);
        self
    }

    /// Aggregation object; overrides the configured aggregation name
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn config(&self) -> &AutoTabularConfig {
        &self.config
    }

    pub fn ensemble(&self) -> Option<&Ensemble> {
        self.ensemble.as_ref()
    }

    /// Trial table of the last search; `None` after loading a stored model
    pub fn search_result(&self) -> Option<&SearchResult> {
        self.result.as_ref()
    }

    pub fn classes(&self) -> Option<&ClassMap> {
        self.classes.as_ref()
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task_type
    }

    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }

    fn resolve_objective(&self, task: TaskType) -> Result<Objective> {
        let objective = match (&self.objective, &self.config.objective) {
            (Some(objective), _) => objective.clone(),
            (None, Some(name)) => Objective::parse(name)?,
            (None, None) => Objective::default_for(task),
        };
        objective.validate(task)?;
        Ok(objective)
    }

    fn resolve_aggregation(&self) -> Result<Aggregation> {
        match &self.aggregation {
            Some(aggregation) => Ok(aggregation.clone()),
            None => Aggregation::parse(&self.config.aggregation),
        }
    }

    /// Fit on a loaded dataset, keeping its class names for the saved model
    pub fn fit_labeled(&mut self, data: &LabeledData) -> Result<()> {
        self.classes = data.classes.clone();
        if self.config.task_type.is_none() {
            self.config.task_type = Some(data.task_type);
        }
        self.fit(&data.x, &data.y)
    }

    /// Search, ensemble the best pipelines and optionally save them.
    ///
    /// A model already saved under the same name is loaded instead.
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<()> {
        if x.height() != y.len() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} target values", x.height()),
                actual: format!("{} target values", y.len()),
            });
        }
        let task = self.config.task_type.unwrap_or_else(|| TaskType::infer(y));

        let model_path = self.config.model_path();
        if model_path.exists() {
            info!(path = %model_path.display(), "stored model found, loading it");
            let saved = SavedModel::load(&model_path)?;
            if saved.task_type != task {
                return Err(AutoMLError::ConfigError(format!(
                    "stored model is {}, requested {}",
                    saved.task_type, task
                )));
            }
            self.restore(saved)?;
            return Ok(());
        }

        let objective = self.resolve_objective(task)?;
        let aggregation = self.resolve_aggregation()?;
        let search_config = self.config.search_config();
        search_config.validate()?;

        let profile = DatasetProfile::from_frame(x, task);
        info!(
            rows = profile.n_rows,
            cols = profile.n_cols,
            has_missing = profile.has_missing,
            task = %task,
            objective = %objective,
            "profiling dataset"
        );
        let candidates = StageCandidates::resolve(
            &self.registries,
            &profile,
            &self.config.restrictions,
            &self.config.candidate_policy,
        )?;
        let space = build_space(&candidates, &self.templates, task)?;

        let trials_dir = self.config.run_dir().join(TRIALS_DIR);
        if trials_dir.exists() && !self.config.resume {
            std::fs::remove_dir_all(&trials_dir)?;
        }
        let store = ArtifactStore::open(&trials_dir)?;

        let evaluator = TrialObjective::new(
            Arc::new(x.clone()),
            Arc::new(y.clone()),
            Arc::clone(&self.registries),
            task,
        )?
        .with_objective(objective)?
        .with_validation(self.config.validation_config())?
        .with_full_status(self.config.full_status)
        .with_store(store.clone());

        let result = SearchController::new(search_config)?.run(&space, &evaluator)?;

        let ensemble_config = EnsembleConfig {
            k: self.config.n_estimators.max(1),
            voting: self.config.voting,
            aggregation,
            weights: self.config.weights.clone(),
        };
        let ranking = result.ranking();
        if ranking.is_empty() {
            return Err(AutoMLError::SearchError(
                "search finished without a fitted trial".to_string(),
            ));
        }
        let top = &ranking[..ensemble_config.k.min(ranking.len())];
        check_weights(top.len(), ensemble_config.weights.as_deref())?;
        let bundles = top
            .iter()
            .map(|record| store.load(record.trial_id))
            .collect::<Result<Vec<_>>>()?;

        let mut ensemble =
            EnsembleBuilder::new(&self.registries).assemble(bundles.clone(), &ensemble_config)?;
        ensemble.fit(x, y)?;

        self.task_type = Some(task);
        self.bundles = bundles;
        self.ensemble = Some(ensemble);
        self.result = Some(result);

        if self.config.save {
            self.save()?;
        }
        if self.config.delete_temp_after_terminate {
            std::fs::remove_dir_all(&trials_dir)?;
        }
        Ok(())
    }

    fn restore(&mut self, saved: SavedModel) -> Result<()> {
        let aggregation = match &self.aggregation {
            Some(aggregation) => aggregation.clone(),
            None => Aggregation::parse(&saved.aggregation)?,
        };
        let config = EnsembleConfig {
            k: saved.bundles.len(),
            voting: saved.voting,
            aggregation,
            weights: saved.weights.clone(),
        };
        let ensemble = EnsembleBuilder::new(&self.registries).assemble(saved.bundles.clone(), &config)?;
        self.task_type = Some(saved.task_type);
        if saved.classes.is_some() {
            self.classes = saved.classes;
        }
        self.bundles = saved.bundles;
        self.ensemble = Some(ensemble);
        Ok(())
    }

    /// Write `model.json` under the run directory
    pub fn save(&self) -> Result<PathBuf> {
        let ensemble = self
            .ensemble
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("AutoTabular".to_string()))?;
        let aggregation = match ensemble {
            Ensemble::Regressor(e) => e.aggregation().clone(),
            Ensemble::Classifier(_) => Aggregation::Mean,
        };
        if aggregation.is_custom() {
            return Err(AutoMLError::Unsupported(format!(
                "custom aggregation '{}' cannot be saved",
                aggregation.name()
            )));
        }
        let voting = match ensemble {
            Ensemble::Classifier(e) => e.voting(),
            Ensemble::Regressor(_) => Voting::Hard,
        };
        let saved = SavedModel {
            created_at: Utc::now(),
            task_type: ensemble.task_type(),
            voting,
            aggregation: aggregation.name().to_string(),
            weights: ensemble.weights().map(<[f64]>::to_vec),
            trial_ids: self.bundles.iter().map(|b| b.trial_id).collect(),
            classes: self.classes.clone(),
            bundles: self.bundles.clone(),
        };
        let path = self.config.model_path();
        saved.save(&path)?;
        info!(path = %path.display(), members = saved.bundles.len(), "model saved");
        Ok(path)
    }

    /// Restore a model written by [`AutoTabular::save`]
    pub fn load(path: impl AsRef<Path>, registries: Registries) -> Result<Self> {
        let path = path.as_ref();
        let saved = SavedModel::load(path)?;
        let mut config = AutoTabularConfig::default().with_task_type(saved.task_type);
        if let Some(run_dir) = path.parent() {
            if let (Some(name), Some(temp)) = (run_dir.file_name(), run_dir.parent()) {
                config.model_name = name.to_string_lossy().into_owned();
                config.temp_dir = temp.to_path_buf();
            }
        }
        let mut model = AutoTabular::new(config).with_registries(registries);
        model.restore(saved)?;
        Ok(model)
    }

    fn fitted(&self) -> Result<&Ensemble> {
        self.ensemble
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("AutoTabular".to_string()))
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        self.fitted()?.predict(x)
    }

    pub fn predict_proba(&self, x: &DataFrame) -> Result<Array2<f64>> {
        self.fitted()?.predict_proba(x)
    }

    /// Predictions mapped back to class names when known
    pub fn predict_labels(&self, x: &DataFrame) -> Result<Vec<String>> {
        let y = self.predict(x)?;
        Ok(match &self.classes {
            Some(classes) => y.iter().map(|v| classes.decode(*v)).collect(),
            None => {
                if self.task_type == Some(TaskType::Classification) {
                    warn!("no class names recorded, returning encoded labels");
                }
                y.iter().map(|v| v.to_string()).collect()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let config = AutoTabularConfig::new().with_temp_dir("/tmp/x").with_model_name("m");
        assert_eq!(config.model_path(), PathBuf::from("/tmp/x/m/model.json"));
    }

    #[test]
    fn test_search_config_mapping() {
        let config = AutoTabularConfig::new()
            .with_max_evals(Some(7))
            .with_time_budget(None)
            .with_n_jobs(3);
        let search = config.search_config();
        assert_eq!(search.num_trials, Some(7));
        assert_eq!(search.n_jobs, 3);
        assert!(search.validate().is_ok());
        let none = AutoTabularConfig::new().with_max_evals(None).with_time_budget(None);
        assert!(matches!(none.search_config().validate(), Err(AutoMLError::NoBudget)));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = AutoTabular::new(AutoTabularConfig::new());
        let x = DataFrame::empty();
        assert!(matches!(model.predict(&x), Err(AutoMLError::NotFitted(_))));
    }
}
