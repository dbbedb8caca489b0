//! Search configuration

use crate::error::{AutoMLError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which search algorithm proposes configs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    #[default]
    Random,
    Grid,
    Tpe,
}

impl AlgorithmKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "random" | "hyperopt" => Ok(AlgorithmKind::Random),
            "grid" => Ok(AlgorithmKind::Grid),
            "tpe" | "bayesian" => Ok(AlgorithmKind::Tpe),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "search_algo".to_string(),
                value: name.to_string(),
                valid: vec!["random".to_string(), "grid".to_string(), "tpe".to_string()],
            }),
        }
    }
}

/// Which scheduler watches finished trials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    Fifo,
    MedianStopping,
}

impl SchedulerKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fifo" | "fifoscheduler" => Ok(SchedulerKind::Fifo),
            "median" | "median_stopping" | "medianstoppingrule" => Ok(SchedulerKind::MedianStopping),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "search_scheduler".to_string(),
                value: name.to_string(),
                valid: vec!["fifo".to_string(), "median_stopping".to_string()],
            }),
        }
    }
}

/// Plateau rule: stop when the best loss has not improved by more than
/// `tolerance` (relative) over the last `window` results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub window: usize,
    pub tolerance: f64,
    /// Results to collect before the rule may fire
    pub grace_period: usize,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            window: 8,
            tolerance: 1e-4,
            grace_period: 16,
        }
    }
}

/// Search controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Trial budget
    pub num_trials: Option<usize>,
    /// Wall-clock budget
    pub time_budget: Option<Duration>,
    /// Failures tolerated: `floor(num_trials * allow_error_prop)`
    pub allow_error_prop: f64,
    /// Trials evaluated in parallel
    pub n_jobs: usize,
    pub seed: u64,
    pub plateau: Option<PlateauConfig>,
    pub algorithm: AlgorithmKind,
    pub scheduler: SchedulerKind,
    /// Write `search_state.json` after each batch
    pub checkpoint: bool,
    /// Continue from an existing `search_state.json`
    pub resume: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_trials: Some(32),
            time_budget: None,
            allow_error_prop: 0.1,
            n_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            seed: 1,
            plateau: Some(PlateauConfig::default()),
            algorithm: AlgorithmKind::default(),
            scheduler: SchedulerKind::default(),
            checkpoint: true,
            resume: false,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_trials(mut self, n: usize) -> Self {
        self.num_trials = Some(n);
        self
    }

    pub fn without_trial_budget(mut self) -> Self {
        self.num_trials = None;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_allow_error_prop(mut self, prop: f64) -> Self {
        self.allow_error_prop = prop;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_plateau(mut self, plateau: Option<PlateauConfig>) -> Self {
        self.plateau = plateau;
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Failure budget, unbounded without a trial budget
    pub fn allowed_failures(&self) -> Option<usize> {
        self.num_trials
            .map(|n| (n as f64 * self.allow_error_prop).floor() as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_trials.is_none() && self.time_budget.is_none() {
            return Err(AutoMLError::NoBudget);
        }
        if self.num_trials == Some(0) {
            return Err(AutoMLError::InvalidParameter {
                name: "num_trials".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.allow_error_prop) {
            return Err(AutoMLError::InvalidParameter {
                name: "allow_error_prop".to_string(),
                value: self.allow_error_prop.to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if self.n_jobs == 0 {
            return Err(AutoMLError::InvalidParameter {
                name: "n_jobs".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(plateau) = &self.plateau {
            if plateau.window == 0 || plateau.tolerance < 0.0 {
                return Err(AutoMLError::InvalidParameter {
                    name: "plateau".to_string(),
                    value: format!("{:?}", plateau),
                    reason: "window must be positive and tolerance non-negative".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_budget_is_fatal() {
        let config = SearchConfig::new().without_trial_budget();
        assert!(matches!(config.validate(), Err(AutoMLError::NoBudget)));
        let config = config.with_time_budget(Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allowed_failures_floor() {
        let config = SearchConfig::new().with_num_trials(10).with_allow_error_prop(0.25);
        assert_eq!(config.allowed_failures(), Some(2));
        assert_eq!(SearchConfig::new().without_trial_budget().allowed_failures(), None);
    }

    #[test]
    fn test_rejects_bad_proportion() {
        assert!(SearchConfig::new().with_allow_error_prop(1.5).validate().is_err());
        assert!(SearchConfig::new().with_n_jobs(0).validate().is_err());
    }

    #[test]
    fn test_config_json_defaults() {
        let config: SearchConfig = serde_json::from_str(r#"{"num_trials": 5, "algorithm": "tpe"}"#).unwrap();
        assert_eq!(config.num_trials, Some(5));
        assert_eq!(config.algorithm, AlgorithmKind::Tpe);
        assert!(config.checkpoint);
    }
}
