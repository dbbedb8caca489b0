//! Integration tests for the search controller

mod common;

use common::*;
use kolosal_autotab::objective::{TrainingStatus, TrialReport};
use kolosal_autotab::prelude::*;
use kolosal_autotab::registry::StageMethod;
use kolosal_autotab::search::{StopReason, CHECKPOINT_FILE};
use kolosal_autotab::space::{ConfigPoint, SearchSpace};
use std::time::Duration;

fn scenario_a_restrictions() -> StageRestrictions {
    StageRestrictions::new()
        .with(Stage::Balancer, Restriction::only(["no_processing"]))
        .with(Stage::Scaler, Restriction::only(["no_processing", "Standardize"]))
        .with(Stage::FeatureSelector, Restriction::only(["no_processing"]))
        .with(Stage::Model, Restriction::only(["LogisticRegression"]))
}

// ============================================================================
// Ranking
// ============================================================================

#[test]
fn test_five_trials_rank_by_loss() {
    let (x, y) = classification_data(120);
    let space = space_for(&x, TaskType::Classification, &scenario_a_restrictions());
    assert_eq!(space.choice_count(Stage::Scaler), 2);

    let evaluator = objective(&x, &y, TaskType::Classification)
        .with_validation(ValidationConfig::default().with_valid_size(0.2).with_seed(1))
        .unwrap();
    let result = SearchController::new(search_config(5))
        .unwrap()
        .run(&space, &evaluator)
        .unwrap();

    let ranking = result.ranking();
    assert_eq!(ranking.len(), 5);
    for pair in ranking.windows(2) {
        assert!(pair[0].loss.unwrap() <= pair[1].loss.unwrap());
    }
    assert_eq!(result.stop_reason, StopReason::TrialBudget);
    assert!(result
        .records
        .iter()
        .all(|r| r.status == TrialStatus::Fitted && r.loss.unwrap() <= 0.0));
}

#[test]
fn test_same_seed_same_proposals() {
    let (x, y) = classification_data(80);
    let space = space_for(&x, TaskType::Classification, &scenario_a_restrictions());
    let evaluator = objective(&x, &y, TaskType::Classification);

    let run = |n_jobs: usize| {
        SearchController::new(search_config(4).with_n_jobs(n_jobs))
            .unwrap()
            .run(&space, &evaluator)
            .unwrap()
    };
    let one = run(1);
    let two = run(2);
    let configs = |r: &SearchResult| r.records.iter().map(|t| t.config.clone()).collect::<Vec<_>>();
    assert_eq!(configs(&one), configs(&two));
}

#[test]
fn test_grid_search_visits_each_scaler() {
    let (x, y) = classification_data(80);
    let space = space_for(&x, TaskType::Classification, &scenario_a_restrictions());
    let evaluator = objective(&x, &y, TaskType::Classification);
    let result = SearchController::new(search_config(2).with_algorithm(AlgorithmKind::Grid))
        .unwrap()
        .run(&space, &evaluator)
        .unwrap();
    let mut scalers: Vec<String> = result
        .records
        .iter()
        .map(|r| r.config.scaler.method.as_str().to_string())
        .collect();
    scalers.sort();
    assert_eq!(scalers, vec!["Standardize", "no_processing"]);
}

// ============================================================================
// Budgets
// ============================================================================

/// Fails every trial whose id is odd
struct OddFailures;

impl TrialEvaluator for OddFailures {
    fn task_type(&self) -> TaskType {
        TaskType::Regression
    }

    fn evaluate(&self, trial_id: usize, _point: &ConfigPoint, _cancel: &CancelToken) -> Result<TrialReport> {
        if trial_id % 2 == 1 {
            return Err(AutoMLError::StageError {
                stage: "model".to_string(),
                message: "diverged".to_string(),
            });
        }
        Ok(TrialReport {
            trial_id,
            loss: 1.0 / (trial_id as f64 + 1.0),
            status: TrainingStatus::Fitted,
            config: None,
            artifact: None,
        })
    }
}

fn regression_space() -> SearchSpace {
    let (x, _) = regression_data(40);
    space_for(&x, TaskType::Regression, &StageRestrictions::default())
}

#[test]
fn test_failures_never_exceed_budget_silently() {
    let space = regression_space();
    for prop in [0.0, 0.2, 0.5, 0.6] {
        let config = search_config(10).with_allow_error_prop(prop);
        let allowed = config.allowed_failures().unwrap();
        match SearchController::new(config).unwrap().run(&space, &OddFailures) {
            Ok(result) => assert!(result.failures().len() <= allowed),
            Err(AutoMLError::FailureBudgetExceeded { failures, allowed: a }) => {
                assert_eq!(a, allowed);
                assert!(failures > allowed);
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
}

#[test]
fn test_failed_trials_are_absent_from_ranking() {
    let space = regression_space();
    let result = SearchController::new(search_config(6).with_allow_error_prop(0.5))
        .unwrap()
        .run(&space, &OddFailures)
        .unwrap();
    let ranked: Vec<usize> = result.ranking().iter().map(|r| r.trial_id).collect();
    assert_eq!(ranked, vec![4, 2, 0]);
    assert_eq!(result.failures().len(), 3);
    assert!(result.failures()[0].error.as_deref().unwrap().contains("diverged"));
}

#[test]
fn test_missing_budget_is_rejected() {
    let err = SearchController::new(SearchConfig::new().without_trial_budget()).err().unwrap();
    assert!(matches!(err, AutoMLError::NoBudget));
}

/// Sleeps, then honours the cancel token
struct Slow;

impl TrialEvaluator for Slow {
    fn task_type(&self) -> TaskType {
        TaskType::Regression
    }

    fn evaluate(&self, trial_id: usize, _point: &ConfigPoint, cancel: &CancelToken) -> Result<TrialReport> {
        std::thread::sleep(Duration::from_millis(20));
        cancel.check()?;
        Ok(TrialReport {
            trial_id,
            loss: 1.0,
            status: TrainingStatus::Fitted,
            config: None,
            artifact: None,
        })
    }
}

#[test]
fn test_time_budget_stops_search() {
    let config = search_config(1)
        .without_trial_budget()
        .with_time_budget(Duration::from_millis(150));
    let result = SearchController::new(config)
        .unwrap()
        .run(&regression_space(), &Slow)
        .unwrap();
    assert_eq!(result.stop_reason, StopReason::TimeBudget);
    assert!(!result.records.is_empty());
    assert!(result
        .records
        .iter()
        .all(|r| matches!(r.status, TrialStatus::Fitted | TrialStatus::Timeout)));
}

#[test]
fn test_plateau_stops_early() {
    let config = search_config(200).with_plateau(Some(kolosal_autotab::search::PlateauConfig {
        window: 4,
        tolerance: 1e-6,
        grace_period: 6,
    }));
    let result = SearchController::new(config)
        .unwrap()
        .run(&regression_space(), &Slow)
        .unwrap();
    assert_eq!(result.stop_reason, StopReason::Plateau);
    assert!(result.records.len() < 200);
}

// ============================================================================
// Checkpoint and resume
// ============================================================================

#[test]
fn test_resume_continues_from_checkpoint() {
    let (x, y) = regression_data(60);
    let restrictions = StageRestrictions::new()
        .with(Stage::Model, Restriction::only(["LinearRegression", "RidgeRegression"]));
    let space = space_for(&x, TaskType::Regression, &restrictions);
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let evaluator = objective(&x, &y, TaskType::Regression).with_store(store.clone());

    let first = SearchController::new(search_config(3).with_checkpoint(true))
        .unwrap()
        .run(&space, &evaluator)
        .unwrap();
    assert!(dir.path().join(CHECKPOINT_FILE).exists());

    let resumed = SearchController::new(search_config(5).with_checkpoint(true).with_resume(true))
        .unwrap()
        .run(&space, &evaluator)
        .unwrap();
    assert_eq!(resumed.run_id, first.run_id);
    let ids: Vec<usize> = resumed.records.iter().map(|r| r.trial_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    for (before, after) in first.records.iter().zip(&resumed.records) {
        assert_eq!(before.trial_id, after.trial_id);
        assert_eq!(before.status, after.status);
        assert_eq!(before.config, after.config);
    }
}
