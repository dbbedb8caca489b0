//! Integration tests for trial evaluation, metrics and splits

mod common;

use common::*;
use kolosal_autotab::objective::{accuracy, holdout_split, TrainingStatus};
use kolosal_autotab::prelude::*;
use kolosal_autotab::registry::ModelMethod;
use ndarray::{array, Array1};
use std::sync::Arc;

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_unregistered_model_fails_before_any_stage() {
    let (x, y) = classification_data(60);
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let mut registries = Registries::default();
    registries.model.unregister(ModelMethod::GaussianNB);
    let evaluator = TrialObjective::new(Arc::new(x), Arc::new(y), Arc::new(registries), TaskType::Classification)
        .unwrap()
        .with_store(store.clone());

    let flat = flat_config(
        "tabular_classification",
        ["DataEncoding", "no_processing", "no_processing", "Standardize", "no_processing", "GaussianNB"],
    );
    let err = evaluator.evaluate_flat(0, &flat, &CancelToken::new()).unwrap_err();
    match err {
        AutoMLError::UnknownMethod { stage, value, valid } => {
            assert_eq!(stage, "model");
            assert_eq!(value, "GaussianNB");
            assert!(valid.contains(&"LogisticRegression".to_string()));
            assert!(!valid.contains(&"GaussianNB".to_string()));
        }
        other => panic!("expected UnknownMethod, got {}", other),
    }
    assert!(!store.exists(0));
}

#[test]
fn test_misspelled_method_lists_valid_names() {
    let (x, y) = classification_data(40);
    let evaluator = objective(&x, &y, TaskType::Classification);
    let flat = flat_config(
        "tabular_classification",
        ["DataEncoding", "no_processing", "no_processing", "Standardise", "no_processing", "GaussianNB"],
    );
    let message = evaluator
        .evaluate_flat(0, &flat, &CancelToken::new())
        .unwrap_err()
        .to_string();
    assert!(message.contains("Standardise"));
    assert!(message.contains("MinMaxScale"));
}

#[test]
fn test_task_tag_mismatch() {
    let (x, y) = regression_data(40);
    let evaluator = objective(&x, &y, TaskType::Regression);
    let flat = flat_config(
        "tabular_classification",
        ["DataEncoding", "no_processing", "no_processing", "no_processing", "no_processing", "GaussianNB"],
    );
    let err = evaluator.evaluate_flat(0, &flat, &CancelToken::new()).unwrap_err();
    assert!(err.is_config_error());
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_regression_trial_reports_mse() {
    let (x, y) = regression_data(80);
    let evaluator = objective(&x, &y, TaskType::Regression).with_full_status(true);
    let flat = flat_config(
        "tabular_regression",
        ["DataEncoding", "no_processing", "no_processing", "no_processing", "no_processing", "LinearRegression"],
    );
    let report = evaluator.evaluate_flat(4, &flat, &CancelToken::new()).unwrap();
    assert_eq!(report.trial_id, 4);
    assert_eq!(report.status, TrainingStatus::Fitted);
    // exact linear target
    assert!(report.loss >= 0.0 && report.loss < 1e-6);
    assert_eq!(report.config.unwrap(), flat);
}

#[test]
fn test_no_validation_scores_on_training_rows() {
    let (x, y) = regression_data(50);
    let evaluator = objective(&x, &y, TaskType::Regression)
        .with_validation(ValidationConfig::disabled())
        .unwrap()
        .with_objective(Objective::R2)
        .unwrap();
    let flat = flat_config(
        "tabular_regression",
        ["DataEncoding", "no_processing", "no_processing", "Standardize", "no_processing", "LinearRegression"],
    );
    let report = evaluator.evaluate_flat(0, &flat, &CancelToken::new()).unwrap();
    assert!((report.loss + 1.0).abs() < 1e-6);
}

// ============================================================================
// Split determinism
// ============================================================================

#[test]
fn test_holdout_split_is_deterministic() {
    for (n, seed) in [(10, 1), (57, 3), (200, 42)] {
        let first = holdout_split(n, 0.2, seed).unwrap();
        let second = holdout_split(n, 0.2, seed).unwrap();
        assert_eq!(first, second);

        let (train, valid) = first;
        assert_eq!(train.len() + valid.len(), n);
        let mut all: Vec<usize> = train.iter().chain(&valid).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }
}

#[test]
fn test_same_seed_same_loss() {
    let (x, y) = classification_data(90);
    let flat = flat_config(
        "tabular_classification",
        ["DataEncoding", "no_processing", "no_processing", "Standardize", "no_processing", "GaussianNB"],
    );
    let a = objective(&x, &y, TaskType::Classification)
        .evaluate_flat(0, &flat, &CancelToken::new())
        .unwrap();
    let b = objective(&x, &y, TaskType::Classification)
        .evaluate_flat(0, &flat, &CancelToken::new())
        .unwrap();
    assert_eq!(a.loss, b.loss);
}

// ============================================================================
// Sign convention
// ============================================================================

#[test]
fn test_greater_is_better_metrics_are_negated() {
    let y_true = array![0.0, 1.0, 1.0, 0.0, 1.0, 0.0];
    let perfect = y_true.clone();
    let worse = array![0.0, 1.0, 0.0, 0.0, 1.0, 1.0];
    let worst = perfect.mapv(|v| 1.0 - v);

    for objective in [Objective::Accuracy, Objective::Precision, Objective::F1] {
        assert!(objective.greater_is_better());
        let best = objective.loss(&y_true, &perfect, None).unwrap();
        let mid = objective.loss(&y_true, &worse, None).unwrap();
        let bad = objective.loss(&y_true, &worst, None).unwrap();
        assert!(best < mid, "{}: {} !< {}", objective, best, mid);
        assert!(mid < bad, "{}: {} !< {}", objective, mid, bad);
    }
    assert_eq!(Objective::Accuracy.loss(&y_true, &perfect, None).unwrap(), -1.0);
}

#[test]
fn test_r2_loss_ordering() {
    let y_true: Array1<f64> = (0..10).map(|v| v as f64).collect();
    let noisy = y_true.mapv(|v| v + if (v as i64) % 2 == 0 { 0.5 } else { -0.5 });
    let best = Objective::R2.loss(&y_true, &y_true, None).unwrap();
    let mid = Objective::R2.loss(&y_true, &noisy, None).unwrap();
    assert_eq!(best, -1.0);
    assert!(best < mid);
}

#[test]
fn test_smaller_is_better_metrics_pass_through() {
    let y_true = array![1.0, 2.0, 3.0];
    let y_pred = array![1.0, 2.0, 5.0];
    assert!(!Objective::Mse.greater_is_better());
    assert_eq!(Objective::Mse.loss(&y_true, &y_pred, None).unwrap(), 4.0 / 3.0);
    assert_eq!(Objective::MaxError.loss(&y_true, &y_pred, None).unwrap(), 2.0);
    assert_eq!(accuracy(&y_true, &y_true), 1.0);
}

#[test]
fn test_custom_objective() {
    let within_one = Objective::custom("within_one", true, |t: &Array1<f64>, p: &Array1<f64>| {
        let hits = t.iter().zip(p).filter(|(a, b)| (*a - *b).abs() <= 1.0).count();
        Ok(hits as f64 / t.len() as f64)
    });
    let y = array![1.0, 2.0, 3.0, 4.0];
    let p = array![1.5, 2.0, 9.0, 4.0];
    assert_eq!(within_one.loss(&y, &p, None).unwrap(), -0.75);
}
