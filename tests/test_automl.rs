//! End-to-end tests for the one-call interface

mod common;

use common::*;
use kolosal_autotab::prelude::*;
use std::io::Write;
use std::path::Path;

fn quick_config(temp: &Path, model: &str) -> AutoTabularConfig {
    let mut config = AutoTabularConfig::new()
        .with_temp_dir(temp)
        .with_time_budget(None)
        .with_max_evals(Some(3))
        .with_n_jobs(2)
        .with_seed(7)
        .with_restrictions(
            StageRestrictions::new()
                .with(Stage::Balancer, Restriction::only(["no_processing"]))
                .with(Stage::FeatureSelector, Restriction::only(["no_processing"]))
                .with(Stage::Model, Restriction::only([model])),
        );
    config.plateau = None;
    config
}

// ============================================================================
// Fit, save and load
// ============================================================================

#[test]
fn test_fit_save_load_predict() {
    let (x, y) = regression_data(80);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), "LinearRegression")
        .with_task_type(TaskType::Regression)
        .with_n_estimators(2);

    let mut automl = AutoTabular::new(config.clone());
    assert!(!automl.is_fitted());
    automl.fit(&x, &y).unwrap();
    assert!(automl.is_fitted());
    assert_eq!(automl.ensemble().unwrap().len(), 2);
    assert_eq!(automl.search_result().unwrap().records.len(), 3);
    assert!(config.model_path().exists());

    let predictions = automl.predict(&x).unwrap();
    assert_eq!(predictions.len(), x.height());

    let loaded = AutoTabular::load(config.model_path(), Registries::default()).unwrap();
    assert_eq!(loaded.task_type(), Some(TaskType::Regression));
    assert_eq!(loaded.predict(&x).unwrap(), predictions);
}

#[test]
fn test_second_fit_reuses_stored_model() {
    let (x, y) = regression_data(60);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), "RidgeRegression").with_task_type(TaskType::Regression);

    let mut first = AutoTabular::new(config.clone());
    first.fit(&x, &y).unwrap();
    assert!(first.search_result().is_some());

    let mut second = AutoTabular::new(config);
    second.fit(&x, &y).unwrap();
    assert!(second.search_result().is_none());
    assert_eq!(second.predict(&x).unwrap(), first.predict(&x).unwrap());
}

#[test]
fn test_stored_model_of_other_task_is_rejected() {
    let (x, y) = regression_data(60);
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path(), "LinearRegression").with_task_type(TaskType::Regression);
    AutoTabular::new(config.clone()).fit(&x, &y).unwrap();

    let (xc, yc) = classification_data(60);
    let err = AutoTabular::new(config.with_task_type(TaskType::Classification))
        .fit(&xc, &yc)
        .err()
        .unwrap();
    assert!(err.is_config_error());
}

#[test]
fn test_predict_before_fit() {
    let (x, _) = regression_data(10);
    let automl = AutoTabular::new(AutoTabularConfig::new());
    assert!(matches!(automl.predict(&x), Err(AutoMLError::NotFitted(_))));
}

// ============================================================================
// CSV input with text labels
// ============================================================================

#[test]
fn test_text_labels_round_trip_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("train.csv");
    let mut file = std::fs::File::create(&csv).unwrap();
    writeln!(file, "a,b,label").unwrap();
    for i in 0..80 {
        let a = (i % 10) as f64;
        let b = ((i * 7) % 13) as f64;
        let label = if a + 0.5 * b > 8.0 { "yes" } else { "no" };
        writeln!(file, "{},{},{}", a, b, label).unwrap();
    }
    drop(file);

    let data = DataLoader::new().load_supervised(&csv, "label", None).unwrap();
    assert_eq!(data.task_type, TaskType::Classification);
    assert_eq!(data.classes.as_ref().unwrap().names, vec!["no", "yes"]);

    let config = quick_config(&dir.path().join("runs"), "LogisticRegression");
    let mut automl = AutoTabular::new(config);
    automl.fit_labeled(&data).unwrap();

    let labels = automl.predict_labels(&data.x).unwrap();
    assert_eq!(labels.len(), 80);
    assert!(labels.iter().all(|l| l == "yes" || l == "no"));

    let loaded = AutoTabular::load(automl.config().model_path(), Registries::default()).unwrap();
    assert_eq!(loaded.classes().unwrap().names, vec!["no", "yes"]);
    assert_eq!(loaded.predict_labels(&data.x).unwrap(), labels);
}
