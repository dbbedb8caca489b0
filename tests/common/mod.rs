//! Shared fixtures for the integration tests

#![allow(dead_code)]

use kolosal_autotab::prelude::*;
use kolosal_autotab::space::SearchSpace;
use ndarray::Array1;
use polars::prelude::*;
use std::sync::Arc;

/// Two numeric features, label set by a linear boundary
pub fn classification_data(n: usize) -> (DataFrame, Array1<f64>) {
    let a: Vec<f64> = (0..n).map(|i| (i % 10) as f64 + (i % 3) as f64 * 0.1).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 7) % 13) as f64).collect();
    let y: Vec<f64> = a
        .iter()
        .zip(&b)
        .map(|(a, b)| if a + 0.5 * b > 8.0 { 1.0 } else { 0.0 })
        .collect();
    let df = df!("a" => a, "b" => b).unwrap();
    (df, Array1::from(y))
}

/// Noisy-free linear target
pub fn regression_data(n: usize) -> (DataFrame, Array1<f64>) {
    let a: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 5) % 11) as f64).collect();
    let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| 2.0 * a - b + 1.0).collect();
    let df = df!("a" => a, "b" => b).unwrap();
    (df, Array1::from(y))
}

/// 100 rows, 70 of class 0 and 30 of class 1
pub fn imbalanced_data() -> (DataFrame, Array1<f64>) {
    let n = 100;
    let y: Vec<f64> = (0..n).map(|i| if i < 70 { 0.0 } else { 1.0 }).collect();
    let a: Vec<f64> = (0..n).map(|i| if i < 70 { (i % 7) as f64 } else { 10.0 + (i % 5) as f64 }).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 3) % 17) as f64).collect();
    let df = df!("a" => a, "b" => b).unwrap();
    (df, Array1::from(y))
}

pub fn profile(x: &DataFrame, task: TaskType) -> DatasetProfile {
    DatasetProfile::from_frame(x, task)
}

pub fn space_for(
    x: &DataFrame,
    task: TaskType,
    restrictions: &StageRestrictions,
) -> SearchSpace {
    let candidates = StageCandidates::resolve(
        &Registries::default(),
        &profile(x, task),
        restrictions,
        &CandidatePolicy::default(),
    )
    .unwrap();
    build_space(&candidates, &default_templates(), task).unwrap()
}

pub fn objective(x: &DataFrame, y: &Array1<f64>, task: TaskType) -> TrialObjective {
    TrialObjective::new(
        Arc::new(x.clone()),
        Arc::new(y.clone()),
        Arc::new(Registries::default()),
        task,
    )
    .unwrap()
}

/// Quiet, deterministic search settings
pub fn search_config(trials: usize) -> SearchConfig {
    SearchConfig::new()
        .with_num_trials(trials)
        .with_n_jobs(2)
        .with_seed(1)
        .with_plateau(None)
        .with_checkpoint(false)
}

/// Wire-form config point from per-stage method names
pub fn flat_config(task: &str, methods: [&str; 6]) -> FlatConfig {
    serde_json::from_value(serde_json::json!({
        "task_type": task,
        "encoder": {"encoder_0": methods[0]},
        "imputer": {"imputer_0": methods[1]},
        "balancer": {"balancer_0": methods[2]},
        "scaler": {"scaler_0": methods[3]},
        "feature_selector": {"feature_selector_0": methods[4]},
        "model": {"model_0": methods[5]}
    }))
    .unwrap()
}
