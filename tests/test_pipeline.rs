//! Integration tests for pipeline fitting, prediction and artifacts

mod common;

use common::*;
use kolosal_autotab::prelude::*;
use kolosal_autotab::stages::balancers::SimpleRandomOverSampling;
use kolosal_autotab::stages::encoders::{frame_to_array, DataEncoding};
use kolosal_autotab::stages::models::LogisticRegression;
use kolosal_autotab::stages::scalers::Standardize;
use kolosal_autotab::stages::{Balancer, NoProcessing};

fn balanced_pipeline() -> Pipeline {
    Pipeline::new()
        .with_encoder(Box::new(DataEncoding::new()))
        .with_imputer(Box::new(NoProcessing::new()))
        .with_balancer(Box::new(SimpleRandomOverSampling::new(0.9, 1)))
        .with_scaler(Box::new(Standardize::new(true, true)))
        .with_feature_selector(Box::new(NoProcessing::new()))
        .with_model(Box::new(LogisticRegression::new(1.0, 200)))
}

// ============================================================================
// Balancing
// ============================================================================

#[test]
fn test_oversampling_grows_training_rows_only() {
    let (x, y) = imbalanced_data();
    let features = frame_to_array(&x).unwrap();

    let mut balancer = SimpleRandomOverSampling::new(0.9, 1);
    let (xb, yb) = balancer.fit_transform(&features, &y).unwrap();
    assert_eq!(xb.nrows(), 140);
    assert_eq!(yb.len(), 140);
    assert_eq!(yb.iter().filter(|v| **v == 1.0).count(), 70);

    let mut pipeline = balanced_pipeline();
    pipeline.fit(&x, &y).unwrap();
    assert_eq!(pipeline.predict(&x).unwrap().len(), 100);
    assert_eq!(pipeline.transform_features(&x).unwrap().nrows(), 100);
    assert_eq!(pipeline.predict_proba(&x).unwrap().nrows(), 100);
}

#[test]
fn test_balanced_data_is_untouched() {
    let (x, y) = imbalanced_data();
    let features = frame_to_array(&x).unwrap();
    let mut balancer = SimpleRandomOverSampling::new(0.3, 1);
    let (xb, yb) = balancer.fit_transform(&features, &y).unwrap();
    assert_eq!(xb, features);
    assert_eq!(yb, y);
}

// ============================================================================
// Fit state
// ============================================================================

#[test]
fn test_every_grid_point_refuses_to_predict_unfitted() {
    let (x, _) = classification_data(30);
    let registries = Registries::default();
    let space = space_for(&x, TaskType::Classification, &StageRestrictions::default());
    for point in space.grid() {
        let pipeline = registries.instantiate(&point).unwrap();
        let err = pipeline.predict(&x).unwrap_err();
        assert!(
            matches!(err, AutoMLError::NotFitted(_)),
            "{}: {}",
            point.summary(),
            err
        );
    }
}

#[test]
fn test_refit_is_noop_for_fitted_pipeline() {
    let (x, y) = imbalanced_data();
    let mut pipeline = balanced_pipeline();
    pipeline.fit(&x, &y).unwrap();
    let before = pipeline.predict_proba(&x).unwrap();
    pipeline.fit(&x, &y).unwrap();
    assert_eq!(pipeline.predict_proba(&x).unwrap(), before);
}

// ============================================================================
// Artifacts
// ============================================================================

#[test]
fn test_restored_bundle_predicts_identically() {
    let (x, y) = classification_data(80);
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let restrictions = StageRestrictions::new()
        .with(Stage::Balancer, Restriction::only(["no_processing"]))
        .with(Stage::Model, Restriction::only(["GaussianNB"]));
    let space = space_for(&x, TaskType::Classification, &restrictions);
    let evaluator = objective(&x, &y, TaskType::Classification).with_store(store.clone());
    let result = SearchController::new(search_config(1))
        .unwrap()
        .run(&space, &evaluator)
        .unwrap();

    let record = result.best_trial().unwrap();
    assert!(store.exists(record.trial_id));
    let bundle = store.load(record.trial_id).unwrap();
    assert_eq!(bundle.config, record.config);

    let registries = Registries::default();
    let restored = registries.restore_pipeline(&bundle).unwrap();
    assert!(restored.is_fully_fitted());

    let mut refit = registries.instantiate(&bundle.config).unwrap();
    refit.fit(&x, &y).unwrap();
    assert!(refit.is_fitted());
    assert_eq!(restored.predict(&x).unwrap().len(), x.height());
}
