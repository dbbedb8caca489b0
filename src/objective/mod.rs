//! Trial objective
//!
//! Turns one config point into a fitted pipeline and a scalar loss.

mod metrics;
mod split;
mod trial;

pub use metrics::{
    accuracy, auc, f1, hinge, mae, max_error, mse, msle, precision, r2, MetricFn, Objective,
};
pub use split::{holdout_split, take_rows, take_targets, ValidationConfig};
pub use trial::{TrainingStatus, TrialEvaluator, TrialObjective, TrialReport};
