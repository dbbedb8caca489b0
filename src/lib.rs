//! Kolosal AutoTab - pipeline search for tabular data
//!
//! This crate searches over six-stage preprocessing and model pipelines and
//! blends the best of them into an ensemble:
//! - Pluggable stage implementations behind per-stage registries
//! - Conditional search spaces with a lossless flat config codec
//! - Parallel trial execution with trial, time and plateau budgets
//! - Voting and averaging ensembles built from persisted trial artifacts
//!
//! # Modules
//!
//! ## Core
//! - [`stages`] - Encoders, imputers, balancers, scalers, feature selectors, models
//! - [`registry`] - Method catalogues and candidate pruning
//! - [`space`] - Hyperparameter templates, search spaces and the config codec
//! - [`pipeline`] - The six-slot pipeline and its on-disk bundles
//!
//! ## Search
//! - [`objective`] - Trial evaluation, metrics and holdout splits
//! - [`search`] - Search controller, algorithms, schedulers and stoppers
//! - [`ensemble`] - Hard/soft voting and regression aggregation
//!
//! ## Interfaces
//! - [`automl`] - One-call search, ensemble and persistence
//! - [`cli`] - Command-line interface
//! - [`utils`] - CSV loading and target extraction

// Core error handling
pub mod error;

// Pipeline building blocks
pub mod stages;
pub mod registry;
pub mod space;
pub mod pipeline;

// Search
pub mod objective;
pub mod search;
pub mod ensemble;

// Interfaces
pub mod automl;
pub mod cli;
pub mod utils;

pub use error::{AutoMLError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{AutoMLError, Result};

    pub use crate::stages::{Stage, TaskType};

    pub use crate::registry::{
        CandidatePolicy, DatasetProfile, Registries, Restriction, StageCandidates,
        StageRestrictions,
    };

    pub use crate::space::{build_space, decode, default_templates, encode, ConfigPoint, FlatConfig, SearchSpace};

    pub use crate::pipeline::{ArtifactStore, Pipeline, PipelineBundle};

    pub use crate::objective::{Objective, TrialEvaluator, TrialObjective, ValidationConfig};

    pub use crate::search::{
        AlgorithmKind, CancelToken, SchedulerKind, SearchConfig, SearchController, SearchResult,
        TrialStatus,
    };

    pub use crate::ensemble::{Aggregation, Ensemble, EnsembleBuilder, EnsembleConfig, Voting};

    pub use crate::automl::{AutoTabular, AutoTabularConfig};

    pub use crate::utils::DataLoader;
}
