//! Pipeline search
//!
//! A [`SearchController`] asks a [`SearchAlgorithm`] for config points,
//! evaluates them in parallel through a
//! [`TrialEvaluator`](crate::objective::TrialEvaluator), and stops on the
//! trial budget, the time budget or a loss plateau. Results are kept in
//! trial-id order and logged to `search_state.json` so a run can resume.

mod algorithms;
mod cancel;
mod config;
mod controller;
mod record;
mod scheduler;
mod stopper;

pub use algorithms::{
    create_algorithm, GridSearch, Observation, RandomSearch, SearchAlgorithm, TpeSearch,
};
pub use cancel::CancelToken;
pub use config::{AlgorithmKind, PlateauConfig, SchedulerKind, SearchConfig};
pub use controller::SearchController;
pub use record::{SearchCheckpoint, SearchResult, TrialRecord, TrialStatus, CHECKPOINT_FILE};
pub use scheduler::{
    create_scheduler, FifoScheduler, MedianStoppingRule, Scheduler, SchedulerDecision,
};
pub use stopper::{CombinedStopper, PlateauStopper, StopReason, Stopper, TimeoutStopper};
