//! Search controller
//!
//! Samples config points in batches of `n_jobs`, evaluates each batch on a
//! dedicated rayon pool and folds the results back in trial-id order, so a
//! fixed seed gives the same proposals whatever the worker count.

use super::algorithms::{create_algorithm, Observation, SearchAlgorithm};
use super::cancel::CancelToken;
use super::config::SearchConfig;
use super::record::{AlgorithmState, SearchCheckpoint, SearchResult, TrialRecord, TrialStatus};
use super::scheduler::{create_scheduler, Scheduler, SchedulerDecision};
use super::stopper::{CombinedStopper, PlateauStopper, StopReason, Stopper, TimeoutStopper};
use crate::error::{AutoMLError, Result};
use crate::objective::TrialEvaluator;
use crate::space::{ConfigPoint, SearchSpace};
use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutable state of one run
struct RunLog {
    run_id: Uuid,
    records: Vec<TrialRecord>,
    observations: Vec<Observation>,
    next_trial_id: usize,
    failures: usize,
}

impl RunLog {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            records: Vec::new(),
            observations: Vec::new(),
            next_trial_id: 0,
            failures: 0,
        }
    }

    fn checkpoint(&self, algorithm: &dyn SearchAlgorithm) -> Result<SearchCheckpoint> {
        Ok(SearchCheckpoint {
            run_id: self.run_id,
            updated_at: Utc::now(),
            next_trial_id: self.next_trial_id,
            records: self.records.clone(),
            algorithm: Some(AlgorithmState {
                algorithm: algorithm.name().to_string(),
                state: algorithm.state()?,
            }),
        })
    }
}

/// Drives a search over a [`SearchSpace`] against a [`TrialEvaluator`]
pub struct SearchController {
    config: SearchConfig,
    checkpoint_dir: Option<PathBuf>,
}

impl SearchController {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            checkpoint_dir: None,
        })
    }

    /// Where `search_state.json` lives; defaults to the evaluator's artifact root
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn checkpoint_dir<'a>(&'a self, evaluator: &'a dyn TrialEvaluator) -> Option<&'a Path> {
        self.checkpoint_dir
            .as_deref()
            .or_else(|| evaluator.artifacts().map(|s| s.root()))
    }

    fn build_stopper(&self) -> CombinedStopper {
        let mut stopper = CombinedStopper::new();
        if let Some(budget) = self.config.time_budget {
            stopper = stopper.with(Box::new(TimeoutStopper::new(budget)));
        }
        if let Some(plateau) = self.config.plateau {
            stopper = stopper.with(Box::new(PlateauStopper::new(plateau)));
        }
        stopper
    }

    /// Reload a previous run log and replay its completed trials
    fn resume(
        &self,
        dir: Option<&Path>,
        algorithm: &mut dyn SearchAlgorithm,
        scheduler: &mut dyn Scheduler,
        stopper: &mut dyn Stopper,
    ) -> Result<RunLog> {
        let mut log = RunLog::new();
        let Some(dir) = dir.filter(|_| self.config.resume) else {
            return Ok(log);
        };
        let Some(checkpoint) = SearchCheckpoint::load(dir)? else {
            debug!(dir = %dir.display(), "no run log to resume from");
            return Ok(log);
        };

        log.run_id = checkpoint.run_id;
        log.next_trial_id = checkpoint.next_trial_id;
        for record in checkpoint.records {
            match record.status {
                TrialStatus::Fitted => {
                    if let Some(loss) = record.loss {
                        scheduler.on_result(record.trial_id, loss);
                        stopper.on_result(loss);
                        log.observations.push(Observation {
                            trial_id: record.trial_id,
                            config: record.config.clone(),
                            loss,
                        });
                    }
                    log.records.push(record);
                }
                TrialStatus::Failed => {
                    log.failures += 1;
                    log.records.push(record);
                }
                // interrupted trials are sampled again
                TrialStatus::Pending | TrialStatus::Timeout => {}
            }
        }
        match checkpoint.algorithm {
            Some(saved) if saved.algorithm == algorithm.name() => algorithm.restore(saved.state)?,
            saved => warn!(
                saved = saved.as_ref().map_or("none", |s| s.algorithm.as_str()),
                current = algorithm.name(),
                "run log has no matching proposer state; proposals start afresh"
            ),
        }
        info!(
            run_id = %log.run_id,
            completed = log.records.len(),
            next_trial_id = log.next_trial_id,
            "resuming search"
        );
        Ok(log)
    }

    /// Run the search to completion
    pub fn run(&self, space: &SearchSpace, evaluator: &dyn TrialEvaluator) -> Result<SearchResult> {
        if space.task_type != evaluator.task_type() {
            return Err(AutoMLError::ConfigError(format!(
                "search space is {}, evaluator is {}",
                space.task_type.tag(),
                evaluator.task_type().tag()
            )));
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let cancel = match self.config.time_budget {
            Some(budget) => CancelToken::with_deadline(start + budget),
            None => CancelToken::new(),
        };
        let mut algorithm = create_algorithm(self.config.algorithm, self.config.seed);
        let mut scheduler = create_scheduler(self.config.scheduler);
        let mut stopper = self.build_stopper();
        let dir = self.checkpoint_dir(evaluator);
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)?;
        }

        let log = Mutex::new(self.resume(
            dir,
            algorithm.as_mut(),
            scheduler.as_mut(),
            &mut stopper,
        )?);
        let allowed = self.config.allowed_failures();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs)
            .build()
            .map_err(|e| AutoMLError::SearchError(format!("failed to build worker pool: {}", e)))?;

        info!(
            run_id = %log.lock().run_id,
            algorithm = algorithm.name(),
            scheduler = scheduler.name(),
            grid_size = space.grid_size(),
            n_jobs = self.config.n_jobs,
            "starting search"
        );

        let stop_reason = loop {
            let completed = log.lock().records.len();
            let remaining = match self.config.num_trials {
                Some(n) if completed >= n => break StopReason::TrialBudget,
                Some(n) => n - completed,
                None => usize::MAX,
            };
            if let Some(reason) = stopper.check(start.elapsed()) {
                break reason;
            }

            let batch: Vec<(usize, ConfigPoint)> = {
                let mut log = log.lock();
                (0..self.config.n_jobs.min(remaining))
                    .map(|_| {
                        let trial_id = log.next_trial_id;
                        log.next_trial_id += 1;
                        let point = algorithm.suggest(space, &log.observations);
                        debug!(trial_id, pipeline = %point.summary(), "sampled trial");
                        (trial_id, point)
                    })
                    .collect()
            };

            let outcomes: Vec<(usize, ConfigPoint, Result<_>, Duration)> = pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|(trial_id, point)| {
                        let t = Instant::now();
                        let outcome = evaluator.evaluate(trial_id, &point, &cancel);
                        (trial_id, point, outcome, t.elapsed())
                    })
                    .collect()
            });

            let mut log = log.lock();
            for (trial_id, point, outcome, duration) in outcomes {
                let mut record = TrialRecord::pending(trial_id, point);
                record.duration = duration;
                match outcome {
                    Ok(report) => {
                        let decision = scheduler.on_result(trial_id, report.loss);
                        stopper.on_result(report.loss);
                        record.status = TrialStatus::Fitted;
                        record.loss = Some(report.loss);
                        record.artifact = report.artifact;
                        record.stopped_early = decision == SchedulerDecision::Stop;
                        log.observations.push(Observation {
                            trial_id,
                            config: record.config.clone(),
                            loss: report.loss,
                        });
                    }
                    Err(AutoMLError::Cancelled) => {
                        debug!(trial_id, "trial cancelled at the deadline");
                        record.status = TrialStatus::Timeout;
                    }
                    Err(err) if err.is_config_error() => return Err(err),
                    Err(err) => {
                        warn!(trial_id, error = %err, "trial failed");
                        record.status = TrialStatus::Failed;
                        record.error = Some(err.to_string());
                        log.failures += 1;
                    }
                }
                log.records.push(record);
            }

            if self.config.checkpoint {
                if let Some(dir) = dir {
                    log.checkpoint(algorithm.as_ref())?.save(dir)?;
                }
            }
            if let Some(allowed) = allowed {
                if log.failures > allowed {
                    return Err(AutoMLError::FailureBudgetExceeded {
                        failures: log.failures,
                        allowed,
                    });
                }
            }
        };

        let log = log.into_inner();
        let result = SearchResult {
            run_id: log.run_id,
            started_at,
            records: log.records,
            stop_reason,
            elapsed: start.elapsed(),
        };
        match result.best_trial() {
            Some(best) => info!(
                run_id = %result.run_id,
                trials = result.records.len(),
                failures = log.failures,
                best_trial = best.trial_id,
                best_loss = best.loss.unwrap_or(f64::NAN),
                reason = %stop_reason,
                "search finished"
            ),
            None => warn!(
                run_id = %result.run_id,
                trials = result.records.len(),
                reason = %stop_reason,
                "search finished without a fitted trial"
            ),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{TrainingStatus, TrialReport};
    use crate::search::config::AlgorithmKind;
    use crate::registry::{
        CandidatePolicy, DatasetProfile, Registries, StageCandidates, StageRestrictions,
    };
    use crate::space::{build_space, default_templates};
    use crate::stages::TaskType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loss is the trial id; ids listed in `fail` raise a data error
    struct Scripted {
        fail: Vec<usize>,
        calls: AtomicUsize,
    }

    impl TrialEvaluator for Scripted {
        fn task_type(&self) -> TaskType {
            TaskType::Regression
        }

        fn evaluate(
            &self,
            trial_id: usize,
            _point: &ConfigPoint,
            _cancel: &CancelToken,
        ) -> Result<TrialReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.contains(&trial_id) {
                return Err(AutoMLError::DataError("scripted failure".to_string()));
            }
            Ok(TrialReport {
                trial_id,
                loss: trial_id as f64,
                status: TrainingStatus::Fitted,
                config: None,
                artifact: None,
            })
        }
    }

    fn space() -> SearchSpace {
        let profile = DatasetProfile {
            n_rows: 30,
            n_cols: 2,
            has_missing: false,
            task_type: TaskType::Regression,
        };
        let candidates = StageCandidates::resolve(
            &Registries::default(),
            &profile,
            &StageRestrictions::default(),
            &CandidatePolicy::default(),
        )
        .unwrap();
        build_space(&candidates, &default_templates(), TaskType::Regression).unwrap()
    }

    fn config(n: usize) -> SearchConfig {
        SearchConfig::new()
            .with_num_trials(n)
            .with_n_jobs(2)
            .with_plateau(None)
            .with_checkpoint(false)
    }

    #[test]
    fn test_runs_exactly_num_trials() {
        let evaluator = Scripted {
            fail: vec![],
            calls: AtomicUsize::new(0),
        };
        let result = SearchController::new(config(5)).unwrap().run(&space(), &evaluator).unwrap();
        assert_eq!(result.records.len(), 5);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.best_trial().unwrap().trial_id, 0);
        assert_eq!(result.stop_reason, StopReason::TrialBudget);
        let ids: Vec<usize> = result.records.iter().map(|r| r.trial_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_failures_within_budget_are_recorded() {
        let evaluator = Scripted {
            fail: vec![1],
            calls: AtomicUsize::new(0),
        };
        let controller = SearchController::new(config(10).with_allow_error_prop(0.1)).unwrap();
        let result = controller.run(&space(), &evaluator).unwrap();
        assert_eq!(result.failures().len(), 1);
        assert_eq!(result.n_fitted(), 9);
    }

    #[test]
    fn test_failure_budget_exceeded() {
        let evaluator = Scripted {
            fail: vec![0, 1],
            calls: AtomicUsize::new(0),
        };
        let controller = SearchController::new(config(10).with_allow_error_prop(0.1)).unwrap();
        let err = controller.run(&space(), &evaluator).unwrap_err();
        assert!(matches!(
            err,
            AutoMLError::FailureBudgetExceeded { failures: 2, allowed: 1 }
        ));
    }

    #[test]
    fn test_task_mismatch_rejected() {
        let evaluator = Scripted {
            fail: vec![],
            calls: AtomicUsize::new(0),
        };
        let mut s = space();
        s.task_type = TaskType::Classification;
        assert!(SearchController::new(config(2)).unwrap().run(&s, &evaluator).is_err());
    }

    #[test]
    fn test_resume_skips_completed_trials() {
        let dir = tempfile::tempdir().unwrap();
        let first = Scripted {
            fail: vec![],
            calls: AtomicUsize::new(0),
        };
        SearchController::new(config(4).with_checkpoint(true))
            .unwrap()
            .with_checkpoint_dir(dir.path())
            .run(&space(), &first)
            .unwrap();

        let second = Scripted {
            fail: vec![],
            calls: AtomicUsize::new(0),
        };
        let result = SearchController::new(config(6).with_checkpoint(true).with_resume(true))
            .unwrap()
            .with_checkpoint_dir(dir.path())
            .run(&space(), &second)
            .unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.records.len(), 6);
        assert_eq!(result.records[4].trial_id, 4);
    }

    #[test]
    fn test_resumed_tpe_proposes_like_uninterrupted_run() {
        let evaluator = || Scripted {
            fail: vec![],
            calls: AtomicUsize::new(0),
        };
        let tpe = |n: usize| config(n).with_algorithm(AlgorithmKind::Tpe).with_checkpoint(true);

        let straight_dir = tempfile::tempdir().unwrap();
        let straight = SearchController::new(tpe(16))
            .unwrap()
            .with_checkpoint_dir(straight_dir.path())
            .run(&space(), &evaluator())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        SearchController::new(tpe(12))
            .unwrap()
            .with_checkpoint_dir(dir.path())
            .run(&space(), &evaluator())
            .unwrap();
        let resumed = SearchController::new(tpe(16).with_resume(true))
            .unwrap()
            .with_checkpoint_dir(dir.path())
            .run(&space(), &evaluator())
            .unwrap();

        let configs = |r: &SearchResult| r.records.iter().map(|t| t.config.clone()).collect::<Vec<_>>();
        assert_eq!(configs(&resumed), configs(&straight));
    }
}
