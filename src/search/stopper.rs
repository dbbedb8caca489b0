//! Stop conditions for the whole search

use super::config::PlateauConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TrialBudget,
    TimeBudget,
    Plateau,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TrialBudget => "trial budget reached",
            StopReason::TimeBudget => "time budget reached",
            StopReason::Plateau => "loss plateaued",
        };
        f.write_str(s)
    }
}

pub trait Stopper: Send {
    fn on_result(&mut self, loss: f64);

    fn check(&self, elapsed: Duration) -> Option<StopReason>;
}

/// Fires once the wall-clock budget is spent
#[derive(Debug, Clone)]
pub struct TimeoutStopper {
    budget: Duration,
}

impl TimeoutStopper {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

impl Stopper for TimeoutStopper {
    fn on_result(&mut self, _loss: f64) {}

    fn check(&self, elapsed: Duration) -> Option<StopReason> {
        (elapsed >= self.budget).then_some(StopReason::TimeBudget)
    }
}

/// Fires when the best loss stalls for `window` results
#[derive(Debug, Clone)]
pub struct PlateauStopper {
    config: PlateauConfig,
    /// Best loss after each result
    best: Vec<f64>,
}

impl PlateauStopper {
    pub fn new(config: PlateauConfig) -> Self {
        Self {
            config,
            best: Vec::new(),
        }
    }
}

impl Stopper for PlateauStopper {
    fn on_result(&mut self, loss: f64) {
        let best = self.best.last().map_or(loss, |b| b.min(loss));
        self.best.push(best);
    }

    fn check(&self, _elapsed: Duration) -> Option<StopReason> {
        let n = self.best.len();
        if n < self.config.grace_period.max(self.config.window + 1) {
            return None;
        }
        let before = self.best[n - 1 - self.config.window];
        let now = self.best[n - 1];
        let improvement = before - now;
        let scale = before.abs().max(f64::EPSILON);
        (improvement <= self.config.tolerance * scale).then_some(StopReason::Plateau)
    }
}

/// Fires when any inner stopper fires
#[derive(Default)]
pub struct CombinedStopper {
    stoppers: Vec<Box<dyn Stopper>>,
}

impl CombinedStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stopper: Box<dyn Stopper>) -> Self {
        self.stoppers.push(stopper);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stoppers.is_empty()
    }
}

impl Stopper for CombinedStopper {
    fn on_result(&mut self, loss: f64) {
        for stopper in &mut self.stoppers {
            stopper.on_result(loss);
        }
    }

    fn check(&self, elapsed: Duration) -> Option<StopReason> {
        self.stoppers.iter().find_map(|s| s.check(elapsed))
    }
}
