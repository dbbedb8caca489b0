//! Trial schedulers
//!
//! A scheduler sees each finished result in trial-id order and may flag the
//! trial as stopped early. A flagged trial keeps its loss and stays in the
//! ranking.

use super::config::SchedulerKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerDecision {
    Continue,
    Stop,
}

pub trait Scheduler: Send {
    fn on_result(&mut self, trial_id: usize, loss: f64) -> SchedulerDecision;

    fn name(&self) -> &'static str;
}

/// First in, first out: never intervenes
#[derive(Debug, Clone, Default)]
pub struct FifoScheduler;

impl Scheduler for FifoScheduler {
    fn on_result(&mut self, _trial_id: usize, _loss: f64) -> SchedulerDecision {
        SchedulerDecision::Continue
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

/// Flags results worse than the median of earlier results
#[derive(Debug, Clone)]
pub struct MedianStoppingRule {
    /// Results to see before the rule applies
    grace_period: usize,
    losses: Vec<f64>,
}

impl Default for MedianStoppingRule {
    fn default() -> Self {
        Self::new(5)
    }
}

impl MedianStoppingRule {
    pub fn new(grace_period: usize) -> Self {
        Self {
            grace_period: grace_period.max(1),
            losses: Vec::new(),
        }
    }

    fn median(&self) -> Option<f64> {
        if self.losses.is_empty() {
            return None;
        }
        let mut sorted = self.losses.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        })
    }
}

impl Scheduler for MedianStoppingRule {
    fn on_result(&mut self, _trial_id: usize, loss: f64) -> SchedulerDecision {
        let decision = match self.median() {
            Some(median) if self.losses.len() >= self.grace_period && loss > median => {
                SchedulerDecision::Stop
            }
            _ => SchedulerDecision::Continue,
        };
        self.losses.push(loss);
        decision
    }

    fn name(&self) -> &'static str {
        "median_stopping"
    }
}

pub fn create_scheduler(kind: SchedulerKind) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Fifo => Box::new(FifoScheduler),
        SchedulerKind::MedianStopping => Box::new(MedianStoppingRule::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_never_stops() {
        let mut s = FifoScheduler;
        for i in 0..10 {
            assert_eq!(s.on_result(i, 100.0 - i as f64), SchedulerDecision::Continue);
        }
    }

    #[test]
    fn test_median_rule_respects_grace_period() {
        let mut s = MedianStoppingRule::new(3);
        assert_eq!(s.on_result(0, 1.0), SchedulerDecision::Continue);
        assert_eq!(s.on_result(1, 2.0), SchedulerDecision::Continue);
        assert_eq!(s.on_result(2, 9.0), SchedulerDecision::Continue);
        // median of [1, 2, 9] is 2
        assert_eq!(s.on_result(3, 5.0), SchedulerDecision::Stop);
        assert_eq!(s.on_result(4, 0.5), SchedulerDecision::Continue);
    }
}
