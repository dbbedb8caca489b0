//! Search algorithms: propose the next config point

use super::config::AlgorithmKind;
use crate::error::Result;
use crate::space::{ConfigPoint, ParameterValue, SearchSpace};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A completed trial as seen by the algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub trial_id: usize,
    pub config: ConfigPoint,
    pub loss: f64,
}

/// Trait for config proposers
pub trait SearchAlgorithm: Send {
    /// Next config to evaluate, given every completed observation in trial-id order
    fn suggest(&mut self, space: &SearchSpace, history: &[Observation]) -> ConfigPoint;

    fn name(&self) -> &'static str;

    /// Proposal state (rng stream, cursors) written into the run log
    fn state(&self) -> Result<serde_json::Value>;

    /// Continue from a state produced by [`SearchAlgorithm::state`]
    fn restore(&mut self, state: serde_json::Value) -> Result<()>;
}

fn to_state<T: Serialize>(algorithm: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(algorithm)?)
}

fn from_state<T: DeserializeOwned>(state: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(state)?)
}

/// Uniform random sampling
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomSearch {
    rng: Xoshiro256PlusPlus,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl SearchAlgorithm for RandomSearch {
    fn suggest(&mut self, space: &SearchSpace, _history: &[Observation]) -> ConfigPoint {
        space.sample(&mut self.rng)
    }

    fn name(&self) -> &'static str {
        "random"
    }

    fn state(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn restore(&mut self, state: serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

/// Walks the method grid once, then falls back to random sampling
#[derive(Debug, Serialize, Deserialize)]
pub struct GridSearch {
    rng: Xoshiro256PlusPlus,
    cursor: usize,
}

impl GridSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            cursor: 0,
        }
    }
}

impl SearchAlgorithm for GridSearch {
    fn suggest(&mut self, space: &SearchSpace, _history: &[Observation]) -> ConfigPoint {
        if self.cursor < space.grid_size() {
            let point = space.grid_point(self.cursor);
            self.cursor += 1;
            return point;
        }
        space.sample(&mut self.rng)
    }

    fn name(&self) -> &'static str {
        "grid"
    }

    fn state(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn restore(&mut self, state: serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

/// Simplified Tree-structured Parzen Estimator.
///
/// Random during start-up; afterwards draws `n_candidates` samples and keeps
/// the one most similar to the best `gamma` share of observations.
#[derive(Debug, Serialize, Deserialize)]
pub struct TpeSearch {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 1.0);
        self
    }

    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    fn similarity(candidate: &ConfigPoint, good: &[&ConfigPoint]) -> f64 {
        if good.is_empty() {
            return 0.0;
        }
        let total: f64 = good
            .iter()
            .map(|g| 1.0 / (1.0 + config_distance(candidate, g)))
            .sum();
        total / good.len() as f64
    }
}

impl SearchAlgorithm for TpeSearch {
    fn suggest(&mut self, space: &SearchSpace, history: &[Observation]) -> ConfigPoint {
        if history.len() < self.n_startup_trials {
            return space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&Observation> = history.iter().collect();
        sorted.sort_by(|a, b| a.loss.total_cmp(&b.loss).then(a.trial_id.cmp(&b.trial_id)));
        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).max(1);
        let good: Vec<&ConfigPoint> = sorted[..n_good].iter().map(|o| &o.config).collect();

        let mut best = space.sample(&mut self.rng);
        let mut best_score = Self::similarity(&best, &good);
        for _ in 1..self.n_candidates {
            let candidate = space.sample(&mut self.rng);
            let score = Self::similarity(&candidate, &good);
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "tpe"
    }

    fn state(&self) -> Result<serde_json::Value> {
        to_state(self)
    }

    fn restore(&mut self, state: serde_json::Value) -> Result<()> {
        *self = from_state(state)?;
        Ok(())
    }
}

fn param_distance(a: &ParameterValue, b: &ParameterValue) -> f64 {
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => {
            let scale = x.abs().max(y.abs());
            if scale > 0.0 {
                (x - y).abs() / scale
            } else {
                0.0
            }
        }
        _ => {
            if a == b {
                0.0
            } else {
                1.0
            }
        }
    }
}

/// Per-stage distance in `[0, 1]`: 1 for a different method, otherwise half
/// the RMS parameter distance; averaged over the six stages
fn config_distance(a: &ConfigPoint, b: &ConfigPoint) -> f64 {
    fn stage<M: PartialEq>(
        ma: &M,
        pa: &crate::space::Hyperparameters,
        mb: &M,
        pb: &crate::space::Hyperparameters,
    ) -> f64 {
        if ma != mb {
            return 1.0;
        }
        let mut sum = 0.0;
        let mut count = 0;
        for (name, value) in pa.iter() {
            if let Some(other) = pb.get(name) {
                let d = param_distance(value, other);
                sum += d * d;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            0.5 * (sum / count as f64).sqrt()
        }
    }
    let total = stage(&a.encoder.method, &a.encoder.params, &b.encoder.method, &b.encoder.params)
        + stage(&a.imputer.method, &a.imputer.params, &b.imputer.method, &b.imputer.params)
        + stage(&a.balancer.method, &a.balancer.params, &b.balancer.method, &b.balancer.params)
        + stage(&a.scaler.method, &a.scaler.params, &b.scaler.method, &b.scaler.params)
        + stage(
            &a.feature_selector.method,
            &a.feature_selector.params,
            &b.feature_selector.method,
            &b.feature_selector.params,
        )
        + stage(&a.model.method, &a.model.params, &b.model.method, &b.model.params);
    total / 6.0
}

/// Create an algorithm from its kind
pub fn create_algorithm(kind: AlgorithmKind, seed: u64) -> Box<dyn SearchAlgorithm> {
    match kind {
        AlgorithmKind::Random => Box::new(RandomSearch::new(seed)),
        AlgorithmKind::Grid => Box::new(GridSearch::new(seed)),
        AlgorithmKind::Tpe => Box::new(TpeSearch::new(seed)),
    }
}
