//! Seeded holdout split

use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Holdout policy of a trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Score on a held-out share; otherwise fit and score on the full data
    pub enabled: bool,
    pub valid_size: f64,
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            valid_size: 0.15,
            seed: 1,
        }
    }
}

impl ValidationConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_valid_size(mut self, valid_size: f64) -> Self {
        self.valid_size = valid_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && !(self.valid_size > 0.0 && self.valid_size < 1.0) {
            return Err(AutoMLError::InvalidParameter {
                name: "valid_size".to_string(),
                value: self.valid_size.to_string(),
                reason: "must lie in (0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

/// Train and validation row indices, each sorted ascending.
///
/// `floor(valid_size * n_rows)` rows are held out by a seeded shuffle, so
/// the partition depends only on `(n_rows, valid_size, seed)`.
pub fn holdout_split(n_rows: usize, valid_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(valid_size > 0.0 && valid_size < 1.0) {
        return Err(AutoMLError::InvalidParameter {
            name: "valid_size".to_string(),
            value: valid_size.to_string(),
            reason: "must lie in (0, 1)".to_string(),
        });
    }
    let n_valid = (valid_size * n_rows as f64).floor() as usize;
    if n_valid == 0 || n_valid >= n_rows {
        return Err(AutoMLError::DataError(format!(
            "a {} holdout of {} rows leaves an empty split",
            valid_size, n_rows
        )));
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut valid = order[..n_valid].to_vec();
    let mut train = order[n_valid..].to_vec();
    valid.sort_unstable();
    train.sort_unstable();
    Ok((train, valid))
}

/// Rows of a frame, in index order
pub fn take_rows(x: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        rows.iter().map(|&r| r as IdxSize).collect(),
    );
    Ok(x.take(&idx)?)
}

/// Entries of a target, in index order
pub fn take_targets(y: &Array1<f64>, rows: &[usize]) -> Array1<f64> {
    y.select(Axis(0), rows)
}
