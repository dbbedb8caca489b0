//! Class balancers (training only)
//!
//! Every balancer first measures the ratio between the smallest and the
//! largest class. Data whose ratio already reaches `imbalance_threshold`
//! is returned unchanged.

use super::{class_labels, ensure_rows, snapshot_of, Balancer, FromParams, StageComponent};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Row indices per class label, ordered by label
fn class_indices(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        indices.entry(label).or_default().push(i);
    }
    indices
}

/// Whether the minority/majority ratio is below the threshold
fn is_imbalanced(indices: &BTreeMap<usize, Vec<usize>>, threshold: f64) -> bool {
    let max = indices.values().map(Vec::len).max().unwrap_or(0);
    let min = indices.values().map(Vec::len).min().unwrap_or(0);
    indices.len() > 1 && max > 0 && (min as f64 / max as f64) < threshold
}

fn gather(x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

fn threshold_param(params: &Hyperparameters) -> Result<f64> {
    let threshold = params.float("imbalance_threshold", 0.9)?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AutoMLError::InvalidParameter {
            name: "imbalance_threshold".to_string(),
            value: threshold.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        });
    }
    Ok(threshold)
}

/// `SimpleRandomOverSampling`: duplicate random minority rows up to the majority count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRandomOverSampling {
    imbalance_threshold: f64,
    seed: u64,
    is_fitted: bool,
}

impl SimpleRandomOverSampling {
    pub fn new(imbalance_threshold: f64, seed: u64) -> Self {
        Self {
            imbalance_threshold,
            seed,
            is_fitted: false,
        }
    }
}

impl FromParams for SimpleRandomOverSampling {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(threshold_param(params)?, params.int("seed", 1)? as u64))
    }
}

impl StageComponent for SimpleRandomOverSampling {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Balancer for SimpleRandomOverSampling {
    fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        ensure_rows(x, y)?;
        let indices = class_indices(&class_labels(y)?);
        self.is_fitted = true;
        if !is_imbalanced(&indices, self.imbalance_threshold) {
            return Ok((x.clone(), y.clone()));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let max_count = indices.values().map(Vec::len).max().unwrap_or(0);
        let mut rows: Vec<usize> = (0..x.nrows()).collect();
        for class_rows in indices.values() {
            for _ in class_rows.len()..max_count {
                rows.push(class_rows[rng.gen_range(0..class_rows.len())]);
            }
        }
        Ok(gather(x, y, &rows))
    }
}

/// `SimpleRandomUnderSampling`: drop random majority rows down to the minority count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRandomUnderSampling {
    imbalance_threshold: f64,
    seed: u64,
    is_fitted: bool,
}

impl SimpleRandomUnderSampling {
    pub fn new(imbalance_threshold: f64, seed: u64) -> Self {
        Self {
            imbalance_threshold,
            seed,
            is_fitted: false,
        }
    }
}

impl FromParams for SimpleRandomUnderSampling {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(threshold_param(params)?, params.int("seed", 1)? as u64))
    }
}

impl StageComponent for SimpleRandomUnderSampling {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Balancer for SimpleRandomUnderSampling {
    fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        ensure_rows(x, y)?;
        let indices = class_indices(&class_labels(y)?);
        self.is_fitted = true;
        if !is_imbalanced(&indices, self.imbalance_threshold) {
            return Ok((x.clone(), y.clone()));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let min_count = indices.values().map(Vec::len).min().unwrap_or(0);
        let mut rows = Vec::with_capacity(min_count * indices.len());
        for class_rows in indices.values() {
            rows.extend(class_rows.choose_multiple(&mut rng, min_count).copied());
        }
        rows.sort_unstable();
        Ok(gather(x, y, &rows))
    }
}

#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// `Smote`: synthesize minority rows by interpolating towards one of the
/// `k` nearest same-class neighbours
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    imbalance_threshold: f64,
    k: usize,
    seed: u64,
    is_fitted: bool,
}

impl Smote {
    pub fn new(imbalance_threshold: f64, k: usize, seed: u64) -> Self {
        Self {
            imbalance_threshold,
            k: k.max(1),
            seed,
            is_fitted: false,
        }
    }

    fn distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Indices (into `rows`) of the k nearest rows to `rows[target]`, excluding itself
    fn neighbors(&self, rows: &[Vec<f64>], target: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(self.k + 1);
        for (i, row) in rows.iter().enumerate() {
            if i == target {
                continue;
            }
            heap.push(DistIdx(Self::distance(&rows[target], row), i));
            if heap.len() > self.k {
                heap.pop();
            }
        }
        heap.into_iter().map(|DistIdx(_, i)| i).collect()
    }
}

impl FromParams for Smote {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(
            threshold_param(params)?,
            params.usize("k", 5)?,
            params.int("seed", 1)? as u64,
        ))
    }
}

impl StageComponent for Smote {
    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Balancer for Smote {
    fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        ensure_rows(x, y)?;
        let indices = class_indices(&class_labels(y)?);
        self.is_fitted = true;
        if !is_imbalanced(&indices, self.imbalance_threshold) {
            return Ok((x.clone(), y.clone()));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let max_count = indices.values().map(Vec::len).max().unwrap_or(0);
        let mut synthetic_x: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<f64> = Vec::new();

        for (&label, class_rows) in &indices {
            let n_new = max_count - class_rows.len();
            if n_new == 0 {
                continue;
            }
            let rows: Vec<Vec<f64>> = class_rows.iter().map(|&i| x.row(i).to_vec()).collect();
            for _ in 0..n_new {
                let base = rng.gen_range(0..rows.len());
                let neighbors = self.neighbors(&rows, base);
                let sample: Vec<f64> = match neighbors.choose(&mut rng) {
                    Some(&nb) => {
                        let gap: f64 = rng.gen();
                        rows[base]
                            .iter()
                            .zip(rows[nb].iter())
                            .map(|(&p, &n)| p + gap * (n - p))
                            .collect()
                    }
                    // single-row class: duplicate it
                    None => rows[base].clone(),
                };
                synthetic_x.extend(sample);
                synthetic_y.push(label as f64);
            }
        }

        let n_synthetic = synthetic_y.len();
        let synthetic_x = Array2::from_shape_vec((n_synthetic, x.ncols()), synthetic_x)?;
        let new_x = ndarray::concatenate(Axis(0), &[x.view(), synthetic_x.view()])?;
        let mut new_y = y.to_vec();
        new_y.extend(synthetic_y);
        Ok((new_x, Array1::from_vec(new_y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        (x, y)
    }

    fn count(y: &Array1<f64>, label: f64) -> usize {
        y.iter().filter(|v| **v == label).count()
    }

    #[test]
    fn test_oversampling_balances_classes() {
        let (x, y) = imbalanced();
        let mut b = SimpleRandomOverSampling::new(0.9, 1);
        let (bx, by) = b.fit_transform(&x, &y).unwrap();
        assert_eq!(bx.nrows(), 16);
        assert_eq!(count(&by, 1.0), 8);
        assert!(b.is_fitted());
    }

    #[test]
    fn test_undersampling_balances_classes() {
        let (x, y) = imbalanced();
        let mut b = SimpleRandomUnderSampling::new(0.9, 1);
        let (bx, by) = b.fit_transform(&x, &y).unwrap();
        assert_eq!(bx.nrows(), 4);
        assert_eq!(count(&by, 0.0), 2);
    }

    #[test]
    fn test_smote_interpolates_within_class_range() {
        let (x, y) = imbalanced();
        let mut b = Smote::new(0.9, 3, 7);
        let (bx, by) = b.fit_transform(&x, &y).unwrap();
        assert_eq!(bx.nrows(), 16);
        for i in 10..16 {
            assert_eq!(by[i], 1.0);
            assert!(bx[[i, 0]] >= 16.0 && bx[[i, 0]] <= 18.0);
        }
    }

    #[test]
    fn test_balanced_data_is_unchanged() {
        let x = Array2::zeros((4, 1));
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0]);
        let mut b = SimpleRandomOverSampling::new(0.9, 1);
        let (bx, by) = b.fit_transform(&x, &y).unwrap();
        assert_eq!(bx.nrows(), 4);
        assert_eq!(by, y);
    }
}
