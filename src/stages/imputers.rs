//! Missing-value imputers

use super::{ensure_fitted, ensure_width, snapshot_of, FromParams, Imputer, StageComponent};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Column statistic used by [`SimpleImputer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    Mean,
    Median,
    MostFrequent,
}

impl FillStrategy {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "mean" => Ok(FillStrategy::Mean),
            "median" => Ok(FillStrategy::Median),
            "most_frequent" => Ok(FillStrategy::MostFrequent),
            other => Err(AutoMLError::InvalidParameter {
                name: "method".to_string(),
                value: other.to_string(),
                reason: "expected mean, median or most_frequent".to_string(),
            }),
        }
    }
}

/// `SimpleImputer`: fill each column with one learned statistic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleImputer {
    strategy: FillStrategy,
    fill_values: Option<Array1<f64>>,
}

impl SimpleImputer {
    pub fn new(strategy: FillStrategy) -> Self {
        Self {
            strategy,
            fill_values: None,
        }
    }

    fn column_statistic(&self, column: &[f64]) -> f64 {
        if column.is_empty() {
            return 0.0;
        }
        match self.strategy {
            FillStrategy::Mean => column.iter().sum::<f64>() / column.len() as f64,
            FillStrategy::Median => median(column),
            FillStrategy::MostFrequent => {
                let mut sorted = column.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let (mut best, mut best_count) = (sorted[0], 0usize);
                let mut i = 0;
                while i < sorted.len() {
                    let j = sorted[i..].iter().take_while(|v| **v == sorted[i]).count();
                    // ties resolve to the smallest value
                    if j > best_count {
                        best = sorted[i];
                        best_count = j;
                    }
                    i += j;
                }
                best
            }
        }
    }
}

impl FromParams for SimpleImputer {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(FillStrategy::parse(&params.string("method", "mean")?)?))
    }
}

impl StageComponent for SimpleImputer {
    fn is_fitted(&self) -> bool {
        self.fill_values.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Imputer for SimpleImputer {
    fn fill(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let values: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                self.column_statistic(&observed)
            })
            .collect();
        self.fill_values = Some(Array1::from_vec(values));
        self.transform(x)
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fill_values = self
            .fill_values
            .as_ref()
            .ok_or_else(|| AutoMLError::NotFitted("SimpleImputer".to_string()))?;
        ensure_width(x, fill_values.len())?;
        let mut result = x.clone();
        for (mut col, &fill) in result.axis_iter_mut(Axis(1)).zip(fill_values.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(result)
    }
}

/// Ordered float for the neighbour heap
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // max heap by distance, so the farthest neighbour pops first
        self.0.total_cmp(&other.0)
    }
}

/// `KNNImputer`: fill a missing cell with the mean of that feature over
/// the `n_neighbors` nearest complete training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    n_neighbors: usize,
    /// Complete training rows
    complete_data: Option<Array2<f64>>,
    /// Fallback when no complete row exists
    feature_means: Option<Array1<f64>>,
}

impl KNNImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            complete_data: None,
            feature_means: None,
        }
    }

    /// Euclidean distance over the coordinates observed in both rows
    fn distance(a: &[f64], b: &[f64]) -> f64 {
        let mut count = 0usize;
        let mut accum = 0.0;
        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if ai.is_nan() || bi.is_nan() {
                continue;
            }
            count += 1;
            accum += (ai - bi) * (ai - bi);
        }
        if count == 0 {
            f64::INFINITY
        } else {
            (accum / count as f64).sqrt()
        }
    }

    fn neighbors(&self, data: &Array2<f64>, sample: &[f64]) -> Vec<usize> {
        let mut heap: BinaryHeap<DistanceIdx> = BinaryHeap::with_capacity(self.n_neighbors + 1);
        for (i, row) in data.rows().into_iter().enumerate() {
            let row: Vec<f64> = row.to_vec();
            heap.push(DistanceIdx(Self::distance(sample, &row), i));
            if heap.len() > self.n_neighbors {
                heap.pop();
            }
        }
        heap.into_iter().map(|d| d.1).collect()
    }
}

impl FromParams for KNNImputer {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self::new(params.usize("n_neighbors", 5)?))
    }
}

impl StageComponent for KNNImputer {
    fn is_fitted(&self) -> bool {
        self.feature_means.is_some()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Imputer for KNNImputer {
    fn fill(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let complete: Vec<usize> = x
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(i, _)| i)
            .collect();
        self.complete_data = Some(x.select(Axis(0), &complete));
        self.feature_means = Some(
            x.axis_iter(Axis(1))
                .map(|col| {
                    let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                    if observed.is_empty() {
                        0.0
                    } else {
                        observed.iter().sum::<f64>() / observed.len() as f64
                    }
                })
                .collect(),
        );
        self.transform(x)
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_fitted(self.is_fitted(), "KNNImputer")?;
        let (Some(data), Some(means)) = (&self.complete_data, &self.feature_means) else {
            return Err(AutoMLError::NotFitted("KNNImputer".to_string()));
        };
        ensure_width(x, means.len())?;

        let mut result = x.clone();
        for mut row in result.rows_mut() {
            if row.iter().all(|v| !v.is_nan()) {
                continue;
            }
            let sample = row.to_vec();
            let neighbors = if data.nrows() > 0 {
                self.neighbors(data, &sample)
            } else {
                Vec::new()
            };
            for (j, value) in row.iter_mut().enumerate() {
                if value.is_nan() {
                    *value = if neighbors.is_empty() {
                        means[j]
                    } else {
                        neighbors.iter().map(|&i| data[[i, j]]).sum::<f64>()
                            / neighbors.len() as f64
                    };
                }
            }
        }
        Ok(result)
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_fill() {
        let x = array![[1.0, f64::NAN], [3.0, 4.0], [f64::NAN, 8.0]];
        let mut imp = SimpleImputer::new(FillStrategy::Mean);
        let filled = imp.fill(&x).unwrap();
        assert_eq!(filled[[2, 0]], 2.0);
        assert_eq!(filled[[0, 1]], 6.0);
    }

    #[test]
    fn test_most_frequent_fill() {
        let x = array![[1.0], [2.0], [2.0], [f64::NAN]];
        let mut imp = SimpleImputer::new(FillStrategy::MostFrequent);
        assert_eq!(imp.fill(&x).unwrap()[[3, 0]], 2.0);
    }

    #[test]
    fn test_fill_is_idempotent_without_missing() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut imp = SimpleImputer::new(FillStrategy::Median);
        assert_eq!(imp.fill(&x).unwrap(), x);
    }

    #[test]
    fn test_knn_fill_uses_neighbours() {
        let x = array![[0.0, 0.0], [0.1, 1.0], [10.0, 100.0], [0.05, f64::NAN]];
        let mut imp = KNNImputer::new(2);
        let filled = imp.fill(&x).unwrap();
        assert!((filled[[3, 1]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_transform_before_fill_fails() {
        let imp = KNNImputer::new(3);
        assert!(imp.transform(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
