//! K-Nearest Neighbors estimators

use super::{ensure_complete, labels_from_proba, n_classes};
use crate::error::{AutoMLError, Result};
use crate::space::Hyperparameters;
use crate::stages::{
    class_labels, ensure_rows, ensure_width, snapshot_of, FromParams, Model, StageComponent,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Neighbour weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborWeights {
    Uniform,
    Distance,
}

impl NeighborWeights {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "uniform" => Ok(NeighborWeights::Uniform),
            "distance" => Ok(NeighborWeights::Distance),
            other => Err(AutoMLError::InvalidParameter {
                name: "weights".to_string(),
                value: other.to_string(),
                reason: "expected uniform or distance".to_string(),
            }),
        }
    }

    fn weight(&self, dist: f64) -> f64 {
        match self {
            NeighborWeights::Uniform => 1.0,
            NeighborWeights::Distance => 1.0 / (dist + 1e-10),
        }
    }
}

/// Shared neighbour search state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NeighborIndex {
    n_neighbors: usize,
    weights: NeighborWeights,
    /// Minkowski exponent: 1 = manhattan, 2 = euclidean
    p: i64,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

/// Distance paired with the neighbour's target
#[derive(Debug, Clone, Copy)]
struct DistLabel(f64, f64);

impl PartialEq for DistLabel {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl NeighborIndex {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        let p = params.int("p", 2)?;
        if p < 1 {
            return Err(AutoMLError::InvalidParameter {
                name: "p".to_string(),
                value: p.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            n_neighbors: params.usize("n_neighbors", 5)?.max(1),
            weights: NeighborWeights::parse(&params.string("weights", "uniform")?)?,
            p,
            x_train: None,
            y_train: None,
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ensure_rows(x, y)?;
        ensure_complete(x)?;
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }

    fn distance(&self, a: &[f64], b: ndarray::ArrayView1<f64>) -> f64 {
        let p = self.p as f64;
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p)
    }

    /// (distance, target) of the k nearest training rows, for each query row
    fn query(&self, x: &Array2<f64>, name: &str) -> Result<Vec<Vec<(f64, f64)>>> {
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(AutoMLError::NotFitted(name.to_string()));
        };
        ensure_width(x, x_train.ncols())?;
        ensure_complete(x)?;
        let k = self.n_neighbors.min(x_train.nrows());

        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                let point = row.to_vec();
                let mut heap = BinaryHeap::with_capacity(k + 1);
                for (i, train_row) in x_train.rows().into_iter().enumerate() {
                    let dist = self.distance(&point, train_row);
                    if heap.len() < k {
                        heap.push(DistLabel(dist, y_train[i]));
                    } else if let Some(top) = heap.peek() {
                        if dist < top.0 {
                            heap.pop();
                            heap.push(DistLabel(dist, y_train[i]));
                        }
                    }
                }
                heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
            })
            .collect())
    }
}

/// `KNearestNeighborsClassifier`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighborsClassifier {
    index: NeighborIndex,
    n_classes: usize,
}

impl FromParams for KNearestNeighborsClassifier {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self {
            index: NeighborIndex::from_params(params)?,
            n_classes: 0,
        })
    }
}

impl StageComponent for KNearestNeighborsClassifier {
    fn is_fitted(&self) -> bool {
        self.index.is_fitted()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for KNearestNeighborsClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.n_classes = n_classes(&class_labels(y)?);
        self.index.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(labels_from_proba(&self.predict_proba(x)?))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let neighbors = self.index.query(x, "KNearestNeighborsClassifier")?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes.max(1)));
        for (i, row) in neighbors.iter().enumerate() {
            let mut total = 0.0;
            for &(dist, label) in row {
                let w = self.index.weights.weight(dist);
                proba[[i, label as usize]] += w;
                total += w;
            }
            if total > 0.0 {
                proba.row_mut(i).mapv_inplace(|v| v / total);
            }
        }
        Ok(proba)
    }

    fn supports_proba(&self) -> bool {
        true
    }
}

/// `KNearestNeighborsRegressor`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighborsRegressor {
    index: NeighborIndex,
}

impl FromParams for KNearestNeighborsRegressor {
    fn from_params(params: &Hyperparameters) -> Result<Self> {
        Ok(Self {
            index: NeighborIndex::from_params(params)?,
        })
    }
}

impl StageComponent for KNearestNeighborsRegressor {
    fn is_fitted(&self) -> bool {
        self.index.is_fitted()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        snapshot_of(self)
    }
}

impl Model for KNearestNeighborsRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.index.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let neighbors = self.index.query(x, "KNearestNeighborsRegressor")?;
        Ok(neighbors
            .iter()
            .map(|row| {
                let (sum, total) = row.iter().fold((0.0, 0.0), |(s, t), &(dist, y)| {
                    let w = self.index.weights.weight(dist);
                    (s + w * y, t + w)
                });
                if total > 0.0 {
                    sum / total
                } else {
                    0.0
                }
            })
            .collect())
    }
}
