//! Built-in estimators
//!
//! Classifiers expect labels `0..K` and report probabilities with one
//! column per label.

mod knn;
mod linear;
mod naive_bayes;
mod svm;

pub use knn::{KNearestNeighborsClassifier, KNearestNeighborsRegressor, NeighborWeights};
pub use linear::{LinearRegression, LogisticRegression, RidgeRegression};
pub use naive_bayes::GaussianNB;
pub use svm::{LinearSVC, LinearSVR};

use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Reject inputs that still carry missing values
pub(crate) fn ensure_complete(x: &Array2<f64>) -> Result<()> {
    if super::has_missing(x) {
        return Err(AutoMLError::DataError(
            "model input contains missing values".to_string(),
        ));
    }
    Ok(())
}

/// Index of the largest entry; ties resolve to the lowest index
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Predicted labels from a probability matrix
pub(crate) fn labels_from_proba(proba: &Array2<f64>) -> Array1<f64> {
    proba.rows().into_iter().map(|r| argmax(r) as f64).collect()
}

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// decomposition, adding a small ridge when `a` is not positive definite.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>().max(1.0) / n.max(1) as f64;

    for attempt in 0..2 {
        let mut l = Array2::<f64>::zeros((n, n));
        let mut ok = true;
        'outer: for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
                if i == j {
                    let diag = a[[i, i]] + if attempt == 1 { ridge } else { 0.0 } - sum;
                    if diag <= 0.0 {
                        ok = false;
                        break 'outer;
                    }
                    l[[i, j]] = diag.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }
        if !ok {
            continue;
        }

        // forward substitution: L y = b
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
            y[i] = (b[i] - sum) / l[[i, i]];
        }
        // backward substitution: L^T x = y
        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
            x[i] = (y[i] - sum) / l[[i, i]];
        }
        return Some(x);
    }
    None
}

/// Number of classes implied by labels `0..K`
pub(crate) fn n_classes(labels: &[usize]) -> usize {
    labels.iter().copied().max().map(|m| m + 1).unwrap_or(0)
}
