//! Aggregation of regressor pipelines

use super::{check_weights, EnsembleMember};
use crate::error::{AutoMLError, Result};
use ndarray::Array1;
use polars::prelude::DataFrame;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// User-supplied combiner of one row's member predictions
#[derive(Clone)]
pub enum AggregationFn {
    /// Ignores weights
    Unweighted(Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>),
    /// Receives the member weights alongside the predictions
    Weighted(Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>),
}

impl AggregationFn {
    fn accepts_weights(&self) -> bool {
        matches!(self, AggregationFn::Weighted(_))
    }
}

/// How member predictions are reduced per row
#[derive(Clone, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    Max,
    Min,
    Custom { name: String, func: AggregationFn },
}

impl Aggregation {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Aggregation::Custom {
            name: name.into(),
            func: AggregationFn::Unweighted(Arc::new(func)),
        }
    }

    pub fn custom_weighted<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Aggregation::Custom {
            name: name.into(),
            func: AggregationFn::Weighted(Arc::new(func)),
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "max" => Ok(Aggregation::Max),
            "min" => Ok(Aggregation::Min),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "aggregation".to_string(),
                value: name.to_string(),
                valid: ["mean", "median", "max", "min"].iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Custom { name, .. } => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Aggregation::Custom { .. })
    }

    /// Whether weights change the result
    pub fn uses_weights(&self) -> bool {
        match self {
            Aggregation::Mean => true,
            Aggregation::Custom { func, .. } => func.accepts_weights(),
            _ => false,
        }
    }

    /// Reduce one row of member predictions
    pub fn apply(&self, values: &[f64], weights: Option<&[f64]>) -> f64 {
        match self {
            Aggregation::Mean => match weights {
                Some(w) => {
                    let total: f64 = w.iter().sum();
                    if total == 0.0 {
                        return mean(values);
                    }
                    values.iter().zip(w).map(|(v, w)| v * w).sum::<f64>() / total
                }
                None => mean(values),
            },
            Aggregation::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.is_empty() {
                    f64::NAN
                } else if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Custom { func, .. } => match func {
                AggregationFn::Unweighted(f) => f(values),
                AggregationFn::Weighted(f) => {
                    let ones;
                    let w = match weights {
                        Some(w) => w,
                        None => {
                            ones = vec![1.0; values.len()];
                            &ones
                        }
                    };
                    f(values, w)
                }
            },
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aggregation({})", self.name())
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Regressor pipelines combined by a per-row aggregation
#[derive(Debug)]
pub struct RegressorEnsemble {
    members: Vec<EnsembleMember>,
    aggregation: Aggregation,
    weights: Option<Vec<f64>>,
}

impl RegressorEnsemble {
    pub fn new(
        members: Vec<EnsembleMember>,
        aggregation: Aggregation,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        check_weights(members.len(), weights.as_deref())?;
        if weights.is_some() && !aggregation.uses_weights() {
            warn!(
                aggregation = %aggregation,
                "aggregation does not take weights, ignoring them"
            );
        }
        Ok(Self {
            members,
            aggregation,
            weights,
        })
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub(crate) fn members_mut(&mut self) -> &mut [EnsembleMember] {
        &mut self.members
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        let predictions = self
            .members
            .iter()
            .map(|m| m.pipeline.predict(x))
            .collect::<Result<Vec<_>>>()?;
        aggregate(&predictions, &self.aggregation, self.weights.as_deref())
    }
}

/// Row-wise reduction of member predictions
pub fn aggregate(
    predictions: &[Array1<f64>],
    aggregation: &Aggregation,
    weights: Option<&[f64]>,
) -> Result<Array1<f64>> {
    let n_rows = predictions
        .first()
        .map(|p| p.len())
        .ok_or_else(|| AutoMLError::DataError("no member predictions to combine".to_string()))?;
    if let Some(bad) = predictions.iter().find(|p| p.len() != n_rows) {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} predictions", n_rows),
            actual: format!("{} predictions", bad.len()),
        });
    }
    let weights = weights.filter(|_| aggregation.uses_weights());
    let mut row = vec![0.0; predictions.len()];
    let out = (0..n_rows)
        .map(|i| {
            for (slot, pred) in row.iter_mut().zip(predictions) {
                *slot = pred[i];
            }
            aggregation.apply(&row, weights)
        })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn preds() -> Vec<Array1<f64>> {
        vec![array![1.0, 10.0], array![2.0, 20.0], array![6.0, 30.0]]
    }

    #[test]
    fn test_builtin_aggregations() {
        let p = preds();
        assert_eq!(aggregate(&p, &Aggregation::Mean, None).unwrap(), array![3.0, 20.0]);
        assert_eq!(aggregate(&p, &Aggregation::Median, None).unwrap(), array![2.0, 20.0]);
        assert_eq!(aggregate(&p, &Aggregation::Max, None).unwrap(), array![6.0, 30.0]);
        assert_eq!(aggregate(&p, &Aggregation::Min, None).unwrap(), array![1.0, 10.0]);
    }

    #[test]
    fn test_weighted_mean() {
        let out = aggregate(&preds(), &Aggregation::Mean, Some(&[1.0, 0.0, 1.0])).unwrap();
        assert_eq!(out, array![3.5, 20.0]);
    }

    #[test]
    fn test_median_ignores_weights() {
        let out = aggregate(&preds(), &Aggregation::Median, Some(&[100.0, 0.0, 0.0])).unwrap();
        assert_eq!(out, array![2.0, 20.0]);
    }

    #[test]
    fn test_only_mean_and_weighted_callables_use_weights() {
        assert!(Aggregation::Mean.uses_weights());
        assert!(!Aggregation::Median.uses_weights());
        assert!(!Aggregation::Max.uses_weights());
        assert!(!Aggregation::Min.uses_weights());
        assert!(!Aggregation::custom("first", |v: &[f64]| v[0]).uses_weights());
        assert!(Aggregation::custom_weighted("dot", |v: &[f64], w: &[f64]| {
            v.iter().zip(w).map(|(a, b)| a * b).sum::<f64>()
        })
        .uses_weights());

        let p = preds();
        let skewed = [100.0, 0.0, 0.0];
        for unweighted in [Aggregation::Median, Aggregation::Max, Aggregation::Min] {
            assert_eq!(
                aggregate(&p, &unweighted, Some(&skewed)).unwrap(),
                aggregate(&p, &unweighted, None).unwrap()
            );
        }
    }

    #[test]
    fn test_custom_callables() {
        let first = Aggregation::custom("first", |v: &[f64]| v[0]);
        assert_eq!(aggregate(&preds(), &first, Some(&[0.0, 1.0, 1.0])).unwrap(), array![1.0, 10.0]);

        let weighted = Aggregation::custom_weighted("heaviest", |v: &[f64], w: &[f64]| {
            let mut best = 0;
            for i in 0..w.len() {
                if w[i] > w[best] {
                    best = i;
                }
            }
            v[best]
        });
        let out = aggregate(&preds(), &weighted, Some(&[0.0, 5.0, 1.0])).unwrap();
        assert_eq!(out, array![2.0, 20.0]);
    }
}
