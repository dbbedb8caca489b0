//! Voting over classifier pipelines

use super::{check_weights, EnsembleMember};
use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Voting strategy for classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voting {
    /// Majority vote over predicted labels
    #[default]
    Hard,
    /// Argmax of the averaged class probabilities
    Soft,
}

impl Voting {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hard" => Ok(Voting::Hard),
            "soft" => Ok(Voting::Soft),
            _ => Err(AutoMLError::UnknownMethod {
                stage: "voting".to_string(),
                value: name.to_string(),
                valid: vec!["hard".to_string(), "soft".to_string()],
            }),
        }
    }
}

impl fmt::Display for Voting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Voting::Hard => f.write_str("hard"),
            Voting::Soft => f.write_str("soft"),
        }
    }
}

/// Weighted majority per row; the lowest class wins ties
pub fn hard_vote(predictions: &[Array1<f64>], weights: &[f64]) -> Result<Array1<f64>> {
    let n_rows = rows_of(predictions)?;
    let mut out = Array1::zeros(n_rows);
    for i in 0..n_rows {
        let mut counts: BTreeMap<i64, f64> = BTreeMap::new();
        for (member, (pred, &w)) in predictions.iter().zip(weights).enumerate() {
            let label = pred[i];
            if !label.is_finite() {
                return Err(AutoMLError::DataError(format!(
                    "member {} predicted a non-finite label ({}) at row {}",
                    member, label, i
                )));
            }
            *counts.entry(label.round() as i64).or_insert(0.0) += w;
        }
        let mut winner = None;
        for (&class, &count) in &counts {
            match winner {
                Some((_, best)) if count <= best => {}
                _ => winner = Some((class, count)),
            }
        }
        out[i] = winner.map_or(0.0, |(class, _)| class as f64);
    }
    Ok(out)
}

/// Weighted average of probability matrices, padded to the widest class count
pub fn average_proba(probas: &[Array2<f64>], weights: &[f64]) -> Result<Array2<f64>> {
    let first = probas
        .first()
        .ok_or_else(|| AutoMLError::DataError("no member probabilities to average".to_string()))?;
    let n_rows = first.nrows();
    let width = probas.iter().map(|p| p.ncols()).max().unwrap_or(0);
    let total: f64 = weights.iter().sum();
    let mut out = Array2::<f64>::zeros((n_rows, width));
    for (proba, &w) in probas.iter().zip(weights) {
        if proba.nrows() != n_rows {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} rows", n_rows),
                actual: format!("{} rows", proba.nrows()),
            });
        }
        let mut block = out.slice_mut(ndarray::s![.., ..proba.ncols()]);
        block.scaled_add(w, proba);
    }
    if total > 0.0 {
        out /= total;
    }
    Ok(out)
}

/// Row-wise argmax, first maximum wins
pub fn argmax_rows(proba: &Array2<f64>) -> Array1<f64> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (j, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = j;
                }
            }
            best as f64
        })
        .collect()
}

fn rows_of(predictions: &[Array1<f64>]) -> Result<usize> {
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
    Ok(n_rows)
}

/// Classifier pipelines combined by voting
#[derive(Debug)]
pub struct ClassifierEnsemble {
    members: Vec<EnsembleMember>,
    voting: Voting,
    weights: Option<Vec<f64>>,
}

impl ClassifierEnsemble {
    pub fn new(
        members: Vec<EnsembleMember>,
        voting: Voting,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        check_weights(members.len(), weights.as_deref())?;
        if voting == Voting::Soft {
            if let Some(m) = members.iter().find(|m| !m.pipeline.supports_proba()) {
                return Err(AutoMLError::ConfigError(format!(
                    "soft voting needs probabilities, {} cannot produce them",
                    m.name
                )));
            }
        }
        Ok(Self {
            members,
            voting,
            weights,
        })
    }

    pub fn voting(&self) -> Voting {
        self.voting
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

    fn effective_weights(&self) -> Vec<f64> {
        self.weights
            .clone()
            .unwrap_or_else(|| vec![1.0; self.members.len()])
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        match self.voting {
            Voting::Hard => {
                let predictions = self
                    .members
                    .iter()
                    .map(|m| m.pipeline.predict(x))
                    .collect::<Result<Vec<_>>>()?;
                hard_vote(&predictions, &self.effective_weights())
            }
            Voting::Soft => Ok(argmax_rows(&self.predict_proba(x)?)),
        }
    }

    /// Averaged member probabilities
    pub fn predict_proba(&self, x: &DataFrame) -> Result<Array2<f64>> {
        let probas = self
            .members
            .iter()
            .map(|m| m.pipeline.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;
        average_proba(&probas, &self.effective_weights())
    }
}
