//! Trial records, search results and the resumable run log

use super::stopper::StopReason;
use crate::error::Result;
use crate::pipeline::{read_json, write_json_atomic};
use crate::space::ConfigPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// File name of the run log inside the run directory
pub const CHECKPOINT_FILE: &str = "search_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Pending,
    Fitted,
    Failed,
    Timeout,
}

/// Outcome of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub config: ConfigPoint,
    pub loss: Option<f64>,
    pub status: TrialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration: Duration,
    /// Flagged by the scheduler; the loss still counts
    #[serde(default)]
    pub stopped_early: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl TrialRecord {
    pub fn pending(trial_id: usize, config: ConfigPoint) -> Self {
        Self {
            trial_id,
            config,
            loss: None,
            status: TrialStatus::Pending,
            error: None,
            duration: Duration::ZERO,
            stopped_early: false,
            artifact: None,
        }
    }

    /// Fitted with a finite loss
    pub fn is_ranked(&self) -> bool {
        self.status == TrialStatus::Fitted && self.loss.map_or(false, f64::is_finite)
    }
}

/// Everything a finished search produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<TrialRecord>,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl SearchResult {
    /// Fitted trials ordered by loss, ties broken by trial id
    pub fn ranking(&self) -> Vec<&TrialRecord> {
        let mut ranked: Vec<&TrialRecord> = self.records.iter().filter(|r| r.is_ranked()).collect();
        ranked.sort_by(|a, b| {
            let la = a.loss.unwrap_or(f64::INFINITY);
            let lb = b.loss.unwrap_or(f64::INFINITY);
            la.total_cmp(&lb).then(a.trial_id.cmp(&b.trial_id))
        });
        ranked
    }

    pub fn best_trial(&self) -> Option<&TrialRecord> {
        self.ranking().into_iter().next()
    }

    pub fn top_k(&self, k: usize) -> Vec<&TrialRecord> {
        self.ranking().into_iter().take(k).collect()
    }

    pub fn failures(&self) -> Vec<&TrialRecord> {
        self.records
            .iter()
            .filter(|r| r.status == TrialStatus::Failed)
            .collect()
    }

    pub fn n_fitted(&self) -> usize {
        self.records.iter().filter(|r| r.is_ranked()).count()
    }

    pub fn record(&self, trial_id: usize) -> Option<&TrialRecord> {
        self.records.iter().find(|r| r.trial_id == trial_id)
    }
}

/// Saved proposer state, tagged with the algorithm that wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmState {
    pub algorithm: String,
    pub state: serde_json::Value,
}

/// On-disk run log written after every batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCheckpoint {
    pub run_id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub next_trial_id: usize,
    pub records: Vec<TrialRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmState>,
}

impl SearchCheckpoint {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CHECKPOINT_FILE)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path(dir);
        write_json_atomic(&path, self)?;
        Ok(path)
    }

    /// `Ok(None)` when no log exists yet
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{encode, FlatConfig};

    fn config() -> ConfigPoint {
        let flat: FlatConfig = serde_json::from_value(serde_json::json!({
            "task_type": "tabular_regression",
            "encoder": {"encoder_0": "DataEncoding"},
            "imputer": {"imputer_0": "no_processing"},
            "balancer": {"balancer_0": "no_processing"},
            "scaler": {"scaler_0": "no_processing"},
            "feature_selector": {"feature_selector_0": "no_processing"},
            "model": {"model_0": "LinearRegression"}
        }))
        .unwrap();
        encode(&flat).unwrap()
    }

    fn fitted(trial_id: usize, loss: f64) -> TrialRecord {
        TrialRecord {
            loss: Some(loss),
            status: TrialStatus::Fitted,
            ..TrialRecord::pending(trial_id, config())
        }
    }

    fn result(records: Vec<TrialRecord>) -> SearchResult {
        SearchResult {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            records,
            stop_reason: StopReason::TrialBudget,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_ranking_breaks_ties_by_trial_id() {
        let mut failed = TrialRecord::pending(0, config());
        failed.status = TrialStatus::Failed;
        let r = result(vec![failed, fitted(3, 0.5), fitted(1, 0.5), fitted(2, 0.1)]);
        let ids: Vec<usize> = r.ranking().iter().map(|t| t.trial_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(r.best_trial().unwrap().trial_id, 2);
        assert_eq!(r.top_k(2).len(), 2);
        assert_eq!(r.failures().len(), 1);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SearchCheckpoint::load(dir.path()).unwrap().is_none());
        let checkpoint = SearchCheckpoint {
            run_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            next_trial_id: 2,
            records: vec![fitted(0, 1.0), fitted(1, 2.0)],
            algorithm: Some(AlgorithmState {
                algorithm: "random".to_string(),
                state: serde_json::json!({"rng": [1, 2, 3, 4]}),
            }),
        };
        checkpoint.save(dir.path()).unwrap();
        let loaded = SearchCheckpoint::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.next_trial_id, 2);
        assert_eq!(loaded.records, checkpoint.records);
        assert_eq!(loaded.algorithm, checkpoint.algorithm);
    }
}
