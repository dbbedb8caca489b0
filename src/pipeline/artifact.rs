//! Persisted trial artifacts
//!
//! A trial's fitted pipeline is written as one JSON bundle under
//! `<root>/trial_<id>/pipeline.json`.

use super::Pipeline;
use crate::error::{AutoMLError, Result};
use crate::registry::{
    BalancerMethod, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod, SelectorMethod,
};
use crate::space::{ConfigPoint, Hyperparameters, StageChoice};
use crate::stages::StageComponent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const BUNDLE_FILE: &str = "pipeline.json";

/// Fitted state of one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact<M> {
    pub method: M,
    pub params: Hyperparameters,
    pub state: serde_json::Value,
}

impl<M: Copy> StageArtifact<M> {
    fn capture<C>(choice: &StageChoice<M>, component: Option<&C>, stage: &str) -> Result<Self>
    where
        C: StageComponent + ?Sized,
    {
        let component = component.ok_or_else(|| {
            AutoMLError::NotFitted(format!("pipeline has an empty {} slot", stage))
        })?;
        Ok(Self {
            method: choice.method,
            params: choice.params.clone(),
            state: component.snapshot()?,
        })
    }
}

/// Six fitted slots of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineBundle {
    pub trial_id: usize,
    pub created_at: DateTime<Utc>,
    pub loss: Option<f64>,
    /// Data and scoring setup the loss was measured under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub config: ConfigPoint,
    pub encoder: StageArtifact<EncoderMethod>,
    pub imputer: StageArtifact<ImputerMethod>,
    pub balancer: StageArtifact<BalancerMethod>,
    pub scaler: StageArtifact<ScalerMethod>,
    pub feature_selector: StageArtifact<SelectorMethod>,
    pub model: StageArtifact<ModelMethod>,
}

impl PipelineBundle {
    /// Snapshot a fitted pipeline built from `config`
    pub fn capture(
        trial_id: usize,
        config: &ConfigPoint,
        pipeline: &Pipeline,
        loss: Option<f64>,
    ) -> Result<Self> {
        if !pipeline.is_fitted() {
            return Err(AutoMLError::NotFitted("Pipeline".to_string()));
        }
        Ok(Self {
            trial_id,
            created_at: Utc::now(),
            loss,
            fingerprint: None,
            config: config.clone(),
            encoder: StageArtifact::capture(&config.encoder, pipeline.encoder(), "encoder")?,
            imputer: StageArtifact::capture(&config.imputer, pipeline.imputer(), "imputer")?,
            balancer: StageArtifact::capture(&config.balancer, pipeline.balancer(), "balancer")?,
            scaler: StageArtifact::capture(&config.scaler, pipeline.scaler(), "scaler")?,
            feature_selector: StageArtifact::capture(
                &config.feature_selector,
                pipeline.feature_selector(),
                "feature_selector",
            )?,
            model: StageArtifact::capture(&config.model, pipeline.model(), "model")?,
        })
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }
}

/// Per-run directory of trial bundles
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a run directory, creating it if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trial_dir(&self, trial_id: usize) -> PathBuf {
        self.root.join(format!("trial_{}", trial_id))
    }

    pub fn bundle_path(&self, trial_id: usize) -> PathBuf {
        self.trial_dir(trial_id).join(BUNDLE_FILE)
    }

    pub fn exists(&self, trial_id: usize) -> bool {
        self.bundle_path(trial_id).is_file()
    }

    /// Write the bundle; readers never observe a partial file
    pub fn save(&self, bundle: &PipelineBundle) -> Result<PathBuf> {
        let dir = self.trial_dir(bundle.trial_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(BUNDLE_FILE);
        write_json_atomic(&path, bundle)?;
        debug!(trial_id = bundle.trial_id, path = %path.display(), "saved pipeline bundle");
        Ok(path)
    }

    pub fn load(&self, trial_id: usize) -> Result<PipelineBundle> {
        let path = self.bundle_path(trial_id);
        if !path.is_file() {
            return Err(AutoMLError::DataError(format!(
                "no artifact for trial {} at {}",
                trial_id,
                path.display()
            )));
        }
        read_json(&path)
    }

    pub fn remove(&self, trial_id: usize) -> Result<()> {
        let dir = self.trial_dir(trial_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Serialize to a sibling temp file, then rename over `path`
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| AutoMLError::SerializationError(format!("Failed to write {}: {}", path.display(), e)))?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AutoMLError::SerializationError(format!("Failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registries;
    use crate::space::encode;
    use crate::space::FlatConfig;
    use ndarray::Array1;
    use polars::prelude::*;

    fn config() -> ConfigPoint {
        let flat: FlatConfig = serde_json::from_value(serde_json::json!({
            "task_type": "classification",
            "encoder": {"encoder_0": "DataEncoding"},
            "imputer": {"imputer_0": "no_processing"},
            "balancer": {"balancer_0": "no_processing"},
            "scaler": {"scaler_0": "MinMaxScale"},
            "feature_selector": {"feature_selector_0": "no_processing"},
            "model": {"model_0": "GaussianNB"}
        }))
        .unwrap();
        encode(&flat).unwrap()
    }

    fn data() -> (DataFrame, Array1<f64>) {
        let df = DataFrame::new(vec![
            Column::new("x".into(), &[0.0, 0.2, 0.1, 3.0, 3.1, 2.9]),
            Column::new("c".into(), &["a", "a", "b", "b", "c", "c"]),
        ])
        .unwrap();
        (df, Array1::from(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]))
    }

    #[test]
    fn test_bundle_save_load_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("run")).unwrap();
        let registries = Registries::default();
        let point = config();
        let (x, y) = data();

        let mut pipeline = registries.instantiate(&point).unwrap();
        pipeline.fit(&x, &y).unwrap();
        let bundle = PipelineBundle::capture(7, &point, &pipeline, Some(-1.0))
            .unwrap()
            .with_fingerprint("6x2");
        let path = store.save(&bundle).unwrap();
        assert!(path.ends_with("trial_7/pipeline.json"));
        assert!(store.exists(7));

        let loaded = store.load(7).unwrap();
        assert_eq!(loaded.config, point);
        assert_eq!(loaded.fingerprint.as_deref(), Some("6x2"));
        let restored = registries.restore_pipeline(&loaded).unwrap();
        assert!(restored.is_fitted());
        assert_eq!(restored.predict(&x).unwrap(), pipeline.predict(&x).unwrap());

        store.remove(7).unwrap();
        assert!(!store.exists(7));
        assert!(store.load(7).is_err());
    }

    #[test]
    fn test_capture_requires_fitted_pipeline() {
        let registries = Registries::default();
        let point = config();
        let pipeline = registries.instantiate(&point).unwrap();
        assert!(PipelineBundle::capture(0, &point, &pipeline, None).is_err());
    }
}
