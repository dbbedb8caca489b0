//! Config points and their flat wire form
//!
//! A [`ConfigPoint`] is the structured result of sampling: one
//! [`StageChoice`] per stage. [`FlatConfig`] is the string-keyed form used
//! for checkpoints and interop, where each stage is a map holding exactly
//! one `<stage>_<index>` key naming the method plus `<method>_<param>`
//! hyperparameters.

use super::params::{Hyperparameters, ParameterValue};
use crate::error::{AutoMLError, Result};
use crate::registry::{
    BalancerMethod, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod, SelectorMethod,
    StageMethod,
};
use crate::stages::{Stage, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chosen method of one stage plus its own hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageChoice<M> {
    /// Position of the choice in its stage space
    pub index: usize,
    pub method: M,
    pub params: Hyperparameters,
}

impl<M: StageMethod> StageChoice<M> {
    pub fn new(index: usize, method: M, params: Hyperparameters) -> Self {
        Self {
            index,
            method,
            params,
        }
    }

    fn flatten(&self) -> BTreeMap<String, ParameterValue> {
        let mut out = BTreeMap::new();
        out.insert(
            format!("{}_{}", M::STAGE, self.index),
            ParameterValue::String(self.method.as_str().to_string()),
        );
        for (name, value) in self.params.iter() {
            out.insert(format!("{}_{}", self.method.as_str(), name), value.clone());
        }
        out
    }

    fn unflatten(entries: &BTreeMap<String, ParameterValue>) -> Result<Self> {
        let stage = M::STAGE;
        let prefix = format!("{}_", stage);
        let method_keys: Vec<(&String, usize)> = entries
            .keys()
            .filter_map(|key| {
                let digits = key.strip_prefix(&prefix)?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse::<usize>().ok().map(|index| (key, index))
            })
            .collect();

        let (method_key, index) = match method_keys.as_slice() {
            [single] => *single,
            [] => {
                return Err(AutoMLError::MalformedConfig {
                    stage: stage.to_string(),
                    reason: format!("no '{}<index>' key names the method", prefix),
                })
            }
            several => {
                return Err(AutoMLError::MalformedConfig {
                    stage: stage.to_string(),
                    reason: format!(
                        "{} method keys found: {}",
                        several.len(),
                        several
                            .iter()
                            .map(|(k, _)| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                })
            }
        };

        let name = match &entries[method_key] {
            ParameterValue::String(name) => name.clone(),
            other => other.to_string(),
        };
        let method = M::parse(&name)?;

        let param_prefix = format!("{}_", method.as_str());
        let params = entries
            .iter()
            .filter(|(key, _)| *key != method_key)
            .map(|(key, value)| {
                let name = key.strip_prefix(&param_prefix).unwrap_or(key);
                (name.to_string(), value.clone())
            })
            .collect();

        Ok(Self {
            index,
            method,
            params,
        })
    }
}

/// One fully resolved pipeline configuration
///
/// Serializes through its flat wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FlatConfig", try_from = "FlatConfig")]
pub struct ConfigPoint {
    pub task_type: TaskType,
    pub encoder: StageChoice<EncoderMethod>,
    pub imputer: StageChoice<ImputerMethod>,
    pub balancer: StageChoice<BalancerMethod>,
    pub scaler: StageChoice<ScalerMethod>,
    pub feature_selector: StageChoice<SelectorMethod>,
    pub model: StageChoice<ModelMethod>,
}

impl ConfigPoint {
    /// Method name per stage, in pipeline order
    pub fn methods(&self) -> [(Stage, &'static str); 6] {
        [
            (Stage::Encoder, self.encoder.method.as_str()),
            (Stage::Imputer, self.imputer.method.as_str()),
            (Stage::Balancer, self.balancer.method.as_str()),
            (Stage::Scaler, self.scaler.method.as_str()),
            (Stage::FeatureSelector, self.feature_selector.method.as_str()),
            (Stage::Model, self.model.method.as_str()),
        ]
    }

    /// `DataEncoding > no_processing > ... > GaussianNB`
    pub fn summary(&self) -> String {
        self.methods()
            .iter()
            .map(|(_, m)| *m)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// String-keyed wire form of a [`ConfigPoint`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatConfig {
    pub task_type: String,
    #[serde(flatten)]
    pub stages: BTreeMap<String, BTreeMap<String, ParameterValue>>,
}

impl FlatConfig {
    pub fn stage(&self, stage: Stage) -> Option<&BTreeMap<String, ParameterValue>> {
        self.stages.get(stage.as_str())
    }

    fn require(&self, stage: Stage) -> Result<&BTreeMap<String, ParameterValue>> {
        self.stage(stage).ok_or_else(|| AutoMLError::MalformedConfig {
            stage: stage.to_string(),
            reason: "stage is missing from the config".to_string(),
        })
    }
}

/// Structured point to its flat wire form
pub fn decode(point: &ConfigPoint) -> FlatConfig {
    let mut stages = BTreeMap::new();
    stages.insert(Stage::Encoder.to_string(), point.encoder.flatten());
    stages.insert(Stage::Imputer.to_string(), point.imputer.flatten());
    stages.insert(Stage::Balancer.to_string(), point.balancer.flatten());
    stages.insert(Stage::Scaler.to_string(), point.scaler.flatten());
    stages.insert(Stage::FeatureSelector.to_string(), point.feature_selector.flatten());
    stages.insert(Stage::Model.to_string(), point.model.flatten());
    FlatConfig {
        task_type: point.task_type.tag(),
        stages,
    }
}

/// Flat wire form to a structured point.
///
/// Keys already stripped of their method prefix are kept as they are, so
/// encoding is idempotent.
pub fn encode(flat: &FlatConfig) -> Result<ConfigPoint> {
    Ok(ConfigPoint {
        task_type: TaskType::parse(&flat.task_type)?,
        encoder: StageChoice::unflatten(flat.require(Stage::Encoder)?)?,
        imputer: StageChoice::unflatten(flat.require(Stage::Imputer)?)?,
        balancer: StageChoice::unflatten(flat.require(Stage::Balancer)?)?,
        scaler: StageChoice::unflatten(flat.require(Stage::Scaler)?)?,
        feature_selector: StageChoice::unflatten(flat.require(Stage::FeatureSelector)?)?,
        model: StageChoice::unflatten(flat.require(Stage::Model)?)?,
    })
}

impl From<ConfigPoint> for FlatConfig {
    fn from(point: ConfigPoint) -> Self {
        decode(&point)
    }
}

impl TryFrom<FlatConfig> for ConfigPoint {
    type Error = AutoMLError;

    fn try_from(flat: FlatConfig) -> Result<Self> {
        encode(&flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_flat() -> FlatConfig {
        serde_json::from_value(json!({
            "task_type": "tabular_classification",
            "encoder": {"encoder_0": "DataEncoding", "DataEncoding_dummy_coding": false},
            "imputer": {"imputer_0": "no_processing"},
            "balancer": {"balancer_3": "Smote", "Smote_k": 4, "Smote_imbalance_threshold": 0.9},
            "scaler": {"scaler_1": "Standardize"},
            "feature_selector": {"feature_selector_0": "no_processing"},
            "model": {"model_1": "GaussianNB", "GaussianNB_var_smoothing": 1e-9}
        }))
        .unwrap()
    }

    #[test]
    fn test_encode_strips_prefixes() {
        let point = encode(&sample_flat()).unwrap();
        assert_eq!(point.task_type, TaskType::Classification);
        assert_eq!(point.balancer.method, BalancerMethod::Smote);
        assert_eq!(point.balancer.index, 3);
        assert_eq!(point.balancer.params.int("k", 0).unwrap(), 4);
        assert_eq!(point.model.method, ModelMethod::GaussianNB);
        assert!(point.model.params.get("var_smoothing").is_some());
        assert!(point.scaler.params.is_empty());
    }

    #[test]
    fn test_encode_is_idempotent() {
        let once = encode(&sample_flat()).unwrap();
        let twice = encode(&decode(&once)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(decode(&once), decode(&twice));
    }

    #[test]
    fn test_already_stripped_keys_survive() {
        let mut flat = sample_flat();
        flat.stages.insert(
            "model".to_string(),
            BTreeMap::from([
                ("model_1".to_string(), ParameterValue::from("GaussianNB")),
                ("var_smoothing".to_string(), ParameterValue::from(1e-8)),
            ]),
        );
        let point = encode(&flat).unwrap();
        assert_eq!(point.model.params.float("var_smoothing", 0.0).unwrap(), 1e-8);
    }

    #[test]
    fn test_missing_method_key_is_malformed() {
        let mut flat = sample_flat();
        flat.stages.insert(
            "scaler".to_string(),
            BTreeMap::from([("Standardize_with_mean".to_string(), ParameterValue::from(true))]),
        );
        match encode(&flat) {
            Err(AutoMLError::MalformedConfig { stage, .. }) => assert_eq!(stage, "scaler"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_two_method_keys_are_malformed() {
        let mut flat = sample_flat();
        if let Some(scaler) = flat.stages.get_mut("scaler") {
            scaler.insert("scaler_2".to_string(), ParameterValue::from("MinMaxScale"));
        }
        assert!(matches!(
            encode(&flat),
            Err(AutoMLError::MalformedConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_method_name() {
        let mut flat = sample_flat();
        if let Some(model) = flat.stages.get_mut("model") {
            model.insert("model_1".to_string(), ParameterValue::from("XGBoost"));
        }
        match encode(&flat) {
            Err(AutoMLError::UnknownMethod { value, valid, .. }) => {
                assert_eq!(value, "XGBoost");
                assert!(valid.contains(&"GaussianNB".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_point_serializes_flat() {
        let point = encode(&sample_flat()).unwrap();
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["model"]["model_1"], "GaussianNB");
        let back: ConfigPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }
}
