//! Hyperparameter templates of the built-in methods

use super::params::{Parameter, ParameterValue};
use crate::registry::{
    BalancerMethod, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod, SelectorMethod,
    StageMethod,
};
use serde::{Deserialize, Serialize};

/// Tunable domains of one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterTemplate<M> {
    pub method: M,
    pub params: Vec<Parameter>,
}

impl<M: StageMethod> HyperparameterTemplate<M> {
    pub fn new(method: M, params: Vec<Parameter>) -> Self {
        Self { method, params }
    }

    /// A method with nothing to tune
    pub fn empty(method: M) -> Self {
        Self::new(method, Vec::new())
    }

    /// Parameters renamed `<method>_<param>`
    pub fn namespaced(&self) -> Vec<Parameter> {
        self.params
            .iter()
            .map(|p| Parameter {
                name: format!("{}_{}", self.method.as_str(), p.name),
                param_type: p.param_type.clone(),
            })
            .collect()
    }
}

/// Templates for all six stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub encoder: Vec<HyperparameterTemplate<EncoderMethod>>,
    pub imputer: Vec<HyperparameterTemplate<ImputerMethod>>,
    pub balancer: Vec<HyperparameterTemplate<BalancerMethod>>,
    pub scaler: Vec<HyperparameterTemplate<ScalerMethod>>,
    pub feature_selector: Vec<HyperparameterTemplate<SelectorMethod>>,
    pub model: Vec<HyperparameterTemplate<ModelMethod>>,
}

fn imbalance_threshold() -> Parameter {
    Parameter::float("imbalance_threshold", 0.8, 1.0)
}

/// Templates of every built-in method
pub fn default_templates() -> Templates {
    Templates {
        encoder: vec![HyperparameterTemplate::new(
            EncoderMethod::DataEncoding,
            vec![Parameter::boolean("dummy_coding")],
        )],
        imputer: vec![
            HyperparameterTemplate::empty(ImputerMethod::NoProcessing),
            HyperparameterTemplate::new(
                ImputerMethod::SimpleImputer,
                vec![Parameter::categorical("method", vec!["mean", "median", "most_frequent"])],
            ),
            HyperparameterTemplate::new(
                ImputerMethod::KNNImputer,
                vec![Parameter::int("n_neighbors", 1, 15)],
            ),
        ],
        balancer: vec![
            HyperparameterTemplate::empty(BalancerMethod::NoProcessing),
            HyperparameterTemplate::new(
                BalancerMethod::SimpleRandomOverSampling,
                vec![imbalance_threshold()],
            ),
            HyperparameterTemplate::new(
                BalancerMethod::SimpleRandomUnderSampling,
                vec![imbalance_threshold()],
            ),
            HyperparameterTemplate::new(
                BalancerMethod::Smote,
                vec![imbalance_threshold(), Parameter::int("k", 3, 10)],
            ),
        ],
        scaler: vec![
            HyperparameterTemplate::empty(ScalerMethod::NoProcessing),
            HyperparameterTemplate::empty(ScalerMethod::MinMaxScale),
            HyperparameterTemplate::new(
                ScalerMethod::Standardize,
                vec![Parameter::fixed("with_mean", true), Parameter::fixed("with_std", true)],
            ),
            HyperparameterTemplate::empty(ScalerMethod::Normalize),
            HyperparameterTemplate::new(
                ScalerMethod::RobustScale,
                vec![
                    Parameter::float("quantile_lower", 0.05, 0.3),
                    Parameter::float("quantile_upper", 0.7, 0.95),
                ],
            ),
        ],
        feature_selector: vec![
            HyperparameterTemplate::empty(SelectorMethod::NoProcessing),
            HyperparameterTemplate::new(
                SelectorMethod::FeatureFilter,
                vec![Parameter::float("n_prop", 0.3, 1.0)],
            ),
            HyperparameterTemplate::new(
                SelectorMethod::SelectPercentileClassification,
                vec![Parameter::int("percentile", 10, 90)],
            ),
            HyperparameterTemplate::new(
                SelectorMethod::SelectPercentileRegression,
                vec![Parameter::int("percentile", 10, 90)],
            ),
            HyperparameterTemplate::new(
                SelectorMethod::LibLinearSvcPreprocessor,
                vec![
                    Parameter::log_float("C", 0.03125, 32.0),
                    Parameter::choice(
                        "threshold",
                        vec![ParameterValue::Float(0.5), ParameterValue::Float(1.0)],
                    ),
                ],
            ),
        ],
        model: vec![
            HyperparameterTemplate::new(
                ModelMethod::LogisticRegression,
                vec![
                    Parameter::log_float("C", 0.03125, 32.0),
                    Parameter::int("max_iter", 100, 300),
                ],
            ),
            HyperparameterTemplate::new(
                ModelMethod::GaussianNB,
                vec![Parameter::log_float("var_smoothing", 1e-11, 1e-7)],
            ),
            HyperparameterTemplate::new(
                ModelMethod::KNearestNeighborsClassifier,
                vec![
                    Parameter::int("n_neighbors", 1, 30),
                    Parameter::categorical("weights", vec!["uniform", "distance"]),
                    Parameter::int("p", 1, 2),
                ],
            ),
            HyperparameterTemplate::new(
                ModelMethod::LibLinearSVC,
                vec![
                    Parameter::log_float("C", 0.03125, 32.0),
                    Parameter::fixed("max_iter", 200i64),
                ],
            ),
            HyperparameterTemplate::empty(ModelMethod::LinearRegression),
            HyperparameterTemplate::new(
                ModelMethod::RidgeRegression,
                vec![Parameter::log_float("alpha", 1e-3, 10.0)],
            ),
            HyperparameterTemplate::new(
                ModelMethod::KNearestNeighborsRegressor,
                vec![
                    Parameter::int("n_neighbors", 1, 30),
                    Parameter::categorical("weights", vec!["uniform", "distance"]),
                    Parameter::int("p", 1, 2),
                ],
            ),
            HyperparameterTemplate::new(
                ModelMethod::LibLinearSVR,
                vec![
                    Parameter::log_float("C", 0.03125, 32.0),
                    Parameter::float("epsilon", 0.0, 1.0),
                    Parameter::fixed("max_iter", 200i64),
                ],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_names() {
        let template = HyperparameterTemplate::new(
            ModelMethod::LibLinearSVC,
            vec![Parameter::log_float("C", 0.1, 1.0)],
        );
        let names: Vec<String> = template.namespaced().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["LibLinear_SVC_C"]);
    }

    #[test]
    fn test_default_templates_are_valid() {
        let templates = default_templates();
        for t in &templates.model {
            for p in &t.params {
                p.validate().unwrap();
            }
        }
        for t in &templates.feature_selector {
            for p in &t.params {
                p.validate().unwrap();
            }
        }
        assert_eq!(templates.model.len(), ModelMethod::ALL.len());
    }
}
