//! Typed method identifiers, one enum per stage

use crate::error::{AutoMLError, Result};
use crate::stages::{Stage, TaskType};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Which task a method can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskSupport {
    Any,
    Classification,
    Regression,
}

impl TaskSupport {
    pub fn supports(&self, task: TaskType) -> bool {
        match self {
            TaskSupport::Any => true,
            TaskSupport::Classification => task == TaskType::Classification,
            TaskSupport::Regression => task == TaskType::Regression,
        }
    }
}

/// Identity of a stage method
///
/// Variants are declared in their canonical order; `Ord` follows it.
pub trait StageMethod:
    Copy + Eq + Ord + Hash + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static
{
    /// Stage this method belongs to
    const STAGE: Stage;

    /// Every variant, in canonical order
    const ALL: &'static [Self];

    /// Canonical method name
    fn as_str(&self) -> &'static str;

    fn task_support(&self) -> TaskSupport {
        TaskSupport::Any
    }

    /// Training cost grows quadratically with the data; pruned on large data
    fn quadratic_cost(&self) -> bool {
        false
    }

    /// The `no_processing` variant of an optional stage
    fn pass_through() -> Option<Self> {
        None
    }

    /// All canonical names
    fn names() -> Vec<String> {
        Self::ALL.iter().map(|m| m.as_str().to_string()).collect()
    }

    /// Parse a canonical name
    fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| AutoMLError::UnknownMethod {
                stage: Self::STAGE.to_string(),
                value: name.to_string(),
                valid: Self::names(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EncoderMethod {
    DataEncoding,
}

impl StageMethod for EncoderMethod {
    const STAGE: Stage = Stage::Encoder;
    const ALL: &'static [Self] = &[EncoderMethod::DataEncoding];

    fn as_str(&self) -> &'static str {
        match self {
            EncoderMethod::DataEncoding => "DataEncoding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImputerMethod {
    #[serde(rename = "no_processing")]
    NoProcessing,
    SimpleImputer,
    KNNImputer,
}

impl StageMethod for ImputerMethod {
    const STAGE: Stage = Stage::Imputer;
    const ALL: &'static [Self] = &[
        ImputerMethod::NoProcessing,
        ImputerMethod::SimpleImputer,
        ImputerMethod::KNNImputer,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ImputerMethod::NoProcessing => "no_processing",
            ImputerMethod::SimpleImputer => "SimpleImputer",
            ImputerMethod::KNNImputer => "KNNImputer",
        }
    }

    fn pass_through() -> Option<Self> {
        Some(ImputerMethod::NoProcessing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BalancerMethod {
    #[serde(rename = "no_processing")]
    NoProcessing,
    SimpleRandomOverSampling,
    SimpleRandomUnderSampling,
    Smote,
}

impl StageMethod for BalancerMethod {
    const STAGE: Stage = Stage::Balancer;
    const ALL: &'static [Self] = &[
        BalancerMethod::NoProcessing,
        BalancerMethod::SimpleRandomOverSampling,
        BalancerMethod::SimpleRandomUnderSampling,
        BalancerMethod::Smote,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            BalancerMethod::NoProcessing => "no_processing",
            BalancerMethod::SimpleRandomOverSampling => "SimpleRandomOverSampling",
            BalancerMethod::SimpleRandomUnderSampling => "SimpleRandomUnderSampling",
            BalancerMethod::Smote => "Smote",
        }
    }

    fn task_support(&self) -> TaskSupport {
        match self {
            BalancerMethod::NoProcessing => TaskSupport::Any,
            _ => TaskSupport::Classification,
        }
    }

    fn pass_through() -> Option<Self> {
        Some(BalancerMethod::NoProcessing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalerMethod {
    #[serde(rename = "no_processing")]
    NoProcessing,
    MinMaxScale,
    Standardize,
    Normalize,
    RobustScale,
}

impl StageMethod for ScalerMethod {
    const STAGE: Stage = Stage::Scaler;
    const ALL: &'static [Self] = &[
        ScalerMethod::NoProcessing,
        ScalerMethod::MinMaxScale,
        ScalerMethod::Standardize,
        ScalerMethod::Normalize,
        ScalerMethod::RobustScale,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ScalerMethod::NoProcessing => "no_processing",
            ScalerMethod::MinMaxScale => "MinMaxScale",
            ScalerMethod::Standardize => "Standardize",
            ScalerMethod::Normalize => "Normalize",
            ScalerMethod::RobustScale => "RobustScale",
        }
    }

    fn pass_through() -> Option<Self> {
        Some(ScalerMethod::NoProcessing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SelectorMethod {
    #[serde(rename = "no_processing")]
    NoProcessing,
    FeatureFilter,
    #[serde(rename = "select_percentile_classification")]
    SelectPercentileClassification,
    #[serde(rename = "select_percentile_regression")]
    SelectPercentileRegression,
    #[serde(rename = "liblinear_svc_preprocessor")]
    LibLinearSvcPreprocessor,
}

impl StageMethod for SelectorMethod {
    const STAGE: Stage = Stage::FeatureSelector;
    const ALL: &'static [Self] = &[
        SelectorMethod::NoProcessing,
        SelectorMethod::FeatureFilter,
        SelectorMethod::SelectPercentileClassification,
        SelectorMethod::SelectPercentileRegression,
        SelectorMethod::LibLinearSvcPreprocessor,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            SelectorMethod::NoProcessing => "no_processing",
            SelectorMethod::FeatureFilter => "FeatureFilter",
            SelectorMethod::SelectPercentileClassification => "select_percentile_classification",
            SelectorMethod::SelectPercentileRegression => "select_percentile_regression",
            SelectorMethod::LibLinearSvcPreprocessor => "liblinear_svc_preprocessor",
        }
    }

    fn task_support(&self) -> TaskSupport {
        match self {
            SelectorMethod::SelectPercentileClassification
            | SelectorMethod::LibLinearSvcPreprocessor => TaskSupport::Classification,
            SelectorMethod::SelectPercentileRegression => TaskSupport::Regression,
            _ => TaskSupport::Any,
        }
    }

    fn quadratic_cost(&self) -> bool {
        matches!(self, SelectorMethod::LibLinearSvcPreprocessor)
    }

    fn pass_through() -> Option<Self> {
        Some(SelectorMethod::NoProcessing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelMethod {
    LogisticRegression,
    GaussianNB,
    KNearestNeighborsClassifier,
    #[serde(rename = "LibLinear_SVC")]
    LibLinearSVC,
    LinearRegression,
    RidgeRegression,
    KNearestNeighborsRegressor,
    #[serde(rename = "LibLinear_SVR")]
    LibLinearSVR,
}

impl StageMethod for ModelMethod {
    const STAGE: Stage = Stage::Model;
    const ALL: &'static [Self] = &[
        ModelMethod::LogisticRegression,
        ModelMethod::GaussianNB,
        ModelMethod::KNearestNeighborsClassifier,
        ModelMethod::LibLinearSVC,
        ModelMethod::LinearRegression,
        ModelMethod::RidgeRegression,
        ModelMethod::KNearestNeighborsRegressor,
        ModelMethod::LibLinearSVR,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ModelMethod::LogisticRegression => "LogisticRegression",
            ModelMethod::GaussianNB => "GaussianNB",
            ModelMethod::KNearestNeighborsClassifier => "KNearestNeighborsClassifier",
            ModelMethod::LibLinearSVC => "LibLinear_SVC",
            ModelMethod::LinearRegression => "LinearRegression",
            ModelMethod::RidgeRegression => "RidgeRegression",
            ModelMethod::KNearestNeighborsRegressor => "KNearestNeighborsRegressor",
            ModelMethod::LibLinearSVR => "LibLinear_SVR",
        }
    }

    fn task_support(&self) -> TaskSupport {
        match self {
            ModelMethod::LogisticRegression
            | ModelMethod::GaussianNB
            | ModelMethod::KNearestNeighborsClassifier
            | ModelMethod::LibLinearSVC => TaskSupport::Classification,
            _ => TaskSupport::Regression,
        }
    }

    fn quadratic_cost(&self) -> bool {
        matches!(self, ModelMethod::LibLinearSVC | ModelMethod::LibLinearSVR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for m in ModelMethod::ALL {
            assert_eq!(ModelMethod::parse(m.as_str()).unwrap(), *m);
        }
        for m in SelectorMethod::ALL {
            assert_eq!(SelectorMethod::parse(m.as_str()).unwrap(), *m);
        }
    }

    #[test]
    fn test_serde_names_match_canonical_names() {
        for m in ModelMethod::ALL {
            let json = serde_json::to_value(m).unwrap();
            assert_eq!(json, serde_json::Value::String(m.as_str().to_string()));
        }
        for m in ScalerMethod::ALL {
            let json = serde_json::to_value(m).unwrap();
            assert_eq!(json, serde_json::Value::String(m.as_str().to_string()));
        }
    }

    #[test]
    fn test_parse_unknown_lists_valid() {
        match ScalerMethod::parse("Winsorize") {
            Err(AutoMLError::UnknownMethod { stage, valid, .. }) => {
                assert_eq!(stage, "scaler");
                assert_eq!(valid.len(), ScalerMethod::ALL.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_task_support() {
        assert!(ModelMethod::GaussianNB.task_support().supports(TaskType::Classification));
        assert!(!ModelMethod::GaussianNB.task_support().supports(TaskType::Regression));
        assert!(SelectorMethod::FeatureFilter.task_support().supports(TaskType::Regression));
    }
}
