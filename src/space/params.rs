//! Hyperparameter domains and sampled values

use crate::error::{AutoMLError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Domain of a single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter, inclusive bounds
    Int {
        low: i64,
        high: i64,
        log_scale: bool,
    },
    /// Categorical parameter
    Categorical { choices: Vec<ParameterValue> },
    /// Boolean parameter
    Boolean,
    /// Constant value
    Fixed(ParameterValue),
}

/// A single hyperparameter with its domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale integer parameter
    pub fn log_int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create a categorical parameter over string choices
    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices
                    .into_iter()
                    .map(|c| ParameterValue::String(c.to_string()))
                    .collect(),
            },
        }
    }

    /// Create a categorical parameter over arbitrary values
    pub fn choice(name: impl Into<String>, choices: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical { choices },
        }
    }

    /// Create a boolean parameter
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Boolean,
        }
    }

    /// Create a fixed-value parameter
    pub fn fixed(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Fixed(value.into()),
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float {
                low,
                high,
                log_scale,
            } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int {
                low,
                high,
                log_scale,
            } => {
                let val = if *log_scale && *low > 0 {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    ((rng.gen::<f64>() * (log_high - log_low) + log_low).exp() as i64)
                        .clamp(*low, *high)
                } else {
                    rng.gen_range(*low..=*high)
                };
                ParameterValue::Int(val)
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                choices[idx].clone()
            }
            ParameterType::Boolean => ParameterValue::Bool(rng.gen()),
            ParameterType::Fixed(value) => value.clone(),
        }
    }

    /// Deterministic representative value, used by grid enumeration
    pub fn default_value(&self) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float {
                low,
                high,
                log_scale,
            } => {
                if *log_scale {
                    ParameterValue::Float(((low.ln() + high.ln()) / 2.0).exp())
                } else {
                    ParameterValue::Float((low + high) / 2.0)
                }
            }
            ParameterType::Int { low, high, .. } => ParameterValue::Int(low + (high - low) / 2),
            ParameterType::Categorical { choices } => choices[0].clone(),
            ParameterType::Boolean => ParameterValue::Bool(false),
            ParameterType::Fixed(value) => value.clone(),
        }
    }

    /// Check that a domain can be sampled
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| AutoMLError::InvalidParameter {
            name: self.name.clone(),
            value: format!("{:?}", self.param_type),
            reason: reason.to_string(),
        };
        match &self.param_type {
            ParameterType::Float {
                low,
                high,
                log_scale,
            } => {
                if !(low <= high) {
                    return Err(invalid("low bound exceeds high bound"));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(invalid("log-scale bounds must be positive"));
                }
            }
            ParameterType::Int { low, high, .. } => {
                if low > high {
                    return Err(invalid("low bound exceeds high bound"));
                }
            }
            ParameterType::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("categorical domain has no choices"));
                }
            }
            ParameterType::Boolean | ParameterType::Fixed(_) => {}
        }
        Ok(())
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

/// Hyperparameters of one chosen method, with method prefixes stripped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, ParameterValue>);

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    /// Float parameter, or `default` when absent
    pub fn float(&self, name: &str, default: f64) -> Result<f64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_float()
                .ok_or_else(|| Self::type_error(name, value, "expected a number")),
        }
    }

    /// Integer parameter, or `default` when absent
    pub fn int(&self, name: &str, default: i64) -> Result<i64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_int()
                .ok_or_else(|| Self::type_error(name, value, "expected an integer")),
        }
    }

    /// Non-negative integer parameter, or `default` when absent
    pub fn usize(&self, name: &str, default: usize) -> Result<usize> {
        let value = self.int(name, default as i64)?;
        usize::try_from(value).map_err(|_| AutoMLError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must be non-negative".to_string(),
        })
    }

    /// Boolean parameter, or `default` when absent
    pub fn bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| Self::type_error(name, value, "expected a boolean")),
        }
    }

    /// String parameter, or `default` when absent
    pub fn string(&self, name: &str, default: &str) -> Result<String> {
        match self.0.get(name) {
            None => Ok(default.to_string()),
            Some(value) => value
                .as_string()
                .map(str::to_string)
                .ok_or_else(|| Self::type_error(name, value, "expected a string")),
        }
    }

    fn type_error(name: &str, value: &ParameterValue, reason: &str) -> AutoMLError {
        AutoMLError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromIterator<(String, ParameterValue)> for Hyperparameters {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Hyperparameters {
    type Item = (String, ParameterValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParameterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_parameter_sampling_stays_in_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let p = Parameter::float("alpha", 0.0, 1.0);
        for _ in 0..100 {
            let v = p.sample(&mut rng).as_float().unwrap();
            assert!((0.0..=1.0).contains(&v));
        }

        let p = Parameter::log_float("C", 1e-3, 1e3);
        for _ in 0..100 {
            let v = p.sample(&mut rng).as_float().unwrap();
            assert!((1e-3..=1e3).contains(&v));
        }

        let p = Parameter::log_int("k", 1, 50);
        for _ in 0..100 {
            let v = p.sample(&mut rng).as_int().unwrap();
            assert!((1..=50).contains(&v));
        }
    }

    #[test]
    fn test_fixed_parameter_always_returns_value() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let p = Parameter::fixed("method", "mean");
        assert_eq!(p.sample(&mut rng), ParameterValue::String("mean".to_string()));
        assert_eq!(p.default_value(), ParameterValue::String("mean".to_string()));
    }

    #[test]
    fn test_untagged_value_json() {
        let params = Hyperparameters::new()
            .with("k", 5i64)
            .with("alpha", 0.5)
            .with("dummy", true)
            .with("strategy", "median");
        let json = serde_json::to_string(&params).unwrap();
        let back: Hyperparameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
        assert_eq!(back.int("k", 0).unwrap(), 5);
        assert_eq!(back.float("alpha", 0.0).unwrap(), 0.5);
    }

    #[test]
    fn test_typed_getters() {
        let params = Hyperparameters::new().with("k", "five");
        assert!(params.int("k", 3).is_err());
        assert_eq!(params.int("missing", 3).unwrap(), 3);
        assert!(Hyperparameters::new().with("k", -1i64).usize("k", 1).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        assert!(Parameter::float("a", 1.0, 0.0).validate().is_err());
        assert!(Parameter::log_float("a", 0.0, 1.0).validate().is_err());
        assert!(Parameter::choice("a", vec![]).validate().is_err());
        assert!(Parameter::int("a", 1, 3).validate().is_ok());
    }
}
