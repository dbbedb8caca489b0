//! Search space construction
//!
//! [`build_space`] merges each stage's candidate methods with their
//! hyperparameter templates into one conditional choice per stage. A
//! [`SearchSpace`] is the cross-product of the six choices plus a task tag;
//! sampling it yields a [`ConfigPoint`].

mod codec;
mod params;
mod templates;

pub use codec::{decode, encode, ConfigPoint, FlatConfig, StageChoice};
pub use params::{Hyperparameters, Parameter, ParameterType, ParameterValue};
pub use templates::{default_templates, HyperparameterTemplate, Templates};

use crate::error::{AutoMLError, Result};
use crate::registry::{
    BalancerMethod, CandidateSet, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod,
    SelectorMethod, StageCandidates, StageMethod,
};
use crate::stages::{Stage, TaskType};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One method choice of a stage with its pinned identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSpace<M> {
    pub index: usize,
    pub method: M,
    pub params: Vec<Parameter>,
}

impl<M: StageMethod> MethodSpace<M> {
    pub fn sample(&self, rng: &mut impl Rng) -> StageChoice<M> {
        let params = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect();
        StageChoice::new(self.index, self.method, params)
    }

    /// Every parameter at its domain default
    pub fn default_choice(&self) -> StageChoice<M> {
        let params = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.default_value()))
            .collect();
        StageChoice::new(self.index, self.method, params)
    }
}

/// Conditional choice node of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpace<M> {
    pub choices: Vec<MethodSpace<M>>,
}

impl<M: StageMethod> StageSpace<M> {
    /// One choice per (candidate, template) pair, candidates in order;
    /// a candidate without a template becomes a parameterless choice
    pub fn build(candidates: &CandidateSet<M>, templates: &[HyperparameterTemplate<M>]) -> Result<Self> {
        let mut choices = Vec::new();
        for &method in candidates.methods() {
            let mut matched = templates.iter().filter(|t| t.method == method).peekable();
            if matched.peek().is_none() {
                choices.push(MethodSpace {
                    index: choices.len(),
                    method,
                    params: Vec::new(),
                });
                continue;
            }
            for template in matched {
                for p in &template.params {
                    p.validate()?;
                }
                choices.push(MethodSpace {
                    index: choices.len(),
                    method,
                    params: template.params.clone(),
                });
            }
        }
        if choices.is_empty() {
            return Err(AutoMLError::ConfigError(format!(
                "{} stage has no choices",
                M::STAGE
            )));
        }
        Ok(Self { choices })
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn choice(&self, index: usize) -> Option<&MethodSpace<M>> {
        self.choices.get(index)
    }

    /// Uniform over choices, then the choice's parameters
    pub fn sample(&self, rng: &mut impl Rng) -> StageChoice<M> {
        let idx = rng.gen_range(0..self.choices.len());
        self.choices[idx].sample(rng)
    }

    /// Whether a choice could have come from this space
    pub fn admits(&self, choice: &StageChoice<M>) -> bool {
        self.choices
            .get(choice.index)
            .map_or(false, |c| c.method == choice.method)
    }

    pub fn methods(&self) -> Vec<M> {
        let mut out: Vec<M> = self.choices.iter().map(|c| c.method).collect();
        out.dedup();
        out
    }
}

/// Joint space over the six stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub task_type: TaskType,
    pub encoder: StageSpace<EncoderMethod>,
    pub imputer: StageSpace<ImputerMethod>,
    pub balancer: StageSpace<BalancerMethod>,
    pub scaler: StageSpace<ScalerMethod>,
    pub feature_selector: StageSpace<SelectorMethod>,
    pub model: StageSpace<ModelMethod>,
}

/// Merge candidates with templates into the joint space
pub fn build_space(
    candidates: &StageCandidates,
    templates: &Templates,
    task_type: TaskType,
) -> Result<SearchSpace> {
    let space = SearchSpace {
        task_type,
        encoder: StageSpace::build(&candidates.encoder, &templates.encoder)?,
        imputer: StageSpace::build(&candidates.imputer, &templates.imputer)?,
        balancer: StageSpace::build(&candidates.balancer, &templates.balancer)?,
        scaler: StageSpace::build(&candidates.scaler, &templates.scaler)?,
        feature_selector: StageSpace::build(
            &candidates.feature_selector,
            &templates.feature_selector,
        )?,
        model: StageSpace::build(&candidates.model, &templates.model)?,
    };
    debug!(
        task = %task_type,
        choices = ?space.radices(),
        grid_size = space.grid_size(),
        "built search space"
    );
    Ok(space)
}

impl SearchSpace {
    /// Choice count per stage, in pipeline order
    pub fn radices(&self) -> [usize; 6] {
        [
            self.encoder.len(),
            self.imputer.len(),
            self.balancer.len(),
            self.scaler.len(),
            self.feature_selector.len(),
            self.model.len(),
        ]
    }

    pub fn choice_count(&self, stage: Stage) -> usize {
        self.radices()[stage as usize]
    }

    pub fn sample(&self, rng: &mut impl Rng) -> ConfigPoint {
        ConfigPoint {
            task_type: self.task_type,
            encoder: self.encoder.sample(rng),
            imputer: self.imputer.sample(rng),
            balancer: self.balancer.sample(rng),
            scaler: self.scaler.sample(rng),
            feature_selector: self.feature_selector.sample(rng),
            model: self.model.sample(rng),
        }
    }

    /// Number of method combinations
    pub fn grid_size(&self) -> usize {
        self.radices().iter().product()
    }

    /// The `n`-th method combination, parameters at their defaults.
    ///
    /// `n` is read as a mixed-radix number with the model stage varying
    /// fastest; it wraps around past [`SearchSpace::grid_size`].
    pub fn grid_point(&self, n: usize) -> ConfigPoint {
        let radices = self.radices();
        let mut digits = [0usize; 6];
        let mut rest = n % self.grid_size().max(1);
        for (digit, radix) in digits.iter_mut().zip(radices.iter()).rev() {
            *digit = rest % radix;
            rest /= radix;
        }
        ConfigPoint {
            task_type: self.task_type,
            encoder: self.encoder.choices[digits[0]].default_choice(),
            imputer: self.imputer.choices[digits[1]].default_choice(),
            balancer: self.balancer.choices[digits[2]].default_choice(),
            scaler: self.scaler.choices[digits[3]].default_choice(),
            feature_selector: self.feature_selector.choices[digits[4]].default_choice(),
            model: self.model.choices[digits[5]].default_choice(),
        }
    }

    /// Every method combination
    pub fn grid(&self) -> Vec<ConfigPoint> {
        (0..self.grid_size()).map(|n| self.grid_point(n)).collect()
    }

    /// Whether a point could have been drawn from this space
    pub fn admits(&self, point: &ConfigPoint) -> bool {
        point.task_type == self.task_type
            && self.encoder.admits(&point.encoder)
            && self.imputer.admits(&point.imputer)
            && self.balancer.admits(&point.balancer)
            && self.scaler.admits(&point.scaler)
            && self.feature_selector.admits(&point.feature_selector)
            && self.model.admits(&point.model)
    }

    /// Choice index per stage, in pipeline order
    pub fn choice_indices(point: &ConfigPoint) -> [usize; 6] {
        [
            point.encoder.index,
            point.imputer.index,
            point.balancer.index,
            point.scaler.index,
            point.feature_selector.index,
            point.model.index,
        ]
    }
}
