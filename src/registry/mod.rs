//! Method registry
//!
//! One [`Registry`] per stage maps a typed method identifier to two
//! constructors: `build` makes an unfitted stage from sampled
//! hyperparameters, `restore` rebuilds a fitted stage from its snapshot.
//! [`Registries`] bundles the six of them and turns config points and
//! saved bundles into runnable [`Pipeline`]s.

mod candidates;
mod methods;

pub use candidates::{
    candidates, CandidatePolicy, CandidateSet, DatasetProfile, Restriction, StageCandidates,
    StageRestrictions,
};
pub use methods::{
    BalancerMethod, EncoderMethod, ImputerMethod, ModelMethod, ScalerMethod, SelectorMethod,
    StageMethod, TaskSupport,
};

use crate::error::{AutoMLError, Result};
use crate::pipeline::{Pipeline, PipelineBundle};
use crate::space::{ConfigPoint, Hyperparameters};
use crate::stages::balancers::{SimpleRandomOverSampling, SimpleRandomUnderSampling, Smote};
use crate::stages::encoders::DataEncoding;
use crate::stages::imputers::{KNNImputer, SimpleImputer};
use crate::stages::models::{
    GaussianNB, KNearestNeighborsClassifier, KNearestNeighborsRegressor, LinearRegression,
    LinearSVC, LinearSVR, LogisticRegression, RidgeRegression,
};
use crate::stages::scalers::{MinMaxScale, Normalize, RobustScale, Standardize};
use crate::stages::selectors::{FeatureFilter, LibLinearSvcPreprocessor, SelectPercentile};
use crate::stages::{
    Balancer, Encoder, FeatureSelector, FromParams, Imputer, Model, NoProcessing, Scaler,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type BuildFn<T> = Arc<dyn Fn(&Hyperparameters) -> Result<Box<T>> + Send + Sync>;
pub type RestoreFn<T> = Arc<dyn Fn(Value) -> Result<Box<T>> + Send + Sync>;

/// Constructors for one method
pub struct StageEntry<T: ?Sized> {
    build: BuildFn<T>,
    restore: RestoreFn<T>,
}

impl<T: ?Sized> Clone for StageEntry<T> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
            restore: Arc::clone(&self.restore),
        }
    }
}

impl<T: ?Sized> StageEntry<T> {
    pub fn new<B, R>(build: B, restore: R) -> Self
    where
        B: Fn(&Hyperparameters) -> Result<Box<T>> + Send + Sync + 'static,
        R: Fn(Value) -> Result<Box<T>> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
            restore: Arc::new(restore),
        }
    }
}

fn restore_state<C: DeserializeOwned>(state: Value) -> Result<C> {
    serde_json::from_value(state).map_err(|e| AutoMLError::SerializationError(e.to_string()))
}

pub fn encoder_entry<C>(build: fn(&Hyperparameters) -> Result<C>) -> StageEntry<dyn Encoder>
where
    C: Encoder + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn Encoder>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn Encoder>),
    )
}

pub fn imputer_entry<C>(build: fn(&Hyperparameters) -> Result<C>) -> StageEntry<dyn Imputer>
where
    C: Imputer + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn Imputer>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn Imputer>),
    )
}

pub fn balancer_entry<C>(build: fn(&Hyperparameters) -> Result<C>) -> StageEntry<dyn Balancer>
where
    C: Balancer + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn Balancer>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn Balancer>),
    )
}

pub fn scaler_entry<C>(build: fn(&Hyperparameters) -> Result<C>) -> StageEntry<dyn Scaler>
where
    C: Scaler + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn Scaler>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn Scaler>),
    )
}

pub fn selector_entry<C>(
    build: fn(&Hyperparameters) -> Result<C>,
) -> StageEntry<dyn FeatureSelector>
where
    C: FeatureSelector + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn FeatureSelector>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn FeatureSelector>),
    )
}

pub fn model_entry<C>(build: fn(&Hyperparameters) -> Result<C>) -> StageEntry<dyn Model>
where
    C: Model + DeserializeOwned + 'static,
{
    StageEntry::new(
        move |p| Ok(Box::new(build(p)?) as Box<dyn Model>),
        |s| Ok(Box::new(restore_state::<C>(s)?) as Box<dyn Model>),
    )
}

/// Method table of one stage
pub struct Registry<M: StageMethod, T: ?Sized> {
    entries: BTreeMap<M, StageEntry<T>>,
}

impl<M: StageMethod, T: ?Sized> Registry<M, T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace a method
    pub fn register(&mut self, method: M, entry: StageEntry<T>) -> &mut Self {
        self.entries.insert(method, entry);
        self
    }

    pub fn with(mut self, method: M, entry: StageEntry<T>) -> Self {
        self.register(method, entry);
        self
    }

    pub fn unregister(&mut self, method: M) -> bool {
        self.entries.remove(&method).is_some()
    }

    pub fn contains(&self, method: M) -> bool {
        self.entries.contains_key(&method)
    }

    /// Registered methods in canonical order
    pub fn methods(&self) -> Vec<M> {
        self.entries.keys().copied().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().map(|m| m.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, method: M) -> Result<&StageEntry<T>> {
        self.entries
            .get(&method)
            .ok_or_else(|| AutoMLError::UnknownMethod {
                stage: M::STAGE.to_string(),
                value: method.as_str().to_string(),
                valid: self.names(),
            })
    }

    /// Unfitted stage from sampled hyperparameters
    pub fn build(&self, method: M, params: &Hyperparameters) -> Result<Box<T>> {
        (self.entry(method)?.build)(params)
    }

    /// Fitted stage from a snapshot
    pub fn restore(&self, method: M, state: Value) -> Result<Box<T>> {
        (self.entry(method)?.restore)(state)
    }
}

impl<M: StageMethod, T: ?Sized> Default for Registry<M, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: StageMethod, T: ?Sized> Clone for Registry<M, T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<M: StageMethod, T: ?Sized> fmt::Debug for Registry<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stage", &M::STAGE)
            .field("methods", &self.names())
            .finish()
    }
}

/// The six stage registries
#[derive(Debug, Clone)]
pub struct Registries {
    pub encoder: Registry<EncoderMethod, dyn Encoder>,
    pub imputer: Registry<ImputerMethod, dyn Imputer>,
    pub balancer: Registry<BalancerMethod, dyn Balancer>,
    pub scaler: Registry<ScalerMethod, dyn Scaler>,
    pub feature_selector: Registry<SelectorMethod, dyn FeatureSelector>,
    pub model: Registry<ModelMethod, dyn Model>,
}

impl Default for Registries {
    /// Every built-in method
    fn default() -> Self {
        let mut registries = Self::empty();
        registries
            .encoder
            .register(EncoderMethod::DataEncoding, encoder_entry(DataEncoding::from_params));
        registries
            .imputer
            .register(ImputerMethod::SimpleImputer, imputer_entry(SimpleImputer::from_params))
            .register(ImputerMethod::KNNImputer, imputer_entry(KNNImputer::from_params));
        registries
            .balancer
            .register(
                BalancerMethod::SimpleRandomOverSampling,
                balancer_entry(SimpleRandomOverSampling::from_params),
            )
            .register(
                BalancerMethod::SimpleRandomUnderSampling,
                balancer_entry(SimpleRandomUnderSampling::from_params),
            )
            .register(BalancerMethod::Smote, balancer_entry(Smote::from_params));
        registries
            .scaler
            .register(ScalerMethod::MinMaxScale, scaler_entry(MinMaxScale::from_params))
            .register(ScalerMethod::Standardize, scaler_entry(Standardize::from_params))
            .register(ScalerMethod::Normalize, scaler_entry(Normalize::from_params))
            .register(ScalerMethod::RobustScale, scaler_entry(RobustScale::from_params));
        registries
            .feature_selector
            .register(SelectorMethod::FeatureFilter, selector_entry(FeatureFilter::from_params))
            .register(
                SelectorMethod::SelectPercentileClassification,
                selector_entry(SelectPercentile::classification),
            )
            .register(
                SelectorMethod::SelectPercentileRegression,
                selector_entry(SelectPercentile::regression),
            )
            .register(
                SelectorMethod::LibLinearSvcPreprocessor,
                selector_entry(LibLinearSvcPreprocessor::from_params),
            );
        registries
            .model
            .register(ModelMethod::LogisticRegression, model_entry(LogisticRegression::from_params))
            .register(ModelMethod::GaussianNB, model_entry(GaussianNB::from_params))
            .register(
                ModelMethod::KNearestNeighborsClassifier,
                model_entry(KNearestNeighborsClassifier::from_params),
            )
            .register(ModelMethod::LibLinearSVC, model_entry(LinearSVC::from_params))
            .register(ModelMethod::LinearRegression, model_entry(LinearRegression::from_params))
            .register(ModelMethod::RidgeRegression, model_entry(RidgeRegression::from_params))
            .register(
                ModelMethod::KNearestNeighborsRegressor,
                model_entry(KNearestNeighborsRegressor::from_params),
            )
            .register(ModelMethod::LibLinearSVR, model_entry(LinearSVR::from_params));
        registries
    }
}

impl Registries {
    /// Only the `no_processing` entries of the optional stages
    pub fn empty() -> Self {
        Self {
            encoder: Registry::new(),
            imputer: Registry::new()
                .with(ImputerMethod::NoProcessing, imputer_entry(NoProcessing::from_params)),
            balancer: Registry::new()
                .with(BalancerMethod::NoProcessing, balancer_entry(NoProcessing::from_params)),
            scaler: Registry::new()
                .with(ScalerMethod::NoProcessing, scaler_entry(NoProcessing::from_params)),
            feature_selector: Registry::new()
                .with(SelectorMethod::NoProcessing, selector_entry(NoProcessing::from_params)),
            model: Registry::new(),
        }
    }

    /// Unfitted pipeline for a config point.
    ///
    /// Every constructor is resolved before anything runs, so an
    /// unregistered method fails here and not halfway through a fit.
    pub fn instantiate(&self, point: &ConfigPoint) -> Result<Pipeline> {
        let pipeline = Pipeline::new()
            .with_encoder(self.encoder.build(point.encoder.method, &point.encoder.params)?)
            .with_imputer(self.imputer.build(point.imputer.method, &point.imputer.params)?)
            .with_balancer(self.balancer.build(point.balancer.method, &point.balancer.params)?)
            .with_scaler(self.scaler.build(point.scaler.method, &point.scaler.params)?)
            .with_feature_selector(
                self.feature_selector
                    .build(point.feature_selector.method, &point.feature_selector.params)?,
            )
            .with_model(self.model.build(point.model.method, &point.model.params)?);
        Ok(pipeline)
    }

    /// Fitted pipeline from a saved bundle
    pub fn restore_pipeline(&self, bundle: &PipelineBundle) -> Result<Pipeline> {
        let pipeline = Pipeline::new()
            .with_encoder(
                self.encoder
                    .restore(bundle.encoder.method, bundle.encoder.state.clone())?,
            )
            .with_imputer(
                self.imputer
                    .restore(bundle.imputer.method, bundle.imputer.state.clone())?,
            )
            .with_balancer(
                self.balancer
                    .restore(bundle.balancer.method, bundle.balancer.state.clone())?,
            )
            .with_scaler(
                self.scaler
                    .restore(bundle.scaler.method, bundle.scaler.state.clone())?,
            )
            .with_feature_selector(self.feature_selector.restore(
                bundle.feature_selector.method,
                bundle.feature_selector.state.clone(),
            )?)
            .with_model(self.model.restore(bundle.model.method, bundle.model.state.clone())?);
        pipeline.into_restored()
    }
}
