//! Feature weighting: parameter vectors, squashing functions, and the weighter.
//!
//! An edge is labelled with a [`FeatureDict`]. Its weight is
//! `squash(Σ value · θ[feature])`, where features missing from the parameter
//! vector θ read the squashing function's default parameter. The weighter
//! also counts how many lookups hit known and unknown features, so callers
//! can warn when a trained model is applied to unfamiliar data.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, WeightError};
use crate::symbol::Feature;

/// Feature → raw value (usually a count) labelling one edge.
pub type FeatureDict = BTreeMap<Feature, f64>;

/// Render a feature dictionary for diagnostics: `{f=1, g=2}`.
pub fn describe_features(features: &FeatureDict) -> String {
    let parts: Vec<String> = features.iter().map(|(f, v)| format!("{f}={v}")).collect();
    format!("{{{}}}", parts.join(", "))
}

// ---------------------------------------------------------------------------
// Parameter vectors
// ---------------------------------------------------------------------------

/// Read-only feature → weight lookup.
pub trait ParamVector: Send + Sync + std::fmt::Debug {
    /// Weight for `feature`, or `None` when the feature was never trained.
    fn get(&self, feature: &str) -> Option<f64>;

    /// Number of stored weights.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map-backed parameter vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimpleParamVector {
    weights: BTreeMap<Feature, f64>,
}

impl SimpleParamVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, feature: impl Into<Feature>, weight: f64) {
        self.weights.insert(feature.into(), weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Feature, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (f, *w))
    }

    /// Parse a JSON object of `feature: weight` pairs.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Load weights saved by [`SimpleParamVector::save`].
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl<F: Into<Feature>> FromIterator<(F, f64)> for SimpleParamVector {
    fn from_iter<I: IntoIterator<Item = (F, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().map(|(f, w)| (f.into(), w)).collect(),
        }
    }
}

impl ParamVector for SimpleParamVector {
    fn get(&self, feature: &str) -> Option<f64> {
        self.weights.get(feature).copied()
    }

    fn len(&self) -> usize {
        self.weights.len()
    }
}

/// Parameter vector that weighs every feature 1.0.
///
/// The fallback when no weights are loaded. It reports itself as empty so
/// that feature-count diagnostics can tell it apart from a trained model.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitVector;

impl ParamVector for UnitVector {
    fn get(&self, _feature: &str) -> Option<f64> {
        Some(1.0)
    }

    fn len(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// Squashing functions
// ---------------------------------------------------------------------------

/// Maps a raw dot product to a nonnegative edge weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SquashingFunction {
    /// `x`; callers must keep parameters nonnegative.
    Linear,
    /// `e^x`.
    Exp,
    /// `e^x` with `x` clipped to ±100.
    ClippedExp,
    /// `1 / (1 + e^-x)`.
    Sigmoid,
    /// `max(0, x)`.
    Relu,
    /// `tanh(x) + 1`.
    Tanh1,
}

impl SquashingFunction {
    pub const ALL: [SquashingFunction; 6] = [
        Self::Linear,
        Self::Exp,
        Self::ClippedExp,
        Self::Sigmoid,
        Self::Relu,
        Self::Tanh1,
    ];

    /// Apply the function to a dot product.
    pub fn compute(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Exp => x.exp(),
            Self::ClippedExp => x.clamp(-100.0, 100.0).exp(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Relu => x.max(0.0),
            Self::Tanh1 => x.tanh() + 1.0,
        }
    }

    /// Parameter value assumed for features missing from the parameter vector.
    pub fn default_parameter(self) -> f64 {
        match self {
            Self::Linear | Self::Relu => 1.0,
            Self::Exp | Self::ClippedExp | Self::Sigmoid | Self::Tanh1 => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Exp => "exp",
            Self::ClippedExp => "clipped-exp",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::Tanh1 => "tanh1",
        }
    }
}

impl std::fmt::Display for SquashingFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SquashingFunction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|f| f.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownSquashingFunction {
                name: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Weighter
// ---------------------------------------------------------------------------

/// Known/unknown feature lookup counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCounts {
    pub known: u64,
    pub unknown: u64,
}

/// Computes edge weights from feature dictionaries.
///
/// Immutable apart from its diagnostic counters, so one weighter is shared
/// through an `Arc` by every prover copy.
#[derive(Debug)]
pub struct Weighter {
    squash: SquashingFunction,
    params: Arc<dyn ParamVector>,
    strict: bool,
    known: AtomicU64,
    unknown: AtomicU64,
}

impl Weighter {
    pub fn new(squash: SquashingFunction, params: Arc<dyn ParamVector>) -> Self {
        Self {
            squash,
            params,
            strict: false,
            known: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
        }
    }

    /// Linear weighting over [`UnitVector`]: every feature counts 1.0.
    pub fn uniform() -> Self {
        Self::new(SquashingFunction::Linear, Arc::new(UnitVector))
    }

    /// Make illegal weights fatal instead of logging and zeroing them.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn squashing_function(&self) -> SquashingFunction {
        self.squash
    }

    pub fn params(&self) -> &Arc<dyn ParamVector> {
        &self.params
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parameter for one feature, counting the lookup.
    pub fn param(&self, feature: &str) -> f64 {
        match self.params.get(feature) {
            Some(w) => {
                self.known.fetch_add(1, Ordering::Relaxed);
                w
            }
            None => {
                self.unknown.fetch_add(1, Ordering::Relaxed);
                self.squash.default_parameter()
            }
        }
    }

    /// Squashed weight without legality checks.
    pub fn raw_weight(&self, features: &FeatureDict) -> f64 {
        let dot: f64 = features
            .iter()
            .map(|(f, value)| value * self.param(f.as_str()))
            .sum();
        self.squash.compute(dot)
    }

    /// Squashed weight, checked for legality.
    pub fn weight(&self, features: &FeatureDict) -> Result<f64, WeightError> {
        let w = self.raw_weight(features);
        self.check(w, || describe_features(features))
    }

    /// Validate a computed weight.
    ///
    /// Illegal weights (NaN, infinite, negative) are errors in strict mode;
    /// otherwise they are logged with their feature context and read as 0.
    pub fn check(&self, weight: f64, describe: impl FnOnce() -> String) -> Result<f64, WeightError> {
        if weight.is_finite() && weight >= 0.0 {
            return Ok(weight);
        }
        let features = describe();
        if self.strict {
            return Err(WeightError::IllegalWeight { weight, features });
        }
        tracing::warn!(weight, %features, "illegal edge weight; treating as 0");
        Ok(0.0)
    }

    /// Snapshot of the known/unknown feature counters.
    pub fn feature_counts(&self) -> FeatureCounts {
        FeatureCounts {
            known: self.known.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}
