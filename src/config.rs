//! Prover configuration: approximation options, prover/graph selection, and
//! interpreter limits.
//!
//! Configuration is plain serde data persisted as TOML. Every field has a
//! default, so a config file only needs to name what it changes:
//!
//! ```toml
//! prover = "dpr"
//! squashing = "exp"
//!
//! [apr]
//! alpha = 0.2
//! epsilon = 1e-5
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::weight::{ParamVector, SquashingFunction, Weighter};

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Approximate PageRank options
// ---------------------------------------------------------------------------

/// Options shared by every prover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprOptions {
    /// Push threshold for the push-based provers.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Restart (teleport) probability.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Maximum proof depth explored.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Depth up to which per-state expansion is logged at debug level.
    #[serde(default)]
    pub trace_depth: usize,
    /// State id at which the tree view starts.
    #[serde(default)]
    pub trace_root: usize,
    /// Cap on PPR iterations and DPR passes.
    #[serde(default)]
    pub stop_early: Option<usize>,
}

fn default_epsilon() -> f64 {
    1e-4
}
fn default_alpha() -> f64 {
    0.1
}
fn default_max_depth() -> usize {
    20
}

impl Default for AprOptions {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            alpha: default_alpha(),
            max_depth: default_max_depth(),
            trace_depth: 0,
            trace_root: 0,
            stop_early: None,
        }
    }
}

impl AprOptions {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_stop_early(mut self, passes: usize) -> Self {
        self.stop_early = Some(passes);
        self
    }

    /// Check ranges: `alpha` in `(0, 1]`, `epsilon` in `(0, 1)`.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(invalid("alpha", format!("must be in (0, 1], got {}", self.alpha)));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(invalid(
                "epsilon",
                format!("must be in (0, 1), got {}", self.epsilon),
            ));
        }
        if self.stop_early == Some(0) {
            return Err(invalid("stop_early", "must be at least 1 when set".into()));
        }
        Ok(())
    }
}

fn invalid(option: &str, message: String) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_string(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Which prover strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProverKind {
    Ppr,
    Dfs,
    #[default]
    Dpr,
    PriorityQueue,
    IdPpr,
    IdDpr,
}

impl ProverKind {
    pub const ALL: [ProverKind; 6] = [
        Self::Ppr,
        Self::Dfs,
        Self::Dpr,
        Self::PriorityQueue,
        Self::IdPpr,
        Self::IdDpr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ppr => "ppr",
            Self::Dfs => "dfs",
            Self::Dpr => "dpr",
            Self::PriorityQueue => "priority-queue",
            Self::IdPpr => "id-ppr",
            Self::IdDpr => "id-dpr",
        }
    }

    /// Whether this prover needs the id-indexed graph.
    pub fn requires_id_graph(self) -> bool {
        matches!(self, Self::IdPpr | Self::IdDpr)
    }
}

impl std::fmt::Display for ProverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownProver {
                name: s.to_string(),
            })
    }
}

/// Which proof graph realization to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphKind {
    /// Map-keyed graph over interned states.
    #[default]
    State,
    /// Id-indexed graph with sparse feature rows; supports pruning.
    CachingId,
}

impl GraphKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::CachingId => "caching-id",
        }
    }
}

impl std::fmt::Display for GraphKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Prover configuration
// ---------------------------------------------------------------------------

/// Full configuration for a proof engine, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub apr: AprOptions,
    #[serde(default)]
    pub prover: ProverKind,
    #[serde(default)]
    pub graph: GraphKind,
    /// Squashing function name, resolved by [`ProverConfig::squashing_function`].
    #[serde(default = "default_squashing")]
    pub squashing: String,
    /// Lazy-walk stay probability for push provers; 0.0 disables it.
    #[serde(default)]
    pub stay_probability: f64,
    /// Optional bound on the call depth of states the push provers settle.
    /// Mass reaching deeper states stays residual.
    #[serde(default)]
    pub max_tree_depth: Option<usize>,
    /// Abort a proof on an illegal edge weight instead of zeroing it.
    #[serde(default)]
    pub fail_on_illegal_weight: bool,
    /// Require a loaded parameter vector and report known/unknown feature counts.
    #[serde(default)]
    pub count_features: bool,
    /// Predicates (`functor/arity`) hidden by pruning provers.
    #[serde(default)]
    pub prune_hidden: Vec<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps_per_expansion: usize,
    #[serde(default = "default_max_call_stack")]
    pub max_call_stack: usize,
    /// Minimum time between status reports.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_squashing() -> String {
    SquashingFunction::Linear.name().into()
}
fn default_max_steps() -> usize {
    100_000
}
fn default_max_call_stack() -> usize {
    1000
}
fn default_status_interval_ms() -> u64 {
    2000
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            apr: AprOptions::default(),
            prover: ProverKind::default(),
            graph: GraphKind::default(),
            squashing: default_squashing(),
            stay_probability: 0.0,
            max_tree_depth: None,
            fail_on_illegal_weight: false,
            count_features: false,
            prune_hidden: Vec::new(),
            max_steps_per_expansion: default_max_steps(),
            max_call_stack: default_max_call_stack(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl ProverConfig {
    /// Resolve the configured squashing function.
    pub fn squashing_function(&self) -> ConfigResult<SquashingFunction> {
        self.squashing.parse()
    }

    /// Validate every option that can be checked without a parameter vector.
    pub fn validate(&self) -> ConfigResult<()> {
        self.apr.validate()?;
        self.squashing_function()?;
        if !(0.0..1.0).contains(&self.stay_probability) {
            return Err(invalid(
                "stay_probability",
                format!("must be in [0, 1), got {}", self.stay_probability),
            ));
        }
        if self.prover.requires_id_graph() && self.graph != GraphKind::CachingId {
            return Err(invalid(
                "graph",
                format!(
                    "prover {} needs graph = \"caching-id\", got \"{}\"",
                    self.prover, self.graph
                ),
            ));
        }
        if !self.prune_hidden.is_empty() && !self.prover.requires_id_graph() {
            return Err(invalid(
                "prune_hidden",
                format!("pruning needs an id prover, got {}", self.prover),
            ));
        }
        if self.max_steps_per_expansion == 0 {
            return Err(invalid("max_steps_per_expansion", "must be positive".into()));
        }
        if self.max_call_stack == 0 {
            return Err(invalid("max_call_stack", "must be positive".into()));
        }
        if self.max_tree_depth == Some(0) {
            return Err(invalid("max_tree_depth", "must be at least 1 when set".into()));
        }
        Ok(())
    }

    /// Validate the config and build a weighter over `params`.
    pub fn weighter(&self, params: Arc<dyn ParamVector>) -> ConfigResult<Weighter> {
        self.validate()?;
        if self.count_features && params.is_empty() {
            return Err(ConfigError::MissingFeatureWeights);
        }
        Ok(Weighter::new(self.squashing_function()?, params)
            .with_strict(self.fail_on_illegal_weight))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
