//! Provers: personalized PageRank over a proof graph.
//!
//! Every prover seeds mass 1.0 at the start state and returns an
//! unnormalized `state → mass` vector. Callers normalize over completed
//! states, see [`solutions`].
//!
//! Strategies:
//!
//! - [`PprProver`]: exact power iteration, `max_depth` steps;
//! - [`DfsProver`]: path-weight propagation, fast and approximate;
//! - [`DprProver`]: push-based approximate PageRank with coarse-to-fine
//!   epsilon;
//! - [`PriorityQueueProver`]: the same push, largest residual first;
//! - [`IdPprProver`], [`IdDprProver`]: dense-vector variants over
//!   [`CachingIdProofGraph`];
//! - [`PruningProver`]: wraps an id prover and prunes afterwards.
//!
//! Provers keep per-proof state and are not reentrant; [`Prover::copy`]
//! gives a fresh instance sharing the same weighter.

pub mod dfs;
pub mod dpr;
pub mod id;
pub mod ppr;
pub mod priority;
pub mod pruning;
pub mod solution;
pub mod status;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{AprOptions, ProverConfig, ProverKind};
use crate::error::ProverError;
use crate::graph::{
    AnyGraph, CachingIdProofGraph, HiddenPredicates, LinkKind, ProofGraph, RESTART_FEATURE, StateId,
    TRUE_LOOP_FEATURE, WeightedLink,
};
use crate::sparse::DenseVector;
use crate::weight::{Weighter, describe_features};

pub use dfs::DfsProver;
pub use dpr::DprProver;
pub use id::{IdDprProver, IdPprProver};
pub use ppr::PprProver;
pub use priority::PriorityQueueProver;
pub use pruning::PruningProver;
pub use solution::{Solution, solutions};
pub use status::{ProveProgress, StatusLogger};

/// Unnormalized mass per state.
pub type ProofVector = BTreeMap<StateId, f64>;

/// Lazy-walk stay probability.
pub const LAZY_STAY_PROBABILITY: f64 = 0.5;

// ---------------------------------------------------------------------------
// Prover contract
// ---------------------------------------------------------------------------

/// A proof strategy over graphs of type `G`.
pub trait Prover<G: ProofGraph + ?Sized = AnyGraph>: Send {
    /// Compute the mass vector of `graph`, expanding it as needed.
    fn prove(&mut self, graph: &mut G, status: &mut StatusLogger)
    -> Result<ProofVector, ProverError>;

    fn name(&self) -> &'static str;

    /// A fresh prover with the same settings, for another thread or proof.
    fn copy(&self) -> Self
    where
        Self: Sized;
}

/// Options every prover reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProverSettings {
    pub apr: AprOptions,
    /// Share of residual mass a push keeps in place.
    pub stay_probability: f64,
    /// Push provers leave states deeper than this call depth unsettled.
    pub max_tree_depth: Option<usize>,
}

impl Default for ProverSettings {
    fn default() -> Self {
        Self::new(AprOptions::default())
    }
}

impl ProverSettings {
    pub fn new(apr: AprOptions) -> Self {
        Self {
            apr,
            stay_probability: 0.0,
            max_tree_depth: None,
        }
    }

    pub fn from_config(config: &ProverConfig) -> Self {
        Self {
            apr: config.apr,
            stay_probability: config.stay_probability,
            max_tree_depth: config.max_tree_depth,
        }
    }

    /// Switch to the lazy walk.
    pub fn lazy(mut self) -> Self {
        self.stay_probability = LAZY_STAY_PROBABILITY;
        self
    }

    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = Some(depth);
        self
    }

    pub fn move_probability(&self) -> f64 {
        1.0 - self.stay_probability
    }

    /// Push provers need `alpha >= epsilon`.
    pub(crate) fn check_min_alpha(&self) -> Result<(), ProverError> {
        let AprOptions { alpha, epsilon, .. } = self.apr;
        if alpha < epsilon {
            return Err(ProverError::MinAlpha {
                alpha,
                min_alpha: epsilon,
                epsilon,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mass vectors
// ---------------------------------------------------------------------------

/// Storage for per-state mass: a map for map-keyed graphs, a dense vector
/// for id-indexed ones.
pub trait MassVector: Default {
    fn mass(&self, id: StateId) -> f64;
    fn add_mass(&mut self, id: StateId, value: f64);
    fn set_mass(&mut self, id: StateId, value: f64);
    /// Nonzero entries in id order.
    fn entries(&self) -> Vec<(StateId, f64)>;
    fn into_proof_vector(self) -> ProofVector;

    fn total_mass(&self) -> f64 {
        self.entries().iter().map(|(_, m)| m).sum()
    }
}

impl MassVector for ProofVector {
    fn mass(&self, id: StateId) -> f64 {
        self.get(&id).copied().unwrap_or(0.0)
    }

    fn add_mass(&mut self, id: StateId, value: f64) {
        *self.entry(id).or_insert(0.0) += value;
    }

    fn set_mass(&mut self, id: StateId, value: f64) {
        if value == 0.0 {
            self.remove(&id);
        } else {
            self.insert(id, value);
        }
    }

    fn entries(&self) -> Vec<(StateId, f64)> {
        self.iter()
            .filter(|(_, m)| **m != 0.0)
            .map(|(&id, &m)| (id, m))
            .collect()
    }

    fn into_proof_vector(self) -> ProofVector {
        self
    }
}

impl MassVector for DenseVector {
    fn mass(&self, id: StateId) -> f64 {
        self.get(id)
    }

    fn add_mass(&mut self, id: StateId, value: f64) {
        self.add(id, value);
    }

    fn set_mass(&mut self, id: StateId, value: f64) {
        self.set(id, value);
    }

    fn entries(&self) -> Vec<(StateId, f64)> {
        self.nonzero().collect()
    }

    fn into_proof_vector(self) -> ProofVector {
        self.nonzero().collect()
    }

    fn total_mass(&self) -> f64 {
        self.total()
    }
}

/// Outlinks of `id` with weights normalized to sum to 1.
///
/// A state whose edges weigh nothing in total gets no outlinks; the anomaly
/// is logged.
pub fn normalized_outlinks<G: ProofGraph + ?Sized>(
    graph: &mut G,
    id: StateId,
    weighter: &Weighter,
    true_loop: bool,
) -> Result<Vec<WeightedLink>, ProverError> {
    let mut links = graph.weighted_outlinks(id, weighter, true_loop)?;
    let total: f64 = links.iter().map(|l| l.weight).sum();
    if !(total > 0.0 && total.is_finite()) {
        let features: Vec<String> = graph
            .outlinks(id)?
            .iter()
            .map(|o| describe_features(&o.features))
            .collect();
        let synthetic: Vec<&str> = links
            .iter()
            .filter_map(|l| match l.kind {
                LinkKind::Restart => Some(RESTART_FEATURE),
                LinkKind::TrueLoop => Some(TRUE_LOOP_FEATURE),
                LinkKind::Derived => None,
            })
            .collect();
        tracing::warn!(
            state = id,
            total,
            features = %features.join("; "),
            synthetic = ?synthetic,
            "zero total outgoing weight; state has nowhere to go"
        );
        return Ok(Vec::new());
    }
    for link in &mut links {
        link.weight /= total;
    }
    Ok(links)
}

/// Progress snapshot from settled (`p`) and residual (`r`) mass.
pub(crate) fn progress<V: MassVector>(
    prover: &str,
    iteration: usize,
    pushes: usize,
    settled: &V,
    residual: &V,
) -> ProveProgress {
    let settled = settled.entries();
    let residual = residual.entries();
    ProveProgress {
        prover: prover.to_string(),
        iteration,
        pushes,
        residual_states: residual.len(),
        residual_mass: residual.iter().map(|(_, m)| m).sum(),
        settled_states: settled.len(),
        settled_mass: settled.iter().map(|(_, m)| m).sum(),
        elapsed_ms: 0,
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Any configured prover.
#[derive(Debug)]
pub enum AnyProver {
    Ppr(PprProver),
    Dfs(DfsProver),
    Dpr(DprProver),
    PriorityQueue(PriorityQueueProver),
    IdPpr(IdPprProver),
    IdDpr(IdDprProver),
    PrunedIdPpr(PruningProver<IdPprProver>),
    PrunedIdDpr(PruningProver<IdDprProver>),
}

impl AnyProver {
    /// The prover `config` selects, wrapped for pruning when
    /// `prune_hidden` names any predicate.
    pub fn from_config(config: &ProverConfig, weighter: Arc<Weighter>) -> Self {
        let settings = ProverSettings::from_config(config);
        let hidden = HiddenPredicates::from_keys(&config.prune_hidden);
        let prune = !hidden.is_empty();
        match config.prover {
            ProverKind::Ppr => Self::Ppr(PprProver::new(settings, weighter)),
            ProverKind::Dfs => Self::Dfs(DfsProver::new(settings, weighter)),
            ProverKind::Dpr => Self::Dpr(DprProver::new(settings, weighter)),
            ProverKind::PriorityQueue => {
                Self::PriorityQueue(PriorityQueueProver::new(settings, weighter))
            }
            ProverKind::IdPpr if prune => Self::PrunedIdPpr(PruningProver::new(
                IdPprProver::new(settings, Arc::clone(&weighter)),
                Arc::new(hidden),
                weighter,
            )),
            ProverKind::IdPpr => Self::IdPpr(IdPprProver::new(settings, weighter)),
            ProverKind::IdDpr if prune => Self::PrunedIdDpr(PruningProver::new(
                IdDprProver::new(settings, Arc::clone(&weighter)),
                Arc::new(hidden),
                weighter,
            )),
            ProverKind::IdDpr => Self::IdDpr(IdDprProver::new(settings, weighter)),
        }
    }
}

/// The id-indexed graph behind `graph`, or a mismatch error naming `prover`.
fn id_graph<'g>(
    graph: &'g mut AnyGraph,
    prover: &'static str,
) -> Result<&'g mut CachingIdProofGraph, ProverError> {
    let kind = graph.kind().name();
    graph
        .as_caching_id()
        .ok_or(ProverError::GraphMismatch { prover, graph: kind })
}

impl Prover for AnyProver {
    fn prove(
        &mut self,
        graph: &mut AnyGraph,
        status: &mut StatusLogger,
    ) -> Result<ProofVector, ProverError> {
        match self {
            Self::Ppr(p) => p.prove(graph, status),
            Self::Dfs(p) => p.prove(graph, status),
            Self::Dpr(p) => p.prove(graph, status),
            Self::PriorityQueue(p) => p.prove(graph, status),
            Self::IdPpr(p) => {
                let graph = id_graph(graph, p.name())?;
                p.prove(graph, status)
            }
            Self::IdDpr(p) => {
                let graph = id_graph(graph, p.name())?;
                p.prove(graph, status)
            }
            Self::PrunedIdPpr(p) => {
                let graph = id_graph(graph, p.name())?;
                p.prove(graph, status)
            }
            Self::PrunedIdDpr(p) => {
                let graph = id_graph(graph, p.name())?;
                p.prove(graph, status)
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Ppr(p) => Prover::<AnyGraph>::name(p),
            Self::Dfs(p) => Prover::<AnyGraph>::name(p),
            Self::Dpr(p) => Prover::<AnyGraph>::name(p),
            Self::PriorityQueue(p) => Prover::<AnyGraph>::name(p),
            Self::IdPpr(p) => p.name(),
            Self::IdDpr(p) => p.name(),
            Self::PrunedIdPpr(p) => p.name(),
            Self::PrunedIdDpr(p) => p.name(),
        }
    }

    fn copy(&self) -> Self {
        match self {
            Self::Ppr(p) => Self::Ppr(Prover::<AnyGraph>::copy(p)),
            Self::Dfs(p) => Self::Dfs(Prover::<AnyGraph>::copy(p)),
            Self::Dpr(p) => Self::Dpr(Prover::<AnyGraph>::copy(p)),
            Self::PriorityQueue(p) => Self::PriorityQueue(Prover::<AnyGraph>::copy(p)),
            Self::IdPpr(p) => Self::IdPpr(p.copy()),
            Self::IdDpr(p) => Self::IdDpr(p.copy()),
            Self::PrunedIdPpr(p) => Self::PrunedIdPpr(p.copy()),
            Self::PrunedIdDpr(p) => Self::PrunedIdDpr(p.copy()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::GraphKind;
    use crate::graph::test_support::{FRIENDS, query};
    use crate::graph::ProofGraphFactory;
    use crate::weight::{SimpleParamVector, SquashingFunction};

    #[test]
    fn normalized_outlinks_sum_to_one() {
        let mut g = state_graph(FRIENDS, "main(X)");
        let links = normalized_outlinks(&mut g, 0, &Weighter::uniform(), true).unwrap();
        let total: f64 = links.iter().map(|l| l.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn zero_weight_state_has_nowhere_to_go() {
        let params: SimpleParamVector = [
            ("id(defaultRule)", 0.0),
            (RESTART_FEATURE, 0.0),
            (TRUE_LOOP_FEATURE, 0.0),
        ]
        .into_iter()
        .collect();
        let weighter = Weighter::new(SquashingFunction::Linear, Arc::new(params));
        let mut g = state_graph(FRIENDS, "main(X)");
        assert!(normalized_outlinks(&mut g, 0, &weighter, true).unwrap().is_empty());
        assert!(!g.outlinks(0).unwrap().is_empty());

        let result = PprProver::new(ProverSettings::new(AprOptions::default()), Arc::new(weighter))
            .prove(&mut g, &mut StatusLogger::silent())
            .unwrap();
        assert!(result.values().all(|m| m.is_finite() && *m >= 0.0));
    }

    #[test]
    fn dense_and_map_vectors_agree() {
        let mut map = ProofVector::new();
        let mut dense = DenseVector::new();
        for (id, m) in [(3, 0.25), (0, 0.5), (3, 0.25)] {
            map.add_mass(id, m);
            dense.add_mass(id, m);
        }
        map.set_mass(0, 0.0);
        dense.set_mass(0, 0.0);
        assert_eq!(map.entries(), dense.entries());
        assert_eq!(map.entries(), vec![(3, 0.5)]);
        assert_eq!(dense.into_proof_vector(), map);
    }

    #[test]
    fn min_alpha_is_checked() {
        let settings = ProverSettings::new(AprOptions::default().with_alpha(1e-5).with_epsilon(1e-4));
        assert!(matches!(
            settings.check_min_alpha(),
            Err(ProverError::MinAlpha { .. })
        ));
        assert!(ProverSettings::default().check_min_alpha().is_ok());
    }

    #[test]
    fn factory_selects_configured_prover() {
        for kind in ProverKind::ALL {
            let config = ProverConfig {
                prover: kind,
                ..Default::default()
            };
            let prover = AnyProver::from_config(&config, weighter());
            assert_eq!(prover.name(), kind.name());
            assert_eq!(prover.copy().name(), kind.name());
        }
        let config = ProverConfig {
            prover: ProverKind::IdDpr,
            prune_hidden: vec!["friend/1".into()],
            ..Default::default()
        };
        assert!(matches!(
            AnyProver::from_config(&config, weighter()),
            AnyProver::PrunedIdDpr(_)
        ));
    }

    #[test]
    fn id_prover_rejects_state_graph() {
        let (q, context) = query(FRIENDS, "main(X)");
        let mut graph = GraphKind::State.build(q, &context).unwrap();
        let config = ProverConfig {
            prover: ProverKind::IdPpr,
            ..Default::default()
        };
        let mut prover = AnyProver::from_config(&config, weighter());
        assert!(matches!(
            prover.prove(&mut graph, &mut StatusLogger::silent()),
            Err(ProverError::GraphMismatch {
                prover: "id-ppr",
                graph: "state"
            })
        ));
    }

    #[test]
    fn every_prover_splits_friends_evenly() {
        for kind in ProverKind::ALL {
            let (q, context) = query(FRIENDS, "main(X)");
            let graph_kind = if kind.requires_id_graph() {
                GraphKind::CachingId
            } else {
                GraphKind::State
            };
            let mut graph = graph_kind.build(q, &context).unwrap();
            let config = ProverConfig {
                prover: kind,
                graph: graph_kind,
                ..Default::default()
            };
            let mut prover = AnyProver::from_config(&config, weighter());
            let result = prover.prove(&mut graph, &mut StatusLogger::silent()).unwrap();
            let answers = answers(&graph, &result);
            assert_eq!(answers.len(), 2, "{kind}");
            assert!((answers["alice"] - 0.5).abs() < 1e-2, "{kind}: {answers:?}");
            assert!((answers["bob"] - 0.5).abs() < 1e-2, "{kind}: {answers:?}");
        }
    }
}
