//! Pruning decorator: prove, then prune the graph and renumber the result.

use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::prune::PruneOptions;
use crate::graph::{CachingIdProofGraph, VisibilityFilter};
use crate::weight::Weighter;

use super::{ProofVector, Prover, StatusLogger};

/// Wraps an id prover. After the inner proof, invisible states are pruned
/// from the graph and the result is remapped to the pruned ids; mass
/// settled on pruned states is dropped.
pub struct PruningProver<P> {
    inner: P,
    filter: Arc<dyn VisibilityFilter + Send>,
    weighter: Arc<Weighter>,
}

impl<P: std::fmt::Debug> std::fmt::Debug for PruningProver<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PruningProver")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<P> PruningProver<P> {
    pub const NAME: &'static str = "pruning";

    pub fn new(inner: P, filter: Arc<dyn VisibilityFilter + Send>, weighter: Arc<Weighter>) -> Self {
        Self {
            inner,
            filter,
            weighter,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

/// Options for [`CachingIdProofGraph::prune`] taken from an inner prover.
pub trait PruneSettings {
    fn prune_options(&self) -> PruneOptions;
}

impl PruneSettings for super::IdPprProver {
    fn prune_options(&self) -> PruneOptions {
        options(&self.settings().apr)
    }
}

impl PruneSettings for super::IdDprProver {
    fn prune_options(&self) -> PruneOptions {
        options(&self.settings().apr)
    }
}

fn options(apr: &crate::config::AprOptions) -> PruneOptions {
    PruneOptions {
        alpha: apr.alpha,
        max_depth: apr.max_depth,
        epsilon: apr.epsilon,
    }
}

impl<P> Prover<CachingIdProofGraph> for PruningProver<P>
where
    P: Prover<CachingIdProofGraph> + PruneSettings,
{
    fn prove(
        &mut self,
        graph: &mut CachingIdProofGraph,
        status: &mut StatusLogger,
    ) -> Result<ProofVector, ProverError> {
        let result = self.inner.prove(graph, status)?;
        let before = result.len();
        let remap = graph.prune(&self.weighter, self.filter.as_ref(), self.inner.prune_options())?;
        let pruned: ProofVector = result
            .into_iter()
            .filter_map(|(old, mass)| remap.get(old).copied().flatten().map(|new| (new, mass)))
            .collect();
        tracing::debug!(
            prover = self.inner.name(),
            before,
            after = pruned.len(),
            "remapped pruned result"
        );
        Ok(pruned)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(
            self.inner.copy(),
            Arc::clone(&self.filter),
            Arc::clone(&self.weighter),
        )
    }
}
