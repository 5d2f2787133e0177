//! Depth-first path-weight propagation.

use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::{LinkKind, ProofGraph, StateId};
use crate::weight::Weighter;

use super::{
    MassVector, ProofVector, ProverSettings, Prover, StatusLogger, normalized_outlinks, progress,
};

/// Descends from the start state, splitting each state's incoming weight
/// over its children by normalized edge weight.
///
/// The restart edge takes its share of the normalizer but is never followed.
/// Descent stops at completed states and at `max_depth`. A state's result is
/// the sum of the weights of every path reaching it, so shared subproofs are
/// counted once per path; this is an approximation, not a fixed point.
#[derive(Debug)]
pub struct DfsProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
}

impl DfsProver {
    pub const NAME: &'static str = "dfs";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self { settings, weighter }
    }
}

impl<G: ProofGraph + ?Sized> Prover<G> for DfsProver {
    fn prove(&mut self, graph: &mut G, status: &mut StatusLogger) -> Result<ProofVector, ProverError> {
        let max_depth = self.settings.apr.max_depth;
        let trace_depth = self.settings.apr.trace_depth;
        let mut result = ProofVector::new();
        let start = graph.start();
        result.add_mass(start, 1.0);

        let mut stack: Vec<(StateId, f64, usize)> = vec![(start, 1.0, 0)];
        let mut visits = 0;
        while let Some((u, weight, depth)) = stack.pop() {
            if depth >= max_depth || graph.is_completed(u) {
                continue;
            }
            visits += 1;
            if depth < trace_depth {
                tracing::debug!(state = u, weight, depth, "dfs visit");
            }
            let links = normalized_outlinks(graph, u, &self.weighter, false)?;
            // Reverse so the first child is explored first.
            for link in links.iter().rev().filter(|l| l.kind != LinkKind::Restart) {
                let share = weight * link.weight;
                result.add_mass(link.child, share);
                stack.push((link.child, share, depth + 1));
            }
            status.tick(|| progress(Self::NAME, visits, 0, &result, &ProofVector::new()));
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}
