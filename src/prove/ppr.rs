//! Exact power iteration.

use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::ProofGraph;
use crate::weight::Weighter;

use super::{
    MassVector, ProofVector, ProverSettings, Prover, StatusLogger, normalized_outlinks, progress,
};

/// Multiplies the seed distribution by the normalized transition matrix
/// `max_depth` times (fewer when `stop_early` caps it).
///
/// Restart and true-loop edges are ordinary edges here, so no mass is lost
/// unless a state's edges weigh nothing.
pub(crate) fn power_iteration<G, V>(
    graph: &mut G,
    weighter: &Weighter,
    settings: &ProverSettings,
    status: &mut StatusLogger,
    name: &str,
) -> Result<V, ProverError>
where
    G: ProofGraph + ?Sized,
    V: MassVector,
{
    let apr = &settings.apr;
    let iterations = apr.stop_early.map_or(apr.max_depth, |cap| cap.min(apr.max_depth));
    let mut current = V::default();
    current.add_mass(graph.start(), 1.0);
    for iteration in 0..iterations {
        let mut next = V::default();
        for (u, mass) in current.entries() {
            for link in normalized_outlinks(graph, u, weighter, true)? {
                next.add_mass(link.child, mass * link.weight);
            }
            if iteration < apr.trace_depth {
                tracing::debug!(state = u, mass, iteration, "ppr step");
            }
        }
        current = next;
        status.tick(|| progress(name, iteration + 1, 0, &current, &V::default()));
    }
    Ok(current)
}

/// Power-iteration prover over any proof graph.
#[derive(Debug)]
pub struct PprProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
}

impl PprProver {
    pub const NAME: &'static str = "ppr";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self { settings, weighter }
    }

    pub fn settings(&self) -> &ProverSettings {
        &self.settings
    }
}

impl<G: ProofGraph + ?Sized> Prover<G> for PprProver {
    fn prove(&mut self, graph: &mut G, status: &mut StatusLogger) -> Result<ProofVector, ProverError> {
        power_iteration::<G, ProofVector>(graph, &self.weighter, &self.settings, status, Self::NAME)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}
