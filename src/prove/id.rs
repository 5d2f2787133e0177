//! Provers over the id-indexed graph, keeping mass in dense vectors.
//!
//! Both freeze the weighter's parameters into the graph before proving, so
//! every edge weight is a dot product against the snapshot.

use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::CachingIdProofGraph;
use crate::sparse::DenseVector;
use crate::weight::Weighter;

use super::dpr::{InFlight, push_passes};
use super::ppr::power_iteration;
use super::{MassVector, ProofVector, ProverSettings, Prover, StatusLogger};

/// Power iteration over a [`CachingIdProofGraph`].
#[derive(Debug)]
pub struct IdPprProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
}

impl IdPprProver {
    pub const NAME: &'static str = "id-ppr";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self { settings, weighter }
    }

    pub fn settings(&self) -> &ProverSettings {
        &self.settings
    }

    /// Dense result vector, indexed by state id.
    pub fn prove_dense(
        &mut self,
        graph: &mut CachingIdProofGraph,
        status: &mut StatusLogger,
    ) -> Result<DenseVector, ProverError> {
        graph.freeze(&self.weighter);
        power_iteration::<_, DenseVector>(graph, &self.weighter, &self.settings, status, Self::NAME)
    }
}

impl Prover<CachingIdProofGraph> for IdPprProver {
    fn prove(
        &mut self,
        graph: &mut CachingIdProofGraph,
        status: &mut StatusLogger,
    ) -> Result<ProofVector, ProverError> {
        self.prove_dense(graph, status).map(MassVector::into_proof_vector)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}

/// Push-based prover over a [`CachingIdProofGraph`].
#[derive(Debug)]
pub struct IdDprProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
    in_flight: InFlight,
}

impl IdDprProver {
    pub const NAME: &'static str = "id-dpr";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self {
            settings,
            weighter,
            in_flight: InFlight::default(),
        }
    }

    pub fn settings(&self) -> &ProverSettings {
        &self.settings
    }

    /// Dense settled-mass vector, indexed by state id.
    pub fn prove_dense(
        &mut self,
        graph: &mut CachingIdProofGraph,
        status: &mut StatusLogger,
    ) -> Result<DenseVector, ProverError> {
        let Self {
            settings,
            weighter,
            in_flight,
        } = self;
        in_flight
            .run(Self::NAME, || {
                graph.freeze(weighter);
                push_passes::<_, DenseVector>(graph, weighter, settings, status, Self::NAME)
            })
            .map(|(p, _)| p)
    }
}

impl Prover<CachingIdProofGraph> for IdDprProver {
    fn prove(
        &mut self,
        graph: &mut CachingIdProofGraph,
        status: &mut StatusLogger,
    ) -> Result<ProofVector, ProverError> {
        self.prove_dense(graph, status).map(MassVector::into_proof_vector)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}
