//! Push-based approximate personalized PageRank.
//!
//! Mass is split between settled `p` and residual `r`, seeded with
//! `r[start] = 1`. Pushing a state `u` moves `alpha·r[u]` into `p[u]`, keeps
//! `(1-alpha)·stay·r[u]` in place and spreads `(1-alpha)·move·r[u]` over its
//! normalized outlinks. `Σp + Σr` stays 1 throughout.
//!
//! A state is pushed while `r[u] / degree(u)` exceeds the current threshold.
//! Thresholds tighten from 1.0 by factors of ten down to `epsilon`; pushing at
//! the final threshold straight away would revisit low-mass states long
//! before mass has spread.

use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::{ProofGraph, StateId};
use crate::weight::Weighter;

use super::{
    MassVector, ProofVector, ProverSettings, Prover, StatusLogger, normalized_outlinks, progress,
};

/// Thresholds from 1.0 down to `epsilon`, dividing by ten.
pub fn epsilon_levels(epsilon: f64) -> Vec<f64> {
    let mut levels = Vec::new();
    let mut level = 1.0;
    while level > epsilon * (1.0 + 1e-9) {
        levels.push(level);
        level /= 10.0;
    }
    levels.push(epsilon);
    levels
}

/// Push state shared by the push provers.
pub(crate) struct Pusher<'a, G: ?Sized, V> {
    pub graph: &'a mut G,
    weighter: &'a Weighter,
    settings: &'a ProverSettings,
    pub p: V,
    pub r: V,
    pub pushes: usize,
}

impl<'a, G, V> Pusher<'a, G, V>
where
    G: ProofGraph + ?Sized,
    V: MassVector,
{
    pub fn new(graph: &'a mut G, weighter: &'a Weighter, settings: &'a ProverSettings) -> Self {
        let mut r = V::default();
        r.add_mass(graph.start(), 1.0);
        Self {
            graph,
            weighter,
            settings,
            p: V::default(),
            r,
            pushes: 0,
        }
    }

    /// `r[u] / degree(u)`, expanding `u` if needed.
    pub fn ratio(&mut self, u: StateId) -> Result<f64, ProverError> {
        let residual = self.r.mass(u);
        if residual <= 0.0 {
            return Ok(0.0);
        }
        let degree = self.graph.degree(u, true)?;
        Ok(residual / degree as f64)
    }

    /// Whether `u` may be settled under `max_tree_depth`.
    pub fn settleable(&self, u: StateId) -> bool {
        match self.settings.max_tree_depth {
            Some(limit) => self
                .graph
                .state(u)
                .is_none_or(|s| s.call_stack().len() <= limit),
            None => true,
        }
    }

    /// Push `u`, returning the states that received mass.
    pub fn push(&mut self, u: StateId, depth: usize) -> Result<Vec<StateId>, ProverError> {
        let alpha = self.settings.apr.alpha;
        let residual = self.r.mass(u);
        let links = normalized_outlinks(&mut *self.graph, u, self.weighter, true)?;
        self.p.add_mass(u, alpha * residual);
        self.r
            .set_mass(u, (1.0 - alpha) * self.settings.stay_probability * residual);
        let spread = (1.0 - alpha) * self.settings.move_probability() * residual;
        for link in &links {
            self.r.add_mass(link.child, spread * link.weight);
        }
        self.pushes += 1;
        if depth <= self.settings.apr.trace_depth {
            tracing::debug!(state = u, residual, depth, degree = links.len(), "push");
        }
        Ok(links.into_iter().map(|l| l.child).collect())
    }

    /// Depth-first pushes from `root` at threshold `epsilon`. Children are
    /// visited in outlink order up to `max_depth` hops below the root.
    pub fn push_from(&mut self, root: StateId, epsilon: f64) -> Result<(), ProverError> {
        let max_depth = self.settings.apr.max_depth;
        let mut stack = vec![(root, 0usize)];
        while let Some((u, depth)) = stack.pop() {
            if !self.settleable(u) || self.ratio(u)? <= epsilon {
                continue;
            }
            let children = self.push(u, depth)?;
            if depth < max_depth {
                stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
            }
        }
        Ok(())
    }

    pub fn progress(&self, name: &str, iteration: usize) -> super::ProveProgress {
        progress(name, iteration, self.pushes, &self.p, &self.r)
    }
}

/// The coarse-to-fine push loop. Returns settled mass and the push count.
pub(crate) fn push_passes<G, V>(
    graph: &mut G,
    weighter: &Weighter,
    settings: &ProverSettings,
    status: &mut StatusLogger,
    name: &str,
) -> Result<(V, usize), ProverError>
where
    G: ProofGraph + ?Sized,
    V: MassVector,
{
    settings.check_min_alpha()?;
    let mut pusher = Pusher::<G, V>::new(graph, weighter, settings);
    let mut passes = 0;
    'levels: for epsilon in epsilon_levels(settings.apr.epsilon) {
        loop {
            if settings.apr.stop_early.is_some_and(|cap| passes >= cap) {
                break 'levels;
            }
            let before = pusher.pushes;
            for (u, _) in pusher.r.entries() {
                pusher.push_from(u, epsilon)?;
            }
            if pusher.pushes == before {
                break;
            }
            passes += 1;
            status.tick(|| pusher.progress(name, passes));
        }
    }
    tracing::debug!(
        prover = name,
        passes,
        pushes = pusher.pushes,
        residual = pusher.r.total_mass(),
        "push passes finished"
    );
    Ok((pusher.p, pusher.pushes))
}

/// Marks a prover busy for the duration of a proof.
///
/// A proof that unwinds midway leaves the flag set, so later proofs on the
/// same instance fail with [`ProverError::Reentrant`].
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    busy: bool,
}

impl InFlight {
    pub fn run<T>(
        &mut self,
        prover: &'static str,
        proof: impl FnOnce() -> Result<T, ProverError>,
    ) -> Result<T, ProverError> {
        if self.busy {
            return Err(ProverError::Reentrant { prover });
        }
        self.busy = true;
        let result = proof();
        self.busy = false;
        result
    }
}

/// Push-based prover over any proof graph.
#[derive(Debug)]
pub struct DprProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
    in_flight: InFlight,
    last_pushes: usize,
}

impl DprProver {
    pub const NAME: &'static str = "dpr";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self {
            settings,
            weighter,
            in_flight: InFlight::default(),
            last_pushes: 0,
        }
    }

    /// Pushes made by the last completed proof.
    pub fn last_pushes(&self) -> usize {
        self.last_pushes
    }
}

impl<G: ProofGraph + ?Sized> Prover<G> for DprProver {
    fn prove(&mut self, graph: &mut G, status: &mut StatusLogger) -> Result<ProofVector, ProverError> {
        let Self {
            settings,
            weighter,
            in_flight,
            ..
        } = self;
        let (p, pushes) = in_flight.run(Self::NAME, || {
            push_passes::<G, ProofVector>(graph, weighter, settings, status, Self::NAME)
        })?;
        self.last_pushes = pushes;
        Ok(p)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}
