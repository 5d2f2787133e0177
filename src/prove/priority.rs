//! Push-based PageRank that always pushes the largest residual ratio next.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;

use crate::error::ProverError;
use crate::graph::{ProofGraph, StateId};
use crate::weight::Weighter;

use super::dpr::{InFlight, Pusher};
use super::{MassVector, ProofVector, ProverSettings, Prover, StatusLogger};

/// Heap entry: a state and its `r / degree` ratio when queued.
#[derive(Debug, Clone, Copy)]
struct Queued {
    ratio: f64,
    id: StateId,
}

impl Ord for Queued {
    /// Largest ratio first; lower ids break ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.ratio
            .total_cmp(&other.ratio)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

/// Pushes in priority order for at most `round(1 / epsilon)` pops.
///
/// Entries are never updated in place; a popped entry whose ratio no longer
/// matches the state's current ratio is stale and skipped without counting.
/// A state's depth is the fewest pushes that reached it from the start;
/// states deeper than `max_depth` collect residual but are never pushed.
pub(crate) fn priority_pushes<G, V>(
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
    let epsilon = settings.apr.epsilon;
    let max_pops = (1.0 / epsilon).round() as usize;
    let mut pusher = Pusher::<G, V>::new(graph, weighter, settings);
    let mut heap = BinaryHeap::new();
    let start = pusher.graph.start();
    let max_depth = settings.apr.max_depth;
    let mut depths: BTreeMap<StateId, usize> = BTreeMap::from([(start, 0)]);
    heap.push(Queued {
        ratio: pusher.ratio(start)?,
        id: start,
    });

    let mut pops = 0;
    while pops < max_pops {
        let Some(Queued { ratio, id }) = heap.pop() else {
            break;
        };
        let current = pusher.ratio(id)?;
        if current != ratio || current <= epsilon || !pusher.settleable(id) {
            continue;
        }
        let depth = depths.get(&id).copied().unwrap_or(0);
        pops += 1;
        let mut touched = pusher.push(id, depth)?;
        for &v in &touched {
            let known = depths.entry(v).or_insert(depth + 1);
            *known = (*known).min(depth + 1);
        }
        touched.push(id);
        touched.sort_unstable();
        touched.dedup();
        for v in touched {
            if depths.get(&v).is_some_and(|&d| d > max_depth) {
                continue;
            }
            let ratio = pusher.ratio(v)?;
            if ratio > epsilon {
                heap.push(Queued { ratio, id: v });
            }
        }
        status.tick(|| pusher.progress(name, pops));
    }
    tracing::debug!(
        prover = name,
        pops,
        queued = heap.len(),
        residual = pusher.r.total_mass(),
        "priority pushes finished"
    );
    Ok((pusher.p, pusher.pushes))
}

/// Priority-queue push prover over any proof graph.
#[derive(Debug)]
pub struct PriorityQueueProver {
    settings: ProverSettings,
    weighter: Arc<Weighter>,
    in_flight: InFlight,
}

impl PriorityQueueProver {
    pub const NAME: &'static str = "priority-queue";

    pub fn new(settings: ProverSettings, weighter: Arc<Weighter>) -> Self {
        Self {
            settings,
            weighter,
            in_flight: InFlight::default(),
        }
    }
}

impl<G: ProofGraph + ?Sized> Prover<G> for PriorityQueueProver {
    fn prove(&mut self, graph: &mut G, status: &mut StatusLogger) -> Result<ProofVector, ProverError> {
        let Self {
            settings,
            weighter,
            in_flight,
        } = self;
        in_flight
            .run(Self::NAME, || {
                priority_pushes::<G, ProofVector>(graph, weighter, settings, status, Self::NAME)
            })
            .map(|(p, _)| p)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy(&self) -> Self {
        Self::new(self.settings, Arc::clone(&self.weighter))
    }
}
