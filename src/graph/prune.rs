//! Pruning: remove invisible states and bridge them with virtual edges.
//!
//! A visibility filter decides which states survive; the start state and
//! completed states always do. For each surviving state `u` and each
//! surviving state `v` reachable from `u` only through invisible states, the
//! pruned graph gets a virtual edge `u → v`. Its mass is the sum over paths
//! of the first edge's raw weight times, for every hop out of an invisible
//! state, that hop's normalized probability (restart included in the
//! normalizer) attenuated by `(1 - alpha)^2`. Paths are followed up to
//! `max_depth` invisible hops and dropped once their mass falls below
//! `epsilon`.
//!
//! Virtual mass is carried by the reserved `subproof` feature: added to the
//! real `u → v` edge when there is one, otherwise on a new edge labelled
//! only `subproof`.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ProverError;
use crate::sparse::{SparseRow, SparseVector};
use crate::symbol::Feature;
use crate::wam::{Label, State};
use crate::weight::Weighter;

use super::{CachingIdProofGraph, LinkKind, ProofGraph, SUBPROOF_FEATURE, StateId};

/// Decides which states survive pruning.
pub trait VisibilityFilter: Sync {
    fn visible(&self, state: &State) -> bool;
}

/// Keeps every state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllVisible;

impl VisibilityFilter for AllVisible {
    fn visible(&self, _state: &State) -> bool {
        true
    }
}

/// Hides every state inside a call to one of the given predicates.
///
/// A state is inside a call when the predicate is the pending call or the
/// pending call of any frame on its stack.
#[derive(Debug, Clone, Default)]
pub struct HiddenPredicates {
    hidden: BTreeSet<Label>,
}

impl HiddenPredicates {
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            hidden: labels.into_iter().collect(),
        }
    }

    /// Build from `functor/arity` keys.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        Self::new(keys.iter().map(|k| Label::parse(k.as_ref())))
    }

    pub fn is_empty(&self) -> bool {
        self.hidden.is_empty()
    }
}

impl VisibilityFilter for HiddenPredicates {
    fn visible(&self, state: &State) -> bool {
        !state.in_call_of(|label| self.hidden.contains(label))
    }
}

impl<F> VisibilityFilter for F
where
    F: Fn(&State) -> bool + Sync,
{
    fn visible(&self, state: &State) -> bool {
        self(state)
    }
}

/// Options bounding the virtual-path search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneOptions {
    pub alpha: f64,
    pub max_depth: usize,
    pub epsilon: f64,
}

impl CachingIdProofGraph {
    /// Prune invisible states, returning the old-id → new-id mapping.
    ///
    /// Only expanded states contribute edges; an unexpanded invisible state
    /// ends its paths. Surviving states keep their relative order, so the
    /// start state stays at id 0.
    pub fn prune(
        &mut self,
        weighter: &Weighter,
        filter: &dyn VisibilityFilter,
        options: PruneOptions,
    ) -> Result<Vec<Option<StateId>>, ProverError> {
        let n = self.node_count();
        let start = self.start();
        let visible: Vec<bool> = (0..n)
            .map(|id| {
                id == start
                    || self
                        .state(id)
                        .is_some_and(|s| s.is_completed() || filter.visible(s))
            })
            .collect();
        if visible.iter().all(|&v| v) {
            return Ok((0..n).map(Some).collect());
        }

        let attenuation = (1.0 - options.alpha).powi(2);
        let subproof = self.features.intern(Feature::new(SUBPROOF_FEATURE));

        // Normalized derived-edge probabilities of expanded invisible states.
        let mut transitions: BTreeMap<StateId, Vec<(StateId, f64)>> = BTreeMap::new();
        let hidden: Vec<StateId> = (0..n)
            .filter(|&id| !visible[id] && self.is_expanded(id))
            .collect();
        for id in hidden {
            let links = self.weighted_outlinks(id, weighter, false)?;
            let total: f64 = links.iter().map(|l| l.weight).sum();
            let derived = if total > 0.0 {
                links
                    .iter()
                    .filter(|l| l.kind == LinkKind::Derived)
                    .map(|l| (l.child, l.weight / total))
                    .collect()
            } else {
                Vec::new()
            };
            transitions.insert(id, derived);
        }

        let mut new_rows: Vec<(StateId, SparseRow)> = Vec::new();
        let sources: Vec<StateId> = (0..n)
            .filter(|&u| visible[u] && self.is_expanded(u))
            .collect();
        for u in sources {
            let weighted = self.weighted_row(u, weighter)?;
            let Some(row) = self.row(u).cloned() else {
                continue;
            };

            let mut kept = SparseRow::new();
            let mut virtual_mass: BTreeMap<StateId, f64> = BTreeMap::new();
            for ((v, vector), (_, raw)) in row.edges().zip(&weighted) {
                if visible[v] {
                    kept.push(v, vector.clone());
                    continue;
                }
                // Depth-first walk through the invisible region below v.
                let mut stack = vec![(v, *raw, 0usize)];
                while let Some((x, mass, depth)) = stack.pop() {
                    if depth >= options.max_depth || mass < options.epsilon {
                        continue;
                    }
                    let Some(next) = transitions.get(&x) else {
                        continue;
                    };
                    for &(y, p) in next {
                        let m = mass * p * attenuation;
                        if visible[y] {
                            *virtual_mass.entry(y).or_insert(0.0) += m;
                        } else {
                            stack.push((y, m, depth + 1));
                        }
                    }
                }
            }

            for (v, mass) in virtual_mass {
                match kept.position(v) {
                    Some(i) => kept.features[i].add(subproof, mass),
                    None => kept.push(v, SparseVector::from_pairs([(subproof, mass)])),
                }
            }
            new_rows.push((u, kept));
        }

        // Renumber survivors in id order and swap the tables.
        let mut remap = vec![None; n];
        let mut next = 0;
        for (old, slot) in remap.iter_mut().enumerate() {
            if visible[old] {
                *slot = Some(next);
                next += 1;
            }
        }
        let mut rows: Vec<Option<SparseRow>> = vec![None; next];
        for (old, mut row) in new_rows {
            if let Some(new) = remap[old] {
                for child in row.children.iter_mut() {
                    // Every kept child is visible, hence mapped.
                    *child = remap[*child].unwrap_or(*child);
                }
                rows[new] = Some(row);
            }
        }
        self.states.retain_remapped(&remap);
        self.rows = rows;
        tracing::debug!(before = n, after = next, "pruned proof graph");
        Ok(remap)
    }
}
