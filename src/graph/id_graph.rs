//! Id-indexed proof graph: sparse feature rows and a frozen parameter snapshot.
//!
//! Each expanded state owns a [`SparseRow`] whose feature vectors are keyed
//! by ids from the shared [`FeatureTable`]. Edge weights are dot products
//! against a per-feature-id parameter snapshot, taken from the weighter on
//! first use and extended lazily as new features appear. Passing a weighter
//! with a different parameter vector or squashing function refreezes.

use std::sync::Arc;

use crate::config::GraphKind;
use crate::error::{GraphError, LogicProgramError, ProverError, WeightError};
use crate::sparse::{SparseRow, SparseVector};
use crate::symbol::{Feature, FeatureTable};
use crate::wam::{QueryProgram, State, WamInterpreter};
use crate::weight::{FeatureDict, ParamVector, SquashingFunction, Weighter};

use super::{
    GraphContext, LinkKind, Outlink, ProofGraph, RESTART_FEATURE, StateId, StateTable,
    TRUE_LOOP_FEATURE, WeightedLink, expand_state,
};

/// Parameters looked up once per feature id.
#[derive(Debug)]
pub(super) struct FrozenParams {
    params: Arc<dyn ParamVector>,
    squash: SquashingFunction,
    values: Vec<Option<f64>>,
}

impl FrozenParams {
    fn new(weighter: &Weighter) -> Self {
        Self {
            params: Arc::clone(weighter.params()),
            squash: weighter.squashing_function(),
            values: Vec::new(),
        }
    }

    fn matches(&self, weighter: &Weighter) -> bool {
        Arc::ptr_eq(&self.params, weighter.params()) && self.squash == weighter.squashing_function()
    }

    fn get(&mut self, fid: usize, features: &FeatureTable, weighter: &Weighter) -> f64 {
        if fid >= self.values.len() {
            self.values.resize(fid + 1, None);
        }
        *self.values[fid].get_or_insert_with(|| match features.symbol(fid) {
            Some(feature) => weighter.param(feature.as_str()),
            None => weighter.squashing_function().default_parameter(),
        })
    }

    /// Weight of an edge labelled `vector`.
    pub(super) fn weight(
        &mut self,
        vector: &SparseVector,
        features: &FeatureTable,
        weighter: &Weighter,
    ) -> Result<f64, WeightError> {
        let dot: f64 = vector
            .iter()
            .map(|(fid, value)| value * self.get(fid, features, weighter))
            .sum();
        weighter.check(self.squash.compute(dot), || describe_vector(vector, features))
    }
}

/// Render a sparse feature vector with feature names.
pub fn describe_vector(vector: &SparseVector, features: &FeatureTable) -> String {
    let parts: Vec<String> = vector
        .iter()
        .map(|(fid, value)| match features.symbol(fid) {
            Some(f) => format!("{f}={value}"),
            None => format!("#{fid}={value}"),
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}

/// Id-indexed proof graph with pruning support.
#[derive(Debug)]
pub struct CachingIdProofGraph {
    pub(super) query: Arc<QueryProgram>,
    pub(super) interpreter: WamInterpreter,
    pub(super) states: StateTable,
    pub(super) rows: Vec<Option<SparseRow>>,
    pub(super) features: Arc<FeatureTable>,
    pub(super) restart: usize,
    pub(super) true_loop: usize,
    pub(super) frozen: Option<FrozenParams>,
}

impl CachingIdProofGraph {
    /// Build the graph, running the query to its start state.
    pub fn new(query: Arc<QueryProgram>, context: &GraphContext) -> Result<Self, LogicProgramError> {
        let mut interpreter = WamInterpreter::new(Arc::clone(&query), Arc::clone(&context.plugins))
            .with_limits(context.limits);
        let start = interpreter.start_state()?;
        let mut states = StateTable::new();
        states.intern(start);
        let features = Arc::clone(&context.features);
        let restart = features.intern(Feature::new(RESTART_FEATURE));
        let true_loop = features.intern(Feature::new(TRUE_LOOP_FEATURE));
        Ok(Self {
            query,
            interpreter,
            states,
            rows: Vec::new(),
            features,
            restart,
            true_loop,
            frozen: None,
        })
    }

    /// Snapshot the weighter's parameters for every feature seen so far.
    pub fn freeze(&mut self, weighter: &Weighter) {
        let mut frozen = FrozenParams::new(weighter);
        for fid in 0..self.features.len() {
            frozen.get(fid, &self.features, weighter);
        }
        self.frozen = Some(frozen);
    }

    /// The parameter snapshot for `weighter`, freezing if needed.
    pub(super) fn frozen_for(&mut self, weighter: &Weighter) -> &mut FrozenParams {
        let stale = self.frozen.as_ref().is_none_or(|f| !f.matches(weighter));
        if stale {
            self.frozen = Some(FrozenParams::new(weighter));
        }
        self.frozen.get_or_insert_with(|| FrozenParams::new(weighter))
    }

    /// Expand `id` if it has no row yet.
    pub(super) fn ensure_row(&mut self, id: StateId) -> Result<(), GraphError> {
        if self.is_expanded(id) {
            return Ok(());
        }
        let outlinks = expand_state(&mut self.interpreter, &mut self.states, id)?;
        let mut row = SparseRow::new();
        for outlink in outlinks {
            let vector = SparseVector::from_pairs(
                outlink
                    .features
                    .into_iter()
                    .map(|(feature, value)| (self.features.intern(feature), value)),
            );
            row.push(outlink.child, vector);
        }
        if self.rows.len() <= id {
            self.rows.resize(id + 1, None);
        }
        self.rows[id] = Some(row);
        Ok(())
    }

    /// The cached row of `id`, if expanded.
    pub fn row(&self, id: StateId) -> Option<&SparseRow> {
        self.rows.get(id).and_then(Option::as_ref)
    }

    fn to_dict(&self, vector: &SparseVector) -> FeatureDict {
        vector
            .iter()
            .map(|(fid, value)| {
                let feature = self
                    .features
                    .symbol(fid)
                    .unwrap_or_else(|| Feature::new(format!("#{fid}")));
                (feature, value)
            })
            .collect()
    }

    /// Weighted derived edges of an expanded row, without synthetic edges.
    pub(super) fn weighted_row(
        &mut self,
        id: StateId,
        weighter: &Weighter,
    ) -> Result<Vec<(StateId, f64)>, ProverError> {
        self.ensure_row(id)?;
        self.frozen_for(weighter);
        let Self {
            rows,
            frozen,
            features,
            ..
        } = self;
        let (Some(Some(row)), Some(frozen)) = (rows.get(id), frozen.as_mut()) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(row.len());
        for (child, vector) in row.edges() {
            out.push((child, frozen.weight(vector, features, weighter)?));
        }
        Ok(out)
    }

    fn synthetic_weight(&mut self, fid: usize, weighter: &Weighter) -> Result<f64, WeightError> {
        let features = Arc::clone(&self.features);
        let vector = SparseVector::from_pairs([(fid, 1.0)]);
        self.frozen_for(weighter).weight(&vector, &features, weighter)
    }
}

impl ProofGraph for CachingIdProofGraph {
    fn state(&self, id: StateId) -> Option<&Arc<State>> {
        self.states.get(id)
    }

    fn id(&self, state: &State) -> Option<StateId> {
        self.states.id_of(state)
    }

    fn node_count(&self) -> usize {
        self.states.len()
    }

    fn degree(&mut self, id: StateId, true_loop: bool) -> Result<usize, GraphError> {
        self.ensure_row(id)?;
        let derived = self.row(id).map_or(0, SparseRow::len);
        let looped = true_loop && self.is_completed(id);
        Ok(derived + 1 + usize::from(looped))
    }

    fn outlinks(&mut self, id: StateId) -> Result<Vec<Outlink>, GraphError> {
        self.ensure_row(id)?;
        Ok(self
            .row(id)
            .map(|row| {
                row.edges()
                    .map(|(child, vector)| Outlink {
                        child,
                        features: self.to_dict(vector),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn weighted_outlinks(
        &mut self,
        id: StateId,
        weighter: &Weighter,
        true_loop: bool,
    ) -> Result<Vec<WeightedLink>, ProverError> {
        let mut links: Vec<WeightedLink> = self
            .weighted_row(id, weighter)?
            .into_iter()
            .map(|(child, weight)| WeightedLink {
                child,
                weight,
                kind: LinkKind::Derived,
            })
            .collect();
        if true_loop && self.is_completed(id) {
            links.push(WeightedLink {
                child: id,
                weight: self.synthetic_weight(self.true_loop, weighter)?,
                kind: LinkKind::TrueLoop,
            });
        }
        links.push(WeightedLink {
            child: self.start(),
            weight: self.synthetic_weight(self.restart, weighter)?,
            kind: LinkKind::Restart,
        });
        Ok(links)
    }

    fn is_expanded(&self, id: StateId) -> bool {
        self.row(id).is_some()
    }

    fn query(&self) -> &Arc<QueryProgram> {
        &self.query
    }

    fn feature_table(&self) -> &Arc<FeatureTable> {
        &self.features
    }

    fn kind(&self) -> GraphKind {
        GraphKind::CachingId
    }
}
