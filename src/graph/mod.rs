//! Proof graphs: lazily expanded graphs over canonicalized machine states.
//!
//! Nodes are interned [`State`]s addressed by dense [`StateId`]s (the start
//! state is always id 0). Edges come from the interpreter's outlinks and are
//! labelled with feature dictionaries; weights are computed on request by a
//! [`Weighter`]. Two synthetic edges are appended to every request:
//!
//! - `id(restart)`: from every state back to the start state;
//! - `id(trueLoop)`: a self-edge on completed states, when the caller asks
//!   for it.
//!
//! Outlinks are computed at most once per state and cached. Only interpreter
//! edges are cached; synthetic edges are rebuilt per request.
//!
//! Two realizations:
//!
//! - [`StateProofGraph`]: feature dictionaries keyed by state id;
//! - [`CachingIdProofGraph`]: sparse id-indexed rows with a frozen parameter
//!   snapshot, and [`CachingIdProofGraph::prune`].

pub mod id_graph;
pub mod prune;
pub mod state_graph;
pub mod trace;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GraphKind;
use crate::error::{GraphError, LogicProgramError, ProverError};
use crate::symbol::{ConstantTable, Feature, FeatureTable};
use crate::wam::{InterpreterLimits, QueryProgram, State, WamInterpreter, WamPlugin};
use crate::weight::{FeatureDict, Weighter};

pub use id_graph::CachingIdProofGraph;
pub use prune::{AllVisible, HiddenPredicates, VisibilityFilter};
pub use state_graph::StateProofGraph;
pub use trace::{GraphExport, serialize, tree_view};

/// Dense index of a state within one proof graph.
pub type StateId = usize;

/// Feature on the synthetic edge from every state back to the start state.
pub const RESTART_FEATURE: &str = "id(restart)";
/// Feature on the synthetic self-edge of completed states.
pub const TRUE_LOOP_FEATURE: &str = "id(trueLoop)";
/// Reserved feature carrying virtual-edge mass added by pruning.
pub const SUBPROOF_FEATURE: &str = "subproof";

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Produced by the interpreter (or added by pruning).
    Derived,
    Restart,
    TrueLoop,
}

/// An edge with its computed weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedLink {
    pub child: StateId,
    pub weight: f64,
    pub kind: LinkKind,
}

/// An interpreter edge with its feature labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlink {
    pub child: StateId,
    pub features: FeatureDict,
}

/// Feature dictionary of a synthetic edge.
pub fn synthetic_features(name: &str) -> FeatureDict {
    [(Feature::new(name), 1.0)].into_iter().collect()
}

// ---------------------------------------------------------------------------
// State table
// ---------------------------------------------------------------------------

/// Interning arena for states: canonical state ↔ dense id.
#[derive(Debug, Default)]
pub struct StateTable {
    index: HashMap<Arc<State>, StateId>,
    states: Vec<Arc<State>>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a state; returns its id and whether it was new.
    pub fn intern(&mut self, state: State) -> (StateId, bool) {
        if let Some(&id) = self.index.get(&state) {
            return (id, false);
        }
        let id = self.states.len();
        let state = Arc::new(state);
        self.states.push(Arc::clone(&state));
        self.index.insert(state, id);
        (id, true)
    }

    pub fn get(&self, id: StateId) -> Option<&Arc<State>> {
        self.states.get(id)
    }

    pub fn id_of(&self, state: &State) -> Option<StateId> {
        self.index.get(state).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Keep only states mapped to `Some`, renumbered as given.
    ///
    /// `remap[old]` must enumerate `0..kept` in increasing order of old id.
    pub fn retain_remapped(&mut self, remap: &[Option<StateId>]) {
        let states = std::mem::take(&mut self.states);
        self.index.clear();
        for (old, state) in states.into_iter().enumerate() {
            if let Some(Some(new)) = remap.get(old) {
                debug_assert_eq!(*new, self.states.len());
                self.index.insert(Arc::clone(&state), *new);
                self.states.push(state);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graph contract
// ---------------------------------------------------------------------------

/// The interface provers walk.
pub trait ProofGraph: Send {
    /// Id of the start state (always 0).
    fn start(&self) -> StateId {
        0
    }

    fn state(&self, id: StateId) -> Option<&Arc<State>>;

    /// Id of an already interned state.
    fn id(&self, state: &State) -> Option<StateId>;

    /// Number of interned states.
    fn node_count(&self) -> usize;

    fn is_completed(&self, id: StateId) -> bool {
        self.state(id).is_some_and(|s| s.is_completed())
    }

    /// Out-degree of `id`, including synthetic edges. Expands `id` if needed.
    fn degree(&mut self, id: StateId, true_loop: bool) -> Result<usize, GraphError>;

    /// Interpreter edges of `id` with their features. Expands `id` if needed.
    fn outlinks(&mut self, id: StateId) -> Result<Vec<Outlink>, GraphError>;

    /// Every edge of `id` with its weight, synthetic edges last.
    fn weighted_outlinks(
        &mut self,
        id: StateId,
        weighter: &Weighter,
        true_loop: bool,
    ) -> Result<Vec<WeightedLink>, ProverError>;

    /// Whether `id` has been expanded.
    fn is_expanded(&self, id: StateId) -> bool;

    fn query(&self) -> &Arc<QueryProgram>;

    fn feature_table(&self) -> &Arc<FeatureTable>;

    fn kind(&self) -> GraphKind;

    fn constants(&self) -> &Arc<ConstantTable> {
        use crate::wam::Code;
        self.query().constants()
    }
}

/// Run the interpreter on `state` and intern its children.
///
/// A logic error makes the state a dead end: it is logged and no interpreter
/// children are returned.
pub(crate) fn expand_state(
    interpreter: &mut WamInterpreter,
    table: &mut StateTable,
    id: StateId,
) -> Result<Vec<Outlink>, GraphError> {
    let state = table
        .get(id)
        .cloned()
        .ok_or(GraphError::UnknownState {
            id,
            size: table.len(),
        })?;
    match interpreter.outlinks(&state) {
        Ok(children) => Ok(children
            .into_iter()
            .map(|outlink| {
                let (child, _) = table.intern(outlink.state);
                Outlink {
                    child,
                    features: outlink.features,
                }
            })
            .collect()),
        Err(error) => {
            tracing::warn!(state = id, %error, "expansion failed; treating state as a dead end");
            Ok(Vec::new())
        }
    }
}

/// Append the synthetic edges of `id` to `links`.
pub(crate) fn push_synthetic_links(
    links: &mut Vec<WeightedLink>,
    id: StateId,
    start: StateId,
    completed: bool,
    true_loop: bool,
    weighter: &Weighter,
) -> Result<(), ProverError> {
    if true_loop && completed {
        links.push(WeightedLink {
            child: id,
            weight: weighter.weight(&synthetic_features(TRUE_LOOP_FEATURE))?,
            kind: LinkKind::TrueLoop,
        });
    }
    links.push(WeightedLink {
        child: start,
        weight: weighter.weight(&synthetic_features(RESTART_FEATURE))?,
        kind: LinkKind::Restart,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Everything a graph needs besides its query.
#[derive(Debug, Clone)]
pub struct GraphContext {
    pub plugins: Arc<Vec<Arc<dyn WamPlugin>>>,
    pub features: Arc<FeatureTable>,
    pub limits: InterpreterLimits,
}

impl Default for GraphContext {
    fn default() -> Self {
        Self {
            plugins: Arc::new(Vec::new()),
            features: Arc::new(FeatureTable::new()),
            limits: InterpreterLimits::default(),
        }
    }
}

/// Builds proof graphs of one realization.
pub trait ProofGraphFactory {
    fn build(
        &self,
        query: Arc<QueryProgram>,
        context: &GraphContext,
    ) -> Result<AnyGraph, LogicProgramError>;
}

impl ProofGraphFactory for GraphKind {
    fn build(
        &self,
        query: Arc<QueryProgram>,
        context: &GraphContext,
    ) -> Result<AnyGraph, LogicProgramError> {
        Ok(match self {
            GraphKind::State => AnyGraph::State(StateProofGraph::new(query, context)?),
            GraphKind::CachingId => AnyGraph::CachingId(CachingIdProofGraph::new(query, context)?),
        })
    }
}

/// A proof graph of either realization.
#[derive(Debug)]
pub enum AnyGraph {
    State(StateProofGraph),
    CachingId(CachingIdProofGraph),
}

impl AnyGraph {
    pub fn as_caching_id(&mut self) -> Option<&mut CachingIdProofGraph> {
        match self {
            AnyGraph::CachingId(g) => Some(g),
            AnyGraph::State(_) => None,
        }
    }

    fn inner(&self) -> &dyn ProofGraph {
        match self {
            AnyGraph::State(g) => g,
            AnyGraph::CachingId(g) => g,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ProofGraph {
        match self {
            AnyGraph::State(g) => g,
            AnyGraph::CachingId(g) => g,
        }
    }
}

impl ProofGraph for AnyGraph {
    fn state(&self, id: StateId) -> Option<&Arc<State>> {
        self.inner().state(id)
    }

    fn id(&self, state: &State) -> Option<StateId> {
        self.inner().id(state)
    }

    fn node_count(&self) -> usize {
        self.inner().node_count()
    }

    fn degree(&mut self, id: StateId, true_loop: bool) -> Result<usize, GraphError> {
        self.inner_mut().degree(id, true_loop)
    }

    fn outlinks(&mut self, id: StateId) -> Result<Vec<Outlink>, GraphError> {
        self.inner_mut().outlinks(id)
    }

    fn weighted_outlinks(
        &mut self,
        id: StateId,
        weighter: &Weighter,
        true_loop: bool,
    ) -> Result<Vec<WeightedLink>, ProverError> {
        self.inner_mut().weighted_outlinks(id, weighter, true_loop)
    }

    fn is_expanded(&self, id: StateId) -> bool {
        self.inner().is_expanded(id)
    }

    fn query(&self) -> &Arc<QueryProgram> {
        self.inner().query()
    }

    fn feature_table(&self) -> &Arc<FeatureTable> {
        self.inner().feature_table()
    }

    fn kind(&self) -> GraphKind {
        self.inner().kind()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::wam::MutableState;

    #[test]
    fn state_table_dedups() {
        let mut table = StateTable::new();
        let a = MutableState::new(3).freeze();
        let b = MutableState::new(3).freeze();
        let c = MutableState::new(4).freeze();
        assert_eq!(table.intern(a), (0, true));
        assert_eq!(table.intern(b), (0, false));
        assert_eq!(table.intern(c), (1, true));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn retain_remapped_renumbers() {
        let mut table = StateTable::new();
        for pc in 0..3 {
            table.intern(MutableState::new(pc).freeze());
        }
        table.retain_remapped(&[Some(0), None, Some(1)]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).map(|s| s.pc()), Some(2));
        assert_eq!(table.id_of(&MutableState::new(2).freeze()), Some(1));
        assert_eq!(table.id_of(&MutableState::new(1).freeze()), None);
    }

    #[test]
    fn factory_builds_requested_kind() {
        let (query, context) = test_support::query(test_support::FRIENDS, "main(X)");
        let graph = GraphKind::State.build(Arc::clone(&query), &context).unwrap();
        assert_eq!(graph.kind(), GraphKind::State);
        let mut graph = GraphKind::CachingId.build(query, &context).unwrap();
        assert_eq!(graph.kind(), GraphKind::CachingId);
        assert!(graph.as_caching_id().is_some());
    }
}
