//! Map-keyed proof graph: outlinks cached as feature dictionaries per state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GraphKind;
use crate::error::{GraphError, LogicProgramError, ProverError};
use crate::symbol::FeatureTable;
use crate::wam::{QueryProgram, State, WamInterpreter};
use crate::weight::Weighter;

use super::{
    GraphContext, LinkKind, Outlink, ProofGraph, StateId, StateTable, WeightedLink, expand_state,
    push_synthetic_links,
};

/// A proof graph caching each state's outlinks with their feature dictionaries.
#[derive(Debug)]
pub struct StateProofGraph {
    query: Arc<QueryProgram>,
    interpreter: WamInterpreter,
    states: StateTable,
    cache: HashMap<StateId, Vec<Outlink>>,
    features: Arc<FeatureTable>,
}

impl StateProofGraph {
    /// Build the graph, running the query to its start state.
    pub fn new(query: Arc<QueryProgram>, context: &GraphContext) -> Result<Self, LogicProgramError> {
        let mut interpreter = WamInterpreter::new(Arc::clone(&query), Arc::clone(&context.plugins))
            .with_limits(context.limits);
        let start = interpreter.start_state()?;
        let mut states = StateTable::new();
        states.intern(start);
        Ok(Self {
            query,
            interpreter,
            states,
            cache: HashMap::new(),
            features: Arc::clone(&context.features),
        })
    }

    /// Cached outlinks of `id`, expanding it on first access.
    fn expanded(&mut self, id: StateId) -> Result<&[Outlink], GraphError> {
        if !self.cache.contains_key(&id) {
            let outlinks = expand_state(&mut self.interpreter, &mut self.states, id)?;
            for outlink in &outlinks {
                for feature in outlink.features.keys() {
                    self.features.intern(feature.clone());
                }
            }
            self.cache.insert(id, outlinks);
        }
        Ok(self.cache.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }
}

impl ProofGraph for StateProofGraph {
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
        let derived = self.expanded(id)?.len();
        let looped = true_loop && self.is_completed(id);
        Ok(derived + 1 + usize::from(looped))
    }

    fn outlinks(&mut self, id: StateId) -> Result<Vec<Outlink>, GraphError> {
        Ok(self.expanded(id)?.to_vec())
    }

    fn weighted_outlinks(
        &mut self,
        id: StateId,
        weighter: &Weighter,
        true_loop: bool,
    ) -> Result<Vec<WeightedLink>, ProverError> {
        let completed = self.is_completed(id);
        let start = self.start();
        let derived = self.expanded(id)?;
        let mut links = Vec::with_capacity(derived.len() + 2);
        for outlink in derived {
            links.push(WeightedLink {
                child: outlink.child,
                weight: weighter.weight(&outlink.features)?,
                kind: LinkKind::Derived,
            });
        }
        push_synthetic_links(&mut links, id, start, completed, true_loop, weighter)?;
        Ok(links)
    }

    fn is_expanded(&self, id: StateId) -> bool {
        self.cache.contains_key(&id)
    }

    fn query(&self) -> &Arc<QueryProgram> {
        &self.query
    }

    fn feature_table(&self) -> &Arc<FeatureTable> {
        &self.features
    }

    fn kind(&self) -> GraphKind {
        GraphKind::State
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{FRIENDS, query};

    fn graph(program: &str, q: &str) -> StateProofGraph {
        let (query, context) = query(program, q);
        StateProofGraph::new(query, &context).unwrap()
    }

    #[test]
    fn expands_lazily_and_once() {
        let mut g = graph(FRIENDS, "main(X)");
        assert_eq!(g.node_count(), 1);
        assert!(!g.is_expanded(0));

        let children = g.outlinks(0).unwrap();
        assert_eq!(children.len(), 1);
        assert!(g.is_expanded(0));
        let nodes = g.node_count();
        g.outlinks(0).unwrap();
        assert_eq!(g.node_count(), nodes);

        let answers = g.outlinks(children[0].child).unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().all(|o| g.is_completed(o.child)));
    }

    #[test]
    fn unbound_feature_arguments_ignore_heap_layout() {
        // The same clause reached with the free variable at heap index 1
        // and at heap index 0.
        let program = "t(A,X) :- q(X) {f(X)}.\nu(X) :- q(X) {f(X)}.\nq(a).";
        for q in ["t(k,Y)", "u(Y)"] {
            let mut g = graph(program, q);
            let out = g.outlinks(0).unwrap();
            assert_eq!(out.len(), 1, "{q}");
            let names: Vec<String> = out[0].features.keys().map(|f| f.to_string()).collect();
            assert_eq!(names, vec!["f(_0)".to_string()], "{q}");
        }
    }

    #[test]
    fn synthetic_edges_are_appended() {
        let mut g = graph(FRIENDS, "main(X)");
        let weighter = Weighter::uniform();
        let links = g.weighted_outlinks(0, &weighter, true).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].kind, LinkKind::Restart);
        assert_eq!(links[1].child, 0);

        let mid = links[0].child;
        let answers: Vec<StateId> = g
            .outlinks(mid)
            .unwrap()
            .into_iter()
            .map(|o| o.child)
            .collect();
        let done = g.weighted_outlinks(answers[0], &weighter, true).unwrap();
        assert_eq!(
            done.iter().map(|l| l.kind).collect::<Vec<_>>(),
            vec![LinkKind::TrueLoop, LinkKind::Restart]
        );
        assert_eq!(g.degree(answers[0], true).unwrap(), 2);
        assert_eq!(g.degree(answers[0], false).unwrap(), 1);
        assert!(g.feature_table().id_of("id(defaultRule)").is_some());
    }

    #[test]
    fn identical_answers_merge() {
        // Two derivations of the same answer end in one completed state.
        let mut g = graph("p(X) :- q(X).\np(X) :- r(X).\nq(a).\nr(a).", "p(Y)");
        let children = g.outlinks(0).unwrap();
        assert_eq!(children.len(), 2);
        assert_ne!(children[0].child, children[1].child);
        let via_q = g.outlinks(children[0].child).unwrap();
        let via_r = g.outlinks(children[1].child).unwrap();
        assert_eq!(via_q.len(), 1);
        assert_eq!(via_q[0].child, via_r[0].child);
        assert!(g.is_completed(via_q[0].child));
        assert_eq!(g.node_count(), 4);
    }

    #[test]
    fn logic_error_is_a_dead_end() {
        let mut g = graph("main(X) :- missing(X).", "main(X)");
        let mid = g.outlinks(0).unwrap()[0].child;
        assert!(g.outlinks(mid).unwrap().is_empty());
        let links = g.weighted_outlinks(mid, &Weighter::uniform(), true).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::Restart);
    }

    #[test]
    fn unknown_state_is_an_error() {
        let mut g = graph(FRIENDS, "main(X)");
        assert!(matches!(
            g.outlinks(42),
            Err(GraphError::UnknownState { id: 42, .. })
        ));
    }
}
