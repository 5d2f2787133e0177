//! Property tests over randomly generated edge programs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use proppr::config::{AprOptions, GraphKind};
use proppr::graph::{
    AllVisible, CachingIdProofGraph, GraphContext, ProofGraph, ProofGraphFactory,
    StateProofGraph, serialize,
};
use proppr::prove::{
    DfsProver, DprProver, IdDprProver, PprProver, PriorityQueueProver, ProofVector, ProveProgress,
    Prover, ProverSettings, PruningProver, StatusLogger,
};
use proppr::wam::{QueryProgram, WamProgram};
use proppr::weight::Weighter;
use proptest::prelude::*;

/// A small directed graph over nodes `n0..n5`, written as facts plus a
/// reachability rule.
fn edge_program() -> impl Strategy<Value = String> {
    proptest::collection::vec((0usize..6, 0usize..6), 1..10).prop_map(|edges| {
        let mut program =
            String::from("reach(X,Y) :- edge(X,Y).\nreach(X,Y) :- edge(X,Z), reach(Z,Y).\n");
        for (a, b) in edges {
            program.push_str(&format!("edge(n{a},n{b}).\n"));
        }
        program
    })
}

fn compile(program: &str, query: &str) -> Arc<QueryProgram> {
    let program = Arc::new(WamProgram::parse(program).unwrap());
    Arc::new(program.parse_query(query).unwrap())
}

fn weighter() -> Arc<Weighter> {
    Arc::new(Weighter::uniform())
}

fn apr() -> AprOptions {
    AprOptions::default().with_max_depth(6).with_epsilon(1e-3)
}

/// A status logger that records every progress report.
fn recording() -> (StatusLogger, Arc<Mutex<Vec<ProveProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let status = StatusLogger::new(Duration::ZERO)
        .with_callback(move |p| sink.lock().unwrap().push(p.clone()));
    (status, seen)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ppr_conserves_mass(program in edge_program(), start in 0usize..6) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let mut graph = StateProofGraph::new(query, &GraphContext::default()).unwrap();
        let result = PprProver::new(ProverSettings::new(apr()), weighter())
            .prove(&mut graph, &mut StatusLogger::silent())
            .unwrap();
        let total: f64 = result.values().sum();
        prop_assert!((total - 1.0).abs() < 1e-9, "total {}", total);
    }

    #[test]
    fn push_provers_never_create_mass(program in edge_program(), start in 0usize..6, lazy in any::<bool>()) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let mut settings = ProverSettings::new(apr());
        if lazy {
            settings = settings.lazy();
        }
        let mut a = StateProofGraph::new(Arc::clone(&query), &GraphContext::default()).unwrap();
        let mut b = StateProofGraph::new(query, &GraphContext::default()).unwrap();
        let dpr = DprProver::new(settings, weighter())
            .prove(&mut a, &mut StatusLogger::silent())
            .unwrap();
        let queue = PriorityQueueProver::new(settings, weighter())
            .prove(&mut b, &mut StatusLogger::silent())
            .unwrap();
        for result in [dpr, queue] {
            let total: f64 = result.values().sum();
            prop_assert!(total <= 1.0 + 1e-9, "total {}", total);
            prop_assert!(result.values().all(|m| *m >= 0.0));
        }
    }

    #[test]
    fn push_provers_conserve_settled_plus_residual(program in edge_program(), start in 0usize..6, lazy in any::<bool>()) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let mut settings = ProverSettings::new(apr());
        if lazy {
            settings = settings.lazy();
        }
        let mut a = StateProofGraph::new(Arc::clone(&query), &GraphContext::default()).unwrap();
        let mut b = StateProofGraph::new(query, &GraphContext::default()).unwrap();
        let (mut dpr_status, dpr_seen) = recording();
        let (mut queue_status, queue_seen) = recording();
        let dpr = DprProver::new(settings, weighter())
            .prove(&mut a, &mut dpr_status)
            .unwrap();
        let queue = PriorityQueueProver::new(settings, weighter())
            .prove(&mut b, &mut queue_status)
            .unwrap();
        for (result, seen) in [(dpr, dpr_seen), (queue, queue_seen)] {
            let seen = seen.lock().unwrap();
            prop_assert!(!seen.is_empty());
            for report in seen.iter() {
                let total = report.settled_mass + report.residual_mass;
                prop_assert!((total - 1.0).abs() < 1e-9, "{}: p + r = {}", report.prover, total);
            }
            let last = seen.last().unwrap();
            let settled: f64 = result.values().sum();
            prop_assert!((settled - last.settled_mass).abs() < 1e-9);
        }
    }

    #[test]
    fn proofs_are_deterministic(program in edge_program(), start in 0usize..6) {
        let run = || -> (ProofVector, String) {
            let query = compile(&program, &format!("reach(n{start},Y)"));
            let mut graph = CachingIdProofGraph::new(query, &GraphContext::default()).unwrap();
            let result = IdDprProver::new(ProverSettings::new(apr()), weighter())
                .prove(&mut graph, &mut StatusLogger::silent())
                .unwrap();
            (result, serialize(&mut graph).unwrap())
        };
        let (first, first_dump) = run();
        let (second, second_dump) = run();
        prop_assert_eq!(first, second);
        prop_assert_eq!(first_dump, second_dump);
    }

    #[test]
    fn graph_realizations_agree(program in edge_program(), start in 0usize..6) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let context = GraphContext::default();
        let mut by_state = GraphKind::State.build(Arc::clone(&query), &context).unwrap();
        let mut by_id = GraphKind::CachingId.build(query, &context).unwrap();
        let settings = ProverSettings::new(apr());
        let a = PprProver::new(settings, weighter())
            .prove(&mut by_state, &mut StatusLogger::silent())
            .unwrap();
        let b = PprProver::new(settings, weighter())
            .prove(&mut by_id, &mut StatusLogger::silent())
            .unwrap();
        prop_assert_eq!(by_state.node_count(), by_id.node_count());
        prop_assert_eq!(a.len(), b.len());
        for ((ia, ma), (ib, mb)) in a.iter().zip(&b) {
            prop_assert_eq!(ia, ib);
            prop_assert!((ma - mb).abs() < 1e-12);
        }
    }

    #[test]
    fn interning_is_idempotent(program in edge_program(), start in 0usize..6) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let mut graph = StateProofGraph::new(query, &GraphContext::default()).unwrap();
        DfsProver::new(ProverSettings::new(apr()), weighter())
            .prove(&mut graph, &mut StatusLogger::silent())
            .unwrap();
        for id in 0..graph.node_count() {
            let state = Arc::clone(graph.state(id).unwrap());
            prop_assert_eq!(graph.id(&state), Some(id));
            let thawed = state.thaw().freeze();
            prop_assert_eq!(thawed.canonical_form(), state.canonical_form());
            prop_assert_eq!(graph.id(&thawed), Some(id));
        }
    }

    #[test]
    fn all_visible_pruning_changes_nothing(program in edge_program(), start in 0usize..6) {
        let query = compile(&program, &format!("reach(n{start},Y)"));
        let settings = ProverSettings::new(apr());
        let mut plain = CachingIdProofGraph::new(Arc::clone(&query), &GraphContext::default()).unwrap();
        let mut pruned = CachingIdProofGraph::new(query, &GraphContext::default()).unwrap();
        let expected = IdDprProver::new(settings, weighter())
            .prove(&mut plain, &mut StatusLogger::silent())
            .unwrap();
        let result = PruningProver::new(
            IdDprProver::new(settings, weighter()),
            Arc::new(AllVisible),
            weighter(),
        )
        .prove(&mut pruned, &mut StatusLogger::silent())
        .unwrap();
        prop_assert_eq!(result, expected);
        prop_assert_eq!(serialize(&mut pruned).unwrap(), serialize(&mut plain).unwrap());
    }
}
