//! End-to-end tests for the proof engine.
//!
//! These run whole queries through parsing, compilation, graph expansion,
//! proving and answer extraction for every prover configuration.

use std::sync::Arc;

use proppr::config::{AprOptions, GraphKind, ProverConfig, ProverKind};
use proppr::engine::ProofEngine;
use proppr::graph::{GraphExport, ProofGraph, serialize};
use proppr::prove::{ProveProgress, StatusLogger};
use proppr::wam::{Code, FactsPlugin, Goal, WamProgram};
use proppr::weight::SimpleParamVector;

const FRIENDS: &str = "main(X) :- friend(X).\nfriend(alice).\nfriend(bob).";

/// Route engine logs to the test harness; set `RUST_LOG=proppr=debug` to see
/// per-state traces.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn config(prover: ProverKind) -> ProverConfig {
    let graph = if prover.requires_id_graph() {
        GraphKind::CachingId
    } else {
        GraphKind::State
    };
    ProverConfig {
        prover,
        graph,
        apr: AprOptions::default().with_max_depth(5),
        ..Default::default()
    }
}

fn probability(engine: &ProofEngine, query: &str, goal: &str) -> f64 {
    engine
        .solve(query)
        .unwrap()
        .into_iter()
        .find(|s| s.goal == goal)
        .map_or(0.0, |s| s.probability)
}

#[test]
fn friends_split_evenly_under_ppr_and_dpr() {
    for prover in [ProverKind::Ppr, ProverKind::Dpr] {
        let engine = ProofEngine::from_source(FRIENDS, config(prover)).unwrap();
        let alice = probability(&engine, "main(X)", "main(alice)");
        let bob = probability(&engine, "main(X)", "main(bob)");
        assert!((alice - 0.5).abs() < 1e-2, "{prover}: alice {alice}");
        assert!((bob - 0.5).abs() < 1e-2, "{prover}: bob {bob}");
    }
}

#[test]
fn every_prover_finds_both_answers() {
    for prover in ProverKind::ALL {
        let engine = ProofEngine::from_source(FRIENDS, config(prover)).unwrap();
        let answers = engine.solve("main(X)").unwrap();
        let goals: Vec<&str> = answers.iter().map(|a| a.goal.as_str()).collect();
        assert_eq!(goals.len(), 2, "{prover}");
        assert!(goals.contains(&"main(alice)"), "{prover}");
        assert!(goals.contains(&"main(bob)"), "{prover}");
    }
}

#[test]
fn recursive_programs_terminate() {
    init_tracing();
    let program = "\
        path(X,Y) :- edge(X,Y).\n\
        path(X,Y) :- edge(X,Z), path(Z,Y).\n\
        edge(a,b).\nedge(b,c).\nedge(c,a).";
    for prover in ProverKind::ALL {
        let engine = ProofEngine::from_source(program, config(prover)).unwrap();
        let answers = engine.solve("path(a,Y)").unwrap();
        assert!(!answers.is_empty(), "{prover}");
        let total: f64 = answers.iter().map(|a| a.probability).sum();
        assert!((total - 1.0).abs() < 1e-9, "{prover}: {total}");
        assert!(answers.iter().all(|a| a.goal.starts_with("path(a,")));
    }
}

#[test]
fn trained_weights_shift_probability() {
    let program = "\
        likes(X,Y) :- friend(X,Y) {by_friend}.\n\
        likes(X,Y) :- colleague(X,Y) {by_colleague}.\n\
        friend(ann,bea).\ncolleague(ann,cid).";
    let params: SimpleParamVector = [("by_friend", 4.0), ("by_colleague", 1.0)]
        .into_iter()
        .collect();
    let engine = ProofEngine::new(
        Arc::new(WamProgram::parse(program).unwrap()),
        Vec::new(),
        config(ProverKind::Ppr),
        Some(Arc::new(params)),
    )
    .unwrap();
    let answers = engine.solve("likes(ann,Y)").unwrap();
    assert_eq!(answers[0].goal, "likes(ann,bea)");
    assert!((answers[0].probability - 0.8).abs() < 1e-9);
    assert_eq!(answers[1].bindings["Y"], "cid");
}

#[test]
fn plugin_facts_carry_their_weights() {
    let program = Arc::new(WamProgram::parse("main(X) :- rated(X).").unwrap());
    let mut facts = FactsPlugin::new("ratings", Arc::clone(program.constants()));
    facts
        .add_fact(&Goal::from_names("rated", &["good"]), 3.0)
        .unwrap();
    facts
        .add_fact(&Goal::from_names("rated", &["fair"]), 1.0)
        .unwrap();
    let engine =
        ProofEngine::new(program, vec![Arc::new(facts)], config(ProverKind::Ppr), None).unwrap();
    let good = probability(&engine, "main(X)", "main(good)");
    assert!((good - 0.75).abs() < 1e-9, "{good}");
}

#[test]
fn builtins_filter_answers() {
    let program = "\
        other(X,Y) :- person(X), person(Y), neq(X,Y).\n\
        person(ann).\nperson(bob).";
    let engine = ProofEngine::from_source(program, config(ProverKind::Ppr)).unwrap();
    let answers = engine.solve("other(ann,Y)").unwrap();
    let goals: Vec<&str> = answers.iter().map(|a| a.goal.as_str()).collect();
    assert_eq!(goals, vec!["other(ann,bob)"]);
}

#[test]
fn answers_differing_only_in_anonymous_variables_merge() {
    let program = "pair(a,b).\npair(a,c).";
    for prover in [ProverKind::Ppr, ProverKind::Dpr] {
        let engine = ProofEngine::from_source(program, config(prover)).unwrap();
        let answers = engine.solve("pair(X,_)").unwrap();
        assert_eq!(answers.len(), 1, "{prover}");
        assert_eq!(answers[0].goal, "pair(a,_)");
        assert!((answers[0].probability - 1.0).abs() < 1e-9, "{prover}");
    }
}

#[test]
fn pruning_hides_helper_predicates() {
    init_tracing();
    let program = "\
        main(X) :- helper(X).\n\
        helper(X) :- friend(X).\n\
        friend(alice).\nfriend(bob).";
    let config = ProverConfig {
        prune_hidden: vec!["helper/1".into()],
        ..config(ProverKind::IdDpr)
    };
    let engine = ProofEngine::from_source(program, config).unwrap();
    let answers = engine.solve("main(X)").unwrap();
    assert_eq!(answers.len(), 2);
    for answer in &answers {
        assert!((answer.probability - 0.5).abs() < 1e-2, "{answer}");
    }
}

#[test]
fn solve_all_matches_sequential_solving() {
    let engine = ProofEngine::from_source(FRIENDS, config(ProverKind::Dpr)).unwrap();
    let queries: Vec<String> = ["main(X)", "friend(X)", "friend(alice)", "main(zed)"]
        .iter()
        .cycle()
        .take(16)
        .map(|q| q.to_string())
        .collect();
    let parallel = engine.solve_all(&queries);
    for (query, result) in queries.iter().zip(parallel) {
        assert_eq!(result.unwrap(), engine.solve(query).unwrap(), "{query}");
    }
}

#[test]
fn status_callback_sees_progress() {
    init_tracing();
    let engine = ProofEngine::from_source(FRIENDS, config(ProverKind::Dpr)).unwrap();
    let mut graph = engine.build_graph("main(X)").unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::<ProveProgress>::new()));
    let sink = Arc::clone(&seen);
    let mut status = StatusLogger::new(std::time::Duration::ZERO)
        .with_callback(move |p| sink.lock().unwrap().push(p.clone()));
    engine.prove_with_status(&mut graph, &mut status).unwrap();
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|p| p.prover == "dpr"));
    let last = seen.last().unwrap();
    assert!((last.settled_mass + last.residual_mass - 1.0).abs() < 1e-9);
}

#[test]
fn graph_dump_and_export_agree() {
    let engine = ProofEngine::from_source(FRIENDS, config(ProverKind::Ppr)).unwrap();
    let mut graph = engine.build_graph("main(X)").unwrap();
    engine.prove(&mut graph).unwrap();
    let dump = serialize(&mut graph).unwrap();
    let export = GraphExport::from_graph(&mut graph).unwrap();
    let fields: Vec<&str> = dump.split('\t').collect();
    assert_eq!(fields[0], graph.node_count().to_string());
    assert_eq!(fields[1], export.edges.len().to_string());
    assert_eq!(export.nodes.iter().filter(|n| n.completed).count(), 2);
}
