//! Benchmarks for the provers on a generated reachability program.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use proppr::config::{AprOptions, GraphKind, ProverConfig, ProverKind};
use proppr::engine::ProofEngine;

/// A ring of `n` nodes with a chord from every node to the one three ahead.
fn ring_program(n: usize) -> String {
    let mut program =
        String::from("reach(X,Y) :- edge(X,Y).\nreach(X,Y) :- edge(X,Z), reach(Z,Y).\n");
    for i in 0..n {
        program.push_str(&format!("edge(n{i},n{}).\n", (i + 1) % n));
        program.push_str(&format!("edge(n{i},n{}).\n", (i + 3) % n));
    }
    program
}

fn engine(prover: ProverKind) -> ProofEngine {
    let graph = if prover.requires_id_graph() {
        GraphKind::CachingId
    } else {
        GraphKind::State
    };
    let config = ProverConfig {
        prover,
        graph,
        apr: AprOptions::default().with_max_depth(8).with_epsilon(1e-4),
        ..Default::default()
    };
    ProofEngine::from_source(&ring_program(40), config).unwrap()
}

fn bench_prover(c: &mut Criterion, prover: ProverKind) {
    let engine = engine(prover);
    c.bench_function(&format!("{prover}_ring40"), |bench| {
        bench.iter(|| black_box(engine.solve("reach(n0,Y)").unwrap()))
    });
}

fn bench_ppr(c: &mut Criterion) {
    bench_prover(c, ProverKind::Ppr);
}

fn bench_dpr(c: &mut Criterion) {
    bench_prover(c, ProverKind::Dpr);
}

fn bench_id_dpr(c: &mut Criterion) {
    bench_prover(c, ProverKind::IdDpr);
}

fn bench_solve_all(c: &mut Criterion) {
    let engine = engine(ProverKind::IdDpr);
    let queries: Vec<String> = (0..16).map(|i| format!("reach(n{i},Y)")).collect();
    c.bench_function("id-dpr_solve_all_16", |bench| {
        bench.iter(|| black_box(engine.solve_all(&queries)))
    });
}

criterion_group!(benches, bench_ppr, bench_dpr, bench_id_dpr, bench_solve_all);
criterion_main!(benches);
