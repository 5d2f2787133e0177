//! Persistence tests: configs and trained weights survive a save/load
//! cycle and drive an engine the same way afterwards.

use proppr::config::{AprOptions, GraphKind, ProverConfig, ProverKind};
use proppr::engine::ProofEngine;
use proppr::error::ConfigError;
use proppr::wam::WamProgram;
use proppr::weight::{ParamVector, SimpleParamVector};
use std::sync::Arc;

const PROGRAM: &str = "\
    main(X) :- friend(X) {via_friend}.\n\
    main(X) :- pal(X) {via_pal}.\n\
    friend(alice).\npal(bob).";

#[test]
fn config_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("prover.toml");
    let config = ProverConfig {
        prover: ProverKind::IdDpr,
        graph: GraphKind::CachingId,
        apr: AprOptions::default()
            .with_alpha(0.2)
            .with_epsilon(1e-5)
            .with_stop_early(3),
        squashing: "exp".into(),
        stay_probability: 0.5,
        max_tree_depth: Some(8),
        prune_hidden: vec!["helper/1".into()],
        ..Default::default()
    };

    // First session: save.
    config.save(&path).unwrap();

    // Second session: reload and verify.
    let loaded = ProverConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();
}

#[test]
fn hand_written_toml_fills_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("prover.toml");
    std::fs::write(&path, "prover = \"dfs\"\n\n[apr]\nmax_depth = 4\n").unwrap();

    let loaded = ProverConfig::load(&path).unwrap();
    assert_eq!(loaded.prover, ProverKind::Dfs);
    assert_eq!(loaded.apr.max_depth, 4);
    assert_eq!(loaded.apr.alpha, AprOptions::default().alpha);
    assert_eq!(loaded.graph, GraphKind::State);
}

#[test]
fn load_errors_name_the_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        ProverConfig::load(&missing),
        Err(ConfigError::Read { .. })
    ));

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "prover = [").unwrap();
    match ProverConfig::load(&broken) {
        Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("broken.toml")),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn weights_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("weights.json");
    let weights: SimpleParamVector = [("via_friend", 3.0), ("via_pal", 1.0)]
        .into_iter()
        .collect();
    weights.save(&path).unwrap();

    let loaded = SimpleParamVector::load(&path).unwrap();
    assert_eq!(loaded, weights);
    assert_eq!(loaded.get("via_friend"), Some(3.0));

    let engine = ProofEngine::new(
        Arc::new(WamProgram::parse(PROGRAM).unwrap()),
        Vec::new(),
        ProverConfig {
            prover: ProverKind::Ppr,
            ..Default::default()
        },
        Some(Arc::new(loaded)),
    )
    .unwrap();
    let answers = engine.solve("main(X)").unwrap();
    assert_eq!(answers[0].goal, "main(alice)");
    assert!((answers[0].probability - 0.75).abs() < 1e-9);
}

#[test]
fn weights_parse_from_json_text() {
    let weights = SimpleParamVector::from_json(r#"{"via_friend": 2.5, "via_pal": 0.5}"#).unwrap();
    assert_eq!(weights.len(), 2);
    assert_eq!(weights.get("via_pal"), Some(0.5));
    assert!(matches!(
        SimpleParamVector::from_json("{not json"),
        Err(ConfigError::Parse { .. })
    ));
}
