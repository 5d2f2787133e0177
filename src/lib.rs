// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # proppr
//!
//! A small logic-programming engine that answers queries by running
//! personalized PageRank over lazily built proof graphs.
//!
//! ## Architecture
//!
//! - **WAM-lite** (`wam`): parser, clause compiler and abstract-machine
//!   interpreter for function-free logic programs, plus plugins
//! - **Proof graphs** (`graph`): canonicalized states, lazily expanded and
//!   cached, in map-keyed and id-indexed realizations, with pruning
//! - **Weighting** (`weight`): parameter vectors and squashing functions
//! - **Provers** (`prove`): PPR, DFS, DPR, priority-queue DPR, id-indexed
//!   variants and a pruning decorator
//! - **Engine** (`engine`): solves one query or many in parallel
//!
//! ## Library usage
//!
//! ```no_run
//! use proppr::config::ProverConfig;
//! use proppr::engine::ProofEngine;
//!
//! let program = "main(X) :- friend(X).\nfriend(alice).\nfriend(bob).";
//! let engine = ProofEngine::from_source(program, ProverConfig::default()).unwrap();
//! for answer in engine.solve("main(X)").unwrap() {
//!     println!("{answer}");
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod prove;
pub mod sparse;
pub mod symbol;
pub mod wam;
pub mod weight;

pub use config::{AprOptions, GraphKind, ProverConfig, ProverKind};
pub use engine::ProofEngine;
pub use error::{PprError, PprResult};
pub use prove::{AnyProver, ProofVector, Prover, Solution, StatusLogger};
pub use wam::{WamPlugin, WamProgram};
pub use weight::{SimpleParamVector, SquashingFunction, Weighter};
