//! Rich diagnostic error types for the prover core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly which predicate,
//! option, or state went wrong.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum PprError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Logic(#[from] LogicProgramError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Weight(#[from] WeightError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Logic program errors
// ---------------------------------------------------------------------------

/// Errors raised while compiling or executing a logic program.
///
/// During proving these are recoverable: the proof graph turns a failed
/// expansion into a dead-end state instead of aborting the whole proof.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LogicProgramError {
    #[error("unknown predicate {label}")]
    #[diagnostic(
        code(proppr::logic::unknown_predicate),
        help(
            "No clause, plugin, or builtin defines this predicate. \
             Check the functor spelling and arity, or load the plugin that provides it."
        )
    )]
    UnknownPredicate { label: String },

    #[error("register {register} read before it was bound (pc {pc})")]
    #[diagnostic(
        code(proppr::logic::unbound_register),
        help("The compiled program reads a variable that was never initialized. This is a compiler bug or a hand-built program error.")
    )]
    UnboundRegister { register: usize, pc: usize },

    #[error("instruction address {pc} is outside the program")]
    #[diagnostic(
        code(proppr::logic::invalid_address),
        help("Execution ran off the end of the program. Every clause must end with a return.")
    )]
    InvalidAddress { pc: usize },

    #[error("heap reference {index} is outside the heap (size {size})")]
    #[diagnostic(
        code(proppr::logic::invalid_heap_reference),
        help("An argument offset points below the bottom of the heap. The caller pushed fewer arguments than the callee expects.")
    )]
    InvalidHeapReference { index: isize, size: usize },

    #[error("builtin {builtin} precondition violated: {message}")]
    #[diagnostic(
        code(proppr::logic::builtin_precondition),
        help("Builtins compare ground values. Make sure every argument is bound before the builtin is called.")
    )]
    BuiltinPrecondition { builtin: String, message: String },

    #[error("expansion exceeded {limit} interpreter steps")]
    #[diagnostic(
        code(proppr::logic::step_limit),
        help("A deterministic chain of builtins or returns did not reach a branching point. Raise `max_steps_per_expansion` or check for a runaway rule.")
    )]
    StepLimitExceeded { limit: usize },

    #[error("call stack overflow: depth {limit} reached calling {label}")]
    #[diagnostic(
        code(proppr::logic::stack_overflow),
        help("The proof recursed deeper than `max_call_stack` frames. Check for left recursion or raise the limit.")
    )]
    CallStackOverflow { limit: usize, label: String },

    #[error("feature variable {variable} in rule for {label} is not bound by the head")]
    #[diagnostic(
        code(proppr::logic::unbound_feature_variable),
        help("Features are reported right after head unification, so every variable in a feature must appear in the rule head.")
    )]
    UnboundFeatureVariable { variable: String, label: String },

    #[error("malformed state: {message}")]
    #[diagnostic(
        code(proppr::logic::malformed_state),
        help("Outlinks can only be computed for states produced by the interpreter at a branching point.")
    )]
    MalformedState { message: String },
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors from reading rules and queries.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    #[diagnostic(
        code(proppr::parse::syntax),
        help("Rules look like `head(X) :- body(X,Y), other(Y) {{feature(X)}}.` and end with a period.")
    )]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("empty query")]
    #[diagnostic(
        code(proppr::parse::empty_query),
        help("A query needs at least one goal, e.g. `main(X)`.")
    )]
    EmptyQuery,
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

/// Errors from proof graph bookkeeping.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum GraphError {
    #[error("state {id} is not in the proof graph (size {size})")]
    #[diagnostic(
        code(proppr::graph::unknown_state),
        help("State ids are only valid for the graph that issued them, and are renumbered by pruning.")
    )]
    UnknownState { id: usize, size: usize },

    #[error("result vector has {len} entries but the graph has {size} states")]
    #[diagnostic(
        code(proppr::graph::result_mismatch),
        help("Pass the result vector produced for this graph, before any other prune.")
    )]
    ResultMismatch { len: usize, size: usize },
}

// ---------------------------------------------------------------------------
// Weighting errors
// ---------------------------------------------------------------------------

/// Numerical problems with edge weights.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum WeightError {
    #[error("illegal edge weight {weight} for features {features}")]
    #[diagnostic(
        code(proppr::weight::illegal),
        help(
            "Edge weights must be finite and nonnegative. Check the parameter vector for \
             NaN or huge values, or pick a squashing function that cannot go negative."
        )
    )]
    IllegalWeight { weight: f64, features: String },
}

// ---------------------------------------------------------------------------
// Prover errors
// ---------------------------------------------------------------------------

/// Usage errors and fatal numerical conditions raised by provers.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ProverError {
    #[error("{prover} prover is already mid-proof")]
    #[diagnostic(
        code(proppr::prover::reentrant),
        help(
            "Provers keep per-proof state and are not reentrant. A previous proof on this \
             instance was abandoned before it finished; use `copy()` to get a fresh prover, \
             one per thread."
        )
    )]
    Reentrant { prover: &'static str },

    #[error("alpha {alpha} is below the minimum {min_alpha} for epsilon {epsilon}")]
    #[diagnostic(
        code(proppr::prover::min_alpha),
        help("Push-based provers need alpha >= epsilon. Raise alpha or lower epsilon.")
    )]
    MinAlpha {
        alpha: f64,
        min_alpha: f64,
        epsilon: f64,
    },

    #[error("{prover} prover cannot run on a {graph} proof graph")]
    #[diagnostic(
        code(proppr::prover::graph_mismatch),
        help("Id-indexed and pruning provers need the caching-id proof graph. Set `graph = \"caching-id\"`.")
    )]
    GraphMismatch {
        prover: &'static str,
        graph: &'static str,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Weight(#[from] WeightError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors detected before any proof starts.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown squashing function: {name}")]
    #[diagnostic(
        code(proppr::config::unknown_squashing_function),
        help("Valid squashing functions are: linear, exp, clipped-exp, sigmoid, relu, tanh1.")
    )]
    UnknownSquashingFunction { name: String },

    #[error("unknown prover: {name}")]
    #[diagnostic(
        code(proppr::config::unknown_prover),
        help("Valid provers are: ppr, dfs, dpr, priority-queue, id-ppr, id-dpr.")
    )]
    UnknownProver { name: String },

    #[error("invalid option {option}: {message}")]
    #[diagnostic(code(proppr::config::invalid_option), help("Check the prover configuration. {message}"))]
    InvalidOption { option: String, message: String },

    #[error("feature counting is enabled but no feature weights were loaded")]
    #[diagnostic(
        code(proppr::config::missing_feature_weights),
        help("Load a parameter vector before proving, or disable `count_features`.")
    )]
    MissingFeatureWeights,

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(proppr::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(proppr::config::parse),
        help("Check the TOML syntax and the option names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(proppr::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning crate results.
pub type PprResult<T> = std::result::Result<T, PprError>;
