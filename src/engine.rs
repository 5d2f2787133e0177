//! Engine facade: the top-level API for proving queries.
//!
//! A [`ProofEngine`] owns the shared, immutable pieces of a proof (compiled
//! program, plugins, weighter, feature table) and hands each proof its own
//! graph and prover copy, so one engine serves many threads.

use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::config::ProverConfig;
use crate::error::{LogicProgramError, PprResult};
use crate::graph::{AnyGraph, GraphContext, ProofGraph, ProofGraphFactory, tree_view};
use crate::prove::{AnyProver, ProofVector, Prover, Solution, StatusLogger, solutions};
use crate::symbol::FeatureTable;
use crate::wam::{InterpreterLimits, QueryProgram, WamPlugin, WamProgram};
use crate::weight::{FeatureCounts, ParamVector, UnitVector, Weighter};

/// The proof engine.
pub struct ProofEngine {
    program: Arc<WamProgram>,
    context: GraphContext,
    config: ProverConfig,
    weighter: Arc<Weighter>,
    prover: AnyProver,
}

impl ProofEngine {
    /// Validate `config` and set up an engine. Without `params` every
    /// feature weighs 1.0.
    pub fn new(
        program: Arc<WamProgram>,
        plugins: Vec<Arc<dyn WamPlugin>>,
        config: ProverConfig,
        params: Option<Arc<dyn ParamVector>>,
    ) -> PprResult<Self> {
        let params = params.unwrap_or_else(|| Arc::new(UnitVector) as Arc<dyn ParamVector>);
        let weighter = Arc::new(config.weighter(params)?);
        let prover = AnyProver::from_config(&config, Arc::clone(&weighter));
        let context = GraphContext {
            plugins: Arc::new(plugins),
            features: Arc::new(FeatureTable::new()),
            limits: InterpreterLimits {
                max_steps_per_expansion: config.max_steps_per_expansion,
                max_call_stack: config.max_call_stack,
            },
        };
        tracing::info!(
            prover = %config.prover,
            graph = %config.graph,
            squashing = %config.squashing,
            alpha = config.apr.alpha,
            epsilon = config.apr.epsilon,
            max_depth = config.apr.max_depth,
            instructions = program.len(),
            plugins = context.plugins.len(),
            "initializing proof engine"
        );
        Ok(Self {
            program,
            context,
            config,
            weighter,
            prover,
        })
    }

    /// Parse `source` and build an engine over it.
    pub fn from_source(source: &str, config: ProverConfig) -> PprResult<Self> {
        let program = Arc::new(WamProgram::parse(source)?);
        Self::new(program, Vec::new(), config, None)
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    pub fn program(&self) -> &Arc<WamProgram> {
        &self.program
    }

    pub fn weighter(&self) -> &Arc<Weighter> {
        &self.weighter
    }

    /// Features seen by any proof so far.
    pub fn feature_table(&self) -> &Arc<FeatureTable> {
        &self.context.features
    }

    /// Known/unknown parameter lookups across every proof so far.
    pub fn feature_counts(&self) -> FeatureCounts {
        self.weighter.feature_counts()
    }

    /// Compile `query` against the program.
    pub fn compile(&self, query: &str) -> PprResult<Arc<QueryProgram>> {
        Ok(Arc::new(self.program.parse_query(query)?))
    }

    /// Build the configured proof graph for `query`, running it to its
    /// start state.
    pub fn build_graph(&self, query: &str) -> PprResult<AnyGraph> {
        let query = self.compile(query)?;
        Ok(self.config.graph.build(query, &self.context)?)
    }

    fn status(&self) -> StatusLogger {
        StatusLogger::new(Duration::from_millis(self.config.status_interval_ms))
    }

    /// Run a fresh copy of the configured prover on `graph`.
    pub fn prove(&self, graph: &mut AnyGraph) -> PprResult<ProofVector> {
        self.prove_with_status(graph, &mut self.status())
    }

    pub fn prove_with_status(
        &self,
        graph: &mut AnyGraph,
        status: &mut StatusLogger,
    ) -> PprResult<ProofVector> {
        let mut prover = self.prover.copy();
        Ok(prover.prove(graph, status)?)
    }

    /// The graph for `query`, or `None` when the query fails before its
    /// first branching call.
    fn graph_or_dead_end(&self, query: &str) -> PprResult<Option<AnyGraph>> {
        let compiled = self.compile(query)?;
        match self.config.graph.build(compiled, &self.context) {
            Ok(graph) => Ok(Some(graph)),
            Err(error) => {
                dead_start(query, &error);
                Ok(None)
            }
        }
    }

    /// Prove `query` and list its answers, most probable first.
    ///
    /// A query whose start state cannot be reached has no answers.
    pub fn solve(&self, query: &str) -> PprResult<Vec<Solution>> {
        let Some(mut graph) = self.graph_or_dead_end(query)? else {
            return Ok(Vec::new());
        };
        let result = self.prove(&mut graph)?;
        let answers = solutions(&graph, &result);
        tracing::debug!(
            query,
            states = graph.node_count(),
            answers = answers.len(),
            "solved query"
        );
        Ok(answers)
    }

    /// Solve every query in parallel, one graph and prover per query.
    /// Results come back in input order.
    pub fn solve_all<S: AsRef<str> + Sync>(&self, queries: &[S]) -> Vec<PprResult<Vec<Solution>>> {
        queries.par_iter().map(|q| self.solve(q.as_ref())).collect()
    }

    /// Prove `query` and render its proof graph from the configured trace
    /// root, `trace_depth` levels deep.
    pub fn explain(&self, query: &str) -> PprResult<String> {
        let Some(mut graph) = self.graph_or_dead_end(query)? else {
            return Ok(String::new());
        };
        self.prove(&mut graph)?;
        let apr = &self.config.apr;
        Ok(tree_view(&mut graph, apr.trace_depth, apr.trace_root)?)
    }
}

fn dead_start(query: &str, error: &LogicProgramError) {
    tracing::warn!(query, %error, "query failed before its first call; no answers");
}

impl std::fmt::Debug for ProofEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofEngine")
            .field("config", &self.config)
            .field("instructions", &self.program.len())
            .field("plugins", &self.context.plugins.len())
            .field("features", &self.context.features.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphKind, ProverKind};
    use crate::wam::{Code, FactsPlugin, Goal};
    use crate::weight::SimpleParamVector;

    const FRIENDS: &str = "main(X) :- friend(X).\nfriend(alice).\nfriend(bob).";

    fn engine(config: ProverConfig) -> ProofEngine {
        ProofEngine::from_source(FRIENDS, config).unwrap()
    }

    #[test]
    fn solves_with_default_config() {
        let answers = engine(ProverConfig::default()).solve("main(X)").unwrap();
        assert_eq!(answers.len(), 2);
        for answer in &answers {
            assert!((answer.probability - 0.5).abs() < 1e-2, "{answer}");
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ProverConfig {
            prover: ProverKind::IdDpr,
            ..Default::default()
        };
        assert!(ProofEngine::from_source(FRIENDS, config).is_err());
    }

    #[test]
    fn unknown_query_predicate_has_no_answers() {
        let answers = engine(ProverConfig::default()).solve("enemy(X)").unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn syntax_errors_surface() {
        assert!(engine(ProverConfig::default()).solve("main(X").is_err());
    }

    #[test]
    fn parameters_skew_answers() {
        let program = "main(X) :- friend(X) {via_friend}.\nmain(X) :- pal(X) {via_pal}.\nfriend(alice).\npal(bob).";
        let params: SimpleParamVector = [("via_friend", 3.0), ("via_pal", 1.0)].into_iter().collect();
        let engine = ProofEngine::new(
            Arc::new(WamProgram::parse(program).unwrap()),
            Vec::new(),
            ProverConfig {
                prover: ProverKind::Ppr,
                ..Default::default()
            },
            Some(Arc::new(params)),
        )
        .unwrap();
        let answers = engine.solve("main(X)").unwrap();
        assert_eq!(answers[0].goal, "main(alice)");
        assert!((answers[0].probability - 0.75).abs() < 1e-9);
        assert!(engine.feature_counts().known > 0);
    }

    #[test]
    fn plugins_supply_facts() {
        let program = Arc::new(WamProgram::parse("main(X) :- likes(X).").unwrap());
        let mut facts = FactsPlugin::new("likes", Arc::clone(program.constants()));
        facts.add_fact(&Goal::from_names("likes", &["tea"]), 1.0).unwrap();
        facts.add_fact(&Goal::from_names("likes", &["cake"]), 1.0).unwrap();
        let engine = ProofEngine::new(
            program,
            vec![Arc::new(facts)],
            ProverConfig::default(),
            None,
        )
        .unwrap();
        let answers = engine.solve("main(X)").unwrap();
        let goals: Vec<&str> = answers.iter().map(|a| a.goal.as_str()).collect();
        assert_eq!(goals.len(), 2);
        assert!(goals.contains(&"main(tea)") && goals.contains(&"main(cake)"));
    }

    #[test]
    fn solve_all_keeps_input_order() {
        let config = ProverConfig {
            prover: ProverKind::IdDpr,
            graph: GraphKind::CachingId,
            ..Default::default()
        };
        let engine = engine(config);
        let queries = ["main(X)", "friend(bob)", "main(carol)", "main(X"];
        let results = engine.solve_all(&queries);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().len(), 2);
        let bob = results[1].as_ref().unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].goal, "friend(bob)");
        assert!(results[2].as_ref().unwrap().is_empty());
        assert!(results[3].is_err());
    }

    #[test]
    fn explain_renders_the_proof_tree() {
        let mut config = ProverConfig::default();
        config.apr.trace_depth = 3;
        let tree = engine(config).explain("main(X)").unwrap();
        assert!(tree.starts_with("0: main("));
        assert!(tree.contains("done [alice]"));
    }
}
