//! Plugins: predicates resolved outside the compiled program.
//!
//! A plugin claims labels (`functor/arity`) and, for a state calling one of
//! them, produces outlinks directly instead of running clause code.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::LogicProgramError;
use crate::symbol::{ConstantTable, Feature};
use crate::weight::FeatureDict;

use super::goal::{Argument, Goal};
use super::instruction::Label;
use super::interpreter::{WamInterpreter, WamOutlink};
use super::state::{Binding, State};

/// An external predicate source.
pub trait WamPlugin: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Whether this plugin resolves calls to `label`.
    fn claims(&self, label: &Label) -> bool;

    /// Continuations of `state`, whose pending call is claimed by this plugin.
    ///
    /// Implementations use the interpreter's plugin helpers
    /// ([`WamInterpreter::restore`], [`WamInterpreter::unify_constant`],
    /// [`WamInterpreter::finish_call`]) to build each child.
    fn outlinks(
        &self,
        state: &State,
        interpreter: &mut WamInterpreter,
    ) -> Result<Vec<WamOutlink>, LogicProgramError>;
}

#[derive(Debug, Clone, PartialEq)]
struct Fact {
    args: Vec<usize>,
    weight: f64,
}

/// Weighted ground facts, e.g. `friend(alice) = 0.7`.
///
/// Each matching fact yields one outlink labelled `db(<functor>/<arity>)`
/// with the fact's weight as the feature value.
#[derive(Debug, Clone)]
pub struct FactsPlugin {
    name: String,
    constants: Arc<ConstantTable>,
    facts: BTreeMap<Label, Vec<Fact>>,
}

impl FactsPlugin {
    /// A plugin interning its constants into the program's table.
    pub fn new(name: impl Into<String>, constants: Arc<ConstantTable>) -> Self {
        Self {
            name: name.into(),
            constants,
            facts: BTreeMap::new(),
        }
    }

    /// Add a ground fact.
    pub fn add_fact(&mut self, goal: &Goal, weight: f64) -> Result<(), LogicProgramError> {
        let mut args = Vec::with_capacity(goal.arity());
        for arg in &goal.args {
            match arg {
                Argument::Constant(c) => args.push(self.constants.intern(c.clone())),
                Argument::Variable(v) => {
                    return Err(LogicProgramError::MalformedState {
                        message: format!("fact {goal} is not ground (variable {v})"),
                    });
                }
            }
        }
        self.facts
            .entry(Label::new(&goal.functor, goal.arity()))
            .or_default()
            .push(Fact { args, weight });
        Ok(())
    }

    /// Number of stored facts.
    pub fn len(&self) -> usize {
        self.facts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The feature reported for matches of `label`.
    pub fn feature(label: &Label) -> Feature {
        Feature::new(format!("db({label})"))
    }
}

impl WamPlugin for FactsPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn claims(&self, label: &Label) -> bool {
        self.facts.contains_key(label)
    }

    fn outlinks(
        &self,
        state: &State,
        interpreter: &mut WamInterpreter,
    ) -> Result<Vec<WamOutlink>, LogicProgramError> {
        let Some(label) = state.jump_to() else {
            return Ok(Vec::new());
        };
        let Some(facts) = self.facts.get(label) else {
            return Ok(Vec::new());
        };

        interpreter.restore(state);
        let mut bound = Vec::with_capacity(label.arity);
        for position in 0..label.arity {
            bound.push(match interpreter.pending_arg(position)? {
                Binding::Constant(c) => Some(c),
                Binding::Free(_) | Binding::Unset => None,
            });
        }
        let feature = Self::feature(label);

        let mut out = Vec::new();
        for fact in facts {
            let matches = fact
                .args
                .iter()
                .zip(&bound)
                .all(|(arg, b)| b.is_none_or(|c| c == *arg));
            if !matches {
                continue;
            }
            interpreter.restore(state);
            let indices = interpreter.pending_args(label.arity)?;
            let unified = indices
                .iter()
                .zip(&fact.args)
                .all(|(&index, &constant)| interpreter.unify_constant(index, constant));
            if !unified {
                continue;
            }
            let features: FeatureDict = [(feature.clone(), fact.weight)].into_iter().collect();
            if let Some(outlink) = interpreter.finish_call(features)? {
                out.push(outlink);
            }
        }
        Ok(out)
    }
}
