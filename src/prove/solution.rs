//! Reading answers off a proof result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{ProofGraph, StateId};
use crate::symbol::ConstantTable;
use crate::wam::{Argument, Binding, Code, Goal, State};

use super::ProofVector;

/// One answer to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// The query with its variables replaced by their bindings.
    pub goal: String,
    /// Named query variables and their values. Anonymous variables are left
    /// out; unbound ones read `_N`.
    pub bindings: BTreeMap<String, String>,
    /// Share of the mass on completed states.
    pub probability: f64,
    pub state: StateId,
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}\t{}", self.probability, self.goal)
    }
}

fn show(binding: Binding, constants: &ConstantTable) -> String {
    match binding {
        Binding::Constant(c) => constants.resolve(c),
        Binding::Free(i) => format!("_{i}"),
        Binding::Unset => "_".into(),
    }
}

fn ground(goal: &Goal, bindings: &BTreeMap<String, String>) -> String {
    let args: Vec<String> = goal
        .args
        .iter()
        .map(|arg| match arg {
            Argument::Variable(name) => bindings.get(name).cloned().unwrap_or_else(|| name.clone()),
            Argument::Constant(name) => name.clone(),
        })
        .collect();
    if args.is_empty() {
        goal.functor.clone()
    } else {
        format!("{}({})", goal.functor, args.join(","))
    }
}

fn solution(state: &State, id: StateId, var_names: &[String], goals: &[Goal], constants: &ConstantTable) -> Solution {
    let bindings: BTreeMap<String, String> = var_names
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.starts_with('_'))
        .map(|(register, name)| (name.clone(), show(state.resolve_register(register), constants)))
        .collect();
    let goal = goals
        .iter()
        .map(|g| ground(g, &bindings))
        .collect::<Vec<_>>()
        .join(", ");
    Solution {
        goal,
        bindings,
        probability: 0.0,
        state: id,
    }
}

/// Normalize `result` over completed states and list the answers, most
/// probable first (ties by goal text).
///
/// States that project onto the same goal (they differ only in anonymous
/// variables) form one answer carrying their summed probability; its
/// `state` is the member holding the most mass.
///
/// Returns nothing when no completed state holds mass.
pub fn solutions<G: ProofGraph + ?Sized>(graph: &G, result: &ProofVector) -> Vec<Solution> {
    let query = graph.query();
    let constants = query.constants();
    let goals = &query.query().goals;
    let mut by_goal: BTreeMap<String, (Solution, f64)> = BTreeMap::new();
    let mut total = 0.0;
    for (&id, &mass) in result {
        let Some(state) = graph.state(id) else {
            continue;
        };
        if !state.is_completed() || mass <= 0.0 {
            continue;
        }
        total += mass;
        let answer = solution(state, id, query.var_names(), goals, constants);
        match by_goal.get_mut(&answer.goal) {
            Some((merged, best)) => {
                merged.probability += mass;
                if mass > *best {
                    merged.state = id;
                    *best = mass;
                }
            }
            None => {
                let goal = answer.goal.clone();
                by_goal.insert(
                    goal,
                    (
                        Solution {
                            probability: mass,
                            ..answer
                        },
                        mass,
                    ),
                );
            }
        }
    }
    if total <= 0.0 {
        return Vec::new();
    }
    let mut answers: Vec<Solution> = by_goal
        .into_values()
        .map(|(mut answer, _)| {
            answer.probability /= total;
            answer
        })
        .collect();
    answers.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.goal.cmp(&b.goal))
    });
    answers
}
