//! Terms of the rule language: arguments, goals, rules, and queries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A goal argument: a constant or a variable.
///
/// Names starting with an uppercase letter or `_` are variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Argument {
    Constant(String),
    Variable(String),
}

impl Argument {
    /// Classify a name by the variable naming convention.
    pub fn parse(name: &str) -> Self {
        if is_variable_name(name) {
            Argument::Variable(name.to_string())
        } else {
            Argument::Constant(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Argument::Constant(n) | Argument::Variable(n) => n,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Argument::Variable(_))
    }
}

/// Whether `name` denotes a variable (uppercase-leading or `_`-leading).
pub fn is_variable_name(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_uppercase() || c == '_')
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A functor applied to arguments, e.g. `friend(X, bob)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Goal {
    pub functor: String,
    pub args: Vec<Argument>,
}

impl Goal {
    pub fn new(functor: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            functor: functor.into(),
            args,
        }
    }

    /// Build a goal from argument names, classifying each by case.
    pub fn from_names(functor: impl Into<String>, names: &[&str]) -> Self {
        Self::new(functor, names.iter().map(|n| Argument::parse(n)).collect())
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// The `functor/arity` key used to resolve the goal.
    pub fn label(&self) -> String {
        format!("{}/{}", self.functor, self.arity())
    }

    /// Whether every argument is a constant.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|a| !a.is_variable())
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.functor)?;
        if !self.args.is_empty() {
            let args: Vec<&str> = self.args.iter().map(Argument::name).collect();
            write!(f, "({})", args.join(","))?;
        }
        Ok(())
    }
}

/// A clause: `head :- body {features}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Goal,
    pub body: Vec<Goal>,
    pub features: Vec<Goal>,
}

impl Rule {
    pub fn new(head: Goal, body: Vec<Goal>, features: Vec<Goal>) -> Self {
        Self {
            head,
            body,
            features,
        }
    }

    /// A unit clause with no body and no features.
    pub fn fact(head: Goal) -> Self {
        Self::new(head, Vec::new(), Vec::new())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            let body: Vec<String> = self.body.iter().map(Goal::to_string).collect();
            write!(f, " :- {}", body.join(", "))?;
        }
        if !self.features.is_empty() {
            let features: Vec<String> = self.features.iter().map(Goal::to_string).collect();
            write!(f, " {{{}}}", features.join(", "))?;
        }
        f.write_str(".")
    }
}

/// A query: a conjunction of goals whose variables are to be solved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub goals: Vec<Goal>,
}

impl Query {
    pub fn new(goals: Vec<Goal>) -> Self {
        Self { goals }
    }

    pub fn single(goal: Goal) -> Self {
        Self { goals: vec![goal] }
    }

    /// Variable names in first-occurrence order.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for arg in self.goals.iter().flat_map(|g| g.args.iter()) {
            if let Argument::Variable(name) = arg {
                if name != "_" && !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }
        seen
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let goals: Vec<String> = self.goals.iter().map(Goal::to_string).collect();
        f.write_str(&goals.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_case_convention() {
        assert!(Argument::parse("X").is_variable());
        assert!(Argument::parse("_tmp").is_variable());
        assert!(!Argument::parse("alice").is_variable());
        assert!(!Argument::parse("42").is_variable());
    }

    #[test]
    fn goal_label_and_display() {
        let g = Goal::from_names("friend", &["X", "bob"]);
        assert_eq!(g.label(), "friend/2");
        assert_eq!(g.to_string(), "friend(X,bob)");
        assert!(!g.is_ground());
        assert_eq!(Goal::from_names("halt", &[]).to_string(), "halt");
    }

    #[test]
    fn rule_display_round_trips_syntax() {
        let rule = Rule::new(
            Goal::from_names("main", &["X"]),
            vec![Goal::from_names("friend", &["X"])],
            vec![Goal::from_names("via", &["friend"])],
        );
        assert_eq!(rule.to_string(), "main(X) :- friend(X) {via(friend)}.");
    }

    #[test]
    fn query_variables_in_order() {
        let q = Query::new(vec![
            Goal::from_names("p", &["Y", "X"]),
            Goal::from_names("q", &["X", "Z", "_"]),
        ]);
        assert_eq!(q.variables(), vec!["Y", "X", "Z"]);
    }
}
