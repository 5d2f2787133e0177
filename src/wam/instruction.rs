//! The instruction set of the abstract machine.
//!
//! Relative heap offsets (`rel`) are negative: `-arity..-1` address the
//! arguments a caller pushed, counted back from the top of the heap.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A predicate key, `functor/arity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub functor: Arc<str>,
    pub arity: usize,
}

impl Label {
    pub fn new(functor: &str, arity: usize) -> Self {
        Self {
            functor: Arc::from(functor),
            arity,
        }
    }

    /// Parse `functor/arity`; a missing or malformed arity reads as 0.
    pub fn parse(key: &str) -> Self {
        match key.rsplit_once('/') {
            Some((functor, arity)) => match arity.parse() {
                Ok(arity) => Self::new(functor, arity),
                Err(_) => Self::new(key, 0),
            },
            None => Self::new(key, 0),
        }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.functor, self.arity)
    }
}

/// One machine instruction. Constants are ids in the program's constant table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Comment(String),
    /// Open a register file of `n` unset registers named `names`.
    Allocate { n: usize, names: Vec<String> },
    /// Register `var` := the heap cell at `heap.len() + rel`.
    InitFreeVar { var: usize, rel: isize },
    /// Unify the heap cell at `heap.len() + rel` with `constant`.
    UnifyConst { constant: usize, rel: isize },
    /// Unify register `var` with the heap cell at `heap.len() + rel`.
    UnifyBoundVar { var: usize, rel: isize },
    PushConst(usize),
    /// Push a fresh variable and bind register `var` to it.
    PushFreeVar(usize),
    PushBoundVar(usize),
    CallP(Label),
    ReturnP,
    FClear,
    FPushStart { functor: String, arity: usize },
    FPushConst(usize),
    FPushBoundVar(usize),
    FReport,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "% {text}"),
            Self::Allocate { n, names } => write!(f, "allocate {n} [{}]", names.join(",")),
            Self::InitFreeVar { var, rel } => write!(f, "initfreevar r{var} {rel}"),
            Self::UnifyConst { constant, rel } => write!(f, "unifyconst #{constant} {rel}"),
            Self::UnifyBoundVar { var, rel } => write!(f, "unifyboundvar r{var} {rel}"),
            Self::PushConst(c) => write!(f, "pushconst #{c}"),
            Self::PushFreeVar(v) => write!(f, "pushfreevar r{v}"),
            Self::PushBoundVar(v) => write!(f, "pushboundvar r{v}"),
            Self::CallP(label) => write!(f, "callp {label}"),
            Self::ReturnP => f.write_str("returnp"),
            Self::FClear => f.write_str("fclear"),
            Self::FPushStart { functor, arity } => write!(f, "fpushstart {functor}/{arity}"),
            Self::FPushConst(c) => write!(f, "fpushconst #{c}"),
            Self::FPushBoundVar(v) => write!(f, "fpushboundvar r{v}"),
            Self::FReport => f.write_str("freport"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_parse_and_display() {
        let label = Label::parse("friend/2");
        assert_eq!(&*label.functor, "friend");
        assert_eq!(label.arity, 2);
        assert_eq!(label.to_string(), "friend/2");
        assert_eq!(Label::parse("halt"), Label::new("halt", 0));
    }

    #[test]
    fn instruction_listing() {
        assert_eq!(Instruction::CallP(Label::new("p", 1)).to_string(), "callp p/1");
        assert_eq!(
            Instruction::UnifyConst { constant: 3, rel: -2 }.to_string(),
            "unifyconst #3 -2"
        );
    }
}
