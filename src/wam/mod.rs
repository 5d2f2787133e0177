//! WAM-lite: a small abstract-machine interpreter for function-free logic
//! programs.
//!
//! Rules are compiled to a flat instruction list ([`program`]); a query is
//! compiled as if appended to the program ([`program::QueryProgram`]). The
//! [`interpreter`] runs deterministically up to a branching call and then
//! enumerates the call's continuations, each labelled with the features its
//! clause (or plugin) reports.

pub mod builtin;
pub mod goal;
pub mod instruction;
pub mod interpreter;
pub mod parser;
pub mod plugin;
pub mod program;
pub mod state;

pub use goal::{Argument, Goal, Query, Rule};
pub use instruction::{Instruction, Label};
pub use interpreter::{Control, InterpreterLimits, WamInterpreter, WamOutlink};
pub use plugin::{FactsPlugin, WamPlugin};
pub use program::{Code, QueryProgram, WamProgram};
pub use state::{Binding, CallStackFrame, HeapCell, MutableState, State};
