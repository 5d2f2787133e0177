//! Deterministic builtins, executed inline by `CallP` without creating a
//! branching point.
//!
//! | Builtin | Succeeds when |
//! |---|---|
//! | `eq(A, B)` | both arguments are bound to the same constant |
//! | `neq(A, B)` | both arguments are bound to different constants |
//! | `assign(X, C)` | `C` is bound; `X` is bound to `C` (or already equal to it) |

use crate::error::LogicProgramError;

use super::instruction::Label;
use super::state::{Binding, HeapCell, MutableState};

/// A builtin: reads its arguments' heap indices, may bind them, and reports
/// success.
pub type BuiltinFn = fn(&mut MutableState, &[usize]) -> Result<bool, LogicProgramError>;

/// The builtin implementing `label`, if any.
pub fn lookup(label: &Label) -> Option<BuiltinFn> {
    match (&*label.functor, label.arity) {
        ("eq", 2) => Some(eq),
        ("neq", 2) => Some(neq),
        ("assign", 2) => Some(assign),
        _ => None,
    }
}

pub fn is_builtin(label: &Label) -> bool {
    lookup(label).is_some()
}

fn bound(
    state: &MutableState,
    index: usize,
    builtin: &str,
    position: usize,
) -> Result<usize, LogicProgramError> {
    match state.resolve(index) {
        Binding::Constant(c) => Ok(c),
        Binding::Free(_) | Binding::Unset => Err(LogicProgramError::BuiltinPrecondition {
            builtin: builtin.to_string(),
            message: format!("argument {} must be bound", position + 1),
        }),
    }
}

fn eq(state: &mut MutableState, args: &[usize]) -> Result<bool, LogicProgramError> {
    let a = bound(state, args[0], "eq/2", 0)?;
    let b = bound(state, args[1], "eq/2", 1)?;
    Ok(a == b)
}

fn neq(state: &mut MutableState, args: &[usize]) -> Result<bool, LogicProgramError> {
    let a = bound(state, args[0], "neq/2", 0)?;
    let b = bound(state, args[1], "neq/2", 1)?;
    Ok(a != b)
}

fn assign(state: &mut MutableState, args: &[usize]) -> Result<bool, LogicProgramError> {
    let value = bound(state, args[1], "assign/2", 1)?;
    match state.resolve(args[0]) {
        Binding::Free(root) => {
            state.heap[root] = HeapCell::Constant(value);
            Ok(true)
        }
        Binding::Constant(c) => Ok(c == value),
        Binding::Unset => Err(LogicProgramError::BuiltinPrecondition {
            builtin: "assign/2".into(),
            message: "argument 1 is not a heap cell".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(cells: Vec<HeapCell>) -> MutableState {
        MutableState {
            heap: cells,
            ..Default::default()
        }
    }

    #[test]
    fn lookup_by_functor_and_arity() {
        assert!(is_builtin(&Label::new("eq", 2)));
        assert!(!is_builtin(&Label::new("eq", 3)));
        assert!(!is_builtin(&Label::new("friend", 1)));
    }

    #[test]
    fn eq_and_neq_compare_constants() {
        let mut s = state(vec![HeapCell::Constant(1), HeapCell::Constant(1), HeapCell::Constant(2)]);
        assert!(eq(&mut s, &[0, 1]).unwrap());
        assert!(!eq(&mut s, &[0, 2]).unwrap());
        assert!(neq(&mut s, &[0, 2]).unwrap());
    }

    #[test]
    fn unbound_argument_violates_precondition() {
        let mut s = state(vec![HeapCell::Ref(0), HeapCell::Constant(1)]);
        assert!(matches!(
            eq(&mut s, &[0, 1]),
            Err(LogicProgramError::BuiltinPrecondition { .. })
        ));
        assert!(assign(&mut s, &[1, 0]).is_err());
    }

    #[test]
    fn assign_binds_free_variable() {
        let mut s = state(vec![HeapCell::Ref(0), HeapCell::Constant(7)]);
        assert!(assign(&mut s, &[0, 1]).unwrap());
        assert_eq!(s.resolve(0), Binding::Constant(7));
        assert!(assign(&mut s, &[0, 1]).unwrap());
    }
}
