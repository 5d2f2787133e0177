//! Machine states: the mutable working state and its immutable, canonically
//! hashed snapshot.
//!
//! Two snapshots are the same proof-graph node exactly when their canonical
//! forms agree. The canonical form renames free variables in first-occurrence
//! order, so states that differ only in heap layout or variable numbering
//! collapse into one node. For an incomplete state it covers everything that
//! decides future execution (pc, the pending call and its arguments, and
//! every frame's return address and bindings); for a completed state only the
//! query's bindings matter.
//!
//! The hash of the canonical form is computed when the snapshot is taken; the
//! form string itself is built lazily, the first time two states collide on
//! their hash.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use crate::symbol::ConstantTable;

use super::instruction::Label;

/// One heap cell. A reference to itself is an unbound variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapCell {
    Constant(usize),
    Ref(usize),
}

/// Saved caller context.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStackFrame {
    pub return_pc: usize,
    pub registers: Vec<Option<usize>>,
    pub jump_to: Option<Label>,
}

/// What a register or heap cell resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Constant(usize),
    /// An unbound variable, identified by its dereferenced heap index.
    Free(usize),
    Unset,
}

// ---------------------------------------------------------------------------
// Working state
// ---------------------------------------------------------------------------

/// The interpreter's working state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutableState {
    pub heap: Vec<HeapCell>,
    pub registers: Vec<Option<usize>>,
    pub call_stack: Vec<CallStackFrame>,
    pub pc: usize,
    pub jump_to: Option<Label>,
    pub completed: bool,
    pub failed: bool,
}

impl MutableState {
    pub fn new(pc: usize) -> Self {
        Self {
            pc,
            ..Self::default()
        }
    }

    /// Follow reference chains to the representative cell index.
    pub fn deref(&self, mut index: usize) -> usize {
        for _ in 0..=self.heap.len() {
            match self.heap.get(index) {
                Some(HeapCell::Ref(next)) if *next != index => index = *next,
                _ => return index,
            }
        }
        index
    }

    /// Resolve a heap index to a constant or a free variable.
    pub fn resolve(&self, index: usize) -> Binding {
        let index = self.deref(index);
        match self.heap.get(index) {
            Some(HeapCell::Constant(c)) => Binding::Constant(*c),
            Some(HeapCell::Ref(_)) => Binding::Free(index),
            None => Binding::Unset,
        }
    }

    /// Resolve a register of the current register file.
    pub fn resolve_register(&self, var: usize) -> Binding {
        match self.registers.get(var).copied().flatten() {
            Some(index) => self.resolve(index),
            None => Binding::Unset,
        }
    }

    /// Push an unbound variable, returning its index.
    pub fn push_free(&mut self) -> usize {
        let index = self.heap.len();
        self.heap.push(HeapCell::Ref(index));
        index
    }

    pub fn push_constant(&mut self, constant: usize) -> usize {
        let index = self.heap.len();
        self.heap.push(HeapCell::Constant(constant));
        index
    }

    /// The number the canonical form gives the free variable rooted at heap
    /// index `root`, so names built from it do not depend on heap layout.
    /// A variable the form never reaches gets the next unused number.
    pub fn canonical_var(&self, root: usize) -> usize {
        let mut canon = Canonicalizer::new(self);
        canon.walk(&mut |_| {});
        canon
            .vars
            .get(&self.deref(root))
            .copied()
            .unwrap_or(canon.vars.len())
    }

    /// Snapshot the state, computing its canonical hash.
    pub fn freeze(self) -> State {
        let mut hasher = DefaultHasher::new();
        Canonicalizer::new(&self).walk(&mut |token| token.hash(&mut hasher));
        State {
            hash: hasher.finish(),
            form: OnceLock::new(),
            inner: self,
        }
    }
}

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

#[derive(Debug, Hash)]
enum Token<'a> {
    Tag(&'static str),
    Num(usize),
    Const(usize),
    Var(usize),
    Unset,
    Label(Option<&'a Label>),
}

impl Token<'_> {
    fn write(&self, out: &mut String) {
        let _ = match self {
            Token::Tag(tag) => write!(out, "{tag}"),
            Token::Num(n) => write!(out, "{n}"),
            Token::Const(c) => write!(out, "c{c}"),
            Token::Var(v) => write!(out, "_{v}"),
            Token::Unset => write!(out, "?"),
            Token::Label(Some(label)) => write!(out, "{label}"),
            Token::Label(None) => write!(out, "-"),
        };
    }
}

struct Canonicalizer<'s> {
    state: &'s MutableState,
    vars: HashMap<usize, usize>,
}

impl<'s> Canonicalizer<'s> {
    fn new(state: &'s MutableState) -> Self {
        Self {
            state,
            vars: HashMap::new(),
        }
    }

    fn cell(&mut self, index: Option<usize>) -> Token<'s> {
        let Some(index) = index else {
            return Token::Unset;
        };
        match self.state.resolve(index) {
            Binding::Constant(c) => Token::Const(c),
            Binding::Free(root) => {
                let next = self.vars.len();
                Token::Var(*self.vars.entry(root).or_insert(next))
            }
            Binding::Unset => Token::Unset,
        }
    }

    fn registers(&mut self, registers: &[Option<usize>], emit: &mut dyn FnMut(Token<'s>)) {
        emit(Token::Num(registers.len()));
        for &reg in registers {
            let token = self.cell(reg);
            emit(token);
        }
    }

    fn walk(&mut self, emit: &mut dyn FnMut(Token<'s>)) {
        let state = self.state;
        if state.completed {
            emit(Token::Tag("done"));
            self.registers(&state.registers, emit);
            return;
        }
        if state.failed {
            emit(Token::Tag("failed"));
            return;
        }
        emit(Token::Tag("pc"));
        emit(Token::Num(state.pc));
        emit(Token::Label(state.jump_to.as_ref()));
        let arity = state.jump_to.as_ref().map_or(0, |l| l.arity);
        let base = state.heap.len().saturating_sub(arity);
        emit(Token::Tag("args"));
        for index in base..state.heap.len() {
            let token = self.cell(Some(index));
            emit(token);
        }
        emit(Token::Tag("regs"));
        self.registers(&state.registers, emit);
        for frame in state.call_stack.iter().rev() {
            emit(Token::Tag("frame"));
            emit(Token::Num(frame.return_pc));
            emit(Token::Label(frame.jump_to.as_ref()));
            self.registers(&frame.registers, emit);
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable machine state with a memoized canonical hash.
#[derive(Debug)]
pub struct State {
    inner: MutableState,
    hash: u64,
    form: OnceLock<String>,
}

impl State {
    pub fn canonical_hash(&self) -> u64 {
        self.hash
    }

    /// The canonical form, computed once on first use.
    pub fn canonical_form(&self) -> &str {
        self.form.get_or_init(|| {
            let mut out = String::new();
            Canonicalizer::new(&self.inner).walk(&mut |token| {
                if !out.is_empty() {
                    out.push(' ');
                }
                token.write(&mut out);
            });
            out
        })
    }

    /// A working copy to resume execution from.
    pub fn thaw(&self) -> MutableState {
        self.inner.clone()
    }

    pub fn working(&self) -> &MutableState {
        &self.inner
    }

    pub fn pc(&self) -> usize {
        self.inner.pc
    }

    pub fn jump_to(&self) -> Option<&Label> {
        self.inner.jump_to.as_ref()
    }

    pub fn call_stack(&self) -> &[CallStackFrame] {
        &self.inner.call_stack
    }

    pub fn registers(&self) -> &[Option<usize>] {
        &self.inner.registers
    }

    pub fn heap_size(&self) -> usize {
        self.inner.heap.len()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failed
    }

    pub fn resolve_register(&self, var: usize) -> Binding {
        self.inner.resolve_register(var)
    }

    /// Whether `label` is being called here or by any pending frame.
    pub fn in_call_of(&self, pred: impl Fn(&Label) -> bool) -> bool {
        self.jump_to().is_some_and(&pred)
            || self
                .call_stack()
                .iter()
                .any(|f| f.jump_to.as_ref().is_some_and(&pred))
    }

    /// A short human-readable description, resolving constants.
    pub fn describe(&self, constants: &ConstantTable) -> String {
        let show = |b: Binding| match b {
            Binding::Constant(c) => constants.resolve(c),
            Binding::Free(i) => format!("_{i}"),
            Binding::Unset => "?".into(),
        };
        if self.is_completed() {
            let regs: Vec<String> = (0..self.registers().len())
                .map(|v| show(self.resolve_register(v)))
                .collect();
            return format!("done [{}]", regs.join(","));
        }
        if self.is_failed() {
            return "failed".into();
        }
        let arity = self.jump_to().map_or(0, |l| l.arity);
        let base = self.heap_size().saturating_sub(arity);
        let args: Vec<String> = (base..self.heap_size())
            .map(|i| show(self.inner.resolve(i)))
            .collect();
        match self.jump_to() {
            Some(label) => format!(
                "{}({}) @{} depth {}",
                label.functor,
                args.join(","),
                self.pc(),
                self.call_stack().len()
            ),
            None => format!("pc {}", self.pc()),
        }
    }
}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.canonical_form() == other.canonical_form()
    }
}

impl Eq for State {}
