//! The interpreter: instruction execution and outlink enumeration.
//!
//! Execution is deterministic between branching points. A branching point is
//! a `CallP` to a predicate defined by clauses or plugins: the interpreter
//! stops there, and [`WamInterpreter::outlinks`] later enumerates every way
//! the call can continue, running each alternative to its next branching
//! point (or to completion).

use std::sync::Arc;

use crate::error::LogicProgramError;
use crate::symbol::Feature;
use crate::weight::FeatureDict;

use super::builtin;
use super::instruction::{Instruction, Label};
use super::plugin::WamPlugin;
use super::program::{Code, QueryProgram};
use super::state::{Binding, CallStackFrame, HeapCell, MutableState, State};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep executing at the (updated) pc.
    Continue,
    /// Stopped at a branching call.
    Branch,
    /// Completed or failed.
    Halt,
}

/// Per-expansion resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterLimits {
    pub max_steps_per_expansion: usize,
    pub max_call_stack: usize,
}

impl Default for InterpreterLimits {
    fn default() -> Self {
        Self {
            max_steps_per_expansion: 100_000,
            max_call_stack: 1000,
        }
    }
}

/// A continuation of a branching state.
#[derive(Debug)]
pub struct WamOutlink {
    pub features: FeatureDict,
    pub state: State,
}

/// A feature term under construction.
#[derive(Debug, Clone)]
struct PendingFeature {
    functor: String,
    arity: usize,
    args: Vec<String>,
}

/// Executes a compiled query against its program and plugins.
///
/// Holds one working state, which is overwritten by every expansion, so an
/// interpreter belongs to one proof graph at a time.
#[derive(Debug, Clone)]
pub struct WamInterpreter {
    program: Arc<QueryProgram>,
    plugins: Arc<Vec<Arc<dyn WamPlugin>>>,
    limits: InterpreterLimits,
    state: MutableState,
    features: FeatureDict,
    pending: Option<PendingFeature>,
    reported: Option<FeatureDict>,
    steps: usize,
}

impl WamInterpreter {
    pub fn new(program: Arc<QueryProgram>, plugins: Arc<Vec<Arc<dyn WamPlugin>>>) -> Self {
        let entry = program.entry();
        Self {
            program,
            plugins,
            limits: InterpreterLimits::default(),
            state: MutableState::new(entry),
            features: FeatureDict::new(),
            pending: None,
            reported: None,
            steps: 0,
        }
    }

    pub fn with_limits(mut self, limits: InterpreterLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn program(&self) -> &Arc<QueryProgram> {
        &self.program
    }

    pub fn limits(&self) -> InterpreterLimits {
        self.limits
    }

    /// The working state.
    pub fn state(&self) -> &MutableState {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run the query from its entry point to the first branching point.
    pub fn start_state(&mut self) -> Result<State, LogicProgramError> {
        self.state = MutableState::new(self.program.entry());
        self.clear_features();
        self.steps = 0;
        self.run()?;
        Ok(self.state.clone().freeze())
    }

    /// Execute until a branching point, completion, or failure.
    pub fn run(&mut self) -> Result<(), LogicProgramError> {
        let program = Arc::clone(&self.program);
        loop {
            if self.steps >= self.limits.max_steps_per_expansion {
                return Err(LogicProgramError::StepLimitExceeded {
                    limit: self.limits.max_steps_per_expansion,
                });
            }
            self.steps += 1;
            let pc = self.state.pc;
            let instruction = program
                .fetch(pc)
                .ok_or(LogicProgramError::InvalidAddress { pc })?;
            match self.execute(instruction)? {
                Control::Continue => continue,
                Control::Branch | Control::Halt => return Ok(()),
            }
        }
    }

    /// Execute one instruction on the working state.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<Control, LogicProgramError> {
        let pc = self.state.pc;
        match instruction {
            Instruction::Comment(_) => {}
            Instruction::Allocate { n, .. } => {
                self.state.registers = vec![None; *n];
            }
            Instruction::InitFreeVar { var, rel } => {
                let index = self.relative(*rel)?;
                self.set_register(*var, index)?;
            }
            Instruction::UnifyConst { constant, rel } => {
                let index = self.relative(*rel)?;
                if !self.unify_constant(index, *constant) {
                    return Ok(self.fail());
                }
            }
            Instruction::UnifyBoundVar { var, rel } => {
                let a = self.register(*var)?;
                let b = self.relative(*rel)?;
                if !self.unify(a, b) {
                    return Ok(self.fail());
                }
            }
            Instruction::PushConst(constant) => {
                self.state.push_constant(*constant);
            }
            Instruction::PushFreeVar(var) => {
                let index = self.state.push_free();
                self.set_register(*var, index)?;
            }
            Instruction::PushBoundVar(var) => {
                let root = self.state.deref(self.register(*var)?);
                self.state.heap.push(HeapCell::Ref(root));
            }
            Instruction::CallP(label) => return self.call(label),
            Instruction::ReturnP => return Ok(self.return_from_call()),
            Instruction::FClear => self.clear_features(),
            Instruction::FPushStart { functor, arity } => {
                self.pending = Some(PendingFeature {
                    functor: functor.clone(),
                    arity: *arity,
                    args: Vec::with_capacity(*arity),
                });
                self.complete_feature();
            }
            Instruction::FPushConst(constant) => {
                let name = self.program.constants().resolve(*constant);
                self.push_feature_arg(name);
            }
            Instruction::FPushBoundVar(var) => {
                let name = match self.state.resolve_register(*var) {
                    Binding::Constant(c) => self.program.constants().resolve(c),
                    Binding::Free(index) => format!("_{}", self.state.canonical_var(index)),
                    Binding::Unset => {
                        return Err(LogicProgramError::UnboundRegister { register: *var, pc });
                    }
                };
                self.push_feature_arg(name);
            }
            Instruction::FReport => {
                self.reported = Some(self.features.clone());
            }
        }
        self.state.pc = pc + 1;
        Ok(Control::Continue)
    }

    fn call(&mut self, label: &Label) -> Result<Control, LogicProgramError> {
        let args = self.pending_args(label.arity)?;
        if let Some(builtin) = builtin::lookup(label) {
            if builtin(&mut self.state, &args)? {
                self.state.pc += 1;
                return Ok(Control::Continue);
            }
            return Ok(self.fail());
        }
        if self.state.call_stack.len() >= self.limits.max_call_stack {
            return Err(LogicProgramError::CallStackOverflow {
                limit: self.limits.max_call_stack,
                label: label.key(),
            });
        }
        self.state.call_stack.push(CallStackFrame {
            return_pc: self.state.pc + 1,
            registers: self.state.registers.clone(),
            jump_to: self.state.jump_to.take(),
        });
        self.state.jump_to = Some(label.clone());
        Ok(Control::Branch)
    }

    fn return_from_call(&mut self) -> Control {
        match self.state.call_stack.pop() {
            Some(frame) => {
                self.state.pc = frame.return_pc;
                self.state.registers = frame.registers;
                self.state.jump_to = frame.jump_to;
                Control::Continue
            }
            None => {
                self.state.completed = true;
                self.state.jump_to = None;
                Control::Halt
            }
        }
    }

    fn fail(&mut self) -> Control {
        self.state.failed = true;
        Control::Halt
    }

    // -----------------------------------------------------------------------
    // Outlinks
    // -----------------------------------------------------------------------

    /// Enumerate every continuation of `state`: plugin matches first, then
    /// each clause of the called predicate in program order.
    ///
    /// Completed and failed states have no continuations. Branches that fail
    /// are dropped.
    pub fn outlinks(&mut self, state: &State) -> Result<Vec<WamOutlink>, LogicProgramError> {
        if state.is_completed() || state.is_failed() {
            return Ok(Vec::new());
        }
        let label = state
            .jump_to()
            .cloned()
            .ok_or_else(|| LogicProgramError::MalformedState {
                message: format!("no pending call at pc {}", state.pc()),
            })?;

        let mut out = Vec::new();
        let plugins = Arc::clone(&self.plugins);
        let mut claimed = false;
        for plugin in plugins.iter().filter(|p| p.claims(&label)) {
            claimed = true;
            out.extend(plugin.outlinks(state, self)?);
        }

        let program = Arc::clone(&self.program);
        let clauses = program.clauses(&label);
        if clauses.is_empty() && !claimed {
            return Err(LogicProgramError::UnknownPredicate { label: label.key() });
        }
        for &addr in clauses {
            self.restore(state);
            self.state.pc = addr;
            self.run()?;
            if self.state.failed {
                continue;
            }
            let features = self.reported.take().unwrap_or_default();
            out.push(WamOutlink {
                features,
                state: self.state.clone().freeze(),
            });
        }
        tracing::trace!(%label, outlinks = out.len(), "expanded state");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Plugin support
    // -----------------------------------------------------------------------

    /// Reset the working state to `state` and start a fresh expansion.
    pub fn restore(&mut self, state: &State) {
        self.state = state.thaw();
        self.clear_features();
        self.reported = None;
        self.steps = 0;
    }

    /// Heap indices of the top `arity` cells: the pending call's arguments.
    pub fn pending_args(&self, arity: usize) -> Result<Vec<usize>, LogicProgramError> {
        let size = self.state.heap.len();
        let base = size
            .checked_sub(arity)
            .ok_or(LogicProgramError::InvalidHeapReference {
                index: size as isize - arity as isize,
                size,
            })?;
        Ok((base..size).collect())
    }

    /// Resolve argument `position` of the pending call.
    pub fn pending_arg(&self, position: usize) -> Result<Binding, LogicProgramError> {
        let arity = self.state.jump_to.as_ref().map_or(0, |l| l.arity);
        let args = self.pending_args(arity)?;
        args.get(position)
            .map(|&index| self.state.resolve(index))
            .ok_or(LogicProgramError::InvalidHeapReference {
                index: position as isize,
                size: arity,
            })
    }

    /// Unify a heap cell with a constant, binding it if free.
    pub fn unify_constant(&mut self, index: usize, constant: usize) -> bool {
        match self.state.resolve(index) {
            Binding::Constant(c) => c == constant,
            Binding::Free(root) => {
                self.state.heap[root] = HeapCell::Constant(constant);
                true
            }
            Binding::Unset => false,
        }
    }

    /// Finish the pending call as a success with `features`, and run on to
    /// the next branching point. Returns `None` if the continuation fails.
    pub fn finish_call(
        &mut self,
        features: FeatureDict,
    ) -> Result<Option<WamOutlink>, LogicProgramError> {
        if self.return_from_call() == Control::Continue {
            self.run()?;
        }
        if self.state.failed {
            return Ok(None);
        }
        Ok(Some(WamOutlink {
            features,
            state: self.state.clone().freeze(),
        }))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn relative(&self, rel: isize) -> Result<usize, LogicProgramError> {
        let size = self.state.heap.len();
        let index = size as isize + rel;
        if index < 0 || index as usize >= size {
            return Err(LogicProgramError::InvalidHeapReference { index, size });
        }
        Ok(index as usize)
    }

    fn register(&self, var: usize) -> Result<usize, LogicProgramError> {
        self.state
            .registers
            .get(var)
            .copied()
            .flatten()
            .ok_or(LogicProgramError::UnboundRegister {
                register: var,
                pc: self.state.pc,
            })
    }

    fn set_register(&mut self, var: usize, index: usize) -> Result<(), LogicProgramError> {
        let pc = self.state.pc;
        let slot = self
            .state
            .registers
            .get_mut(var)
            .ok_or(LogicProgramError::UnboundRegister { register: var, pc })?;
        *slot = Some(index);
        Ok(())
    }

    fn unify(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.state.deref(a), self.state.deref(b));
        if ra == rb {
            return true;
        }
        match (self.state.heap[ra], self.state.heap[rb]) {
            (HeapCell::Constant(x), HeapCell::Constant(y)) => x == y,
            (HeapCell::Ref(_), _) => {
                self.state.heap[ra] = HeapCell::Ref(rb);
                true
            }
            (_, HeapCell::Ref(_)) => {
                self.state.heap[rb] = HeapCell::Ref(ra);
                true
            }
        }
    }

    fn clear_features(&mut self) {
        self.features.clear();
        self.pending = None;
    }

    fn push_feature_arg(&mut self, arg: String) {
        if let Some(pending) = self.pending.as_mut() {
            pending.args.push(arg);
        }
        self.complete_feature();
    }

    /// Emit the pending feature term once all its arguments are in.
    fn complete_feature(&mut self) {
        let done = self
            .pending
            .as_ref()
            .is_some_and(|p| p.args.len() >= p.arity);
        if !done {
            return;
        }
        if let Some(p) = self.pending.take() {
            let name = if p.arity == 0 {
                p.functor
            } else {
                format!("{}({})", p.functor, p.args.join(","))
            };
            *self.features.entry(Feature::new(name)).or_insert(0.0) += 1.0;
        }
    }
}
