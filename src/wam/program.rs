//! Compiled programs: clause compilation, the label table, and query programs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{LogicProgramError, ParseError};
use crate::symbol::ConstantTable;

use super::goal::{Argument, Goal, Query, Rule};
use super::instruction::{Instruction, Label};
use super::parser;

/// Feature reported by clauses that carry no feature annotation.
pub const DEFAULT_RULE_FEATURE: &str = "defaultRule";

/// Read-only instruction source for the interpreter.
pub trait Code: Send + Sync {
    /// Instruction at `pc`, if any.
    fn fetch(&self, pc: usize) -> Option<&Instruction>;

    /// Clause entry addresses for a predicate, in program order.
    fn clauses(&self, label: &Label) -> &[usize];

    fn constants(&self) -> &Arc<ConstantTable>;
}

// ---------------------------------------------------------------------------
// Clause compiler
// ---------------------------------------------------------------------------

/// Register allocation for one clause or query.
struct ClauseCompiler<'a> {
    constants: &'a ConstantTable,
    names: Vec<String>,
    index: HashMap<String, usize>,
    anonymous: usize,
    out: Vec<Instruction>,
}

impl<'a> ClauseCompiler<'a> {
    fn new(constants: &'a ConstantTable) -> Self {
        Self {
            constants,
            names: Vec::new(),
            index: HashMap::new(),
            anonymous: 0,
            out: Vec::new(),
        }
    }

    /// Register for a variable, and whether it was seen before.
    fn register(&mut self, name: &str) -> (usize, bool) {
        let name = if name == "_" {
            self.anonymous += 1;
            format!("_{}", self.anonymous)
        } else {
            name.to_string()
        };
        if let Some(&var) = self.index.get(&name) {
            return (var, true);
        }
        let var = self.names.len();
        self.index.insert(name.clone(), var);
        self.names.push(name);
        (var, false)
    }

    fn constant(&self, name: &str) -> usize {
        self.constants.intern(name.to_string())
    }

    fn head(&mut self, head: &Goal) {
        let arity = head.arity() as isize;
        for (i, arg) in head.args.iter().enumerate() {
            let rel = i as isize - arity;
            let op = match arg {
                Argument::Constant(c) => Instruction::UnifyConst {
                    constant: self.constant(c),
                    rel,
                },
                Argument::Variable(v) => match self.register(v) {
                    (var, true) => Instruction::UnifyBoundVar { var, rel },
                    (var, false) => Instruction::InitFreeVar { var, rel },
                },
            };
            self.out.push(op);
        }
    }

    fn features(&mut self, features: &[Goal], label: &str) -> Result<(), LogicProgramError> {
        self.out.push(Instruction::FClear);
        if features.is_empty() {
            self.out.push(Instruction::FPushStart {
                functor: "id".into(),
                arity: 1,
            });
            self.out
                .push(Instruction::FPushConst(self.constant(DEFAULT_RULE_FEATURE)));
        }
        for feature in features {
            self.out.push(Instruction::FPushStart {
                functor: feature.functor.clone(),
                arity: feature.arity(),
            });
            for arg in &feature.args {
                let op = match arg {
                    Argument::Constant(c) => Instruction::FPushConst(self.constant(c)),
                    Argument::Variable(v) => match self.index.get(v) {
                        Some(&var) => Instruction::FPushBoundVar(var),
                        None => {
                            return Err(LogicProgramError::UnboundFeatureVariable {
                                variable: v.clone(),
                                label: label.to_string(),
                            });
                        }
                    },
                };
                self.out.push(op);
            }
        }
        self.out.push(Instruction::FReport);
        Ok(())
    }

    fn body(&mut self, body: &[Goal]) {
        for goal in body {
            for arg in &goal.args {
                let op = match arg {
                    Argument::Constant(c) => Instruction::PushConst(self.constant(c)),
                    Argument::Variable(v) => match self.register(v) {
                        (var, true) => Instruction::PushBoundVar(var),
                        (var, false) => Instruction::PushFreeVar(var),
                    },
                };
                self.out.push(op);
            }
            self.out
                .push(Instruction::CallP(Label::new(&goal.functor, goal.arity())));
        }
        self.out.push(Instruction::ReturnP);
    }

    /// Prepend the `Allocate` now that every register is known.
    fn finish(self, comment: String) -> (Vec<Instruction>, Vec<String>) {
        let mut code = Vec::with_capacity(self.out.len() + 2);
        code.push(Instruction::Comment(comment));
        code.push(Instruction::Allocate {
            n: self.names.len(),
            names: self.names.clone(),
        });
        code.extend(self.out);
        (code, self.names)
    }
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// A compiled rule base.
#[derive(Debug, Clone)]
pub struct WamProgram {
    instructions: Vec<Instruction>,
    labels: BTreeMap<Label, Vec<usize>>,
    constants: Arc<ConstantTable>,
}

impl Default for WamProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl WamProgram {
    pub fn new() -> Self {
        Self::with_constants(Arc::new(ConstantTable::new()))
    }

    /// A program that interns its constants into a shared table.
    pub fn with_constants(constants: Arc<ConstantTable>) -> Self {
        Self {
            instructions: Vec::new(),
            labels: BTreeMap::new(),
            constants,
        }
    }

    /// Compile a set of rules.
    pub fn from_rules<'r>(
        rules: impl IntoIterator<Item = &'r Rule>,
    ) -> Result<Self, LogicProgramError> {
        let mut program = Self::new();
        for rule in rules {
            program.add_rule(rule)?;
        }
        Ok(program)
    }

    /// Parse and compile program text.
    pub fn parse(src: &str) -> crate::error::PprResult<Self> {
        let rules = parser::parse_program(src)?;
        Ok(Self::from_rules(&rules)?)
    }

    /// Compile one rule at the end of the program, returning its address.
    pub fn add_rule(&mut self, rule: &Rule) -> Result<usize, LogicProgramError> {
        let label = Label::new(&rule.head.functor, rule.head.arity());
        let mut compiler = ClauseCompiler::new(&self.constants);
        compiler.head(&rule.head);
        compiler.features(&rule.features, &label.key())?;
        compiler.body(&rule.body);
        let (code, _) = compiler.finish(rule.to_string());

        let addr = self.instructions.len();
        self.instructions.extend(code);
        self.labels.entry(label).or_default().push(addr);
        tracing::trace!(addr, %rule, "compiled clause");
        Ok(addr)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Defined predicates, in label order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> + '_ {
        self.labels.keys()
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains_key(label)
    }

    /// Human-readable instruction listing.
    pub fn listing(&self) -> String {
        self.instructions
            .iter()
            .enumerate()
            .map(|(pc, ins)| format!("{pc:>5}  {ins}\n"))
            .collect()
    }

    /// Compile a query against this program.
    pub fn compile_query(self: &Arc<Self>, query: &Query) -> Result<QueryProgram, ParseError> {
        if query.goals.is_empty() {
            return Err(ParseError::EmptyQuery);
        }
        let mut compiler = ClauseCompiler::new(&self.constants);
        compiler.body(&query.goals);
        let (instructions, var_names) = compiler.finish(format!("query {query}"));
        Ok(QueryProgram {
            base: Arc::clone(self),
            instructions,
            var_names,
            query: query.clone(),
        })
    }

    /// Parse and compile a query.
    pub fn parse_query(self: &Arc<Self>, src: &str) -> Result<QueryProgram, ParseError> {
        self.compile_query(&parser::parse_query(src)?)
    }
}

impl Code for WamProgram {
    fn fetch(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    fn clauses(&self, label: &Label) -> &[usize] {
        self.labels.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    fn constants(&self) -> &Arc<ConstantTable> {
        &self.constants
    }
}

// ---------------------------------------------------------------------------
// Query program
// ---------------------------------------------------------------------------

/// A query compiled as if appended to the end of its base program.
///
/// The base program is shared and never modified; query code lives at
/// addresses from `base.len()` up.
#[derive(Debug, Clone)]
pub struct QueryProgram {
    base: Arc<WamProgram>,
    instructions: Vec<Instruction>,
    var_names: Vec<String>,
    query: Query,
}

impl QueryProgram {
    /// Address of the query's first instruction.
    pub fn entry(&self) -> usize {
        self.base.len()
    }

    pub fn base(&self) -> &Arc<WamProgram> {
        &self.base
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Query variable names, indexed by register.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }
}

impl Code for QueryProgram {
    fn fetch(&self, pc: usize) -> Option<&Instruction> {
        match pc.checked_sub(self.base.len()) {
            Some(offset) => self.instructions.get(offset),
            None => self.base.fetch(pc),
        }
    }

    fn clauses(&self, label: &Label) -> &[usize] {
        self.base.clauses(label)
    }

    fn constants(&self) -> &Arc<ConstantTable> {
        self.base.constants()
    }
}
