//! Definition model: the abstract syntax tree of a unit.
//!
//! Every node exclusively owns its children.  References that the resolver
//! establishes (a variable use → its declaration, a call → a module object)
//! are stored as plain handles ([`VarSlot`], [`ObjectId`]) and are written
//! exactly once.
//!
//! Expressions keep the table-driven shape of the language: a primary
//! expression is a flat chain of operands joined by arithmetic operators and
//! evaluated with a shared precedence table, comparisons and logicals are
//! flat chains on top of that.

use std::sync::Arc;

use super::module::ObjectId;
use super::types::PrimitiveType;

/// A 1-based source line.
pub type Location = u32;

// ── Operators ─────────────────────────────────────────────────────────────────

/// Arithmetic operator joining a primary-chain operand to the next one.
/// The last operand of a chain carries [`PrimaryOp::Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryOp {
    Value,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl PrimaryOp {
    pub fn precedence(self) -> u32 {
        match self {
            PrimaryOp::Value => 0,
            PrimaryOp::Add | PrimaryOp::Sub => 1,
            PrimaryOp::Mul | PrimaryOp::Div | PrimaryOp::Mod => 2,
            PrimaryOp::Pow => 3,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PrimaryOp::Value => "value",
            PrimaryOp::Add => "+",
            PrimaryOp::Sub => "-",
            PrimaryOp::Mul => "*",
            PrimaryOp::Div => "/",
            PrimaryOp::Mod => "%",
            PrimaryOp::Pow => "^",
        }
    }
}

impl std::fmt::Display for PrimaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    Or,
    And,
}

impl LogicalOp {
    pub fn precedence(self) -> u32 {
        match self {
            LogicalOp::Or => 1,
            LogicalOp::And => 2,
        }
    }
}

// ── Variables ─────────────────────────────────────────────────────────────────

/// A declared variable.  Its index within the owning block is its position in
/// [`Block::variables`].
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: PrimitiveType,
}

/// Runtime address of a variable: the depth of the owning block and the
/// block-relative index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarSlot {
    pub depth: u32,
    pub index: u32,
}

/// A use of a variable by name.  Bound to its declaration once, by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    slot: Option<VarSlot>,
}

impl VarRef {
    pub fn new(name: impl Into<String>) -> Self {
        VarRef { name: name.into(), slot: None }
    }

    pub fn slot(&self) -> Option<VarSlot> {
        self.slot
    }

    /// Bind to `slot`.  A reference that is already bound keeps its first
    /// binding; the return value says whether this call bound it.
    pub fn bind(&mut self, slot: VarSlot) -> bool {
        if self.slot.is_some() {
            return false;
        }
        self.slot = Some(slot);
        true
    }
}

// ── Expressions ───────────────────────────────────────────────────────────────

/// The value of one primary-chain operand.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Call(FunctionCall),
    Variable(VarRef),
    /// Parenthesised (or negated) sub-expression.
    Exp(Box<Exp>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryNode {
    pub value: ExpValue,
    /// Operator joining this operand to the next; `Value` on the last one.
    pub op: PrimaryOp,
    /// Type of this operand, decided by the resolver.
    pub ty: PrimitiveType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryExp {
    pub negate: bool,
    pub nodes: Vec<PrimaryNode>,
    /// Promotion of every operand type; all operands are evaluated as this.
    pub effective_type: PrimitiveType,
}

impl PrimaryExp {
    /// A chain holding a single operand.
    pub fn single(value: ExpValue) -> Self {
        PrimaryExp {
            negate: false,
            nodes: vec![PrimaryNode { value, op: PrimaryOp::Value, ty: PrimitiveType::Delayed }],
            effective_type: PrimitiveType::Delayed,
        }
    }
}

/// `a < b <= c …`; `link_types` holds one promoted type per operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonExp {
    pub operands: Vec<PrimaryExp>,
    pub ops: Vec<ComparisonOp>,
    pub link_types: Vec<PrimitiveType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOperand {
    pub negate: bool,
    pub exp: Exp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExp {
    pub operands: Vec<LogicalOperand>,
    pub ops: Vec<LogicalOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Primary(PrimaryExp),
    Comparison(ComparisonExp),
    Logical(LogicalExp),
}

impl Exp {
    /// Resolved type of the expression (`Delayed` before resolution).
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Exp::Primary(p) => p.effective_type,
            Exp::Comparison(_) | Exp::Logical(_) => PrimitiveType::Bool,
        }
    }

    pub fn int(value: i64) -> Self {
        Exp::Primary(PrimaryExp::single(ExpValue::Int(value)))
    }
}

// ── Function calls ────────────────────────────────────────────────────────────

/// What a call was bound to during resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBinding {
    pub object: ObjectId,
    /// Types the arguments are converted to before the call.
    pub parameter_types: Vec<PrimitiveType>,
    pub output: PrimitiveType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Exp>,
    pub location: Location,
    binding: Option<CallBinding>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Vec<Exp>, location: Location) -> Self {
        FunctionCall { name: name.into(), arguments, location, binding: None }
    }

    pub fn binding(&self) -> Option<&CallBinding> {
        self.binding.as_ref()
    }

    /// Bind the call.  The first binding is permanent.
    pub fn bind(&mut self, binding: CallBinding) -> bool {
        if self.binding.is_some() {
            return false;
        }
        self.binding = Some(binding);
        true
    }
}

// ── Statements ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub variable: VarRef,
    pub exp: Exp,
    /// Type of the assigned variable.
    pub ty: PrimitiveType,
}

/// One link of an `if` / `elseif` / `else` chain.  Links after the first
/// carry `else_flag`; a plain `else` has no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Option<Exp>,
    pub else_flag: bool,
    pub block: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub variable: VarRef,
    /// `= exp` part; absent when stepping an existing variable.
    pub initial: Option<Exp>,
    pub direction: StepDirection,
    pub to: Exp,
    /// Type of the loop variable.
    pub ty: PrimitiveType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    /// `while cond`; `loop` is a while without a condition.
    While(Option<Exp>),
    For(ForLoop),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatement {
    pub kind: LoopKind,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    FunctionCall(FunctionCall),
    Assignment(Assignment),
    If(IfStatement),
    Loop(LoopStatement),
    Continue,
    Break,
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub location: Location,
    pub kind: StatementKind,
}

// ── Blocks, actions, units ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub depth: u32,
    pub variables: Vec<Variable>,
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(depth: u32) -> Self {
        Block { depth, variables: Vec::new(), statements: Vec::new() }
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub triggers: Vec<FunctionCall>,
    pub location: Location,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub name: String,
    /// Declared type; `None` makes the unit a template.
    pub declared: Option<PrimitiveType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub variable: VarRef,
    /// `output x = exp`: evaluated at unit entry.  A bare `output x` returns
    /// the global variable `x` as it stands at exit.
    pub initializer: Option<Exp>,
    pub location: Location,
    pub ty: PrimitiveType,
}

/// A named, reusable script definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    /// Sequential id assigned when the unit is marked resolved; 0 before.
    pub unit_id: u32,
    pub input: Vec<Input>,
    pub output: Option<Output>,
    pub global_block: Block,
    pub actions: Vec<Action>,
    /// Text the unit was constructed from, kept for diagnostics.
    pub source: Arc<str>,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Unit {
            name: name.into(),
            unit_id: 0,
            input: Vec::new(),
            output: None,
            global_block: Block::new(0),
            actions: Vec::new(),
            source: Arc::from(""),
        }
    }

    /// A unit is typed when every input declares its type.
    pub fn is_typed(&self) -> bool {
        self.input.iter().all(|i| i.declared.is_some())
    }

    /// Declared input types, with `Delayed` for untyped inputs.
    pub fn input_types(&self) -> Vec<PrimitiveType> {
        self.input
            .iter()
            .map(|i| i.declared.unwrap_or(PrimitiveType::Delayed))
            .collect()
    }

    pub fn output_type(&self) -> PrimitiveType {
        self.output.as_ref().map_or(PrimitiveType::Void, |o| o.ty)
    }

    /// Copy a template for instantiation with concrete input types.
    pub fn clone_unit(&self) -> Unit {
        let mut unit = self.clone();
        unit.unit_id = 0;
        unit
    }

    /// Source line `line` (1-based), if the source is available.
    pub fn source_line(&self, line: Location) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.source.lines().nth(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_ref_binds_once() {
        let mut r = VarRef::new("x");
        assert!(r.bind(VarSlot { depth: 0, index: 1 }));
        assert!(!r.bind(VarSlot { depth: 2, index: 0 }));
        assert_eq!(r.slot(), Some(VarSlot { depth: 0, index: 1 }));
    }

    #[test]
    fn call_binds_once() {
        let mut call = FunctionCall::new("f", Vec::new(), 3);
        let first = CallBinding {
            object: ObjectId(1),
            parameter_types: vec![],
            output: PrimitiveType::Int,
        };
        assert!(call.bind(first.clone()));
        assert!(!call.bind(CallBinding { object: ObjectId(9), ..first.clone() }));
        assert_eq!(call.binding(), Some(&first));
    }

    #[test]
    fn untyped_input_makes_template() {
        let mut unit = Unit::new("t");
        unit.input.push(Input { name: "a".into(), declared: Some(PrimitiveType::Int) });
        assert!(unit.is_typed());
        unit.input.push(Input { name: "b".into(), declared: None });
        assert!(!unit.is_typed());
        assert_eq!(unit.input_types(), vec![PrimitiveType::Int, PrimitiveType::Delayed]);
    }

    #[test]
    fn clone_resets_unit_id() {
        let mut unit = Unit::new("t");
        unit.unit_id = 7;
        assert_eq!(unit.clone_unit().unit_id, 0);
    }

    #[test]
    fn precedence_table() {
        assert!(PrimaryOp::Pow.precedence() > PrimaryOp::Mul.precedence());
        assert!(PrimaryOp::Mod.precedence() > PrimaryOp::Sub.precedence());
        assert!(LogicalOp::And.precedence() > LogicalOp::Or.precedence());
    }
}
