//! Function bodies as operation trees
//!
//! The front end lowers each function body into a tree of [`Operation`]s.
//! The checker walks the tree to compute required effects and the engine
//! evaluates it. A tree is owned by exactly one function.

use crate::signature::FunctionId;
use crate::types::Type;
use crate::value::{RefId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub callee: FunctionId,
    #[serde(default)]
    pub args: Vec<Operation>,
}

impl Call {
    pub fn new(callee: FunctionId, args: Vec<Operation>) -> Self {
        Call { callee, args }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub ty: Type,
    pub init: Box<Operation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Literal(Value),
    /// Argument of the enclosing function call
    Param(usize),
    /// Read the cell the operand evaluates to
    HeapRead(Box<Operation>),
    /// `set cell = value`; evaluates to the written value
    HeapWrite(Box<Operation>, Box<Operation>),
    Allocate(Allocation),
    Call(Call),
    /// `if (cond) then else`; `cond` runs in its own speculative scope
    Branch {
        cond: Box<Operation>,
        #[serde(rename = "then")]
        then_ops: Vec<Operation>,
        #[serde(rename = "else", default)]
        else_ops: Vec<Operation>,
    },
    /// Fails when the predicate fails, is `false`, or is an empty option
    FailPoint(Box<Operation>),
    SuspendPoint(Call),
    Compare(CmpOp, Box<Operation>, Box<Operation>),
    Add(Box<Operation>, Box<Operation>),
    /// Non-speculative lexical scope that owns its defers
    Block(Vec<Operation>),
    /// Implicit-and chain evaluated in one speculative scope
    And(Vec<Operation>),
    Or(Box<Operation>, Box<Operation>),
    Not(Box<Operation>),
    /// Converts failure of the operand into an empty option
    Bridge(Box<Operation>),
    Defer(Vec<Operation>),
    Return(Box<Operation>),
    /// Fire-and-forget call in an independent execution context
    Spawn(Call),
}

impl Operation {
    pub fn lit(value: impl Into<Value>) -> Self {
        Operation::Literal(value.into())
    }

    pub fn unit() -> Self {
        Operation::Literal(Value::Unit)
    }

    pub fn cell(id: RefId) -> Self {
        Operation::Literal(Value::Ref(id))
    }

    pub fn read(id: RefId) -> Self {
        Operation::HeapRead(Box::new(Operation::cell(id)))
    }

    pub fn write(id: RefId, value: Operation) -> Self {
        Operation::HeapWrite(Box::new(Operation::cell(id)), Box::new(value))
    }

    pub fn allocate(ty: Type, init: Operation) -> Self {
        Operation::Allocate(Allocation { ty, init: Box::new(init) })
    }

    pub fn call(callee: FunctionId, args: Vec<Operation>) -> Self {
        Operation::Call(Call::new(callee, args))
    }

    pub fn suspend(callee: FunctionId, args: Vec<Operation>) -> Self {
        Operation::SuspendPoint(Call::new(callee, args))
    }

    pub fn spawn(callee: FunctionId, args: Vec<Operation>) -> Self {
        Operation::Spawn(Call::new(callee, args))
    }

    pub fn branch(cond: Operation, then_ops: Vec<Operation>, else_ops: Vec<Operation>) -> Self {
        Operation::Branch {
            cond: Box::new(cond),
            then_ops,
            else_ops,
        }
    }

    pub fn fail_if_not(predicate: Operation) -> Self {
        Operation::FailPoint(Box::new(predicate))
    }

    /// A fail point that always fails
    pub fn fail() -> Self {
        Operation::FailPoint(Box::new(Operation::lit(false)))
    }

    pub fn compare(op: CmpOp, lhs: Operation, rhs: Operation) -> Self {
        Operation::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Operation, rhs: Operation) -> Self {
        Operation::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(p: Operation, q: Operation) -> Self {
        Operation::Or(Box::new(p), Box::new(q))
    }

    pub fn not(p: Operation) -> Self {
        Operation::Not(Box::new(p))
    }

    pub fn bridge(p: Operation) -> Self {
        Operation::Bridge(Box::new(p))
    }

    pub fn ret(value: Operation) -> Self {
        Operation::Return(Box::new(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Literal(_) => "literal",
            Operation::Param(_) => "param",
            Operation::HeapRead(_) => "heap-read",
            Operation::HeapWrite(..) => "heap-write",
            Operation::Allocate(_) => "allocate",
            Operation::Call(_) => "call",
            Operation::Branch { .. } => "branch",
            Operation::FailPoint(_) => "fail-point",
            Operation::SuspendPoint(_) => "suspend-point",
            Operation::Compare(..) => "compare",
            Operation::Add(..) => "add",
            Operation::Block(_) => "block",
            Operation::And(_) => "and",
            Operation::Or(..) => "or",
            Operation::Not(_) => "not",
            Operation::Bridge(_) => "bridge",
            Operation::Defer(_) => "defer",
            Operation::Return(_) => "return",
            Operation::Spawn(_) => "spawn",
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Operation> {
        match self {
            Operation::Literal(_) | Operation::Param(_) => Vec::new(),
            Operation::HeapRead(target) => vec![target.as_ref()],
            Operation::HeapWrite(target, value) => vec![target.as_ref(), value.as_ref()],
            Operation::Allocate(alloc) => vec![alloc.init.as_ref()],
            Operation::Call(call) | Operation::SuspendPoint(call) | Operation::Spawn(call) => {
                call.args.iter().collect()
            }
            Operation::Branch { cond, then_ops, else_ops } => std::iter::once(cond.as_ref())
                .chain(then_ops.iter())
                .chain(else_ops.iter())
                .collect(),
            Operation::FailPoint(p)
            | Operation::Not(p)
            | Operation::Bridge(p)
            | Operation::Return(p) => vec![p.as_ref()],
            Operation::Compare(_, lhs, rhs) | Operation::Add(lhs, rhs) | Operation::Or(lhs, rhs) => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Operation::Block(ops) | Operation::And(ops) | Operation::Defer(ops) => ops.iter().collect(),
        }
    }

    /// Functions this operation may call directly, spawned calls included
    pub fn callees(&self) -> Vec<FunctionId> {
        let mut out = Vec::new();
        self.collect_callees(&mut out);
        out
    }

    fn collect_callees(&self, out: &mut Vec<FunctionId>) {
        match self {
            Operation::Call(call) | Operation::SuspendPoint(call) | Operation::Spawn(call) => {
                out.push(call.callee)
            }
            _ => {}
        }
        for child in self.children() {
            child.collect_callees(out);
        }
    }
}

/// Position of an operation inside a body: child indices from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationPath(pub Vec<u32>);

impl OperationPath {
    pub fn root() -> Self {
        OperationPath(Vec::new())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(index as u32);
        OperationPath(steps)
    }
}

impl fmt::Display for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}
