//! Speculative evaluation
//!
//! Conditions, `and`/`or`/`not` operands, failure bridges and calls to
//! fallible functions each run in a speculative scope: a journal checkpoint
//! that is rolled back when the scope fails and committed when it succeeds.
//! Every scope also owns the deferred blocks registered inside it; they run
//! newest first when the scope exits successfully or by `return`.

use crate::context::{DeferEntry, ExecutionContext, World};
use crate::error::{Result, RuntimeError};
use crate::journal::UndoRecord;
use fx_core::{CmpOp, FunctionId, FundamentalEffect, Operation, Program, RefId, Signature, Value};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::trace;

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded(Value),
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            Outcome::Failed => None,
        }
    }
}

/// Control flow out of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flow {
    Value(Value),
    Fail,
    Return(Value),
}

/// Unwrap a `Flow::Value`, passing failure and `return` to the caller.
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Value(value) => value,
            other => return Ok(other),
        }
    };
}

/// In a condition, `false` and an empty option count as failure and a
/// present option is unwrapped.
fn admit(flow: Flow) -> Flow {
    match flow {
        Flow::Value(Value::Bool(false)) | Flow::Value(Value::Option(None)) => Flow::Fail,
        Flow::Value(Value::Option(Some(inner))) => Flow::Value(*inner),
        other => other,
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Maximum operations one context may evaluate
    pub step_limit: Option<u64>,
    /// Trace every journal record and rollback
    pub trace_journal: bool,
}

pub struct SpeculativeEngine<'p> {
    program: &'p Program,
    config: EngineConfig,
}

impl<'p> SpeculativeEngine<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, EngineConfig::default())
    }

    pub fn with_config(program: &'p Program, config: EngineConfig) -> Self {
        SpeculativeEngine { program, config }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate a closed operation
    pub fn evaluate(&self, op: &Operation, ctx: &mut ExecutionContext, world: &mut World) -> Result<Outcome> {
        self.evaluate_with(op, &[], ctx, world)
    }

    /// Evaluate `op` with `args` bound to its parameters
    pub fn evaluate_with(
        &self,
        op: &Operation,
        args: &[Value],
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Outcome> {
        Ok(match self.eval(op, args, ctx, world)? {
            Flow::Value(value) | Flow::Return(value) => Outcome::Succeeded(value),
            Flow::Fail => Outcome::Failed,
        })
    }

    pub fn call(
        &self,
        callee: FunctionId,
        args: Vec<Value>,
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Outcome> {
        Ok(match self.call_function(callee, args, ctx, world)? {
            Flow::Value(value) | Flow::Return(value) => Outcome::Succeeded(value),
            Flow::Fail => Outcome::Failed,
        })
    }

    pub(crate) fn signature(&self, callee: FunctionId) -> Result<&'p Signature> {
        self.program
            .signature(callee)
            .ok_or(RuntimeError::UnknownFunction { callee })
    }

    pub(crate) fn tick(&self, ctx: &mut ExecutionContext) -> Result<()> {
        ctx.tick(self.config.step_limit)
    }

    pub(crate) fn eval(
        &self,
        op: &Operation,
        args: &[Value],
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Flow> {
        self.tick(ctx)?;

        match op {
            Operation::Literal(value) => Ok(Flow::Value(value.clone())),
            Operation::Param(index) => args
                .get(*index)
                .cloned()
                .map(Flow::Value)
                .ok_or(RuntimeError::ArgumentOutOfRange { index: *index }),
            Operation::HeapRead(target) => {
                let cell = cell(value!(self.eval(target, args, ctx, world)?))?;
                Ok(Flow::Value(world.heap.read(cell)?.clone()))
            }
            Operation::HeapWrite(target, value) => {
                let cell = cell(value!(self.eval(target, args, ctx, world)?))?;
                let value = value!(self.eval(value, args, ctx, world)?);
                let previous = world.heap.write(cell, value)?;
                self.record(ctx, UndoRecord::Write { cell, previous });
                Ok(Flow::Value(Value::Unit))
            }
            Operation::Allocate(alloc) => {
                let init = value!(self.eval(&alloc.init, args, ctx, world)?);
                let cell = world.heap.allocate(init);
                self.record(ctx, UndoRecord::Allocate { cell });
                Ok(Flow::Value(Value::Ref(cell)))
            }
            Operation::Call(call) => {
                let mut values = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    values.push(value!(self.eval(arg, args, ctx, world)?));
                }
                self.call_function(call.callee, values, ctx, world)
            }
            Operation::SuspendPoint(call) => {
                if ctx.is_speculative() {
                    Err(RuntimeError::SuspensionInSpeculativeScope { callee: call.callee })
                } else {
                    Err(RuntimeError::SuspensionInExpression { callee: call.callee })
                }
            }
            Operation::Branch { cond, then_ops, else_ops } => {
                let taken = match self.guard(cond, args, ctx, world)? {
                    Flow::Value(_) => then_ops,
                    Flow::Fail => else_ops,
                    ret => return Ok(ret),
                };
                self.block(taken, args, ctx, world)
            }
            Operation::FailPoint(predicate) => {
                self.reject_failure_query(predicate)?;
                Ok(admit(self.eval(predicate, args, ctx, world)?))
            }
            Operation::Compare(cmp, lhs, rhs) => {
                let lhs = value!(self.eval(lhs, args, ctx, world)?);
                let rhs = value!(self.eval(rhs, args, ctx, world)?);
                Ok(Flow::Value(Value::Bool(compare(*cmp, &lhs, &rhs)?)))
            }
            Operation::Add(lhs, rhs) => {
                let lhs = value!(self.eval(lhs, args, ctx, world)?);
                let rhs = value!(self.eval(rhs, args, ctx, world)?);
                Ok(Flow::Value(add(lhs, rhs)?))
            }
            Operation::Block(ops) => self.block(ops, args, ctx, world),
            Operation::And(ops) => self.scoped(true, ctx, world, |ctx, world| {
                let mut last = Value::Unit;
                for op in ops {
                    last = value!(admit(self.eval(op, args, ctx, world)?));
                }
                Ok(Flow::Value(last))
            }),
            Operation::Or(p, q) => match self.guard(p, args, ctx, world)? {
                Flow::Fail => self.guard(q, args, ctx, world),
                flow => Ok(flow),
            },
            Operation::Not(operand) => {
                self.reject_failure_query(operand)?;
                let checkpoint = ctx.journal.checkpoint();
                let base = ctx.defers.len();
                let flow = admit(self.eval(operand, args, ctx, world)?);
                let undone = ctx.rollback(checkpoint, &mut world.heap);
                ctx.defers.truncate(base);
                if self.config.trace_journal {
                    trace!("not: rolled back {} records", undone);
                }
                Ok(match flow {
                    Flow::Fail => Flow::Value(Value::Unit),
                    Flow::Value(_) | Flow::Return(_) => Flow::Fail,
                })
            }
            Operation::Bridge(operand) => {
                self.reject_failure_query(operand)?;
                let flow = self.scoped(true, ctx, world, |ctx, world| Ok(admit(self.eval(operand, args, ctx, world)?)))?;
                Ok(match flow {
                    Flow::Value(value) => Flow::Value(Value::some(value)),
                    Flow::Fail => Flow::Value(Value::none()),
                    ret => ret,
                })
            }
            Operation::Defer(ops) => {
                let slot = ctx.register_defer(DeferEntry {
                    ops: ops.clone(),
                    args: args.to_vec(),
                });
                trace!("deferred block registered at slot {}", slot);
                Ok(Flow::Value(Value::Unit))
            }
            Operation::Return(value) => {
                let value = value!(self.eval(value, args, ctx, world)?);
                Ok(Flow::Return(value))
            }
            Operation::Spawn(call) => {
                if ctx.is_speculative() {
                    return Err(RuntimeError::SpawnInSpeculativeScope { callee: call.callee });
                }
                self.signature(call.callee)?;
                let mut values = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    values.push(value!(self.eval(arg, args, ctx, world)?));
                }
                let handle = world.request_spawn(call.callee, values);
                trace!("spawn of {} requested as {}", call.callee, handle);
                Ok(Flow::Value(Value::Task(handle.0)))
            }
        }
    }

    pub(crate) fn call_function(
        &self,
        callee: FunctionId,
        args: Vec<Value>,
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Flow> {
        let def = self
            .program
            .function(callee)
            .ok_or(RuntimeError::UnknownFunction { callee })?;
        let signature = &def.signature;
        if signature.arity() != args.len() {
            return Err(RuntimeError::type_mismatch(
                format!("{} arguments", signature.arity()),
                format!("{} arguments", args.len()),
            ));
        }
        if ctx.is_speculative() {
            if signature.suspends() {
                return Err(RuntimeError::SuspensionInSpeculativeScope { callee });
            }
            if signature.effects.contains(FundamentalEffect::NoRollback) {
                return Err(RuntimeError::NoRollbackInSpeculativeScope { callee });
            }
        }

        trace!("call {} ({})", signature.name, callee);
        let flow = self.scoped(signature.is_fallible(), ctx, world, |ctx, world| {
            self.eval(&def.body, &args, ctx, world)
        })?;
        match flow {
            Flow::Value(value) | Flow::Return(value) => Ok(Flow::Value(value)),
            Flow::Fail if signature.suspends() => Err(RuntimeError::FailureAcrossSuspension { function: callee }),
            Flow::Fail => Ok(Flow::Fail),
        }
    }

    /// Evaluate a condition in its own speculative scope
    pub(crate) fn guard(
        &self,
        cond: &Operation,
        args: &[Value],
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Flow> {
        self.scoped(true, ctx, world, |ctx, world| Ok(admit(self.eval(cond, args, ctx, world)?)))
    }

    /// Lexical scope: owns defers, never rolls back on its own
    pub(crate) fn block(
        &self,
        ops: &[Operation],
        args: &[Value],
        ctx: &mut ExecutionContext,
        world: &mut World,
    ) -> Result<Flow> {
        self.scoped(false, ctx, world, |ctx, world| {
            let mut last = Value::Unit;
            for op in ops {
                last = value!(self.eval(op, args, ctx, world)?);
            }
            Ok(Flow::Value(last))
        })
    }

    fn scoped<F>(&self, speculative: bool, ctx: &mut ExecutionContext, world: &mut World, body: F) -> Result<Flow>
    where
        F: FnOnce(&mut ExecutionContext, &mut World) -> Result<Flow>,
    {
        let checkpoint = speculative.then(|| ctx.journal.checkpoint());
        let base = ctx.defers.len();
        let flow = body(ctx, world)?;

        match &flow {
            Flow::Fail => {
                if let Some(checkpoint) = checkpoint {
                    let undone = ctx.rollback(checkpoint, &mut world.heap);
                    if self.config.trace_journal {
                        trace!("rolled back {} records", undone);
                    }
                }
                ctx.defers.truncate(base);
            }
            Flow::Value(_) | Flow::Return(_) => {
                self.run_defers(base, ctx, world)?;
                if let Some(checkpoint) = checkpoint {
                    ctx.journal.commit(checkpoint);
                }
            }
        }
        Ok(flow)
    }

    /// Run deferred blocks registered above `base`, newest first.
    pub(crate) fn run_defers(&self, base: usize, ctx: &mut ExecutionContext, world: &mut World) -> Result<()> {
        while ctx.defers.len() > base {
            let Some(entry) = ctx.defers.pop() else { break };
            if let Flow::Fail = self.block(&entry.ops, &entry.args, ctx, world)? {
                return Err(RuntimeError::DeferredFailure);
            }
        }
        Ok(())
    }

    /// Failure queries may not be applied directly to a suspending call.
    fn reject_failure_query(&self, operand: &Operation) -> Result<()> {
        match operand {
            Operation::SuspendPoint(call) => Err(RuntimeError::FailureQueryOnSuspendingCall { callee: call.callee }),
            Operation::Call(call) if self.program.signature(call.callee).is_some_and(|sig| sig.suspends()) => {
                Err(RuntimeError::FailureQueryOnSuspendingCall { callee: call.callee })
            }
            _ => Ok(()),
        }
    }

    fn record(&self, ctx: &mut ExecutionContext, record: UndoRecord) {
        if self.config.trace_journal {
            trace!("journal: {:?}", record);
        }
        ctx.journal.record(record);
    }
}

fn cell(value: Value) -> Result<RefId> {
    value
        .as_ref_id()
        .ok_or_else(|| RuntimeError::type_mismatch("ref", value.kind()))
}

fn compare(cmp: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    Ok(match cmp {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Lt => ordering(lhs, rhs)? == Ordering::Less,
        CmpOp::Le => ordering(lhs, rhs)? != Ordering::Greater,
        CmpOp::Gt => ordering(lhs, rhs)? == Ordering::Greater,
        CmpOp::Ge => ordering(lhs, rhs)? != Ordering::Less,
    })
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(RuntimeError::type_mismatch(lhs.kind(), rhs.kind())),
    }
}

fn add(lhs: Value, rhs: Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (lhs, rhs) => Err(RuntimeError::type_mismatch(lhs.kind(), rhs.kind())),
    }
}
