//! Lowering of expressions that suspend
//!
//! A suspending call nested in an ordinary expression, as in
//! `set x = fetch()`, cannot be evaluated by the recursive engine because
//! the context has to stop in the middle of it. Such an expression is
//! rewritten into a run of statements, each binding its value to a fresh
//! parameter slot, followed by the residual expression reading those
//! slots. Operands left of the last suspending operand are hoisted too, so
//! evaluation order is unchanged.
//!
//! Speculative operands (conditions, `and`/`or`/`not`, bridges, fail points)
//! and deferred blocks are never descended into; a suspension there stays
//! an error.

use fx_core::{Allocation, Call, Operation, Program};

/// Whether evaluating `op` reaches a suspension outside any speculative
/// operand
pub(crate) fn suspends_eagerly(program: &Program, op: &Operation) -> bool {
    let any = |ops: &[Operation]| ops.iter().any(|op| suspends_eagerly(program, op));
    match op {
        Operation::SuspendPoint(_) => true,
        Operation::Call(call) => callee_suspends(program, call) || any(&call.args),
        Operation::Spawn(call) => any(&call.args),
        Operation::Branch { then_ops, else_ops, .. } => any(then_ops) || any(else_ops),
        Operation::And(_)
        | Operation::Or(..)
        | Operation::Not(_)
        | Operation::Bridge(_)
        | Operation::FailPoint(_)
        | Operation::Defer(_) => false,
        _ => op.children().into_iter().any(|child| suspends_eagerly(program, child)),
    }
}

pub(crate) fn callee_suspends(program: &Program, call: &Call) -> bool {
    program.signature(call.callee).is_some_and(|sig| sig.suspends())
}

/// Lower `op` into statements for an expression frame whose parameters
/// start with `arity` values. The last statement is the residual.
pub(crate) fn lower(program: &Program, op: &Operation, arity: usize) -> Vec<Operation> {
    let mut lowering = Lowering {
        program,
        steps: Vec::new(),
        next_slot: arity,
    };
    let residual = lowering.expr(op);
    lowering.steps.push(residual);
    lowering.steps
}

struct Lowering<'p> {
    program: &'p Program,
    steps: Vec<Operation>,
    next_slot: usize,
}

impl Lowering<'_> {
    fn expr(&mut self, op: &Operation) -> Operation {
        if !suspends_eagerly(self.program, op) {
            return op.clone();
        }
        match op {
            Operation::SuspendPoint(call) => {
                let call = self.call(call);
                self.bind(Operation::SuspendPoint(call))
            }
            Operation::Call(call) => {
                let lowered = Operation::Call(self.call(call));
                if callee_suspends(self.program, call) {
                    self.bind(lowered)
                } else {
                    lowered
                }
            }
            Operation::Spawn(call) => Operation::Spawn(self.call(call)),
            Operation::Block(_) | Operation::Branch { .. } => self.bind(op.clone()),
            Operation::HeapRead(target) => Operation::HeapRead(Box::new(self.expr(target))),
            Operation::HeapWrite(target, value) => {
                let [target, value] = self.pair(target, value);
                Operation::HeapWrite(Box::new(target), Box::new(value))
            }
            Operation::Allocate(alloc) => Operation::Allocate(Allocation {
                ty: alloc.ty.clone(),
                init: Box::new(self.expr(&alloc.init)),
            }),
            Operation::Compare(cmp, lhs, rhs) => {
                let [lhs, rhs] = self.pair(lhs, rhs);
                Operation::Compare(*cmp, Box::new(lhs), Box::new(rhs))
            }
            Operation::Add(lhs, rhs) => {
                let [lhs, rhs] = self.pair(lhs, rhs);
                Operation::Add(Box::new(lhs), Box::new(rhs))
            }
            Operation::Return(value) => Operation::Return(Box::new(self.expr(value))),
            other => other.clone(),
        }
    }

    fn call(&mut self, call: &Call) -> Call {
        let args: Vec<&Operation> = call.args.iter().collect();
        Call::new(call.callee, self.seq(&args))
    }

    fn pair(&mut self, first: &Operation, second: &Operation) -> [Operation; 2] {
        let mut lowered = self.seq(&[first, second]).into_iter();
        match (lowered.next(), lowered.next()) {
            (Some(first), Some(second)) => [first, second],
            _ => [first.clone(), second.clone()],
        }
    }

    /// Operands evaluated left to right. Everything before the last
    /// suspending operand is bound first.
    fn seq(&mut self, ops: &[&Operation]) -> Vec<Operation> {
        let last = ops.iter().rposition(|op| suspends_eagerly(self.program, op));
        ops.iter()
            .enumerate()
            .map(|(i, op)| match last {
                Some(j) if i < j => {
                    let value = self.expr(op);
                    self.bind(value)
                }
                Some(j) if i == j => self.expr(op),
                _ => (*op).clone(),
            })
            .collect()
    }

    fn bind(&mut self, op: Operation) -> Operation {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.steps.push(op);
        Operation::Param(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::{EffectSet, FundamentalEffect, RefId, Signature, Type, Value};

    fn program() -> (Program, fx_core::FunctionId, fx_core::FunctionId) {
        let mut program = Program::new();
        let pure = program.add_function(
            Signature::new("pure", vec![], Type::Unit, EffectSet::pure()),
            Operation::unit(),
        );
        let fetch = program.add_function(
            Signature::new("fetch", vec![], Type::Unit, EffectSet::single(FundamentalEffect::Suspends)),
            Operation::unit(),
        );
        (program, pure, fetch)
    }

    #[test]
    fn test_plain_expressions_are_untouched() {
        let (program, pure, _) = program();
        let op = Operation::add(Operation::call(pure, vec![]), Operation::lit(1));
        assert!(!suspends_eagerly(&program, &op));
        assert_eq!(lower(&program, &op, 0), vec![op]);
    }

    #[test]
    fn test_write_of_suspending_call() {
        let (program, _, fetch) = program();
        let x = RefId(0);
        let op = Operation::write(x, Operation::call(fetch, vec![]));
        assert_eq!(
            lower(&program, &op, 1),
            vec![
                Operation::cell(x),
                Operation::call(fetch, vec![]),
                Operation::HeapWrite(Box::new(Operation::Param(1)), Box::new(Operation::Param(2))),
            ]
        );
    }

    #[test]
    fn test_left_operands_are_bound_first() {
        let (program, _, fetch) = program();
        let op = Operation::add(
            Operation::read(RefId(0)),
            Operation::add(Operation::lit(1), Operation::suspend(fetch, vec![])),
        );
        let steps = lower(&program, &op, 0);
        assert_eq!(
            steps,
            vec![
                Operation::read(RefId(0)),
                Operation::lit(1),
                Operation::suspend(fetch, vec![]),
                Operation::add(
                    Operation::Param(0),
                    Operation::add(Operation::Param(1), Operation::Param(2)),
                ),
            ]
        );
    }

    #[test]
    fn test_speculative_operands_are_opaque() {
        let (program, _, fetch) = program();
        let op = Operation::add(Operation::lit(Value::Int(1)), Operation::bridge(Operation::call(fetch, vec![])));
        assert!(!suspends_eagerly(&program, &op));
        assert_eq!(lower(&program, &op, 0).len(), 1);
    }
}
