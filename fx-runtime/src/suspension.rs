//! Suspension coordinator
//!
//! Owns every execution context and the heap they share, and drives
//! contexts round-robin. A context runs statement by statement from its
//! frame stack; a suspension point parks the context with a fresh token
//! and the call it will enter once resumed. Expressions that suspend are
//! lowered into statements first. Suspending inside a speculative scope is
//! a fatal error for that context, and a faulted context has its open
//! scopes rolled back.

use crate::context::{ExecutionContext, FrameKind, SuspensionToken, TaskHandle, World};
use crate::engine::{EngineConfig, Flow, Outcome, SpeculativeEngine};
use crate::error::{Result, RuntimeError};
use crate::heap::Heap;
use crate::lower::{callee_suspends, lower, suspends_eagerly};
use fx_core::{Call, FunctionId, Operation, Program, Value};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ready,
    Suspended,
    Completed,
    /// The entry function failed; its effects were rolled back
    Failed,
    Cancelled,
    Faulted,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskStatus::Ready | TaskStatus::Suspended)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub engine: EngineConfig,
    /// Maximum number of unfinished tasks
    pub max_contexts: Option<usize>,
}

#[derive(Debug)]
struct Task {
    entry: FunctionId,
    context: ExecutionContext,
    status: TaskStatus,
    token: Option<SuspensionToken>,
    error: Option<RuntimeError>,
}

/// How a slice of a task ended
enum Slice {
    Suspended,
    Completed,
    Failed,
}

pub struct SuspensionCoordinator<'p> {
    engine: SpeculativeEngine<'p>,
    world: World,
    main: ExecutionContext,
    tasks: BTreeMap<TaskHandle, Task>,
    ready: VecDeque<TaskHandle>,
    parked: VecDeque<SuspensionToken>,
    max_contexts: Option<usize>,
}

impl<'p> SuspensionCoordinator<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, CoordinatorConfig::default())
    }

    pub fn with_config(program: &'p Program, config: CoordinatorConfig) -> Self {
        SuspensionCoordinator {
            engine: SpeculativeEngine::with_config(program, config.engine),
            world: World::new(Heap::from_program(program)),
            main: ExecutionContext::new(),
            tasks: BTreeMap::new(),
            ready: VecDeque::new(),
            parked: VecDeque::new(),
            max_contexts: config.max_contexts,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.world.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.world.heap
    }

    /// Run `entry` to completion. Suspending entries run as a task; spawned
    /// tasks are drained before returning.
    pub fn run(&mut self, entry: FunctionId, args: Vec<Value>) -> Result<Outcome> {
        if self.engine.signature(entry)?.suspends() {
            let handle = self.spawn(entry, args)?;
            self.run_until_idle();
            let task = self.task(handle)?;
            return match task.status {
                TaskStatus::Completed => Ok(Outcome::Succeeded(task.context.result.clone().unwrap_or_default())),
                TaskStatus::Faulted => Err(task.error.clone().unwrap_or(RuntimeError::DeferredFailure)),
                _ => Ok(Outcome::Failed),
            };
        }

        let outcome = self.call(entry, args)?;
        self.run_until_idle();
        Ok(outcome)
    }

    /// Call a non-suspending function on the coordinator's own context
    pub fn call(&mut self, callee: FunctionId, args: Vec<Value>) -> Result<Outcome> {
        let outcome = self.engine.call(callee, args, &mut self.main, &mut self.world);
        if outcome.is_err() {
            self.main.abort(&mut self.world.heap);
        }
        self.adopt_spawns();
        outcome
    }

    /// Start `callee` in a fresh context
    pub fn spawn(&mut self, callee: FunctionId, args: Vec<Value>) -> Result<TaskHandle> {
        self.engine.signature(callee)?;
        self.check_capacity()?;
        let handle = self.world.next_handle();
        self.insert_task(handle, callee, args);
        Ok(handle)
    }

    fn check_capacity(&self) -> Result<()> {
        match self.max_contexts {
            Some(limit) if self.active() >= limit => Err(RuntimeError::TooManyContexts { limit }),
            _ => Ok(()),
        }
    }

    fn insert_task(&mut self, handle: TaskHandle, entry: FunctionId, args: Vec<Value>) {
        let mut context = ExecutionContext::new();
        context.pending = Some((entry, args));
        self.tasks.insert(
            handle,
            Task {
                entry,
                context,
                status: TaskStatus::Ready,
                token: None,
                error: None,
            },
        );
        self.ready.push_back(handle);
        debug!("spawned {} running {}", handle, entry);
    }

    /// Turn spawn requests evaluated by any context into tasks. A request
    /// over the context limit becomes a task that is already faulted.
    fn adopt_spawns(&mut self) {
        for request in self.world.take_spawns() {
            match self.check_capacity() {
                Ok(()) => self.insert_task(request.handle, request.callee, request.args),
                Err(error) => {
                    warn!("{} not started: {}", request.handle, error);
                    self.tasks.insert(
                        request.handle,
                        Task {
                            entry: request.callee,
                            context: ExecutionContext::new(),
                            status: TaskStatus::Faulted,
                            token: None,
                            error: Some(error),
                        },
                    );
                }
            }
        }
    }

    /// Cancel a task at its current suspension boundary.
    ///
    /// Deferred blocks of its open scopes run, newest first; its journal is
    /// then dropped without replay. Cancelling a finished task does nothing.
    pub fn cancel(&mut self, handle: TaskHandle) -> Result<()> {
        let task = self
            .tasks
            .get_mut(&handle)
            .ok_or(RuntimeError::UnknownTask { handle: handle.0 })?;
        if task.status.is_finished() {
            return Ok(());
        }

        self.ready.retain(|h| *h != handle);
        self.parked.retain(|token| token.context != handle);
        task.token = None;

        let cleanup = self.engine.run_defers(0, &mut task.context, &mut self.world);
        task.context.discard();
        debug!("cancelled {}", handle);
        match cleanup {
            Ok(()) => {
                task.status = TaskStatus::Cancelled;
                self.adopt_spawns();
                Ok(())
            }
            Err(error) => {
                task.status = TaskStatus::Faulted;
                task.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Make a suspended task runnable again
    pub fn resume(&mut self, token: SuspensionToken) -> Result<()> {
        let handle = token.context;
        let task = self
            .tasks
            .get_mut(&handle)
            .ok_or(RuntimeError::UnknownTask { handle: handle.0 })?;
        if task.status != TaskStatus::Suspended || task.token != Some(token) {
            return Err(RuntimeError::StaleToken { handle: handle.0 });
        }
        task.token = None;
        task.status = TaskStatus::Ready;
        self.parked.retain(|parked| *parked != token);
        self.ready.push_back(handle);
        trace!("resumed {} at #{}", handle, token.sequence);
        Ok(())
    }

    pub fn poll(&self, handle: TaskHandle) -> Result<TaskStatus> {
        Ok(self.task(handle)?.status)
    }

    pub fn result(&self, handle: TaskHandle) -> Option<&Value> {
        self.tasks.get(&handle).and_then(|task| task.context.result.as_ref())
    }

    pub fn error(&self, handle: TaskHandle) -> Option<&RuntimeError> {
        self.tasks.get(&handle).and_then(|task| task.error.as_ref())
    }

    pub fn entry(&self, handle: TaskHandle) -> Option<FunctionId> {
        self.tasks.get(&handle).map(|task| task.entry)
    }

    /// Tokens of suspended tasks in the order they suspended
    pub fn suspended(&self) -> Vec<SuspensionToken> {
        self.parked.iter().copied().collect()
    }

    pub fn handles(&self) -> Vec<TaskHandle> {
        self.tasks.keys().copied().collect()
    }

    /// Unfinished tasks
    pub fn active(&self) -> usize {
        self.tasks.values().filter(|task| !task.status.is_finished()).count()
    }

    fn task(&self, handle: TaskHandle) -> Result<&Task> {
        self.tasks
            .get(&handle)
            .ok_or(RuntimeError::UnknownTask { handle: handle.0 })
    }

    /// Run the next ready task until it suspends or finishes.
    pub fn step(&mut self) -> Option<TaskHandle> {
        let handle = self.ready.pop_front()?;
        let Some(task) = self.tasks.get_mut(&handle) else { return Some(handle) };
        if task.status != TaskStatus::Ready {
            return Some(handle);
        }

        match drive(&self.engine, &mut task.context, &mut self.world) {
            Ok(Slice::Suspended) => {
                let token = SuspensionToken {
                    context: handle,
                    sequence: task.context.next_sequence(),
                };
                task.token = Some(token);
                task.status = TaskStatus::Suspended;
                self.parked.push_back(token);
                trace!("{} suspended at #{}", handle, token.sequence);
            }
            Ok(Slice::Completed) => {
                task.status = TaskStatus::Completed;
                debug!("{} completed", handle);
            }
            Ok(Slice::Failed) => {
                task.status = TaskStatus::Failed;
                debug!("{} failed", handle);
            }
            Err(error) => {
                let undone = task.context.abort(&mut self.world.heap);
                warn!("{} faulted: {} ({} records undone)", handle, error, undone);
                task.status = TaskStatus::Faulted;
                task.error = Some(error);
            }
        }
        self.adopt_spawns();
        Some(handle)
    }

    /// Drive every task until none is ready. Suspended tasks are resumed
    /// in the order they suspended once the ready queue drains. Returns the
    /// number of slices run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut slices = 0;
        loop {
            while self.step().is_some() {
                slices += 1;
            }
            if self.parked.is_empty() {
                return slices;
            }
            for token in std::mem::take(&mut self.parked) {
                if let Err(error) = self.resume(token) {
                    trace!("skipping token: {}", error);
                }
            }
        }
    }
}

/// Run one context from its continuation until it suspends or finishes.
fn drive(engine: &SpeculativeEngine<'_>, ctx: &mut ExecutionContext, world: &mut World) -> Result<Slice> {
    let program = engine.program();
    if let Some((callee, args)) = ctx.pending.take() {
        if engine.signature(callee)?.suspends() {
            enter(engine, ctx, callee, args)?;
        } else {
            // Nothing inside can suspend: run it whole, in its own scope.
            match engine.call_function(callee, args, ctx, world)? {
                Flow::Value(value) | Flow::Return(value) => deliver(ctx, value),
                Flow::Fail if ctx.frames.is_empty() => return Ok(Slice::Failed),
                Flow::Fail => return Err(failure_across_suspension(ctx)),
            }
        }
    }

    loop {
        engine.tick(ctx)?;
        let Some(frame) = ctx.frames.last_mut() else {
            return Ok(Slice::Completed);
        };

        if frame.pc >= frame.ops.len() {
            let value = std::mem::take(&mut frame.last);
            finish_frame(engine, ctx, world, value)?;
            continue;
        }
        let op = frame.ops[frame.pc].clone();
        frame.pc += 1;
        let args = frame.args.clone();
        let eager_args = |call: &Call| call.args.iter().any(|arg| suspends_eagerly(program, arg));

        match &op {
            Operation::SuspendPoint(call) if !eager_args(call) => {
                engine.signature(call.callee)?;
                let Some(values) = statement_args(engine, &call.args, &args, ctx, world)? else { continue };
                ctx.pending = Some((call.callee, values));
                return Ok(Slice::Suspended);
            }
            Operation::Call(call) if callee_suspends(program, call) && !eager_args(call) => {
                let Some(values) = statement_args(engine, &call.args, &args, ctx, world)? else { continue };
                enter(engine, ctx, call.callee, values)?;
            }
            Operation::Block(ops) if suspends_eagerly(program, &op) => {
                ctx.push_frame(FrameKind::Block, ops.clone(), args);
            }
            Operation::Branch { cond, then_ops, else_ops } if suspends_eagerly(program, &op) => {
                let taken = match engine.guard(cond, &args, ctx, world)? {
                    Flow::Value(_) => then_ops,
                    Flow::Fail => else_ops,
                    Flow::Return(value) => {
                        unwind(engine, ctx, world, value)?;
                        continue;
                    }
                };
                ctx.push_frame(FrameKind::Block, taken.clone(), args);
            }
            _ if suspends_eagerly(program, &op) => {
                let steps = lower(program, &op, args.len());
                trace!("lowered {} into {} statements", op.kind(), steps.len());
                ctx.push_frame(FrameKind::Expr, steps, args);
            }
            _ => match engine.eval(&op, &args, ctx, world)? {
                Flow::Value(value) => store(ctx, value),
                Flow::Fail => return Err(failure_across_suspension(ctx)),
                Flow::Return(value) => unwind(engine, ctx, world, value)?,
            },
        }
    }
}

/// Evaluate call arguments at statement level. `None` means a `return`
/// inside an argument already unwound the function.
fn statement_args(
    engine: &SpeculativeEngine<'_>,
    ops: &[Operation],
    args: &[Value],
    ctx: &mut ExecutionContext,
    world: &mut World,
) -> Result<Option<Vec<Value>>> {
    let mut values = Vec::with_capacity(ops.len());
    for op in ops {
        match engine.eval(op, args, ctx, world)? {
            Flow::Value(value) => values.push(value),
            Flow::Fail => return Err(failure_across_suspension(ctx)),
            Flow::Return(value) => {
                unwind(engine, ctx, world, value)?;
                return Ok(None);
            }
        }
    }
    Ok(Some(values))
}

fn failure_across_suspension(ctx: &ExecutionContext) -> RuntimeError {
    RuntimeError::FailureAcrossSuspension {
        function: ctx.current_function().unwrap_or(FunctionId(0)),
    }
}

/// Push a function frame for `callee`; a block body is spread into statements.
fn enter(engine: &SpeculativeEngine<'_>, ctx: &mut ExecutionContext, callee: FunctionId, args: Vec<Value>) -> Result<()> {
    let def = engine
        .program()
        .function(callee)
        .ok_or(RuntimeError::UnknownFunction { callee })?;
    if def.signature.arity() != args.len() {
        return Err(RuntimeError::type_mismatch(
            format!("{} arguments", def.signature.arity()),
            format!("{} arguments", args.len()),
        ));
    }
    let ops = match &def.body {
        Operation::Block(ops) => ops.clone(),
        other => vec![other.clone()],
    };
    trace!("enter {} ({})", def.signature.name, callee);
    ctx.push_frame(FrameKind::Function(callee), ops, args);
    Ok(())
}

/// Pop the top frame after its last statement and hand its value outward.
/// Expression frames own no scope; their defers belong to the enclosing one.
fn finish_frame(engine: &SpeculativeEngine<'_>, ctx: &mut ExecutionContext, world: &mut World, value: Value) -> Result<()> {
    let Some(frame) = ctx.frames.last() else { return Ok(()) };
    if frame.kind != FrameKind::Expr {
        let base = frame.defer_base;
        engine.run_defers(base, ctx, world)?;
    }
    ctx.frames.pop();
    deliver(ctx, value);
    Ok(())
}

/// `return`: pop frames up to and including the innermost function frame,
/// running each scope's deferred blocks on the way out.
fn unwind(engine: &SpeculativeEngine<'_>, ctx: &mut ExecutionContext, world: &mut World, value: Value) -> Result<()> {
    while let Some(frame) = ctx.frames.last() {
        let base = frame.defer_base;
        let kind = frame.kind;
        if kind != FrameKind::Expr {
            engine.run_defers(base, ctx, world)?;
        }
        ctx.frames.pop();
        if let FrameKind::Function(_) = kind {
            break;
        }
    }
    deliver(ctx, value);
    Ok(())
}

fn deliver(ctx: &mut ExecutionContext, value: Value) {
    if ctx.frames.is_empty() {
        ctx.result = Some(value);
    } else {
        store(ctx, value);
    }
}

/// Record the value of the statement that just completed in the top frame.
/// In an expression frame every statement but the last fills a slot.
fn store(ctx: &mut ExecutionContext, value: Value) {
    if let Some(frame) = ctx.frames.last_mut() {
        if frame.kind == FrameKind::Expr && frame.pc < frame.ops.len() {
            frame.args.push(value);
        } else {
            frame.last = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::{EffectSet, FundamentalEffect, FundamentalEffect::*, RefId, Signature, Type};

    fn sig(name: &str, effects: &[FundamentalEffect]) -> Signature {
        Signature::new(name, vec![], Type::Unit, EffectSet::new(effects.iter().copied()).unwrap())
    }

    fn bump(x: RefId) -> Operation {
        Operation::write(x, Operation::add(Operation::read(x), Operation::lit(1)))
    }

    /// `tick` yields once, then bumps `x`
    fn ticking_program() -> (Program, RefId, FunctionId, FunctionId) {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let tick = program.add_function(
            sig("tick", &[Reads, Writes, Suspends]),
            Operation::Block(vec![Operation::suspend(nap, vec![]), bump(x)]),
        );
        (program, x, nap, tick)
    }

    #[test]
    fn test_suspend_and_resume() {
        let (program, x, _, tick) = ticking_program();
        let mut coordinator = SuspensionCoordinator::new(&program);
        let handle = coordinator.spawn(tick, vec![]).unwrap();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Ready);

        assert_eq!(coordinator.step(), Some(handle));
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Suspended);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(0));

        let tokens = coordinator.suspended();
        assert_eq!(tokens.len(), 1);
        coordinator.resume(tokens[0]).unwrap();
        assert_eq!(
            coordinator.resume(tokens[0]),
            Err(RuntimeError::StaleToken { handle: handle.0 })
        );

        coordinator.step();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Completed);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_run_until_idle_interleaves_tasks() {
        let (program, x, _, tick) = ticking_program();
        let mut coordinator = SuspensionCoordinator::new(&program);
        let a = coordinator.spawn(tick, vec![]).unwrap();
        let b = coordinator.spawn(tick, vec![]).unwrap();
        let slices = coordinator.run_until_idle();
        assert_eq!(slices, 4);
        assert_eq!(coordinator.poll(a).unwrap(), TaskStatus::Completed);
        assert_eq!(coordinator.poll(b).unwrap(), TaskStatus::Completed);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(2));
        assert_eq!(coordinator.active(), 0);
    }

    #[test]
    fn test_spawn_from_code() {
        let (mut program, x, _, tick) = ticking_program();
        let main = program.add_function(
            sig("main", &[]),
            Operation::Block(vec![Operation::spawn(tick, vec![]), Operation::spawn(tick, vec![])]),
        );
        let mut coordinator = SuspensionCoordinator::new(&program);
        let outcome = coordinator.run(main, vec![]).unwrap();
        assert!(matches!(outcome, Outcome::Succeeded(Value::Task(_))));
        assert_eq!(coordinator.handles().len(), 2);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(2));
    }

    #[test]
    fn test_cancel_runs_defers_without_replay() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let log = program.add_global("log", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let worker = program.add_function(
            sig("worker", &[Reads, Writes, Suspends]),
            Operation::Block(vec![
                Operation::Defer(vec![Operation::write(log, Operation::lit(1))]),
                Operation::write(x, Operation::lit(5)),
                Operation::suspend(nap, vec![]),
                Operation::write(x, Operation::lit(6)),
            ]),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        let handle = coordinator.spawn(worker, vec![]).unwrap();
        coordinator.step();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Suspended);

        coordinator.cancel(handle).unwrap();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Cancelled);
        assert_eq!(coordinator.heap().read(log).unwrap(), &Value::Int(1));
        // Committed work stays; nothing after the suspension point ran.
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(5));
        assert!(coordinator.suspended().is_empty());
        assert_eq!(coordinator.run_until_idle(), 0);

        coordinator.cancel(handle).unwrap();
        assert_eq!(
            coordinator.cancel(TaskHandle(42)),
            Err(RuntimeError::UnknownTask { handle: 42 })
        );
    }

    #[test]
    fn test_suspension_in_speculative_scope_faults_context() {
        let mut program = Program::new();
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let bad = program.add_function(
            sig("bad", &[Suspends]),
            Operation::Block(vec![Operation::branch(Operation::suspend(nap, vec![]), vec![], vec![])]),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        let handle = coordinator.spawn(bad, vec![]).unwrap();
        coordinator.run_until_idle();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Faulted);
        assert_eq!(
            coordinator.error(handle),
            Some(&RuntimeError::SuspensionInSpeculativeScope { callee: nap })
        );
    }

    #[test]
    fn test_failure_across_suspension_is_fatal() {
        let mut program = Program::new();
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let leaky = program.add_function(
            sig("leaky", &[Suspends]),
            Operation::Block(vec![Operation::suspend(nap, vec![]), Operation::fail()]),
        );
        let mut coordinator = SuspensionCoordinator::new(&program);
        assert_eq!(
            coordinator.run(leaky, vec![]),
            Err(RuntimeError::FailureAcrossSuspension { function: leaky })
        );
    }

    #[test]
    fn test_suspending_call_inside_expression() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let fetch = program.add_function(
            sig("fetch", &[Suspends]),
            Operation::Block(vec![Operation::suspend(nap, vec![]), Operation::lit(5)]),
        );
        let main = program.add_function(
            sig("main", &[Writes, Suspends]),
            Operation::Block(vec![Operation::write(x, Operation::call(fetch, vec![]))]),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        let handle = coordinator.spawn(main, vec![]).unwrap();
        coordinator.step();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Suspended);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(0));

        coordinator.run_until_idle();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Completed);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(5));
    }

    #[test]
    fn test_operands_keep_their_order_across_suspension() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(1));
        let total = program.add_global("total", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        // Overwrites x after yielding, then returns 1
        let bump = program.add_function(
            sig("bump", &[Writes, Suspends]),
            Operation::Block(vec![
                Operation::suspend(nap, vec![]),
                Operation::write(x, Operation::lit(10)),
                Operation::lit(1),
            ]),
        );
        let main = program.add_function(
            sig("main", &[Reads, Writes, Suspends]),
            Operation::write(
                total,
                Operation::add(Operation::read(x), Operation::suspend(bump, vec![])),
            ),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        assert_eq!(coordinator.run(main, vec![]).unwrap(), Outcome::Succeeded(Value::Unit));
        // x was read before bump ran
        assert_eq!(coordinator.heap().read(total).unwrap(), &Value::Int(2));
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(10));
    }

    #[test]
    fn test_suspension_inside_defer_is_fatal() {
        let mut program = Program::new();
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let late = program.add_function(
            sig("late", &[Suspends]),
            Operation::Block(vec![Operation::Defer(vec![Operation::suspend(nap, vec![])])]),
        );
        let mut coordinator = SuspensionCoordinator::new(&program);
        assert_eq!(
            coordinator.run(late, vec![]),
            Err(RuntimeError::SuspensionInExpression { callee: nap })
        );
    }

    #[test]
    fn test_fault_rolls_back_open_scopes() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let bad = program.add_function(
            sig("bad", &[Reads, Writes, Suspends]),
            Operation::Block(vec![Operation::branch(
                Operation::And(vec![Operation::write(x, Operation::lit(5)), Operation::call(nap, vec![])]),
                vec![],
                vec![],
            )]),
        );
        // fails the same way on the coordinator's own context
        let direct = program.add_function(
            sig("direct", &[Reads, Writes]),
            Operation::branch(
                Operation::And(vec![Operation::write(x, Operation::lit(7)), Operation::suspend(nap, vec![])]),
                vec![],
                vec![],
            ),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        let handle = coordinator.spawn(bad, vec![]).unwrap();
        coordinator.run_until_idle();
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Faulted);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(0));

        let mut coordinator = SuspensionCoordinator::new(&program);
        assert!(coordinator.call(direct, vec![]).is_err());
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(0));
    }

    #[test]
    fn test_failing_task_entry_rolls_back() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let attempt = program.add_function(
            sig("attempt", &[Writes, MayFail]),
            Operation::Block(vec![Operation::write(x, Operation::lit(5)), Operation::fail()]),
        );
        let settle = program.add_function(
            sig("settle", &[Writes]),
            Operation::write(x, Operation::lit(3)),
        );

        let mut coordinator = SuspensionCoordinator::new(&program);
        let failed = coordinator.spawn(attempt, vec![]).unwrap();
        let done = coordinator.spawn(settle, vec![]).unwrap();
        coordinator.run_until_idle();
        assert_eq!(coordinator.poll(failed).unwrap(), TaskStatus::Failed);
        assert_eq!(coordinator.error(failed), None);
        assert_eq!(coordinator.poll(done).unwrap(), TaskStatus::Completed);
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_return_unwinds_nested_frames() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(0));
        let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
        let early = program.add_function(
            sig("early", &[Writes, Suspends]),
            Operation::Block(vec![
                Operation::Defer(vec![Operation::write(x, Operation::lit(3))]),
                Operation::Block(vec![
                    Operation::suspend(nap, vec![]),
                    Operation::ret(Operation::lit(11)),
                ]),
                Operation::write(x, Operation::lit(99)),
            ]),
        );
        let mut coordinator = SuspensionCoordinator::new(&program);
        let outcome = coordinator.run(early, vec![]).unwrap();
        assert_eq!(outcome, Outcome::Succeeded(Value::Int(11)));
        assert_eq!(coordinator.heap().read(x).unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_context_limit() {
        let (program, _, _, tick) = ticking_program();
        let mut coordinator = SuspensionCoordinator::with_config(
            &program,
            CoordinatorConfig {
                max_contexts: Some(1),
                ..Default::default()
            },
        );
        coordinator.spawn(tick, vec![]).unwrap();
        assert_eq!(
            coordinator.spawn(tick, vec![]),
            Err(RuntimeError::TooManyContexts { limit: 1 })
        );
    }
}
