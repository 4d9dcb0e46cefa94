//! Effect checker
//!
//! For every function the checker computes the effects its body requires
//! and verifies they are covered by the declared effects. Calls contribute
//! the callee's effects verbatim. Mutually recursive functions are solved
//! as a fixed point per strongly connected component of the call graph,
//! visiting components callee-first.

use crate::error_reporting::{CheckWarning, EffectViolation, ViolationKind, ViolationReporter, WarningKind};
use crate::graph::CallGraph;
use fx_core::{
    Call, EffectSet, FunctionDef, FunctionId, FundamentalEffect, Operation, OperationPath, Program, Symbol,
};
use tracing::{debug, trace, warn};

/// Knobs for one checker pass
#[derive(Debug, Clone, Default)]
pub struct CheckerOptions {
    /// Treat a declared `no_rollback` as an error instead of a warning
    pub deny_no_rollback: bool,
    /// Upper bound on rounds per component; defaults to the lattice height
    /// times the component size
    pub max_fixpoint_rounds: Option<usize>,
}

/// Result of a successful pass
#[derive(Debug, Clone)]
pub struct EffectSummary {
    effective: Vec<EffectSet>,
    required: Vec<EffectSet>,
    pub warnings: Vec<CheckWarning>,
    pub components: usize,
    pub rounds: usize,
}

impl EffectSummary {
    /// Declared effects, or the inferred ones for undeclared functions
    pub fn effects_of(&self, id: FunctionId) -> Option<EffectSet> {
        self.effective.get(id.index()).copied()
    }

    /// What the body actually needs
    pub fn required_of(&self, id: FunctionId) -> Option<EffectSet> {
        self.required.get(id.index()).copied()
    }
}

pub struct EffectChecker {
    options: CheckerOptions,
}

impl EffectChecker {
    pub fn new() -> Self {
        Self::with_options(CheckerOptions::default())
    }

    pub fn with_options(options: CheckerOptions) -> Self {
        EffectChecker { options }
    }

    /// Check every function of `program`.
    ///
    /// Each function yields at most one violation, pinned to the first
    /// offending operation; checking continues with the remaining functions.
    pub fn check(&self, program: &Program) -> Result<EffectSummary, Vec<EffectViolation>> {
        let graph = CallGraph::build(program);
        let components = graph.components();
        debug!("checking effects of {} functions in {} components", program.len(), components.len());

        let mut effective: Vec<EffectSet> = program
            .functions()
            .map(|(_, def)| if def.inferred { EffectSet::pure() } else { def.signature.effects })
            .collect();
        let mut required = vec![EffectSet::pure(); program.len()];
        let mut total_rounds = 0;

        for component in &components {
            let rounds = self.solve_component(program, &graph, component, &mut effective, &mut required);
            trace!("component {:?} settled after {} rounds", component, rounds);
            total_rounds += rounds;
        }

        let mut reporter = ViolationReporter::new();
        for (id, def) in program.functions() {
            self.check_function(program, id, def, &effective, &required, &mut reporter);
        }

        let (errors, warnings) = reporter.into_parts();
        for warning in &warnings {
            warn!("{}", warning);
        }
        if !errors.is_empty() {
            debug!("effect check found {} violations", errors.len());
            return Err(errors);
        }

        Ok(EffectSummary {
            effective,
            required,
            warnings,
            components: components.len(),
            rounds: total_rounds,
        })
    }

    fn solve_component(
        &self,
        program: &Program,
        graph: &CallGraph,
        component: &[FunctionId],
        effective: &mut [EffectSet],
        required: &mut [EffectSet],
    ) -> usize {
        let recursive = component.len() > 1 || graph.calls(component[0], component[0]);
        let bound = self
            .options
            .max_fixpoint_rounds
            .unwrap_or(FundamentalEffect::ALL.len() * component.len() + 1);

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for &id in component {
                let Some(def) = program.function(id) else { continue };
                let mut walker = BodyWalker::new(program, effective, None);
                let needed = walker.walk(&def.body, &OperationPath::root(), Frame::root(false));
                if needed != required[id.index()] {
                    required[id.index()] = needed;
                    changed = true;
                }
                if def.inferred && effective[id.index()] != needed {
                    effective[id.index()] = needed;
                    changed = true;
                }
            }
            if !changed || !recursive {
                return rounds;
            }
            if rounds >= bound {
                warn!("fixed point for {:?} not reached after {} rounds", component, rounds);
                return rounds;
            }
        }
    }

    fn check_function(
        &self,
        program: &Program,
        id: FunctionId,
        def: &FunctionDef,
        effective: &[EffectSet],
        required: &[EffectSet],
        reporter: &mut ViolationReporter,
    ) {
        let signature = &def.signature;
        let violation = |path: OperationPath, operation: &'static str, kind: ViolationKind| EffectViolation {
            function: id,
            name: signature.name,
            path,
            operation,
            kind,
        };

        if !def.inferred && signature.effects.contains(FundamentalEffect::NoRollback) {
            if self.options.deny_no_rollback {
                reporter.report_error(violation(OperationPath::root(), def.body.kind(), ViolationKind::DeprecatedNoRollback));
                return;
            }
            reporter.report_warning(CheckWarning {
                function: id,
                name: signature.name,
                kind: WarningKind::DeprecatedNoRollback,
            });
        }

        let declared = effective[id.index()];
        let mut walker = BodyWalker::new(program, effective, Some(declared));
        let root = Frame::root(!def.inferred && signature.is_fallible());
        walker.walk(&def.body, &OperationPath::root(), root);

        if let Some((path, operation, kind)) = walker.shape {
            reporter.report_error(violation(path, operation, kind));
        } else if let Some((path, operation)) = walker.offender {
            let needed = required[id.index()];
            reporter.report_error(violation(
                path,
                operation,
                ViolationKind::MissingEffects {
                    required: needed,
                    declared,
                    missing: needed.difference(&declared),
                },
            ));
        } else if !declared.is_well_formed() {
            reporter.report_error(violation(
                OperationPath::root(),
                def.body.kind(),
                ViolationKind::IllFormedEffects { effects: declared },
            ));
        }
    }
}

impl Default for EffectChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Check `program` with default options
pub fn check_program(program: &Program) -> Result<EffectSummary, Vec<EffectViolation>> {
    EffectChecker::new().check(program)
}

/// Context inherited from enclosing operations
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Effects absorbed before they can leave the function
    mask: EffectSet,
    /// Inside an uncommitted speculative scope
    speculative: bool,
}

impl Frame {
    fn root(speculative: bool) -> Self {
        Frame {
            mask: EffectSet::pure(),
            speculative,
        }
    }

    /// Operand whose failure is caught by the enclosing construct
    fn catching(self) -> Self {
        Frame {
            mask: self.mask.union(&EffectSet::single(FundamentalEffect::MayFail)),
            speculative: true,
        }
    }

    fn speculative(self) -> Self {
        Frame { speculative: true, ..self }
    }
}

/// Post-order walk of one body computing required effects.
///
/// With a declared set it also records the first operation whose own
/// contribution escapes the declaration, and the first shape violation.
struct BodyWalker<'a> {
    program: &'a Program,
    effective: &'a [EffectSet],
    declared: Option<EffectSet>,
    offender: Option<(OperationPath, &'static str)>,
    shape: Option<(OperationPath, &'static str, ViolationKind)>,
}

impl<'a> BodyWalker<'a> {
    fn new(program: &'a Program, effective: &'a [EffectSet], declared: Option<EffectSet>) -> Self {
        BodyWalker {
            program,
            effective,
            declared,
            offender: None,
            shape: None,
        }
    }

    fn walk(&mut self, op: &Operation, path: &OperationPath, frame: Frame) -> EffectSet {
        use FundamentalEffect::*;

        let (inner, local) = match op {
            Operation::Literal(_) | Operation::Param(_) => (EffectSet::pure(), EffectSet::pure()),
            Operation::HeapRead(target) => (self.walk(target, &path.child(0), frame), EffectSet::single(Reads)),
            Operation::HeapWrite(target, value) => {
                let target = self.walk(target, &path.child(0), frame);
                let value = self.walk(value, &path.child(1), frame);
                (target.union(&value), EffectSet::single(Writes))
            }
            Operation::Allocate(alloc) => (self.walk(&alloc.init, &path.child(0), frame), EffectSet::single(Allocates)),
            Operation::Call(call) => {
                let args = self.walk_args(call, path, frame);
                let callee = self.callee_effects(call, path, op);
                if frame.speculative {
                    if callee.suspends() {
                        self.shape_violation(path, op, ViolationKind::SuspendInSpeculativeScope);
                    } else if callee.contains(NoRollback) {
                        self.shape_violation(path, op, ViolationKind::NoRollbackInSpeculativeScope);
                    }
                }
                (args, callee)
            }
            Operation::SuspendPoint(call) => {
                let args = self.walk_args(call, path, frame);
                let callee = self.callee_effects(call, path, op);
                if frame.speculative {
                    self.shape_violation(path, op, ViolationKind::SuspendInSpeculativeScope);
                }
                (args, callee.union(&EffectSet::single(Suspends)))
            }
            Operation::Spawn(call) => {
                let args = self.walk_args(call, path, frame);
                let callee = self.callee_effects(call, path, op);
                if frame.speculative {
                    self.shape_violation(path, op, ViolationKind::SpawnInSpeculativeScope);
                }
                (args, callee.without(Suspends))
            }
            Operation::Branch { cond, then_ops, else_ops } => {
                let cond = self.walk(cond, &path.child(0), frame.catching());
                let then_req = self.walk_seq(then_ops, path, 1, frame);
                let else_req = self.walk_seq(else_ops, path, 1 + then_ops.len(), frame);
                if let Err(err) = then_req.join(&else_req) {
                    if then_req.is_well_formed() && else_req.is_well_formed() {
                        self.shape_violation(path, op, ViolationKind::IllFormedJoin(err));
                    }
                }
                (cond.union(&then_req).union(&else_req), EffectSet::pure())
            }
            Operation::FailPoint(predicate) => {
                self.reject_direct_query(predicate, path);
                (self.walk(predicate, &path.child(0), frame.catching()), EffectSet::single(MayFail))
            }
            Operation::Not(operand) => {
                self.reject_direct_query(operand, path);
                (self.walk(operand, &path.child(0), frame.catching()), EffectSet::single(MayFail))
            }
            Operation::Bridge(operand) => {
                self.reject_direct_query(operand, path);
                (self.walk(operand, &path.child(0), frame.catching()), EffectSet::pure())
            }
            Operation::Or(p, q) => {
                let p = self.walk(p, &path.child(0), frame.catching());
                let q = self.walk(q, &path.child(1), frame.speculative());
                (p.union(&q), EffectSet::pure())
            }
            Operation::And(ops) => (self.walk_seq(ops, path, 0, frame.speculative()), EffectSet::pure()),
            Operation::Compare(_, lhs, rhs) | Operation::Add(lhs, rhs) => {
                let lhs = self.walk(lhs, &path.child(0), frame);
                let rhs = self.walk(rhs, &path.child(1), frame);
                (lhs.union(&rhs), EffectSet::pure())
            }
            Operation::Block(ops) => (self.walk_seq(ops, path, 0, frame), EffectSet::pure()),
            Operation::Defer(ops) => {
                // Deferred code runs at scope exit, outside any enclosing catch.
                let deferred = Frame {
                    mask: frame.mask.without(MayFail),
                    speculative: frame.speculative,
                };
                let body = self.walk_seq(ops, path, 0, deferred);
                if body.is_fallible() {
                    self.shape_violation(path, op, ViolationKind::FallibleDefer);
                }
                (body, EffectSet::pure())
            }
            Operation::Return(value) => (self.walk(value, &path.child(0), frame), EffectSet::pure()),
        };

        let contribution = local.difference(&frame.mask);
        if let Some(declared) = self.declared {
            if self.offender.is_none() && !contribution.is_subset_of(&declared) {
                self.offender = Some((path.clone(), op.kind()));
            }
        }
        inner.union(&contribution)
    }

    fn walk_seq(&mut self, ops: &[Operation], path: &OperationPath, offset: usize, frame: Frame) -> EffectSet {
        ops.iter().enumerate().fold(EffectSet::pure(), |acc, (i, op)| {
            acc.union(&self.walk(op, &path.child(offset + i), frame))
        })
    }

    fn walk_args(&mut self, call: &Call, path: &OperationPath, frame: Frame) -> EffectSet {
        self.walk_seq(&call.args, path, 0, frame)
    }

    fn callee_effects(&mut self, call: &Call, path: &OperationPath, op: &Operation) -> EffectSet {
        match self.program.signature(call.callee) {
            Some(signature) => {
                if signature.arity() != call.args.len() {
                    self.shape_violation(
                        path,
                        op,
                        ViolationKind::ArityMismatch {
                            expected: signature.arity(),
                            found: call.args.len(),
                        },
                    );
                }
                self.effective[call.callee.index()]
            }
            None => {
                self.shape_violation(path, op, ViolationKind::UnknownCallee { callee: call.callee });
                EffectSet::pure()
            }
        }
    }

    /// `?`, `not` and `option{}` may not be applied straight to a suspending call.
    fn reject_direct_query(&mut self, operand: &Operation, path: &OperationPath) {
        if let Operation::Call(call) | Operation::SuspendPoint(call) = operand {
            let suspends = matches!(operand, Operation::SuspendPoint(_))
                || self.program.signature(call.callee).is_some_and(|sig| sig.suspends());
            if suspends {
                self.shape_violation(&path.child(0), operand, ViolationKind::FailureQueryOnSuspendingCall);
            }
        }
    }

    fn shape_violation(&mut self, path: &OperationPath, op: &Operation, kind: ViolationKind) {
        if self.declared.is_some() && self.shape.is_none() {
            self.shape = Some((path.clone(), op.kind(), kind));
        }
    }
}

/// Name used in diagnostics for a function id
pub fn function_name(program: &Program, id: FunctionId) -> Symbol {
    program
        .signature(id)
        .map(|sig| sig.name)
        .unwrap_or_else(|| Symbol::intern("<unknown>"))
}
