//! Effect diagnostics
//!
//! Violations are compile-time errors. They are collected per function and
//! handed to the front end; one function's violation never stops the pass.

use fx_core::{EffectConstructionError, EffectSet, FunctionId, OperationPath, Symbol};
use std::fmt;
use thiserror::Error;

/// What went wrong at the offending operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    #[error("requires {required} but declares {declared} (missing {missing})")]
    MissingEffects {
        required: EffectSet,
        declared: EffectSet,
        missing: EffectSet,
    },

    #[error("suspending call inside a speculative scope")]
    SuspendInSpeculativeScope,

    #[error("failure query applied directly to a suspending call")]
    FailureQueryOnSuspendingCall,

    #[error("spawn inside a speculative scope")]
    SpawnInSpeculativeScope,

    #[error("`no_rollback` function called inside a speculative scope")]
    NoRollbackInSpeculativeScope,

    #[error("deferred block may fail")]
    FallibleDefer,

    #[error("branches cannot be joined: {0}")]
    IllFormedJoin(EffectConstructionError),

    #[error("inferred effects {effects} both suspend and fail")]
    IllFormedEffects { effects: EffectSet },

    #[error("call to unknown function {callee}")]
    UnknownCallee { callee: FunctionId },

    #[error("call passes {found} arguments, callee takes {expected}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("`no_rollback` is deprecated and denied by configuration")]
    DeprecatedNoRollback,
}

/// A violation pinned to the first offending operation of a function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectViolation {
    pub function: FunctionId,
    pub name: Symbol,
    pub path: OperationPath,
    pub operation: &'static str,
    pub kind: ViolationKind,
}

impl EffectViolation {
    pub fn missing(&self) -> Option<EffectSet> {
        match &self.kind {
            ViolationKind::MissingEffects { missing, .. } => Some(*missing),
            _ => None,
        }
    }
}

impl fmt::Display for EffectViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} at {} `{}`",
            self.name, self.function, self.kind, self.path, self.operation
        )
    }
}

impl std::error::Error for EffectViolation {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    DeprecatedNoRollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckWarning {
    pub function: FunctionId,
    pub name: Symbol,
    pub kind: WarningKind,
}

impl fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::DeprecatedNoRollback => {
                write!(f, "{} ({}): `no_rollback` is deprecated", self.name, self.function)
            }
        }
    }
}

/// Collects violations and warnings across one checker pass
#[derive(Debug, Clone, Default)]
pub struct ViolationReporter {
    errors: Vec<EffectViolation>,
    warnings: Vec<CheckWarning>,
}

impl ViolationReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_error(&mut self, error: EffectViolation) {
        self.errors.push(error);
    }

    pub fn report_warning(&mut self, warning: CheckWarning) {
        self.warnings.push(warning);
    }

    pub fn errors(&self) -> &[EffectViolation] {
        &self.errors
    }

    pub fn warnings(&self) -> &[CheckWarning] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_parts(self) -> (Vec<EffectViolation>, Vec<CheckWarning>) {
        (self.errors, self.warnings)
    }
}
