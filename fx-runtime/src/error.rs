//! Fatal runtime errors
//!
//! Failure of a speculative expression is not an error: it is the
//! `Outcome::Failed` value. The conditions below abort the whole context.

use fx_core::{FunctionId, RefId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("call to suspending {callee} inside a speculative scope")]
    SuspensionInSpeculativeScope { callee: FunctionId },

    #[error("failure escaped suspending {function}")]
    FailureAcrossSuspension { function: FunctionId },

    #[error("failure query applied to suspending {callee}")]
    FailureQueryOnSuspendingCall { callee: FunctionId },

    #[error("`no_rollback` {callee} called inside a speculative scope")]
    NoRollbackInSpeculativeScope { callee: FunctionId },

    #[error("spawn of {callee} inside a speculative scope")]
    SpawnInSpeculativeScope { callee: FunctionId },

    #[error("deferred block failed")]
    DeferredFailure,

    #[error("dangling reference {cell}")]
    DanglingRef { cell: RefId },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("unknown function {callee}")]
    UnknownFunction { callee: FunctionId },

    #[error("parameter {index} is out of range")]
    ArgumentOutOfRange { index: usize },

    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("unknown task {handle}")]
    UnknownTask { handle: u64 },

    #[error("stale suspension token for task {handle}")]
    StaleToken { handle: u64 },

    #[error("context limit of {limit} reached")]
    TooManyContexts { limit: usize },

    #[error("suspending {callee} where the context cannot be parked")]
    SuspensionInExpression { callee: FunctionId },
}

impl RuntimeError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
