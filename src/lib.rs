//! fx
//!
//! Effect-typed functions with speculative execution. A front end builds a
//! [`Program`] of signatures and operation trees; the effect checker
//! validates it; the runtime executes it with transactional rollback of
//! failed speculation and cooperative suspension.

pub mod config;
pub mod pipeline;

// Re-export main types
pub use config::{ConfigError, FxConfig};
pub use fx_checker::{CheckWarning, CheckerOptions, EffectChecker, EffectSummary, EffectViolation, ViolationKind};
pub use fx_core::{
    Call, CmpOp, EffectFamily, EffectSet, FunctionId, FundamentalEffect, Operation, Program, RefId, Signature,
    Specifier, Symbol, Type, Value,
};
pub use fx_runtime::{Heap, Outcome, RuntimeError, SuspensionCoordinator, TaskHandle, TaskStatus};
pub use pipeline::{Pipeline, PipelineStage, RunReport};

use std::fmt;
use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FxError>;

#[derive(Error, Debug)]
pub enum FxError {
    #[error("effect check failed with {} violation(s)", .0.len())]
    Violations(Vec<EffectViolation>),

    #[error("{count} warning(s) treated as errors")]
    WarningsDenied { count: usize },

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown entry function `{name}`")]
    UnknownEntry { name: String },

    #[error("entry function `{name}` has {count} overloads")]
    AmbiguousEntry { name: String, count: usize },

    #[error("Program document error: {message}")]
    Document { message: String },
}

impl FxError {
    pub fn unknown_entry(name: impl Into<String>) -> Self {
        Self::UnknownEntry { name: name.into() }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub function: Option<FunctionId>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

impl From<&EffectViolation> for Diagnostic {
    fn from(violation: &EffectViolation) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: violation.to_string(),
            function: Some(violation.function),
        }
    }
}

/// Effect checking directly on a program
pub trait ProgramExt {
    fn check(&self) -> std::result::Result<EffectSummary, Vec<EffectViolation>>;
}

impl ProgramExt for Program {
    fn check(&self) -> std::result::Result<EffectSummary, Vec<EffectViolation>> {
        fx_checker::check_program(self)
    }
}

/// Executes functions of one program against a shared heap
pub struct Runtime<'p> {
    coordinator: SuspensionCoordinator<'p>,
}

impl<'p> Runtime<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, &FxConfig::default())
    }

    pub fn with_config(program: &'p Program, config: &FxConfig) -> Self {
        Runtime {
            coordinator: SuspensionCoordinator::with_config(program, config.coordinator_config()),
        }
    }

    /// Run `entry` and every task it spawns to completion
    pub fn run(&mut self, entry: FunctionId, args: Vec<Value>) -> Result<Outcome> {
        Ok(self.coordinator.run(entry, args)?)
    }

    pub fn heap(&self) -> &Heap {
        self.coordinator.heap()
    }

    pub fn coordinator(&self) -> &SuspensionCoordinator<'p> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut SuspensionCoordinator<'p> {
        &mut self.coordinator
    }
}

/// Parse a JSON program document
pub fn parse_program(json: &str) -> Result<Program> {
    serde_json::from_str(json).map_err(|e| FxError::document(e.to_string()))
}

pub fn load_program(path: &Path) -> Result<Program> {
    let content =
        std::fs::read_to_string(path).map_err(|e| FxError::document(format!("{}: {}", path.display(), e)))?;
    parse_program(&content)
}

/// Check `program` and run `entry` with the default configuration
pub fn run(program: &Program, entry: &str) -> Result<RunReport> {
    Pipeline::new(FxConfig::default()).run(program, entry, Vec::new())
}
