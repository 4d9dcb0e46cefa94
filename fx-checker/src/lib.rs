//! fx Effect Checker
//!
//! This crate verifies that every function's body requires no effect beyond
//! what its signature declares. Effects flow from callee to caller through
//! the call graph; recursive groups are solved as a fixed point.

pub mod checker;
pub mod error_reporting;
pub mod graph;

// Re-export core types
pub use checker::{check_program, function_name, CheckerOptions, EffectChecker, EffectSummary};
pub use error_reporting::{CheckWarning, EffectViolation, ViolationKind, ViolationReporter, WarningKind};
pub use graph::CallGraph;
