//! Core data model for the fx effect system
//!
//! This crate defines the effect lattice, function signatures, and the
//! operation trees that the checker validates and the runtime evaluates.
//! It has no knowledge of surface syntax: a front end produces these values.

pub mod effects;
pub mod error;
pub mod operation;
pub mod program;
pub mod signature;
pub mod symbol;
pub mod types;
pub mod value;

// Re-export core types
pub use effects::{EffectFamily, EffectSet, FundamentalEffect, Specifier};
pub use error::{EffectConstructionError, TypeJoinError};
pub use operation::{Allocation, Call, CmpOp, Operation, OperationPath};
pub use program::{FunctionDef, GlobalCell, Program};
pub use signature::{Cardinality, FunctionId, Signature};
pub use symbol::Symbol;
pub use types::Type;
pub use value::{RefId, Value};
