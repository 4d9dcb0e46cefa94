//! fx Runtime
//!
//! Speculative execution with a transaction journal, failure propagation
//! through `and`/`or`/`not` and bridges, deferred blocks, and cooperative
//! suspension of explicit continuations.

pub mod context;
pub mod engine;
pub mod error;
pub mod heap;
pub mod journal;
mod lower;
pub mod suspension;

// Re-export core types
pub use context::{ExecutionContext, SpawnRequest, SuspensionToken, TaskHandle, World};
pub use engine::{EngineConfig, Outcome, SpeculativeEngine};
pub use error::{Result, RuntimeError};
pub use heap::Heap;
pub use journal::{Checkpoint, Journal, UndoRecord};
pub use suspension::{CoordinatorConfig, SuspensionCoordinator, TaskStatus};
