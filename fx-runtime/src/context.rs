//! Execution contexts
//!
//! A context is one logical thread of evaluation. It owns its journal, the
//! deferred blocks registered by its open scopes, and an explicit
//! continuation: a stack of frames, each holding an operation list and a
//! program counter. Suspending a context is just leaving its frames alone.

use crate::error::{Result, RuntimeError};
use crate::heap::Heap;
use crate::journal::{Checkpoint, Journal, UndoRecord};
use fx_core::{FunctionId, Operation, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task({})", self.0)
    }
}

/// Identifies a suspended computation that has not been resumed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuspensionToken {
    pub context: TaskHandle,
    pub sequence: u64,
}

/// A `spawn` evaluated by some context, waiting for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub handle: TaskHandle,
    pub callee: FunctionId,
    pub args: Vec<Value>,
}

/// State shared by every context: the heap and pending spawns
#[derive(Debug, Clone, Default)]
pub struct World {
    pub heap: Heap,
    spawns: Vec<SpawnRequest>,
    next_task: u64,
}

impl World {
    pub fn new(heap: Heap) -> Self {
        World {
            heap,
            spawns: Vec::new(),
            next_task: 0,
        }
    }

    pub fn next_handle(&mut self) -> TaskHandle {
        let handle = TaskHandle(self.next_task);
        self.next_task += 1;
        handle
    }

    pub fn request_spawn(&mut self, callee: FunctionId, args: Vec<Value>) -> TaskHandle {
        let handle = self.next_handle();
        self.spawns.push(SpawnRequest { handle, callee, args });
        handle
    }

    pub fn take_spawns(&mut self) -> Vec<SpawnRequest> {
        std::mem::take(&mut self.spawns)
    }
}

/// A deferred block with the arguments of the function that registered it
#[derive(Debug, Clone)]
pub(crate) struct DeferEntry {
    pub ops: Vec<Operation>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Function(FunctionId),
    Block,
    /// A lowered expression: every statement but the last binds its value
    /// to the next temporary parameter
    Expr,
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub ops: Vec<Operation>,
    pub pc: usize,
    pub args: Vec<Value>,
    pub defer_base: usize,
    /// Value of the last completed statement
    pub last: Value,
}

#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub(crate) journal: Journal,
    pub(crate) defers: Vec<DeferEntry>,
    pub(crate) frames: Vec<Frame>,
    /// Call to enter when the context is resumed
    pub(crate) pending: Option<(FunctionId, Vec<Value>)>,
    pub(crate) result: Option<Value>,
    steps: u64,
    sequence: u64,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// True while any speculative checkpoint is open
    pub fn is_speculative(&self) -> bool {
        self.journal.is_open()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Deferred blocks registered by scopes that have not exited yet
    pub fn pending_defers(&self) -> usize {
        self.defers.len()
    }

    pub(crate) fn tick(&mut self, limit: Option<u64>) -> Result<()> {
        self.steps += 1;
        match limit {
            Some(limit) if self.steps > limit => Err(RuntimeError::StepLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub(crate) fn register_defer(&mut self, entry: DeferEntry) -> usize {
        let slot = self.defers.len();
        self.defers.push(entry);
        self.journal.record(UndoRecord::DeferRegistered { slot });
        slot
    }

    /// Undo everything recorded since `checkpoint`.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint, heap: &mut Heap) -> usize {
        let undo = self.journal.rollback(checkpoint);
        let count = undo.len();
        for record in undo {
            match record {
                UndoRecord::Write { cell, previous } => heap.restore(cell, previous),
                UndoRecord::Allocate { cell } => heap.free(cell),
                UndoRecord::DeferRegistered { slot } => self.defers.truncate(slot),
            }
        }
        count
    }

    pub(crate) fn push_frame(&mut self, kind: FrameKind, ops: Vec<Operation>, args: Vec<Value>) {
        let defer_base = self.defers.len();
        self.frames.push(Frame {
            kind,
            ops,
            pc: 0,
            args,
            defer_base,
            last: Value::Unit,
        });
    }

    /// Innermost function frame, if any
    pub(crate) fn current_function(&self) -> Option<FunctionId> {
        self.frames.iter().rev().find_map(|frame| match frame.kind {
            FrameKind::Function(id) => Some(id),
            FrameKind::Block | FrameKind::Expr => None,
        })
    }

    /// Roll back every open checkpoint, then forget the continuation. Used
    /// when the context faults, so no provisional write outlives it.
    pub(crate) fn abort(&mut self, heap: &mut Heap) -> usize {
        let undone = match self.journal.outermost() {
            Some(checkpoint) => self.rollback(checkpoint, heap),
            None => 0,
        };
        self.discard();
        undone
    }

    /// Forget the continuation and the journal without replaying anything.
    pub(crate) fn discard(&mut self) {
        self.journal.discard();
        self.defers.clear();
        self.frames.clear();
        self.pending = None;
    }
}
