//! Transaction journal
//!
//! An undo log with nested checkpoints. Mutations made while at least one
//! checkpoint is open are recorded; rolling back pops records above the
//! checkpoint in LIFO order. Committing the outermost checkpoint drops the
//! log, after which nothing can be undone.

use fx_core::{RefId, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoRecord {
    /// A cell was overwritten; `previous` is restored on rollback
    Write { cell: RefId, previous: Value },
    /// A cell was allocated; rollback frees it
    Allocate { cell: RefId },
    /// A deferred block was registered at `slot` of the context's defer list
    DeferRegistered { slot: usize },
}

/// Handle to an open checkpoint.
///
/// A checkpoint can be closed at most once; rolling back or committing a
/// closed checkpoint again does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    id: u64,
    depth: usize,
    mark: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    records: Vec<UndoRecord>,
    open: Vec<u64>,
    next_id: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint {
            id: self.next_id,
            depth: self.open.len(),
            mark: self.records.len(),
        };
        self.next_id += 1;
        self.open.push(checkpoint.id);
        checkpoint
    }

    /// Record a mutation. Returns false when no checkpoint is open, in which
    /// case the mutation is already final.
    pub fn record(&mut self, record: UndoRecord) -> bool {
        if self.open.is_empty() {
            return false;
        }
        self.records.push(record);
        true
    }

    fn is_current(&self, checkpoint: Checkpoint) -> bool {
        self.open.get(checkpoint.depth) == Some(&checkpoint.id)
    }

    /// Close `checkpoint` and every checkpoint nested in it, returning the
    /// records to undo, newest first.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Vec<UndoRecord> {
        if !self.is_current(checkpoint) {
            return Vec::new();
        }
        self.open.truncate(checkpoint.depth);
        let mut undo = self.records.split_off(checkpoint.mark);
        undo.reverse();
        undo
    }

    /// Close `checkpoint`, keeping its records for enclosing checkpoints.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        if !self.is_current(checkpoint) {
            return;
        }
        self.open.truncate(checkpoint.depth);
        if self.open.is_empty() {
            self.records.clear();
        }
    }

    /// The outermost open checkpoint. Rolling it back undoes every record
    /// still in the log.
    pub fn outermost(&self) -> Option<Checkpoint> {
        self.open.first().map(|&id| Checkpoint { id, depth: 0, mark: 0 })
    }

    /// Drop every record and checkpoint without replaying anything
    pub fn discard(&mut self) {
        self.records.clear();
        self.open.clear();
    }

    pub fn is_open(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
