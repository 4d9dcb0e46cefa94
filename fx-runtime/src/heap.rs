//! Shared heap of mutable cells

use crate::error::{Result, RuntimeError};
use fx_core::{Program, RefId, Value};

/// Cells addressed by `RefId`. Globals occupy the first cells in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    cells: Vec<Option<Value>>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_program(program: &Program) -> Self {
        Heap {
            cells: program.globals().iter().map(|cell| Some(cell.initial.clone())).collect(),
        }
    }

    pub fn allocate(&mut self, value: Value) -> RefId {
        let id = RefId(self.cells.len() as u32);
        self.cells.push(Some(value));
        id
    }

    pub fn read(&self, cell: RefId) -> Result<&Value> {
        self.cells
            .get(cell.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(RuntimeError::DanglingRef { cell })
    }

    /// Store `value` and hand back the previous contents for the journal.
    pub fn write(&mut self, cell: RefId, value: Value) -> Result<Value> {
        match self.cells.get_mut(cell.0 as usize) {
            Some(Some(slot)) => Ok(std::mem::replace(slot, value)),
            _ => Err(RuntimeError::DanglingRef { cell }),
        }
    }

    pub(crate) fn restore(&mut self, cell: RefId, previous: Value) {
        if let Some(slot) = self.cells.get_mut(cell.0 as usize) {
            *slot = Some(previous);
        }
    }

    /// Undo an allocation. Trailing freed cells are reclaimed so ids stay dense.
    pub(crate) fn free(&mut self, cell: RefId) {
        if let Some(slot) = self.cells.get_mut(cell.0 as usize) {
            *slot = None;
        }
        while matches!(self.cells.last(), Some(None)) {
            self.cells.pop();
        }
    }

    pub fn is_live(&self, cell: RefId) -> bool {
        matches!(self.cells.get(cell.0 as usize), Some(Some(_)))
    }

    /// Number of live cells
    pub fn live(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_come_first() {
        let mut program = Program::new();
        let x = program.add_global("x", Value::Int(3));
        let heap = Heap::from_program(&program);
        assert_eq!(heap.read(x).unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_write_returns_previous() {
        let mut heap = Heap::new();
        let cell = heap.allocate(Value::Int(1));
        assert_eq!(heap.write(cell, Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(heap.read(cell).unwrap(), &Value::Int(2));
    }

    #[test]
    fn test_free_reclaims_tail() {
        let mut heap = Heap::new();
        let a = heap.allocate(Value::Unit);
        let b = heap.allocate(Value::Unit);
        heap.free(b);
        assert!(!heap.is_live(b));
        assert_eq!(heap.read(b), Err(RuntimeError::DanglingRef { cell: b }));
        assert_eq!(heap.allocate(Value::Bool(true)), b);
        assert!(heap.is_live(a));
        assert_eq!(heap.live(), 2);
    }
}
