//! Program arena: functions and global cells addressed by integer ids

use crate::effects::EffectSet;
use crate::operation::Operation;
use crate::signature::{FunctionId, Signature};
use crate::symbol::Symbol;
use crate::types::Type;
use crate::value::{RefId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub signature: Signature,
    pub body: Operation,
    /// Effects are computed by the checker instead of declared
    #[serde(default)]
    pub inferred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCell {
    pub name: Symbol,
    pub initial: Value,
}

/// Functions and globals of one compilation unit.
///
/// Overloads are separate entries sharing a name; they are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    functions: Vec<FunctionDef>,
    #[serde(default)]
    globals: Vec<GlobalCell>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function with declared effects
    pub fn add_function(&mut self, signature: Signature, body: Operation) -> FunctionId {
        self.push(FunctionDef { signature, body, inferred: false })
    }

    /// Add a function whose effects the checker infers
    pub fn add_inferred(&mut self, name: &str, params: Vec<Type>, return_type: Type, body: Operation) -> FunctionId {
        let signature = Signature::new(name, params, return_type, EffectSet::pure());
        self.push(FunctionDef { signature, body, inferred: true })
    }

    /// Reserve an id before the body exists, for recursive definitions.
    pub fn declare(&mut self, signature: Signature) -> FunctionId {
        self.push(FunctionDef { signature, body: Operation::unit(), inferred: false })
    }

    pub fn define(&mut self, id: FunctionId, body: Operation) -> bool {
        match self.functions.get_mut(id.index()) {
            Some(def) => {
                def.body = body;
                true
            }
            None => false,
        }
    }

    fn push(&mut self, def: FunctionDef) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(def);
        id
    }

    pub fn add_global(&mut self, name: &str, initial: Value) -> RefId {
        let id = RefId(self.globals.len() as u32);
        self.globals.push(GlobalCell { name: Symbol::intern(name), initial });
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(id.index())
    }

    pub fn signature(&self, id: FunctionId) -> Option<&Signature> {
        self.function(id).map(|def| &def.signature)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &FunctionDef)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, def)| (FunctionId(i as u32), def))
    }

    /// All overloads with this name, in declaration order
    pub fn lookup(&self, name: &str) -> Vec<FunctionId> {
        let name = Symbol::intern(name);
        self.functions()
            .filter(|(_, def)| def.signature.name == name)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn globals(&self) -> &[GlobalCell] {
        &self.globals
    }

    pub fn global(&self, name: &str) -> Option<RefId> {
        let name = Symbol::intern(name);
        self.globals
            .iter()
            .position(|cell| cell.name == name)
            .map(|i| RefId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
