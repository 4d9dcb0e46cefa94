//! Symbol interning for function and type names
//!
//! Names are interned once into a global table so signatures and
//! diagnostics can compare them by integer identity.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Interned string symbol
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Intern a string and return its symbol
    pub fn intern(s: &str) -> Self {
        with_interner(|interner| interner.intern(s))
    }

    /// Get the string representation of this symbol
    pub fn as_str(self) -> &'static str {
        with_interner(|interner| interner.resolve(self))
    }

    /// Get the raw symbol ID
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::intern(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::intern(&s)
    }
}

// Symbols travel as their text; raw ids are only meaningful inside one process.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Symbol::intern(&text))
    }
}

struct SymbolInterner {
    // Leaked once per distinct name; the table lives for the whole process.
    symbols: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

impl SymbolInterner {
    fn new() -> Self {
        SymbolInterner {
            symbols: Vec::new(),
            indices: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&index) = self.indices.get(s) {
            return Symbol(index);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let index = self.symbols.len() as u32;
        self.symbols.push(leaked);
        self.indices.insert(leaked, index);
        Symbol(index)
    }

    fn resolve(&self, symbol: Symbol) -> &'static str {
        self.symbols.get(symbol.0 as usize).copied().unwrap_or("<unknown>")
    }
}

static INTERNER: Lazy<Mutex<SymbolInterner>> = Lazy::new(|| Mutex::new(SymbolInterner::new()));

fn with_interner<R>(f: impl FnOnce(&mut SymbolInterner) -> R) -> R {
    // A poisoned lock still holds a consistent table: interning never panics midway.
    let mut guard = match INTERNER.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard)
}
