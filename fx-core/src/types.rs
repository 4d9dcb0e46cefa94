//! Structural types as seen by the effect core
//!
//! The nominal type system lives in the front end. This core only needs type
//! identity and the ability to join two function types that differ in their
//! effects, which happens when a conditional returns differently-effectful
//! callables from its branches.

use crate::effects::EffectSet;
use crate::error::TypeJoinError;
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Unit,
    /// Opaque nominal type produced by the front end
    Named(Symbol),
    Function {
        params: Vec<Type>,
        return_type: Box<Type>,
        effects: EffectSet,
    },
}

impl Type {
    pub fn named(name: &str) -> Self {
        Type::Named(Symbol::intern(name))
    }

    pub fn function(params: Vec<Type>, return_type: Type, effects: EffectSet) -> Self {
        Type::Function {
            params,
            return_type: Box::new(return_type),
            effects,
        }
    }

    pub fn effects(&self) -> Option<EffectSet> {
        match self {
            Type::Function { effects, .. } => Some(*effects),
            _ => None,
        }
    }

    /// Least upper bound of two types.
    ///
    /// Identical types join to themselves. Function types with the same
    /// shape join pointwise on their effects, recursing into parameter and
    /// return positions so nested callables are joined too.
    pub fn join(&self, other: &Type) -> Result<Type, TypeJoinError> {
        if self == other {
            return Ok(self.clone());
        }
        match (self, other) {
            (
                Type::Function { params: p1, return_type: r1, effects: e1 },
                Type::Function { params: p2, return_type: r2, effects: e2 },
            ) if p1 == p2 => {
                let return_type = r1.join(r2).map_err(|_| self.incompatible(other))?;
                Ok(Type::Function {
                    params: p1.clone(),
                    return_type: Box::new(return_type),
                    effects: e1.join(e2)?,
                })
            }
            _ => Err(self.incompatible(other)),
        }
    }

    /// Structural subtyping: identical shape, and fewer or equal effects.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        match (self, other) {
            (
                Type::Function { params: p1, return_type: r1, effects: e1 },
                Type::Function { params: p2, return_type: r2, effects: e2 },
            ) => p1 == p2 && r1.is_subtype_of(r2) && e1.is_subset_of(e2),
            _ => self == other,
        }
    }

    fn incompatible(&self, other: &Type) -> TypeJoinError {
        TypeJoinError::Incompatible {
            left: self.to_string(),
            right: other.to_string(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Named(name) => write!(f, "{}", name),
            Type::Function { params, return_type, effects } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", return_type)?;
                if !effects.is_pure() {
                    write!(f, " / {}", effects)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::FundamentalEffect::*;

    fn callable(effects: &[crate::effects::FundamentalEffect]) -> Type {
        Type::function(
            vec![Type::named("int")],
            Type::Unit,
            EffectSet::new(effects.iter().copied()).unwrap(),
        )
    }

    #[test]
    fn test_branch_join_of_callables() {
        let reader = callable(&[Reads]);
        let writer = callable(&[Reads, Writes]);
        let joined = reader.join(&writer).unwrap();
        assert_eq!(joined, writer);
        assert!(reader.is_subtype_of(&joined));
        assert!(writer.is_subtype_of(&joined));
    }

    #[test]
    fn test_join_rejects_mismatched_shapes() {
        let a = Type::function(vec![Type::named("int")], Type::Unit, EffectSet::pure());
        let b = Type::function(vec![Type::named("string")], Type::Unit, EffectSet::pure());
        assert!(matches!(a.join(&b), Err(TypeJoinError::Incompatible { .. })));
        assert!(Type::Unit.join(&Type::named("int")).is_err());
    }

    #[test]
    fn test_join_rejects_suspend_fail_mix() {
        let a = callable(&[Suspends]);
        let b = callable(&[MayFail]);
        assert!(matches!(a.join(&b), Err(TypeJoinError::Effects(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(callable(&[Reads]).to_string(), "(int) -> unit / {reads}");
        assert_eq!(callable(&[]).to_string(), "(int) -> unit");
    }
}
