//! Function signatures

use crate::effects::{EffectSet, FundamentalEffect};
use crate::symbol::Symbol;
use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a function in a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    AlwaysSucceeds,
    MayFail,
}

/// Elaborated function signature.
///
/// The cardinality is derived from the `MayFail` flag when the signature is
/// built, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SignatureDecl")]
pub struct Signature {
    pub name: Symbol,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub effects: EffectSet,
    pub cardinality: Cardinality,
}

impl Signature {
    pub fn new(name: impl Into<Symbol>, params: Vec<Type>, return_type: Type, effects: EffectSet) -> Self {
        let cardinality = if effects.contains(FundamentalEffect::MayFail) {
            Cardinality::MayFail
        } else {
            Cardinality::AlwaysSucceeds
        };
        Signature {
            name: name.into(),
            params,
            return_type,
            effects,
            cardinality,
        }
    }

    pub fn is_fallible(&self) -> bool {
        self.cardinality == Cardinality::MayFail
    }

    pub fn suspends(&self) -> bool {
        self.effects.suspends()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `self` may be used where `other` is expected: same shape, fewer or
    /// equal effects. Shrinking a signature's effects is always a compatible
    /// change; growing them is not.
    pub fn is_subtype_of(&self, other: &Signature) -> bool {
        self.params == other.params
            && self.return_type.is_subtype_of(&other.return_type)
            && self.effects.is_subset_of(&other.effects)
    }

    pub fn as_type(&self) -> Type {
        Type::function(self.params.clone(), self.return_type.clone(), self.effects)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") {} : {}", self.effects, self.return_type)
    }
}

#[derive(Deserialize)]
struct SignatureDecl {
    name: Symbol,
    #[serde(default)]
    params: Vec<Type>,
    #[serde(default = "unit_type")]
    return_type: Type,
    #[serde(default)]
    effects: EffectSet,
}

fn unit_type() -> Type {
    Type::Unit
}

impl From<SignatureDecl> for Signature {
    fn from(decl: SignatureDecl) -> Self {
        Signature::new(decl.name, decl.params, decl.return_type, decl.effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::FundamentalEffect::*;

    #[test]
    fn test_cardinality_follows_effects() {
        let fallible = Signature::new("lookup", vec![], Type::Unit, EffectSet::single(MayFail));
        assert!(fallible.is_fallible());
        let total = Signature::new("tick", vec![], Type::Unit, EffectSet::single(Writes));
        assert_eq!(total.cardinality, Cardinality::AlwaysSucceeds);
    }

    #[test]
    fn test_shrinking_effects_is_compatible() {
        let wide = Signature::new("f", vec![Type::named("int")], Type::Unit, EffectSet::transacts());
        let narrow = Signature::new("f", vec![Type::named("int")], Type::Unit, EffectSet::single(Reads));
        assert!(narrow.is_subtype_of(&wide));
        assert!(!wide.is_subtype_of(&narrow));
    }

    #[test]
    fn test_deserialize_derives_cardinality() {
        let json = r#"{"name": "get", "effects": ["reads", "may_fail"]}"#;
        let sig: Signature = serde_json::from_str(json).unwrap();
        assert_eq!(sig.cardinality, Cardinality::MayFail);
        assert_eq!(sig.return_type, Type::Unit);
    }

    #[test]
    fn test_display_lists_params_and_effects() {
        let sig = Signature::new(
            "move_to",
            vec![Type::named("int"), Type::named("int")],
            Type::Unit,
            EffectSet::new([Reads, Writes]).unwrap(),
        );
        assert_eq!(sig.to_string(), "move_to(int, int) {reads, writes} : unit");
    }
}
