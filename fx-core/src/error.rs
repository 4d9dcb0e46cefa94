//! Construction errors for effect sets and types

use crate::effects::Specifier;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EffectConstructionError>;

/// Raised when an effect set would violate one of its invariants.
///
/// These are static errors: the front end reports them as diagnostics and
/// never retries the construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectConstructionError {
    #[error("effect set cannot both suspend and fail: `suspends` and `decides` are mutually exclusive")]
    SuspendsAndFails,

    #[error("conflicting heap shorthands `{first}` and `{second}`: at most one may be declared")]
    ConflictingShorthand { first: Specifier, second: Specifier },

    #[error("unknown effect specifier `{name}`")]
    UnknownSpecifier { name: String },
}

impl EffectConstructionError {
    pub fn unknown_specifier(name: impl Into<String>) -> Self {
        Self::UnknownSpecifier { name: name.into() }
    }
}

/// Raised when two types have no least upper bound in this core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeJoinError {
    #[error("cannot join `{left}` with `{right}`: types differ outside their effects")]
    Incompatible { left: String, right: String },

    #[error("joined function type is ill-formed: {0}")]
    Effects(#[from] EffectConstructionError),
}
