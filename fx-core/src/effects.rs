//! Effect lattice
//!
//! Effects are a fixed vocabulary of flags grouped into six families. An
//! [`EffectSet`] is an immutable bitmask over those flags, partially ordered
//! by inclusion. That ordering is effect subtyping: a function that does
//! fewer effects can be used wherever more are tolerated.
//!
//! The raw bits are never exposed. Every constructor that can produce a
//! declared set goes through validation, so the `Suspends`/`MayFail`
//! exclusivity holds for any set built with [`EffectSet::new`],
//! [`EffectSet::from_specifiers`] or [`EffectSet::join`].

use crate::error::{EffectConstructionError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct EffectBits: u16 {
        const MAY_SUCCEED = 1 << 0;
        const MAY_FAIL = 1 << 1;
        const READS = 1 << 2;
        const WRITES = 1 << 3;
        const ALLOCATES = 1 << 4;
        const SUSPENDS = 1 << 5;
        const MAY_DIVERGE = 1 << 6;
        const SERVER_AUTHORITATIVE = 1 << 7;
        const CLIENT_PREDICTED = 1 << 8;
        const NO_ROLLBACK = 1 << 9;
    }
}

/// The six effect families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectFamily {
    Cardinality,
    Heap,
    Suspension,
    Divergence,
    Prediction,
    Internal,
}

/// One flag of the lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalEffect {
    MaySucceed,
    MayFail,
    Reads,
    Writes,
    Allocates,
    Suspends,
    MayDiverge,
    ServerAuthoritative,
    ClientPredicted,
    /// Legacy; kept only so old declarations can be checked for compatibility.
    NoRollback,
}

impl FundamentalEffect {
    pub const ALL: [FundamentalEffect; 10] = [
        FundamentalEffect::MaySucceed,
        FundamentalEffect::MayFail,
        FundamentalEffect::Reads,
        FundamentalEffect::Writes,
        FundamentalEffect::Allocates,
        FundamentalEffect::Suspends,
        FundamentalEffect::MayDiverge,
        FundamentalEffect::ServerAuthoritative,
        FundamentalEffect::ClientPredicted,
        FundamentalEffect::NoRollback,
    ];

    pub fn family(self) -> EffectFamily {
        match self {
            FundamentalEffect::MaySucceed | FundamentalEffect::MayFail => EffectFamily::Cardinality,
            FundamentalEffect::Reads | FundamentalEffect::Writes | FundamentalEffect::Allocates => {
                EffectFamily::Heap
            }
            FundamentalEffect::Suspends => EffectFamily::Suspension,
            FundamentalEffect::MayDiverge => EffectFamily::Divergence,
            FundamentalEffect::ServerAuthoritative | FundamentalEffect::ClientPredicted => {
                EffectFamily::Prediction
            }
            FundamentalEffect::NoRollback => EffectFamily::Internal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FundamentalEffect::MaySucceed => "may_succeed",
            FundamentalEffect::MayFail => "may_fail",
            FundamentalEffect::Reads => "reads",
            FundamentalEffect::Writes => "writes",
            FundamentalEffect::Allocates => "allocates",
            FundamentalEffect::Suspends => "suspends",
            FundamentalEffect::MayDiverge => "may_diverge",
            FundamentalEffect::ServerAuthoritative => "server_authoritative",
            FundamentalEffect::ClientPredicted => "client_predicted",
            FundamentalEffect::NoRollback => "no_rollback",
        }
    }

    fn bits(self) -> EffectBits {
        match self {
            FundamentalEffect::MaySucceed => EffectBits::MAY_SUCCEED,
            FundamentalEffect::MayFail => EffectBits::MAY_FAIL,
            FundamentalEffect::Reads => EffectBits::READS,
            FundamentalEffect::Writes => EffectBits::WRITES,
            FundamentalEffect::Allocates => EffectBits::ALLOCATES,
            FundamentalEffect::Suspends => EffectBits::SUSPENDS,
            FundamentalEffect::MayDiverge => EffectBits::MAY_DIVERGE,
            FundamentalEffect::ServerAuthoritative => EffectBits::SERVER_AUTHORITATIVE,
            FundamentalEffect::ClientPredicted => EffectBits::CLIENT_PREDICTED,
            FundamentalEffect::NoRollback => EffectBits::NO_ROLLBACK,
        }
    }
}

impl fmt::Display for FundamentalEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable set of fundamental effects
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectSet {
    bits: EffectBits,
}

impl EffectSet {
    /// The bottom of the lattice
    pub const fn pure() -> Self {
        EffectSet { bits: EffectBits::empty() }
    }

    /// Build a set, rejecting combinations that break exclusivity.
    pub fn new(effects: impl IntoIterator<Item = FundamentalEffect>) -> Result<Self> {
        let bits = effects
            .into_iter()
            .fold(EffectBits::empty(), |acc, effect| acc | effect.bits());
        Self::validated(bits)
    }

    /// A set with one flag. A single flag can never conflict with itself.
    pub fn single(effect: FundamentalEffect) -> Self {
        EffectSet { bits: effect.bits() }
    }

    /// `reads | writes | allocates`
    pub fn transacts() -> Self {
        EffectSet {
            bits: EffectBits::READS | EffectBits::WRITES | EffectBits::ALLOCATES,
        }
    }

    fn validated(bits: EffectBits) -> Result<Self> {
        if bits.contains(EffectBits::SUSPENDS | EffectBits::MAY_FAIL) {
            return Err(EffectConstructionError::SuspendsAndFails);
        }
        Ok(EffectSet { bits })
    }

    /// Pointwise OR. Total: the result is not re-validated, so the union of a
    /// suspending and a failing set carries both bits and reports
    /// `is_well_formed() == false`. Use [`EffectSet::join`] when the result
    /// must itself be a legal declaration.
    pub fn union(&self, other: &EffectSet) -> EffectSet {
        EffectSet {
            bits: self.bits | other.bits,
        }
    }

    /// Effect subtyping: every flag of `self` is present in `other`.
    pub fn is_subset_of(&self, other: &EffectSet) -> bool {
        (self.bits & !other.bits).is_empty()
    }

    /// Least upper bound of two sets, re-validated.
    pub fn join(&self, other: &EffectSet) -> Result<EffectSet> {
        Self::validated(self.bits | other.bits)
    }

    /// Flags present in `self` but not in `other`
    pub fn difference(&self, other: &EffectSet) -> EffectSet {
        EffectSet {
            bits: self.bits & !other.bits,
        }
    }

    pub fn contains(&self, effect: FundamentalEffect) -> bool {
        self.bits.contains(effect.bits())
    }

    /// Copy of this set with one flag removed. Removing never breaks an invariant.
    pub fn without(&self, effect: FundamentalEffect) -> EffectSet {
        EffectSet {
            bits: self.bits - effect.bits(),
        }
    }

    /// Copy of this set with one more flag, validated.
    pub fn with(&self, effect: FundamentalEffect) -> Result<EffectSet> {
        Self::validated(self.bits | effect.bits())
    }

    pub fn is_pure(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_well_formed(&self) -> bool {
        !self.bits.contains(EffectBits::SUSPENDS | EffectBits::MAY_FAIL)
    }

    pub fn is_fallible(&self) -> bool {
        self.contains(FundamentalEffect::MayFail)
    }

    pub fn suspends(&self) -> bool {
        self.contains(FundamentalEffect::Suspends)
    }

    pub fn len(&self) -> usize {
        self.bits.bits().count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.is_pure()
    }

    pub fn iter(&self) -> impl Iterator<Item = FundamentalEffect> + '_ {
        FundamentalEffect::ALL
            .into_iter()
            .filter(move |effect| self.contains(*effect))
    }

    /// Flags of this set that belong to `family`
    pub fn family(&self, family: EffectFamily) -> EffectSet {
        let bits = self
            .iter()
            .filter(|effect| effect.family() == family)
            .fold(EffectBits::empty(), |acc, effect| acc | effect.bits());
        EffectSet { bits }
    }

    /// Translate declaration specifiers into an effect set.
    ///
    /// At most one heap shorthand may be written; without one the function
    /// transacts. Functions may diverge unless they are declared `converges`,
    /// and are server-authoritative unless they `predicts`.
    pub fn from_specifiers<I, S>(specifiers: I) -> Result<EffectSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut heap: Option<Specifier> = None;
        let mut bits = EffectBits::empty();
        let mut converges = false;
        let mut predicts = false;

        for raw in specifiers {
            let specifier: Specifier = raw.as_ref().parse()?;
            if let Some(heap_bits) = specifier.heap_bits() {
                if let Some(first) = heap {
                    if first != specifier {
                        return Err(EffectConstructionError::ConflictingShorthand {
                            first,
                            second: specifier,
                        });
                    }
                }
                heap = Some(specifier);
                bits |= heap_bits;
                continue;
            }
            match specifier {
                Specifier::Decides => bits |= EffectBits::MAY_FAIL,
                Specifier::Suspends => bits |= EffectBits::SUSPENDS,
                Specifier::Converges => converges = true,
                Specifier::Predicts => predicts = true,
                Specifier::NoRollback => bits |= EffectBits::NO_ROLLBACK,
                _ => {}
            }
        }

        if heap.is_none() {
            bits |= EffectBits::READS | EffectBits::WRITES | EffectBits::ALLOCATES;
        }
        if !converges {
            bits |= EffectBits::MAY_DIVERGE;
        }
        bits |= if predicts {
            EffectBits::CLIENT_PREDICTED
        } else {
            EffectBits::SERVER_AUTHORITATIVE
        };

        Self::validated(bits)
    }
}

impl Default for EffectSet {
    fn default() -> Self {
        Self::pure()
    }
}

impl FromIterator<FundamentalEffect> for EffectSet {
    /// Unchecked collection, the same contract as [`EffectSet::union`].
    fn from_iter<T: IntoIterator<Item = FundamentalEffect>>(iter: T) -> Self {
        iter.into_iter()
            .fold(EffectSet::pure(), |acc, effect| acc.union(&EffectSet::single(effect)))
    }
}

impl fmt::Debug for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, effect) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", effect)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for EffectSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for EffectSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let effects = Vec::<FundamentalEffect>::deserialize(deserializer)?;
        EffectSet::new(effects).map_err(D::Error::custom)
    }
}

/// Declaration specifiers understood by [`EffectSet::from_specifiers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specifier {
    Computes,
    Reads,
    Writes,
    Allocates,
    Transacts,
    Decides,
    Suspends,
    Converges,
    Predicts,
    NoRollback,
}

impl Specifier {
    fn heap_bits(self) -> Option<EffectBits> {
        match self {
            Specifier::Computes => Some(EffectBits::empty()),
            Specifier::Reads => Some(EffectBits::READS),
            Specifier::Writes => Some(EffectBits::WRITES),
            Specifier::Allocates => Some(EffectBits::ALLOCATES),
            Specifier::Transacts => Some(EffectBits::READS | EffectBits::WRITES | EffectBits::ALLOCATES),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Specifier::Computes => "computes",
            Specifier::Reads => "reads",
            Specifier::Writes => "writes",
            Specifier::Allocates => "allocates",
            Specifier::Transacts => "transacts",
            Specifier::Decides => "decides",
            Specifier::Suspends => "suspends",
            Specifier::Converges => "converges",
            Specifier::Predicts => "predicts",
            Specifier::NoRollback => "no_rollback",
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Specifier {
    type Err = EffectConstructionError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('<').trim_end_matches('>');
        let specifier = match trimmed {
            "computes" => Specifier::Computes,
            "reads" => Specifier::Reads,
            "writes" => Specifier::Writes,
            "allocates" => Specifier::Allocates,
            "transacts" => Specifier::Transacts,
            "decides" => Specifier::Decides,
            "suspends" => Specifier::Suspends,
            "converges" => Specifier::Converges,
            "predicts" => Specifier::Predicts,
            "no_rollback" => Specifier::NoRollback,
            other => return Err(EffectConstructionError::unknown_specifier(other)),
        };
        Ok(specifier)
    }
}
