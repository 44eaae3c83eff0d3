//! Closed taxonomies: symptom states, antibiotics, resistance profiles.
//!
//! Every enum here is `#[repr(u8)]` with a `from_u8` constructor that
//! rejects unknown ids instead of clamping them. Resistance profiles are
//! backed by a bitmask over the first-line antibiotics, so "more resistant"
//! is a strict superset relation on masks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Name of the reserve drug. It has no resistance bit and is always effective.
pub const RESERVE_DRUG: &str = "M";

// ============================================================================
// SYMPTOM STATES
// ============================================================================

/// Symptom status of an infection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SymptomState {
    Symptomatic = 0,
    Asymptomatic = 1,
}

impl SymptomState {
    pub const COUNT: usize = 2;
    pub const ALL: [SymptomState; 2] = [SymptomState::Symptomatic, SymptomState::Asymptomatic];

    pub fn from_u8(val: u8) -> Result<Self> {
        match val {
            0 => Ok(Self::Symptomatic),
            1 => Ok(Self::Asymptomatic),
            _ => Err(ModelError::UnknownTaxonomyValue {
                what: "symptom state",
                value: val,
            }),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Symptomatic => "Symp",
            Self::Asymptomatic => "Asym",
        }
    }
}

impl fmt::Display for SymptomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// ANTIBIOTICS
// ============================================================================

/// First-line antibiotics that carry a resistance bit.
///
/// The reserve drug ([`RESERVE_DRUG`]) is deliberately not a variant: no
/// profile can be resistant to it, so it never enters outcome routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Antibiotic {
    /// Ciprofloxacin.
    Cip = 0,
    /// Tetracycline.
    Tet = 1,
    /// Ceftriaxone. Default treatment when no rapid test is performed.
    Cro = 2,
}

impl Antibiotic {
    pub const COUNT: usize = 3;
    pub const ALL: [Antibiotic; 3] = [Antibiotic::Cip, Antibiotic::Tet, Antibiotic::Cro];

    pub fn from_u8(val: u8) -> Result<Self> {
        match val {
            0 => Ok(Self::Cip),
            1 => Ok(Self::Tet),
            2 => Ok(Self::Cro),
            _ => Err(ModelError::UnknownTaxonomyValue {
                what: "antibiotic",
                value: val,
            }),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cip => "CIP",
            Self::Tet => "TET",
            Self::Cro => "CRO",
        }
    }

    /// Bit this drug occupies in a [`ResistanceProfile`] mask.
    pub fn resistance_bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Whether a point-of-care susceptibility test exists for this drug.
    pub fn has_rapid_test(self) -> bool {
        matches!(self, Self::Cip | Self::Tet)
    }
}

impl fmt::Display for Antibiotic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// RESISTANCE PROFILES
// ============================================================================

/// Subset of first-line antibiotics a strain is non-susceptible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResistanceProfile {
    /// Susceptible to every first-line drug.
    Susceptible = 0,
    Cip = 1,
    Tet = 2,
    Cro = 3,
    CipTet = 4,
    CipCro = 5,
    TetCro = 6,
    CipTetCro = 7,
}

impl ResistanceProfile {
    pub const COUNT: usize = 8;
    pub const ALL: [ResistanceProfile; 8] = [
        ResistanceProfile::Susceptible,
        ResistanceProfile::Cip,
        ResistanceProfile::Tet,
        ResistanceProfile::Cro,
        ResistanceProfile::CipTet,
        ResistanceProfile::CipCro,
        ResistanceProfile::TetCro,
        ResistanceProfile::CipTetCro,
    ];

    /// Profiles whose initial share is drawn from a prior. The fully
    /// susceptible share is the remainder and is never in this list.
    pub const NON_SUSCEPTIBLE: [ResistanceProfile; 7] = [
        ResistanceProfile::Cip,
        ResistanceProfile::Tet,
        ResistanceProfile::Cro,
        ResistanceProfile::CipTet,
        ResistanceProfile::CipCro,
        ResistanceProfile::TetCro,
        ResistanceProfile::CipTetCro,
    ];

    pub fn from_u8(val: u8) -> Result<Self> {
        Self::ALL
            .get(val as usize)
            .copied()
            .ok_or(ModelError::UnknownTaxonomyValue {
                what: "resistance profile",
                value: val,
            })
    }

    /// Resistance bitmask (bit = [`Antibiotic::resistance_bit`]).
    pub fn mask(self) -> u8 {
        match self {
            Self::Susceptible => 0b000,
            Self::Cip => 0b001,
            Self::Tet => 0b010,
            Self::Cro => 0b100,
            Self::CipTet => 0b011,
            Self::CipCro => 0b101,
            Self::TetCro => 0b110,
            Self::CipTetCro => 0b111,
        }
    }

    pub fn from_mask(mask: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.mask() == mask)
    }

    pub fn is_resistant_to(self, antibiotic: Antibiotic) -> bool {
        self.mask() & antibiotic.resistance_bit() != 0
    }

    /// Number of first-line drugs this profile is non-susceptible to.
    pub fn resistance_count(self) -> u32 {
        self.mask().count_ones()
    }

    /// True if `self` resists everything `other` resists, plus at least one more.
    pub fn is_strictly_more_resistant_than(self, other: ResistanceProfile) -> bool {
        self.mask() & other.mask() == other.mask() && self.mask() != other.mask()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Susceptible => "CIP-S, TET-S, CRO-S",
            Self::Cip => "CIP-NS, TET-S, CRO-S",
            Self::Tet => "CIP-S, TET-NS, CRO-S",
            Self::Cro => "CIP-S, TET-S, CRO-NS",
            Self::CipTet => "CIP-NS, TET-NS, CRO-S",
            Self::CipCro => "CIP-NS, TET-S, CRO-NS",
            Self::TetCro => "CIP-S, TET-NS, CRO-NS",
            Self::CipTetCro => "CIP-NS, TET-NS, CRO-NS",
        }
    }
}

impl fmt::Display for ResistanceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// TREATMENT OUTCOMES
// ============================================================================

/// Why a treatment did not simply cure the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreatmentOutcome {
    /// The case was cured and returns to S.
    Success,
    /// Resistance to the administered drug emerged during treatment.
    Resistance,
    /// The strain was already non-susceptible to the administered drug.
    Ineffective,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_rejects_unknown() {
        assert!(SymptomState::from_u8(2).is_err());
        assert!(Antibiotic::from_u8(3).is_err());
        assert!(ResistanceProfile::from_u8(8).is_err());
        assert_eq!(ResistanceProfile::from_u8(7), Ok(ResistanceProfile::CipTetCro));
    }

    #[test]
    fn test_masks_are_unique() {
        for a in ResistanceProfile::ALL {
            for b in ResistanceProfile::ALL {
                if a != b {
                    assert_ne!(a.mask(), b.mask(), "{a} and {b} share a mask");
                }
            }
            assert_eq!(ResistanceProfile::from_mask(a.mask()), Some(a));
        }
    }

    #[test]
    fn test_resistance_membership() {
        assert!(ResistanceProfile::CipCro.is_resistant_to(Antibiotic::Cip));
        assert!(!ResistanceProfile::CipCro.is_resistant_to(Antibiotic::Tet));
        assert!(ResistanceProfile::CipCro.is_resistant_to(Antibiotic::Cro));
        for ab in Antibiotic::ALL {
            assert!(!ResistanceProfile::Susceptible.is_resistant_to(ab));
            assert!(ResistanceProfile::CipTetCro.is_resistant_to(ab));
        }
    }

    #[test]
    fn test_strictly_more_resistant() {
        use ResistanceProfile::*;
        assert!(CipTet.is_strictly_more_resistant_than(Cip));
        assert!(!Cip.is_strictly_more_resistant_than(Cip));
        assert!(!Tet.is_strictly_more_resistant_than(Cip));
        assert!(CipTetCro.is_strictly_more_resistant_than(Susceptible));
    }

    #[test]
    fn test_labels_follow_enum_order() {
        assert_eq!(ResistanceProfile::ALL[0].label(), "CIP-S, TET-S, CRO-S");
        assert_eq!(ResistanceProfile::NON_SUSCEPTIBLE.len(), ResistanceProfile::COUNT - 1);
        assert!(Antibiotic::Cip.has_rapid_test());
        assert!(!Antibiotic::Cro.has_rapid_test());
    }
}
