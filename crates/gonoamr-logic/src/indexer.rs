//! Flat indexing of (symptom, profile[, antibiotic]) tuples.
//!
//! Compartments and chance nodes are laid out in flat vectors; an
//! [`Indexer`] is the bijection between a [`StateKey`] and its slot.
//! Layout is symptom-major: `index = (P * A) * s + A * p + a` with the
//! antibiotic dimension, `P * s + p` without.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::taxonomy::{Antibiotic, ResistanceProfile, SymptomState};

/// A (symptom, profile[, antibiotic]) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub symptom: SymptomState,
    pub profile: ResistanceProfile,
    pub antibiotic: Option<Antibiotic>,
}

impl StateKey {
    pub fn new(symptom: SymptomState, profile: ResistanceProfile) -> Self {
        Self {
            symptom,
            profile,
            antibiotic: None,
        }
    }

    pub fn with_antibiotic(
        symptom: SymptomState,
        profile: ResistanceProfile,
        antibiotic: Antibiotic,
    ) -> Self {
        Self {
            symptom,
            profile,
            antibiotic: Some(antibiotic),
        }
    }
}

/// Bijection between state tuples and flat indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indexer {
    with_antibiotic: bool,
}

impl Indexer {
    /// Indexer over (symptom, profile) pairs.
    pub const fn symptom_profile() -> Self {
        Self {
            with_antibiotic: false,
        }
    }

    /// Indexer over (symptom, profile, antibiotic) triples.
    pub const fn symptom_profile_antibiotic() -> Self {
        Self {
            with_antibiotic: true,
        }
    }

    pub fn has_antibiotic(&self) -> bool {
        self.with_antibiotic
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        let base = SymptomState::COUNT * ResistanceProfile::COUNT;
        if self.with_antibiotic {
            base * Antibiotic::COUNT
        } else {
            base
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of a typed key.
    pub fn index(&self, key: StateKey) -> Result<usize> {
        let s = key.symptom as usize;
        let p = key.profile as usize;
        match (self.with_antibiotic, key.antibiotic) {
            (false, None) => Ok(ResistanceProfile::COUNT * s + p),
            (true, Some(a)) => Ok((ResistanceProfile::COUNT * Antibiotic::COUNT) * s
                + Antibiotic::COUNT * p
                + a as usize),
            (true, None) => Err(ModelError::MissingAntibiotic),
            (false, Some(_)) => Err(ModelError::UnexpectedAntibiotic),
        }
    }

    /// Flat index from raw ids. Unknown ids are fatal.
    pub fn index_raw(&self, symptom: u8, profile: u8, antibiotic: Option<u8>) -> Result<usize> {
        let key = StateKey {
            symptom: SymptomState::from_u8(symptom)?,
            profile: ResistanceProfile::from_u8(profile)?,
            antibiotic: antibiotic.map(Antibiotic::from_u8).transpose()?,
        };
        self.index(key)
    }

    /// Exact inverse of [`Indexer::index`].
    pub fn key(&self, index: usize) -> Result<StateKey> {
        if index >= self.len() {
            return Err(ModelError::IndexOutOfRange {
                what: if self.with_antibiotic {
                    "symptom/profile/antibiotic index"
                } else {
                    "symptom/profile index"
                },
                index,
                len: self.len(),
            });
        }

        if self.with_antibiotic {
            let per_symptom = ResistanceProfile::COUNT * Antibiotic::COUNT;
            let s = index / per_symptom;
            let rest = index % per_symptom;
            Ok(StateKey {
                symptom: SymptomState::from_u8(s as u8)?,
                profile: ResistanceProfile::from_u8((rest / Antibiotic::COUNT) as u8)?,
                antibiotic: Some(Antibiotic::from_u8((rest % Antibiotic::COUNT) as u8)?),
            })
        } else {
            Ok(StateKey {
                symptom: SymptomState::from_u8((index / ResistanceProfile::COUNT) as u8)?,
                profile: ResistanceProfile::from_u8((index % ResistanceProfile::COUNT) as u8)?,
                antibiotic: None,
            })
        }
    }

    /// Every valid key, in index order.
    pub fn keys(&self) -> Vec<StateKey> {
        let mut out = Vec::with_capacity(self.len());
        for symptom in SymptomState::ALL {
            for profile in ResistanceProfile::ALL {
                if self.with_antibiotic {
                    for antibiotic in Antibiotic::ALL {
                        out.push(StateKey::with_antibiotic(symptom, profile, antibiotic));
                    }
                } else {
                    out.push(StateKey::new(symptom, profile));
                }
            }
        }
        out
    }

    /// Human-readable label, e.g. `Symp-CIP-NS, TET-S, CRO-S` or
    /// `Tx-CRO in Asym-CIP-S, TET-S, CRO-S`.
    pub fn label(&self, key: StateKey) -> Result<String> {
        // validates the key shape against this indexer
        self.index(key)?;
        Ok(match key.antibiotic {
            None => symptom_profile_label(key.symptom, key.profile),
            Some(a) => format!(
                "Tx-{} in {}",
                a.label(),
                symptom_profile_label(key.symptom, key.profile)
            ),
        })
    }
}

/// Flat index of a (symptom, profile) pair. Infallible for typed inputs.
pub fn sp_index(symptom: SymptomState, profile: ResistanceProfile) -> usize {
    ResistanceProfile::COUNT * symptom as usize + profile as usize
}

/// Flat index of a (symptom, profile, antibiotic) triple. Infallible for typed inputs.
pub fn spa_index(symptom: SymptomState, profile: ResistanceProfile, antibiotic: Antibiotic) -> usize {
    (ResistanceProfile::COUNT * Antibiotic::COUNT) * symptom as usize
        + Antibiotic::COUNT * profile as usize
        + antibiotic as usize
}

pub fn symptom_profile_label(symptom: SymptomState, profile: ResistanceProfile) -> String {
    format!("{}-{}", symptom.label(), profile.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_symptom_profile() {
        let ix = Indexer::symptom_profile();
        assert_eq!(ix.len(), 16);
        for i in 0..ix.len() {
            let key = ix.key(i).unwrap();
            assert_eq!(ix.index(key).unwrap(), i);
        }
    }

    #[test]
    fn test_roundtrip_with_antibiotic() {
        let ix = Indexer::symptom_profile_antibiotic();
        assert_eq!(ix.len(), 48);
        for key in ix.keys() {
            let i = ix.index(key).unwrap();
            assert_eq!(ix.key(i).unwrap(), key);
        }
    }

    #[test]
    fn test_typed_shortcuts_agree() {
        let ix = Indexer::symptom_profile();
        let ixa = Indexer::symptom_profile_antibiotic();
        for key in ixa.keys() {
            let a = key.antibiotic.unwrap();
            assert_eq!(spa_index(key.symptom, key.profile, a), ixa.index(key).unwrap());
            assert_eq!(
                sp_index(key.symptom, key.profile),
                ix.index(StateKey::new(key.symptom, key.profile)).unwrap()
            );
        }
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let ix = Indexer::symptom_profile();
        assert!(matches!(
            ix.key(16),
            Err(ModelError::IndexOutOfRange { index: 16, len: 16, .. })
        ));
        assert!(ix.index_raw(2, 0, None).is_err());
        assert!(ix.index_raw(0, 8, None).is_err());
        assert!(Indexer::symptom_profile_antibiotic()
            .index_raw(0, 0, Some(3))
            .is_err());
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let ix = Indexer::symptom_profile();
        let key = StateKey::with_antibiotic(
            SymptomState::Symptomatic,
            ResistanceProfile::Cip,
            Antibiotic::Tet,
        );
        assert_eq!(ix.index(key), Err(ModelError::UnexpectedAntibiotic));
        assert_eq!(
            Indexer::symptom_profile_antibiotic().index(StateKey::new(
                SymptomState::Symptomatic,
                ResistanceProfile::Cip
            )),
            Err(ModelError::MissingAntibiotic)
        );
    }

    #[test]
    fn test_labels() {
        let ix = Indexer::symptom_profile();
        let key = StateKey::new(SymptomState::Asymptomatic, ResistanceProfile::Tet);
        assert_eq!(ix.label(key).unwrap(), "Asym-CIP-S, TET-NS, CRO-S");

        let ixa = Indexer::symptom_profile_antibiotic();
        let key = StateKey::with_antibiotic(
            SymptomState::Symptomatic,
            ResistanceProfile::Susceptible,
            Antibiotic::Cro,
        );
        assert_eq!(ixa.label(key).unwrap(), "Tx-CRO in Symp-CIP-S, TET-S, CRO-S");
    }
}
