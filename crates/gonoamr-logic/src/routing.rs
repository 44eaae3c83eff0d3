//! Treatment-outcome routing.
//!
//! `(profile, antibiotic) → (next profile, outcome)` as an explicit table.
//! A treatment that does not cure routes either to
//! - `(same profile, Ineffective)` when the strain already resists the drug, or
//! - `(profile + drug, Resistance)` when resistance newly emerges.
//!
//! [`verify_routing_table`] checks the table against the resistance bitmasks
//! and runs at the start of every model build.

use crate::error::{ModelError, Result};
use crate::taxonomy::{Antibiotic, ResistanceProfile, TreatmentOutcome};

use ResistanceProfile as P;
use TreatmentOutcome::{Ineffective as IN, Resistance as RE};

/// Rows in `ResistanceProfile` order, columns in `Antibiotic` order (CIP, TET, CRO).
const ROUTING_TABLE: [[(ResistanceProfile, TreatmentOutcome); Antibiotic::COUNT];
    ResistanceProfile::COUNT] = [
    // Susceptible
    [(P::Cip, RE), (P::Tet, RE), (P::Cro, RE)],
    // Cip
    [(P::Cip, IN), (P::CipTet, RE), (P::CipCro, RE)],
    // Tet
    [(P::CipTet, RE), (P::Tet, IN), (P::TetCro, RE)],
    // Cro
    [(P::CipCro, RE), (P::TetCro, RE), (P::Cro, IN)],
    // CipTet
    [(P::CipTet, IN), (P::CipTet, IN), (P::CipTetCro, RE)],
    // CipCro
    [(P::CipCro, IN), (P::CipTetCro, RE), (P::CipCro, IN)],
    // TetCro
    [(P::CipTetCro, RE), (P::TetCro, IN), (P::TetCro, IN)],
    // CipTetCro
    [(P::CipTetCro, IN), (P::CipTetCro, IN), (P::CipTetCro, IN)],
];

/// Profile and failure reason after treating `profile` with `antibiotic`
/// when the treatment does not cure.
pub fn route(profile: ResistanceProfile, antibiotic: Antibiotic) -> (ResistanceProfile, TreatmentOutcome) {
    ROUTING_TABLE[profile as usize][antibiotic as usize]
}

/// Like [`route`] but from raw ids; unknown ids are fatal.
pub fn route_raw(profile: u8, antibiotic: u8) -> Result<(ResistanceProfile, TreatmentOutcome)> {
    Ok(route(
        ResistanceProfile::from_u8(profile)?,
        Antibiotic::from_u8(antibiotic)?,
    ))
}

/// Check one table entry against the bitmask semantics.
fn check_entry(
    profile: ResistanceProfile,
    antibiotic: Antibiotic,
    next: ResistanceProfile,
    outcome: TreatmentOutcome,
) -> Result<()> {
    let defect = |reason: String| ModelError::RoutingDefect {
        profile: profile.label().to_string(),
        antibiotic: antibiotic.label().to_string(),
        reason,
    };

    match outcome {
        TreatmentOutcome::Ineffective => {
            if !profile.is_resistant_to(antibiotic) {
                return Err(defect("ineffective but the profile is susceptible".into()));
            }
            if next != profile {
                return Err(defect(format!("ineffective treatment changed profile to {next}")));
            }
        }
        TreatmentOutcome::Resistance => {
            if profile.is_resistant_to(antibiotic) {
                return Err(defect("emergence routed for an already resistant profile".into()));
            }
            if !next.is_strictly_more_resistant_than(profile) {
                return Err(defect(format!("{next} is not strictly more resistant")));
            }
            if next.mask() != profile.mask() | antibiotic.resistance_bit() {
                return Err(defect(format!("{next} does not add exactly this drug")));
            }
        }
        TreatmentOutcome::Success => {
            return Err(defect("success is not a failure route".into()));
        }
    }
    Ok(())
}

/// Exhaustiveness and monotonicity check over every (profile, antibiotic) pair.
pub fn verify_routing_table() -> Result<()> {
    for profile in ResistanceProfile::ALL {
        for antibiotic in Antibiotic::ALL {
            let (next, outcome) = route(profile, antibiotic);
            check_entry(profile, antibiotic, next, outcome)?;
        }
    }
    log::trace!(
        "routing table verified ({} entries)",
        ResistanceProfile::COUNT * Antibiotic::COUNT
    );
    Ok(())
}

/// Treating with `antibiotic` can cure `profile` (resistance may still emerge).
pub fn is_effective(profile: ResistanceProfile, antibiotic: Antibiotic) -> bool {
    route(profile, antibiotic).1 == TreatmentOutcome::Resistance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_consistent() {
        verify_routing_table().unwrap();
    }

    #[test]
    fn test_never_downgrades() {
        for p in ResistanceProfile::ALL {
            for a in Antibiotic::ALL {
                let (next, outcome) = route(p, a);
                assert!(next.mask() & p.mask() == p.mask(), "{p} -> {next} via {a}");
                match outcome {
                    TreatmentOutcome::Ineffective => assert_eq!(next, p),
                    TreatmentOutcome::Resistance => assert_ne!(next, p),
                    TreatmentOutcome::Success => panic!("success in failure table"),
                }
            }
        }
    }

    #[test]
    fn test_known_entries() {
        assert_eq!(
            route(ResistanceProfile::Tet, Antibiotic::Cip),
            (ResistanceProfile::CipTet, TreatmentOutcome::Resistance)
        );
        assert_eq!(
            route(ResistanceProfile::CipCro, Antibiotic::Cro),
            (ResistanceProfile::CipCro, TreatmentOutcome::Ineffective)
        );
        assert_eq!(
            route(ResistanceProfile::CipTet, Antibiotic::Cro),
            (ResistanceProfile::CipTetCro, TreatmentOutcome::Resistance)
        );
    }

    #[test]
    fn test_fully_resistant_is_ineffective_everywhere() {
        for a in Antibiotic::ALL {
            assert!(!is_effective(ResistanceProfile::CipTetCro, a));
            assert!(is_effective(ResistanceProfile::Susceptible, a));
        }
    }

    #[test]
    fn test_check_entry_catches_defects() {
        // emergence that doesn't escalate
        assert!(check_entry(
            ResistanceProfile::Susceptible,
            Antibiotic::Cip,
            ResistanceProfile::Susceptible,
            TreatmentOutcome::Resistance
        )
        .is_err());
        // emergence to the wrong drug
        assert!(check_entry(
            ResistanceProfile::Susceptible,
            Antibiotic::Cip,
            ResistanceProfile::Tet,
            TreatmentOutcome::Resistance
        )
        .is_err());
        // ineffective on a susceptible strain
        assert!(check_entry(
            ResistanceProfile::Tet,
            Antibiotic::Cip,
            ResistanceProfile::Tet,
            TreatmentOutcome::Ineffective
        )
        .is_err());
        assert!(route_raw(8, 0).is_err());
        assert!(route_raw(0, 3).is_err());
    }
}
