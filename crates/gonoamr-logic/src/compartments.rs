//! Population compartments.
//!
//! One susceptible pool `S`, and for every (symptom, profile) pair an
//! active-infection pool `I` and a post-failure pool `F` awaiting
//! retreatment. Infectious pools carry an infectivity vector that is zero
//! everywhere except their own profile's slot.

use serde::Serialize;

use crate::cascade::{Destination, EpiEvent};
use crate::error::Result;
use crate::graph::ParamRef;
use crate::indexer::{sp_index, symptom_profile_label, Indexer, StateKey};
use crate::params::{ParamId, Parameters};
use crate::taxonomy::{ResistanceProfile, SymptomState};

/// Index of a compartment in [`CompartmentNetwork::compartments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CompartmentId(pub usize);

/// Which pool a compartment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompartmentKind {
    Susceptible,
    Infectious(StateKey),
    AwaitingRetreatment(StateKey),
}

/// A population pool handed to the engine.
#[derive(Debug, Clone)]
pub struct Compartment {
    pub id: CompartmentId,
    pub name: String,
    pub kind: CompartmentKind,
    /// Initial size; `None` starts empty.
    pub size: Option<ParamRef>,
    /// Infectivity by profile (`ResistanceProfile` order).
    pub infectivity: Vec<ParamRef>,
    /// Susceptibility by profile (`ResistanceProfile` order). Empty for
    /// compartments that cannot be infected.
    pub susceptibility: Vec<ParamRef>,
    pub eradicate_if_empty: bool,
    pub collect_prevalence: bool,
    pub events: Vec<EpiEvent>,
}

impl Compartment {
    /// Every destination named by this compartment's events.
    pub fn event_destinations(&self) -> impl Iterator<Item = Destination> + '_ {
        self.events.iter().map(|e| e.destination)
    }
}

/// S plus the I and F pools of every (symptom, profile) pair.
#[derive(Debug, Clone)]
pub struct CompartmentNetwork {
    compartments: Vec<Compartment>,
    susceptible: CompartmentId,
    infectious: Vec<CompartmentId>,
    awaiting: Vec<CompartmentId>,
}

impl CompartmentNetwork {
    /// Create all compartments. Parameters must already be registered.
    pub fn build(params: &Parameters, collect_prevalence: bool) -> Result<Self> {
        let indexer = Indexer::symptom_profile();
        let zero = params.get(ParamId::Zero)?;
        let one = params.get(ParamId::One)?;

        let mut compartments = Vec::with_capacity(1 + 2 * indexer.len());
        let susceptible = CompartmentId(0);
        compartments.push(Compartment {
            id: susceptible,
            name: "S".into(),
            kind: CompartmentKind::Susceptible,
            size: Some(params.get(ParamId::SizeS)?),
            infectivity: vec![zero; ResistanceProfile::COUNT],
            susceptibility: vec![one; ResistanceProfile::COUNT],
            eradicate_if_empty: false,
            collect_prevalence: true,
            events: Vec::new(),
        });

        let mut infectious = vec![CompartmentId(0); indexer.len()];
        let mut awaiting = vec![CompartmentId(0); indexer.len()];

        for key in indexer.keys() {
            let i = indexer.index(key)?;
            let label = symptom_profile_label(key.symptom, key.profile);

            let mut infectivity = vec![zero; ResistanceProfile::COUNT];
            infectivity[key.profile as usize] = params.get(ParamId::Infectivity(key.profile))?;

            let id = CompartmentId(compartments.len());
            compartments.push(Compartment {
                id,
                name: format!("I {label}"),
                kind: CompartmentKind::Infectious(key),
                size: Some(params.get(ParamId::SizeI0(key.symptom, key.profile))?),
                infectivity: infectivity.clone(),
                susceptibility: Vec::new(),
                eradicate_if_empty: true,
                collect_prevalence,
                events: Vec::new(),
            });
            infectious[i] = id;

            let id = CompartmentId(compartments.len());
            compartments.push(Compartment {
                id,
                name: format!("F {label}"),
                kind: CompartmentKind::AwaitingRetreatment(key),
                size: None,
                infectivity,
                susceptibility: Vec::new(),
                eradicate_if_empty: true,
                collect_prevalence,
                events: Vec::new(),
            });
            awaiting[i] = id;
        }

        log::debug!("built {} compartments", compartments.len());
        Ok(Self {
            compartments,
            susceptible,
            infectious,
            awaiting,
        })
    }

    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    pub fn susceptible(&self) -> CompartmentId {
        self.susceptible
    }

    /// Active-infection pool of a (symptom, profile) pair.
    pub fn infectious(&self, symptom: SymptomState, profile: ResistanceProfile) -> CompartmentId {
        self.infectious[sp_index(symptom, profile)]
    }

    /// Post-failure pool of a (symptom, profile) pair.
    pub fn awaiting(&self, symptom: SymptomState, profile: ResistanceProfile) -> CompartmentId {
        self.awaiting[sp_index(symptom, profile)]
    }

    pub fn all_infectious(&self) -> &[CompartmentId] {
        &self.infectious
    }

    pub fn all_awaiting(&self) -> &[CompartmentId] {
        &self.awaiting
    }

    pub fn get(&self, id: CompartmentId) -> &Compartment {
        &self.compartments[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: CompartmentId) -> &mut Compartment {
        &mut self.compartments[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Compartment> {
        self.compartments.iter()
    }

    /// Initial size of every compartment, in compartment order.
    pub fn initial_sizes(&self, params: &Parameters) -> Result<Vec<f64>> {
        self.compartments
            .iter()
            .map(|c| match c.size {
                Some(r) => params.value(r, 0.0),
                None => Ok(0.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ModelSettings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network() -> (Parameters, CompartmentNetwork) {
        let mut params = Parameters::build(&ModelSettings::default()).unwrap();
        params.sample(&mut StdRng::seed_from_u64(21)).unwrap();
        let net = CompartmentNetwork::build(&params, true).unwrap();
        (params, net)
    }

    #[test]
    fn test_one_i_and_one_f_per_pair() {
        let (_, net) = network();
        assert_eq!(net.len(), 1 + 2 * 16);
        let mut seen = std::collections::HashSet::new();
        for s in SymptomState::ALL {
            for p in ResistanceProfile::ALL {
                let i = net.infectious(s, p);
                let f = net.awaiting(s, p);
                assert!(seen.insert(i) && seen.insert(f));
                assert_eq!(
                    net.get(i).kind,
                    CompartmentKind::Infectious(StateKey::new(s, p))
                );
                assert_eq!(
                    net.get(f).kind,
                    CompartmentKind::AwaitingRetreatment(StateKey::new(s, p))
                );
            }
        }
    }

    #[test]
    fn test_infectivity_only_in_own_slot() {
        let (params, net) = network();
        let zero = params.get(ParamId::Zero).unwrap();
        for c in net.iter() {
            match c.kind {
                CompartmentKind::Susceptible => assert!(c.infectivity.iter().all(|r| *r == zero)),
                CompartmentKind::Infectious(k) | CompartmentKind::AwaitingRetreatment(k) => {
                    for (slot, r) in c.infectivity.iter().enumerate() {
                        if slot == k.profile as usize {
                            assert_eq!(*r, params.get(ParamId::Infectivity(k.profile)).unwrap());
                        } else {
                            assert_eq!(*r, zero);
                        }
                    }
                    assert!(c.eradicate_if_empty);
                }
            }
        }
    }

    #[test]
    fn test_initial_sizes_cover_population() {
        let (params, net) = network();
        let sizes = net.initial_sizes(&params).unwrap();
        let total: f64 = sizes.iter().sum();
        assert!((total - crate::params::POP_SIZE).abs() / crate::params::POP_SIZE < 1e-9);
        for f in net.all_awaiting() {
            assert_eq!(sizes[f.0], 0.0);
        }
    }
}
