//! Clinical care cascade: chance nodes and epidemic events.
//!
//! A case moves between compartments through zero-duration chance nodes.
//! Every node is binary: the first destination is taken with the node's
//! probability parameter, the second with its complement, so branch
//! probabilities always sum to 1.
//!
//! # Cascade
//!
//! ```text
//! S ──infection──▶ symptomatic? ──▶ I(s,p)
//! I(s,p) ──recovery──▶ S
//! I(s,p) ──screening / care seeking──▶ rapid test?
//!     ├─ yes ─▶ CIP test ─┬─ S ─▶ TET test ─┬─ S ─▶ CIP or TET
//!     │                   │                 └─ NS ─▶ Tx-CIP
//!     │                   └─ NS ─▶ TET test ─┬─ S ─▶ Tx-TET
//!     │                                      └─ NS ─▶ Tx-CRO
//!     └─ no ──▶ Tx-CRO
//! Tx-a in (s,p) ─┬─ susceptible ─▶ emergence? ─┬─ no ─▶ success ─▶ S
//!                │                             └─ yes ─▶ (s, p+a) retreatment path
//!                └─ non-susceptible ─▶ retreatment decision (symptomatic) / I (asymptomatic)
//! retreatment decision ─┬─ symptomatic ─▶ F(s,p)
//!                       └─ asymptomatic ─▶ I(s,p)
//! F(s,p) ──retreatment──▶ CRO (emergence? ─▶ F(s,p+CRO)) or M ─▶ S
//! ```
//!
//! Nodes are created leaves-first: a node may only name compartments and
//! nodes that already exist.

use rand::Rng;
use serde::Serialize;

use crate::compartments::{CompartmentId, CompartmentNetwork};
use crate::error::{ModelError, Result};
use crate::graph::ParamRef;
use crate::indexer::{sp_index, spa_index, symptom_profile_label, Indexer, StateKey};
use crate::params::{ParamId, Parameters};
use crate::policy::Intervention;
use crate::routing::route;
use crate::taxonomy::{Antibiotic, ResistanceProfile, SymptomState, TreatmentOutcome, RESERVE_DRUG};

/// Index of a chance node in [`Cascade::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Where a case goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Destination {
    Compartment(CompartmentId),
    Node(NodeId),
}

/// How an epidemic event fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Rate independent of the epidemic state.
    Independent { rate: ParamRef },
    /// Force of infection generated by cases of `pathogen`.
    Dependent { pathogen: ResistanceProfile },
}

/// An event attached to a compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct EpiEvent {
    pub name: String,
    pub kind: EventKind,
    pub destination: Destination,
    /// Event only fires while this intervention is switched on.
    pub intervention: Option<Intervention>,
}

/// Role of a chance node in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    SymptomOnset(ResistanceProfile),
    RapidTestGate(StateKey),
    CipTest(StateKey),
    TetTestAfterCipSusceptible(StateKey),
    TetTestAfterCipNonSusceptible(StateKey),
    CipOrTet(StateKey),
    TreatmentOutcome(StateKey),
    RetreatmentDecision(StateKey),
    SymptomsAfterEmergence(ResistanceProfile),
    RetreatmentWithCro(StateKey),
    CountSuccess(Antibiotic),
    CountSuccessFirstLine,
    CountReserve,
    CountFirstLineReserve,
    CountFirstLineReserveBy(StateKey),
}

/// A zero-duration binary branch.
#[derive(Debug, Clone)]
pub struct ChanceNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub destinations: [Destination; 2],
    /// Probability of the first destination.
    pub probability: ParamRef,
    pub collect_incidence: bool,
}

impl ChanceNode {
    /// Branch probabilities at time `t`; they sum to 1.
    pub fn probabilities(&self, params: &Parameters, t: f64) -> Result<[f64; 2]> {
        let p = params.value(self.probability, t)?;
        if !(0.0..=1.0).contains(&p) || p.is_nan() {
            return Err(ModelError::InvalidProbability {
                node: self.name.clone(),
                value: p,
            });
        }
        Ok([p, 1.0 - p])
    }

    /// Pass-through node whose two branches lead to the same place.
    pub fn is_counter(&self) -> bool {
        self.destinations[0] == self.destinations[1]
    }
}

/// Path of a single case through the cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Walk {
    pub nodes: Vec<NodeId>,
    pub landed: CompartmentId,
}

impl Walk {
    pub fn visited(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

struct NodeBuilder {
    nodes: Vec<ChanceNode>,
    n_compartments: usize,
    collect: bool,
}

impl NodeBuilder {
    fn check(&self, owner: &str, d: Destination) -> Result<()> {
        let ok = match d {
            Destination::Compartment(c) => c.0 < self.n_compartments,
            Destination::Node(n) => n.0 < self.nodes.len(),
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::DanglingDestination {
                owner: owner.to_string(),
                target: format!("{d:?}"),
            })
        }
    }

    fn add(
        &mut self,
        name: String,
        kind: NodeKind,
        destinations: [Destination; 2],
        probability: ParamRef,
    ) -> Result<NodeId> {
        for d in destinations {
            self.check(&name, d)?;
        }
        let id = NodeId(self.nodes.len());
        log::trace!("chance node {}: {name}", id.0);
        self.nodes.push(ChanceNode {
            id,
            name,
            kind,
            destinations,
            probability,
            collect_incidence: self.collect,
        });
        Ok(id)
    }

    /// Node that always forwards to `to`.
    fn counter(&mut self, name: &str, kind: NodeKind, to: Destination, one: ParamRef) -> Result<NodeId> {
        self.add(name.to_string(), kind, [to, to], one)
    }
}

fn node(id: NodeId) -> Destination {
    Destination::Node(id)
}

fn comp(id: CompartmentId) -> Destination {
    Destination::Compartment(id)
}

/// The full chance-node network with typed handles into it.
#[derive(Debug, Clone)]
pub struct Cascade {
    nodes: Vec<ChanceNode>,
    pub count_success_first_line: NodeId,
    pub count_reserve: NodeId,
    pub count_first_line_reserve: NodeId,
    count_first_line_reserve_by: Vec<NodeId>,
    count_success_by_drug: Vec<NodeId>,
    symptom_onset: Vec<NodeId>,
    retreatment_with_cro: Vec<Option<NodeId>>,
    retreatment_decision: Vec<NodeId>,
    symptoms_after_emergence: Vec<NodeId>,
    treatment_outcome: Vec<NodeId>,
    cip_or_tet: Vec<NodeId>,
    tet_after_cip_susceptible: Vec<NodeId>,
    tet_after_cip_non_susceptible: Vec<NodeId>,
    cip_test: Vec<NodeId>,
    rapid_test_gate: Vec<NodeId>,
}

impl Cascade {
    /// Build every chance node and attach epidemic events to the compartments.
    pub fn build(
        params: &Parameters,
        compartments: &mut CompartmentNetwork,
        collect_incidence: bool,
    ) -> Result<Self> {
        let sp = Indexer::symptom_profile();
        let spa = Indexer::symptom_profile_antibiotic();
        let one = params.get(ParamId::One)?;
        let zero = params.get(ParamId::Zero)?;
        let p_symp = params.get(ParamId::ProbSymptomatic)?;
        let s_comp = comp(compartments.susceptible());

        let mut b = NodeBuilder {
            nodes: Vec::new(),
            n_compartments: compartments.len(),
            collect: collect_incidence,
        };

        // ── Counting nodes ──
        let count_success_first_line = b.counter(
            "Successful Tx with CIP, TET, or CRO",
            NodeKind::CountSuccessFirstLine,
            s_comp,
            one,
        )?;
        let count_reserve = b.counter(
            &format!("Tx with {RESERVE_DRUG}"),
            NodeKind::CountReserve,
            s_comp,
            one,
        )?;
        let count_first_line_reserve = b.counter(
            &format!("1st-Tx with {RESERVE_DRUG}"),
            NodeKind::CountFirstLineReserve,
            node(count_reserve),
            one,
        )?;
        let mut count_first_line_reserve_by = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            count_first_line_reserve_by.push(b.counter(
                &format!(
                    "1st-Tx with {RESERVE_DRUG} | {}",
                    symptom_profile_label(key.symptom, key.profile)
                ),
                NodeKind::CountFirstLineReserveBy(key),
                node(count_first_line_reserve),
                one,
            )?);
        }
        let mut count_success_by_drug = Vec::with_capacity(Antibiotic::COUNT);
        for ab in Antibiotic::ALL {
            count_success_by_drug.push(b.counter(
                &format!("Counting success tx with {ab}"),
                NodeKind::CountSuccess(ab),
                node(count_success_first_line),
                one,
            )?);
        }

        // ── Symptom onset after infection ──
        let mut symptom_onset = Vec::with_capacity(ResistanceProfile::COUNT);
        for p in ResistanceProfile::ALL {
            symptom_onset.push(b.add(
                format!("If symptomatic to {p}"),
                NodeKind::SymptomOnset(p),
                [
                    comp(compartments.infectious(SymptomState::Symptomatic, p)),
                    comp(compartments.infectious(SymptomState::Asymptomatic, p)),
                ],
                p_symp,
            )?);
        }

        // ── Retreatment with CRO from F ──
        // Only defined where CRO can still cure; otherwise F goes straight to M.
        let p_emerge_cro = params.get(ParamId::ProbEmergence(Antibiotic::Cro))?;
        let mut retreatment_with_cro = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            let (next, outcome) = route(key.profile, Antibiotic::Cro);
            let entry = match outcome {
                TreatmentOutcome::Resistance => Some(b.add(
                    format!(
                        "If resistance after re-tx with CRO in {}",
                        symptom_profile_label(key.symptom, key.profile)
                    ),
                    NodeKind::RetreatmentWithCro(key),
                    [
                        comp(compartments.awaiting(key.symptom, next)),
                        node(count_success_by_drug[Antibiotic::Cro as usize]),
                    ],
                    p_emerge_cro,
                )?),
                TreatmentOutcome::Ineffective => None,
                TreatmentOutcome::Success => return Err(routing_defect(key.profile, Antibiotic::Cro)),
            };
            retreatment_with_cro.push(entry);
        }

        // ── Retreatment decision ──
        // Symptomatic cases always seek retreatment, asymptomatic cases never do.
        let mut retreatment_decision = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            let prob = match key.symptom {
                SymptomState::Symptomatic => one,
                SymptomState::Asymptomatic => zero,
            };
            retreatment_decision.push(b.add(
                format!(
                    "If re-tx after ineff tx/rest dev in {}",
                    symptom_profile_label(key.symptom, key.profile)
                ),
                NodeKind::RetreatmentDecision(key),
                [
                    comp(compartments.awaiting(key.symptom, key.profile)),
                    comp(compartments.infectious(key.symptom, key.profile)),
                ],
                prob,
            )?);
        }

        // ── Symptom status after resistance emerges ──
        let mut symptoms_after_emergence = Vec::with_capacity(ResistanceProfile::COUNT);
        for p in ResistanceProfile::ALL {
            symptoms_after_emergence.push(b.add(
                format!("If symp after developing resistance to {p}"),
                NodeKind::SymptomsAfterEmergence(p),
                [
                    node(retreatment_decision[sp_index(SymptomState::Symptomatic, p)]),
                    node(retreatment_decision[sp_index(SymptomState::Asymptomatic, p)]),
                ],
                p_symp,
            )?);
        }

        // ── Treatment outcomes ──
        let mut treatment_outcome = Vec::with_capacity(spa.len());
        for key in spa.keys() {
            let ab = key.antibiotic.ok_or(ModelError::MissingAntibiotic)?;
            let (s, p) = (key.symptom, key.profile);
            let name = format!("Outcome of {}", spa.label(key)?);
            let (next, outcome) = route(p, ab);
            let id = match outcome {
                TreatmentOutcome::Resistance => {
                    let dest_resistant = match s {
                        SymptomState::Symptomatic => node(retreatment_decision[sp_index(s, next)]),
                        SymptomState::Asymptomatic => node(symptoms_after_emergence[next as usize]),
                    };
                    b.add(
                        name,
                        NodeKind::TreatmentOutcome(key),
                        [dest_resistant, node(count_success_by_drug[ab as usize])],
                        params.get(ParamId::ProbEmergence(ab))?,
                    )?
                }
                TreatmentOutcome::Ineffective => {
                    let dest = match s {
                        SymptomState::Symptomatic => node(retreatment_decision[sp_index(s, p)]),
                        SymptomState::Asymptomatic => comp(compartments.infectious(s, p)),
                    };
                    b.add(name, NodeKind::TreatmentOutcome(key), [dest, dest], one)?
                }
                TreatmentOutcome::Success => return Err(routing_defect(p, ab)),
            };
            treatment_outcome.push(id);
        }
        let tx = |s: SymptomState, p: ResistanceProfile, ab: Antibiotic| node(treatment_outcome[spa_index(s, p, ab)]);

        // ── Diagnostic cascade ──
        let p_cip_if_both = params.get(ParamId::ProbTxCipIfSusceptibleToBoth)?;
        let mut cip_or_tet = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            cip_or_tet.push(b.add(
                format!(
                    "If Tx-CIP if test susceptible to CIP and TET | {}",
                    symptom_profile_label(key.symptom, key.profile)
                ),
                NodeKind::CipOrTet(key),
                [
                    tx(key.symptom, key.profile, Antibiotic::Cip),
                    tx(key.symptom, key.profile, Antibiotic::Tet),
                ],
                p_cip_if_both,
            )?);
        }

        let mut tet_after_cip_susceptible = Vec::with_capacity(sp.len());
        let mut tet_after_cip_non_susceptible = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            let i = sp.index(key)?;
            let label = symptom_profile_label(key.symptom, key.profile);
            let pos_tet = params.get(ParamId::PositiveTest(Antibiotic::Tet, key.profile))?;
            tet_after_cip_susceptible.push(b.add(
                format!("Result of TET test after CIP test returned positive | {label}"),
                NodeKind::TetTestAfterCipSusceptible(key),
                [node(cip_or_tet[i]), tx(key.symptom, key.profile, Antibiotic::Cip)],
                pos_tet,
            )?);
            tet_after_cip_non_susceptible.push(b.add(
                format!("Result of TET test after CIP test returned negative | {label}"),
                NodeKind::TetTestAfterCipNonSusceptible(key),
                [
                    tx(key.symptom, key.profile, Antibiotic::Tet),
                    tx(key.symptom, key.profile, Antibiotic::Cro),
                ],
                pos_tet,
            )?);
        }

        let mut cip_test = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            let i = sp.index(key)?;
            cip_test.push(b.add(
                format!(
                    "Result of CIP test | {}",
                    symptom_profile_label(key.symptom, key.profile)
                ),
                NodeKind::CipTest(key),
                [
                    node(tet_after_cip_susceptible[i]),
                    node(tet_after_cip_non_susceptible[i]),
                ],
                params.get(ParamId::PositiveTest(Antibiotic::Cip, key.profile))?,
            )?);
        }

        let p_rapid = params.get(ParamId::ProbRapidTest)?;
        let mut rapid_test_gate = Vec::with_capacity(sp.len());
        for key in sp.keys() {
            let i = sp.index(key)?;
            rapid_test_gate.push(b.add(
                format!(
                    "If will receive a rapid test | {}",
                    symptom_profile_label(key.symptom, key.profile)
                ),
                NodeKind::RapidTestGate(key),
                [node(cip_test[i]), tx(key.symptom, key.profile, Antibiotic::Cro)],
                p_rapid,
            )?);
        }

        let cascade = Self {
            nodes: b.nodes,
            count_success_first_line,
            count_reserve,
            count_first_line_reserve,
            count_first_line_reserve_by,
            count_success_by_drug,
            symptom_onset,
            retreatment_with_cro,
            retreatment_decision,
            symptoms_after_emergence,
            treatment_outcome,
            cip_or_tet,
            tet_after_cip_susceptible,
            tet_after_cip_non_susceptible,
            cip_test,
            rapid_test_gate,
        };
        cascade.attach_events(params, compartments)?;
        log::debug!("built {} chance nodes", cascade.nodes.len());
        Ok(cascade)
    }

    fn attach_events(&self, params: &Parameters, compartments: &mut CompartmentNetwork) -> Result<()> {
        let s_id = compartments.susceptible();
        let rate_recovery = params.get(ParamId::RateNaturalRecovery)?;
        let rate_screening = params.get(ParamId::RateScreening)?;
        let rate_treatment = params.get(ParamId::RateTreatment)?;
        let rate_retreatment = params.get(ParamId::RateRetreatment)?;

        // infection
        for p in ResistanceProfile::ALL {
            compartments.get_mut(s_id).events.push(EpiEvent {
                name: format!("Infection | {p}"),
                kind: EventKind::Dependent { pathogen: p },
                destination: node(self.symptom_onset[p as usize]),
                intervention: None,
            });
        }

        for s in SymptomState::ALL {
            for p in ResistanceProfile::ALL {
                let i = sp_index(s, p);
                let i_id = compartments.infectious(s, p);
                let name = compartments.get(i_id).name.clone();
                let gate = node(self.rapid_test_gate[i]);
                let first_line_m = node(self.count_first_line_reserve_by[i]);

                let mut events = vec![
                    EpiEvent {
                        name: format!("Natural recovery | {name}"),
                        kind: EventKind::Independent { rate: rate_recovery },
                        destination: comp(s_id),
                        intervention: None,
                    },
                    EpiEvent {
                        name: format!("Screening | {name}"),
                        kind: EventKind::Independent { rate: rate_screening },
                        destination: gate,
                        intervention: Some(Intervention::FirstLineCro),
                    },
                    EpiEvent {
                        name: format!("Screening then {RESERVE_DRUG} | {name}"),
                        kind: EventKind::Independent { rate: rate_screening },
                        destination: first_line_m,
                        intervention: Some(Intervention::FirstLineReserve),
                    },
                ];
                if s == SymptomState::Symptomatic {
                    events.push(EpiEvent {
                        name: format!("Seeking treatment | {name}"),
                        kind: EventKind::Independent { rate: rate_treatment },
                        destination: gate,
                        intervention: Some(Intervention::FirstLineCro),
                    });
                    events.push(EpiEvent {
                        name: format!("Seeking treatment then {RESERVE_DRUG} | {name}"),
                        kind: EventKind::Independent { rate: rate_treatment },
                        destination: first_line_m,
                        intervention: Some(Intervention::FirstLineReserve),
                    });
                }
                compartments.get_mut(i_id).events.extend(events);

                let f_id = compartments.awaiting(s, p);
                let name = compartments.get(f_id).name.clone();
                let destination = match self.retreatment_with_cro[i] {
                    Some(n) => node(n),
                    None => node(self.count_reserve),
                };
                compartments.get_mut(f_id).events.push(EpiEvent {
                    name: format!("Re-Tx | {name}"),
                    kind: EventKind::Independent {
                        rate: rate_retreatment,
                    },
                    destination,
                    intervention: None,
                });
            }
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[ChanceNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &ChanceNode {
        &self.nodes[id.0]
    }

    pub fn symptom_onset(&self, p: ResistanceProfile) -> NodeId {
        self.symptom_onset[p as usize]
    }

    pub fn rapid_test_gate(&self, s: SymptomState, p: ResistanceProfile) -> NodeId {
        self.rapid_test_gate[sp_index(s, p)]
    }

    pub fn all_rapid_test_gates(&self) -> &[NodeId] {
        &self.rapid_test_gate
    }

    pub fn cip_test(&self, s: SymptomState, p: ResistanceProfile) -> NodeId {
        self.cip_test[sp_index(s, p)]
    }

    pub fn treatment_outcome(&self, s: SymptomState, p: ResistanceProfile, ab: Antibiotic) -> NodeId {
        self.treatment_outcome[spa_index(s, p, ab)]
    }

    pub fn retreatment_decision(&self, s: SymptomState, p: ResistanceProfile) -> NodeId {
        self.retreatment_decision[sp_index(s, p)]
    }

    pub fn symptoms_after_emergence(&self, p: ResistanceProfile) -> NodeId {
        self.symptoms_after_emergence[p as usize]
    }

    pub fn retreatment_with_cro(&self, s: SymptomState, p: ResistanceProfile) -> Option<NodeId> {
        self.retreatment_with_cro[sp_index(s, p)]
    }

    pub fn count_success(&self, ab: Antibiotic) -> NodeId {
        self.count_success_by_drug[ab as usize]
    }

    pub fn count_first_line_reserve_by(&self, s: SymptomState, p: ResistanceProfile) -> NodeId {
        self.count_first_line_reserve_by[sp_index(s, p)]
    }

    /// Check every node's branch probabilities at time `t`.
    pub fn verify_probabilities(&self, params: &Parameters, t: f64) -> Result<()> {
        for n in &self.nodes {
            let [a, b] = n.probabilities(params, t)?;
            debug_assert!((a + b - 1.0).abs() < 1e-12);
        }
        Ok(())
    }

    /// Follow a single case from `start` until it lands in a compartment.
    pub fn walk<R: Rng + ?Sized>(
        &self,
        start: Destination,
        params: &Parameters,
        t: f64,
        rng: &mut R,
    ) -> Result<Walk> {
        let mut nodes = Vec::new();
        let mut at = start;
        loop {
            match at {
                Destination::Compartment(c) => return Ok(Walk { nodes, landed: c }),
                Destination::Node(id) => {
                    let n = self.node(id);
                    nodes.push(id);
                    let [p, _] = n.probabilities(params, t)?;
                    // a probability of exactly 1 or 0 never consults the rng
                    at = if p >= 1.0 {
                        n.destinations[0]
                    } else if p <= 0.0 {
                        n.destinations[1]
                    } else if rng.gen::<f64>() < p {
                        n.destinations[0]
                    } else {
                        n.destinations[1]
                    };
                }
            }
        }
    }
}

fn routing_defect(p: ResistanceProfile, ab: Antibiotic) -> ModelError {
    ModelError::RoutingDefect {
        profile: p.label().to_string(),
        antibiotic: ab.label().to_string(),
        reason: "outcome routing produced an unexpected outcome kind".into(),
    }
}
