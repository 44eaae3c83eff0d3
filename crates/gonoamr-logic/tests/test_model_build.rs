//! Integration tests for the full model construction pipeline.
//!
//! Exercises: ModelSettings → Parameters → CompartmentNetwork → Cascade
//! → Outputs → calibration bindings → DrugSwitchPolicy
//!
//! All tests are pure construction, with no simulation engine.

use gonoamr_logic::cascade::{Destination, NodeKind};
use gonoamr_logic::compartments::CompartmentKind;
use gonoamr_logic::params::{ParamId, POP_SIZE};
use gonoamr_logic::policy::Intervention;
use gonoamr_logic::routing::route;
use gonoamr_logic::scenarios::sensitivity_scenarios;
use gonoamr_logic::settings::{ModelSettings, ProfileSharePrior};
use gonoamr_logic::taxonomy::{Antibiotic, ResistanceProfile, SymptomState, TreatmentOutcome};
use gonoamr_logic::{build_model, GonoModel, ModelError};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ────────────────────────────────────────────────────────────

fn model(settings: &ModelSettings, seed: u64) -> GonoModel {
    build_model(settings, seed).expect("model builds")
}

fn perfect_tests(coverage: f64) -> ModelSettings {
    ModelSettings::projection(true).with_rapid_test(1.0, 1.0, 1.0, 1.0, coverage, 1.0)
}

// ── Structure ──────────────────────────────────────────────────────────

#[test]
fn one_i_and_one_f_per_pair() {
    let m = model(&ModelSettings::default(), 0);
    let mut infectious = 0;
    let mut awaiting = 0;
    for c in m.compartments.iter() {
        match c.kind {
            CompartmentKind::Susceptible => {}
            CompartmentKind::Infectious(_) => infectious += 1,
            CompartmentKind::AwaitingRetreatment(_) => awaiting += 1,
        }
    }
    assert_eq!(infectious, SymptomState::COUNT * ResistanceProfile::COUNT);
    assert_eq!(awaiting, infectious);
}

#[test]
fn treatment_outcomes_only_escalate() {
    let m = model(&ModelSettings::default(), 0);
    for n in m.cascade.nodes() {
        let NodeKind::TreatmentOutcome(key) = n.kind else {
            continue;
        };
        for d in n.destinations {
            let Destination::Compartment(c) = d else {
                continue;
            };
            match m.compartments.get(c).kind {
                CompartmentKind::Infectious(k) | CompartmentKind::AwaitingRetreatment(k) => {
                    assert!(
                        k.profile == key.profile || k.profile.is_strictly_more_resistant_than(key.profile),
                        "{}",
                        n.name
                    );
                }
                CompartmentKind::Susceptible => {}
            }
        }
    }
}

#[test]
fn resistance_emergence_leads_to_more_resistant_profile() {
    let m = model(&ModelSettings::default(), 0);
    let c = &m.cascade;
    let mut emerging = 0;
    for s in SymptomState::ALL {
        for p in ResistanceProfile::ALL {
            for ab in Antibiotic::ALL {
                let (next, outcome) = route(p, ab);
                if outcome != TreatmentOutcome::Resistance {
                    continue;
                }
                assert_ne!(next, p);
                assert!(next.is_strictly_more_resistant_than(p));
                let node = c.node(c.treatment_outcome(s, p, ab));
                let expected = match s {
                    SymptomState::Symptomatic => c.retreatment_decision(SymptomState::Symptomatic, next),
                    SymptomState::Asymptomatic => c.symptoms_after_emergence(next),
                };
                assert_eq!(node.destinations[0], Destination::Node(expected), "{}", node.name);
                assert_eq!(
                    node.destinations[1],
                    Destination::Node(c.count_success(ab)),
                    "{}",
                    node.name
                );
                emerging += 1;
            }
        }
    }
    assert!(emerging > 0);
}

#[test]
fn symptoms_after_emergence_keep_the_new_profile() {
    let m = model(&ModelSettings::default(), 0);
    let c = &m.cascade;
    for p in ResistanceProfile::ALL {
        let node = c.node(c.symptoms_after_emergence(p));
        assert_eq!(
            node.destinations,
            [
                Destination::Node(c.retreatment_decision(SymptomState::Symptomatic, p)),
                Destination::Node(c.retreatment_decision(SymptomState::Asymptomatic, p)),
            ]
        );
    }
}

#[test]
fn retreatment_with_cro_moves_to_escalated_pool() {
    let m = model(&ModelSettings::default(), 0);
    let c = &m.cascade;
    for s in SymptomState::ALL {
        for p in ResistanceProfile::ALL {
            let (next, outcome) = route(p, Antibiotic::Cro);
            match (outcome, c.retreatment_with_cro(s, p)) {
                (TreatmentOutcome::Resistance, Some(id)) => {
                    let node = c.node(id);
                    assert_eq!(
                        node.destinations[0],
                        Destination::Compartment(m.compartments.awaiting(s, next)),
                        "{}",
                        node.name
                    );
                    assert_ne!(next, p);
                }
                (TreatmentOutcome::Ineffective, None) => {}
                (o, n) => panic!("{s:?}/{p:?}: outcome {o:?} with node {n:?}"),
            }
        }
    }
}

// ── Parameters ─────────────────────────────────────────────────────────

#[test]
fn shares_sum_to_one_over_many_seeds() {
    for seed in 0..50 {
        let m = model(&ModelSettings::default(), seed);
        let shares = m.parameters.profile_shares().unwrap();
        let total: f64 = shares.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "seed {seed}: {total}");
        assert!(shares.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}

#[test]
fn independent_share_overflow_is_rejected_not_clamped() {
    let settings = ModelSettings {
        profile_share_prior: ProfileSharePrior::Independent,
        ..ModelSettings::default()
    };
    let mut rejected = 0;
    for seed in 0..200 {
        match build_model(&settings, seed) {
            Ok(m) => {
                let total: f64 = m.parameters.profile_shares().unwrap().iter().sum();
                assert!((total - 1.0).abs() < 1e-9);
            }
            Err(ModelError::ShareOverflow { sum }) => {
                assert!(sum > 1.0);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(rejected > 0);
}

#[test]
fn probabilities_valid_for_every_scenario() {
    for sc in sensitivity_scenarios(true, true) {
        let settings = sc.apply(&ModelSettings::projection(true));
        for seed in 0..3 {
            let m = model(&settings, seed);
            for t in [0.0, 1.0, 10.0, 25.0] {
                for [a, b] in m.chance_node_probabilities(t).unwrap() {
                    assert!((a + b - 1.0).abs() < 1e-12);
                    assert!((0.0..=1.0).contains(&a));
                }
            }
        }
    }
}

#[test]
fn initial_sizes_cover_population() {
    let m = model(&ModelSettings::default(), 4);
    let total: f64 = m.initial_sizes().unwrap().iter().sum();
    assert!((total - POP_SIZE).abs() / POP_SIZE < 1e-9);
}

// ── Cascade scenarios ──────────────────────────────────────────────────

#[test]
fn coverage_zero_sends_every_care_seeker_to_cro() {
    let m = model(&perfect_tests(0.0), 5);
    let mut rng = StdRng::seed_from_u64(5);
    for p in ResistanceProfile::ALL {
        let gate = m.cascade.rapid_test_gate(SymptomState::Symptomatic, p);
        let cro = m.cascade.treatment_outcome(SymptomState::Symptomatic, p, Antibiotic::Cro);
        for _ in 0..100 {
            let w = m
                .cascade
                .walk(Destination::Node(gate), &m.parameters, 10.0, &mut rng)
                .unwrap();
            assert_eq!(w.nodes[1], cro);
        }
    }
}

#[test]
fn perfect_test_never_gives_cip_to_cip_resistant_case() {
    let m = model(&perfect_tests(1.0), 6);
    let mut rng = StdRng::seed_from_u64(6);
    for p in ResistanceProfile::ALL.into_iter().filter(|p| p.is_resistant_to(Antibiotic::Cip)) {
        for s in SymptomState::ALL {
            let cip_outcome = m.cascade.treatment_outcome(s, p, Antibiotic::Cip);
            let node = m.cascade.node(cip_outcome);
            // CIP is ineffective here: the profile is unchanged
            assert!(node.is_counter());

            let gate = m.cascade.rapid_test_gate(s, p);
            for _ in 0..200 {
                let w = m
                    .cascade
                    .walk(Destination::Node(gate), &m.parameters, 10.0, &mut rng)
                    .unwrap();
                assert!(!w.visited(cip_outcome));
                assert!(!w.visited(m.cascade.count_success(Antibiotic::Cip)));
            }
        }
    }
}

#[test]
fn failed_cases_with_cro_resistance_go_to_reserve_drug() {
    let m = model(&ModelSettings::default(), 8);
    let f = m.compartments.awaiting(SymptomState::Symptomatic, ResistanceProfile::CipTetCro);
    let event = &m.compartments.get(f).events[0];
    assert_eq!(event.destination, Destination::Node(m.cascade.count_reserve));
}

// ── Calibration ────────────────────────────────────────────────────────

#[test]
fn projection_builds_carry_no_feasible_ranges() {
    for reserve in [false, true] {
        let m = model(&ModelSettings::projection(reserve), 1);
        let out = &m.outputs;
        for id in [
            out.ratio.prevalence,
            out.ratio.gonorrhea_rate,
            out.ratio.perc_symptomatic,
            out.ratio.perc_cro_ns,
        ] {
            let series = out.ratio_series(id);
            assert!(series.feasible.is_none(), "{}: {:?}", series.name, series.feasible);
            assert!(series.targets.is_empty(), "{}", series.name);
        }
    }
}

#[test]
fn calibration_builds_carry_feasible_ranges() {
    let m = model(&ModelSettings::calibration(), 1);
    let out = &m.outputs;
    for id in [out.ratio.prevalence, out.ratio.gonorrhea_rate, out.ratio.perc_symptomatic] {
        assert!(out.ratio_series(id).feasible.is_some());
    }
    let cro = out.ratio_series(out.ratio.perc_cro_ns);
    assert_eq!(cro.feasible.and_then(|f| f.min_threshold_to_hit), Some(0.05));
}

// ── Determinism ────────────────────────────────────────────────────────

#[test]
fn same_seed_same_model() {
    let settings = perfect_tests(0.75);
    let a = model(&settings, 42);
    let b = model(&settings, 42);
    assert_eq!(a.initial_sizes().unwrap(), b.initial_sizes().unwrap());
    assert_eq!(
        a.chance_node_probabilities(3.0).unwrap(),
        b.chance_node_probabilities(3.0).unwrap()
    );
    let c = model(&settings, 43);
    assert_ne!(
        a.parameters.value_of(ParamId::Transmission, 0.0).unwrap(),
        c.parameters.value_of(ParamId::Transmission, 0.0).unwrap()
    );
}

// ── Policy ─────────────────────────────────────────────────────────────

#[test]
fn reserve_drug_ratchet() {
    let m = model(&ModelSettings::projection(true), 9);
    let mut state = m.policy.initial_state();
    state = m.policy.step(&state, Some(m.settings.switch_threshold));
    assert_eq!(state.active(), Some(Intervention::FirstLineReserve));
    state = m.policy.step(&state, Some(0.0));
    assert_eq!(state.active(), Some(Intervention::FirstLineReserve));
}
