//! gonoamr Headless Model Harness
//!
//! Builds the model for every scenario and validates the graph without a
//! simulation engine. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p gonoamr-simtest
//!   cargo run -p gonoamr-simtest -- --verbose
//!   cargo run -p gonoamr-simtest -- --json --seeds 20
//!
//! Set `RUST_LOG=debug` for build logs.

use gonoamr_logic::calibration::CalibrationTarget;
use gonoamr_logic::cascade::Destination;
use gonoamr_logic::indexer::Indexer;
use gonoamr_logic::params::POP_SIZE;
use gonoamr_logic::policy::Intervention;
use gonoamr_logic::routing::{route, verify_routing_table};
use gonoamr_logic::scenarios::{scenario_name, sensitivity_scenarios};
use gonoamr_logic::settings::ModelSettings;
use gonoamr_logic::taxonomy::{Antibiotic, ResistanceProfile, SymptomState, TreatmentOutcome};
use gonoamr_logic::{build_model, GonoModel};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

struct Options {
    verbose: bool,
    json: bool,
    seeds: u64,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let seeds = args
        .iter()
        .position(|a| a == "--seeds")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    Options {
        verbose: args.iter().any(|a| a == "--verbose"),
        json: args.iter().any(|a| a == "--json"),
        seeds,
    }
}

fn main() {
    env_logger::init();
    let opts = parse_args();
    if !opts.json {
        println!("=== gonoamr Model Harness ===\n");
    }

    let mut results = Vec::new();

    // 1. Outcome routing
    results.extend(validate_routing(&opts));

    // 2. Index bijection
    results.extend(validate_indexers(&opts));

    // 3. Every scenario builds
    results.extend(validate_scenarios(&opts));

    // 4. Case walks through the cascade
    results.extend(validate_case_walks(&opts));

    // 5. Drug switching policy
    results.extend(validate_policy(&opts));

    // 6. Calibration bindings
    results.extend(validate_calibration(&opts));

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    for r in results.iter().filter(|r| !r.passed) {
        log::warn!("check failed: {}: {}", r.name, r.detail);
    }
    log::info!("harness finished: {passed} passed, {failed} failed");

    if opts.json {
        match serde_json::to_string_pretty(&results) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("could not serialize results: {e}"),
        }
    } else {
        println!();
        for r in &results {
            let icon = if r.passed { "✓" } else { "✗" };
            if !r.passed || opts.verbose {
                println!("  {} {}: {}", icon, r.name, r.detail);
            }
        }
        println!(
            "\n=== RESULT: {}/{} passed, {} failed ===",
            passed,
            results.len(),
            failed
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn section(opts: &Options, title: &str) {
    if !opts.json {
        println!("--- {title} ---");
    }
}

// ── 1. Routing ──────────────────────────────────────────────────────────

fn validate_routing(opts: &Options) -> Vec<TestResult> {
    section(opts, "Outcome Routing");
    let mut results = Vec::new();

    results.push(match verify_routing_table() {
        Ok(()) => TestResult::new("routing_table_exhaustive", true, "24 entries verified"),
        Err(e) => TestResult::new("routing_table_exhaustive", false, e.to_string()),
    });

    let mut ineffective = 0;
    let mut bad = Vec::new();
    for p in ResistanceProfile::ALL {
        for a in Antibiotic::ALL {
            let (next, outcome) = route(p, a);
            match outcome {
                TreatmentOutcome::Ineffective => {
                    ineffective += 1;
                    if next != p || !p.is_resistant_to(a) {
                        bad.push(format!("{p}/{a}"));
                    }
                }
                _ => {
                    if !next.is_strictly_more_resistant_than(p) {
                        bad.push(format!("{p}/{a}"));
                    }
                }
            }
        }
    }
    results.push(TestResult::new(
        "routing_escalates_only",
        bad.is_empty(),
        if bad.is_empty() {
            format!("{ineffective} ineffective, {} resistance entries", 24 - ineffective)
        } else {
            format!("bad entries: {}", bad.join("; "))
        },
    ));
    results
}

// ── 2. Indexers ─────────────────────────────────────────────────────────

fn validate_indexers(opts: &Options) -> Vec<TestResult> {
    section(opts, "Indexers");
    let mut results = Vec::new();
    for (name, indexer) in [
        ("sp", Indexer::symptom_profile()),
        ("spa", Indexer::symptom_profile_antibiotic()),
    ] {
        let failures = (0..indexer.len())
            .filter(|i| {
                indexer
                    .key(*i)
                    .and_then(|k| indexer.index(k))
                    .map_or(true, |j| j != *i)
            })
            .count();
        let out_of_range = indexer.key(indexer.len()).is_err();
        results.push(TestResult::new(
            format!("indexer_{name}_round_trip"),
            failures == 0 && out_of_range,
            format!("{} slots, {} failures", indexer.len(), failures),
        ));
    }
    results
}

// ── 3. Scenarios ────────────────────────────────────────────────────────

fn check_model(model: &GonoModel) -> Result<String, String> {
    let sizes = model.initial_sizes().map_err(|e| e.to_string())?;
    let total: f64 = sizes.iter().sum();
    if ((total - POP_SIZE) / POP_SIZE).abs() > 1e-9 {
        return Err(format!("initial sizes sum to {total}"));
    }
    for t in [0.0, model.settings.end_of_warm_up, model.settings.sim_duration] {
        model
            .chance_node_probabilities(t)
            .map_err(|e| format!("t={t}: {e}"))?;
    }
    let nodes = model.cascade.nodes().len();
    for c in model.compartments.iter() {
        for d in c.event_destinations() {
            let resolved = match d {
                Destination::Compartment(id) => id.0 < model.compartments.len(),
                Destination::Node(id) => id.0 < nodes,
            };
            if !resolved {
                return Err(format!("{}: event destination {d:?} does not resolve", c.name));
            }
        }
    }
    let scalars = model
        .parameters
        .graph()
        .scalar_values(model.settings.end_of_warm_up)
        .map_err(|e| e.to_string())?;
    if let Some((name, v)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
        return Err(format!("parameter {name} = {v}"));
    }
    Ok(format!(
        "{} compartments, {} nodes, {} scalar parameters",
        model.compartments.len(),
        nodes,
        scalars.len()
    ))
}

fn validate_scenarios(opts: &Options) -> Vec<TestResult> {
    section(opts, "Scenario Builds");
    let mut results = Vec::new();

    for reserve in [false, true] {
        let base = ModelSettings::projection(reserve);
        let run = scenario_name(reserve, Some(base.sim_duration), None, false, true);
        let mut built = 0;
        let mut failures = Vec::new();
        for sc in sensitivity_scenarios(true, true) {
            let settings = sc.apply(&base);
            for seed in 0..opts.seeds {
                match build_model(&settings, seed).map_err(|e| e.to_string()).and_then(|m| check_model(&m)) {
                    Ok(detail) => {
                        built += 1;
                        if opts.verbose && seed == 0 && !opts.json {
                            println!("    {} | {}: {detail}", run, sc.name);
                        }
                    }
                    Err(e) => failures.push(format!("{} seed {seed}: {e}", sc.name)),
                }
            }
        }
        results.push(TestResult::new(
            format!("scenarios_build[{run}]"),
            failures.is_empty(),
            if failures.is_empty() {
                format!("{built} models built and checked")
            } else {
                failures.join("; ")
            },
        ));
    }

    // Same seed, same model
    let settings = ModelSettings::projection(true);
    let same = match (build_model(&settings, 7), build_model(&settings, 7)) {
        (Ok(a), Ok(b)) => {
            a.initial_sizes().ok() == b.initial_sizes().ok()
                && a.chance_node_probabilities(2.0).ok() == b.chance_node_probabilities(2.0).ok()
        }
        _ => false,
    };
    results.push(TestResult::new(
        "build_deterministic",
        same,
        "identical sizes and branch probabilities for seed 7",
    ));
    results
}

// ── 4. Case walks ───────────────────────────────────────────────────────

fn validate_case_walks(opts: &Options) -> Vec<TestResult> {
    section(opts, "Case Walks");
    let mut results = Vec::new();
    let walks = 1000;

    // No rapid testing: every care-seeker gets CRO.
    let no_test = ModelSettings::projection(true).with_rapid_test(1.0, 1.0, 1.0, 1.0, 0.0, 1.0);
    results.push(match build_model(&no_test, 11) {
        Ok(model) => {
            let mut rng = StdRng::seed_from_u64(11);
            let c = &model.cascade;
            let mut to_cro = 0;
            for i in 0..walks {
                let p = ResistanceProfile::ALL[i % ResistanceProfile::COUNT];
                let gate = Destination::Node(c.rapid_test_gate(SymptomState::Symptomatic, p));
                if let Ok(w) = c.walk(gate, &model.parameters, 5.0, &mut rng) {
                    if w.visited(c.treatment_outcome(SymptomState::Symptomatic, p, Antibiotic::Cro)) {
                        to_cro += 1;
                    }
                }
            }
            TestResult::new(
                "coverage_zero_all_cro",
                to_cro == walks,
                format!("{to_cro}/{walks} symptomatic care-seekers treated with CRO"),
            )
        }
        Err(e) => TestResult::new("coverage_zero_all_cro", false, e.to_string()),
    });

    // Perfect tests: a CIP-resistant case is never given CIP.
    let perfect = ModelSettings::projection(true).with_rapid_test(1.0, 1.0, 1.0, 1.0, 1.0, 1.0);
    results.push(match build_model(&perfect, 12) {
        Ok(model) => {
            let mut rng = StdRng::seed_from_u64(12);
            let c = &model.cascade;
            let mut given_cip = 0;
            for i in 0..walks {
                let s = SymptomState::ALL[i % 2];
                let gate = Destination::Node(c.rapid_test_gate(s, ResistanceProfile::Cip));
                if let Ok(w) = c.walk(gate, &model.parameters, 5.0, &mut rng) {
                    if w.visited(c.treatment_outcome(s, ResistanceProfile::Cip, Antibiotic::Cip)) {
                        given_cip += 1;
                    }
                }
            }
            TestResult::new(
                "perfect_test_avoids_cip",
                given_cip == 0,
                format!("{given_cip}/{walks} CIP-NS cases treated with CIP"),
            )
        }
        Err(e) => TestResult::new("perfect_test_avoids_cip", false, e.to_string()),
    });
    results
}

// ── 5. Policy ───────────────────────────────────────────────────────────

fn validate_policy(opts: &Options) -> Vec<TestResult> {
    section(opts, "Drug Switching");
    let mut results = Vec::new();

    for reserve in [false, true] {
        let name = format!("policy_ratchet[{}]", scenario_name(reserve, None, None, false, false));
        match build_model(&ModelSettings::projection(reserve), 3) {
            Ok(model) => {
                let policy = &model.policy;
                let mut state = policy.initial_state();
                let trace = [None, Some(0.01), Some(0.08), Some(0.0), Some(0.02), Some(0.5)];
                let mut actives = Vec::new();
                for v in trace {
                    state = policy.step(&state, v);
                    actives.push(state.active());
                }
                let one_active = actives.iter().all(|a| a.is_some());
                let expected_last = if reserve {
                    Intervention::FirstLineReserve
                } else {
                    Intervention::FirstLineCro
                };
                let ratchet = actives[3..].iter().all(|a| *a == Some(expected_last));
                results.push(TestResult::new(
                    name,
                    one_active && ratchet,
                    format!("{actives:?}"),
                ));
            }
            Err(e) => results.push(TestResult::new(name, false, e.to_string())),
        }
    }
    results
}

// ── 6. Calibration ──────────────────────────────────────────────────────

fn validate_calibration(opts: &Options) -> Vec<TestResult> {
    section(opts, "Calibration");
    let mut results = Vec::new();
    match build_model(&ModelSettings::calibration(), 0) {
        Ok(model) => {
            let out = &model.outputs;
            for id in [out.ratio.prevalence, out.ratio.gonorrhea_rate, out.ratio.perc_symptomatic] {
                let series = out.ratio_series(id);
                let observed = series
                    .targets
                    .iter()
                    .filter(|t| matches!(t, CalibrationTarget::Observed { .. }))
                    .count();
                results.push(TestResult::new(
                    format!("targets[{}]", series.name),
                    series.feasible.is_some() && observed == series.targets.len().saturating_sub(1),
                    format!("{observed}/{} periods observed", series.targets.len()),
                ));
            }
            let cro = out.ratio_series(out.ratio.perc_cro_ns);
            results.push(TestResult::new(
                "cro_ns_threshold_to_hit",
                cro.feasible.and_then(|f| f.min_threshold_to_hit) == Some(0.05),
                "CRO-NS must reach 5%",
            ));
        }
        Err(e) => results.push(TestResult::new("calibration_build", false, e.to_string())),
    }

    // Projections are never filtered by calibration ranges.
    for reserve in [false, true] {
        let name = format!("projection_unfiltered[M={reserve}]");
        results.push(match build_model(&ModelSettings::projection(reserve), 0) {
            Ok(model) => {
                let filtered: Vec<_> = model
                    .outputs
                    .ratios()
                    .iter()
                    .filter(|s| s.feasible.is_some() || !s.targets.is_empty())
                    .map(|s| s.name.clone())
                    .collect();
                TestResult::new(
                    name,
                    filtered.is_empty(),
                    if filtered.is_empty() {
                        "no feasible ranges or targets".to_string()
                    } else {
                        format!("filtered series: {}", filtered.join(", "))
                    },
                )
            }
            Err(e) => TestResult::new(name, false, e.to_string()),
        });
    }
    results
}
