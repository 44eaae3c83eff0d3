//! Scenario catalogue for rapid-test analyses.
//!
//! Every scenario sets the CIP/TET test characteristics, rapid-test
//! coverage and transmission factor. A characteristic left as `None` is
//! drawn from its default Beta prior.

use serde::{Deserialize, Serialize};

use crate::settings::{ModelSettings, TestAccuracy};

pub const COVERAGE_VALUES: [f64; 3] = [0.5, 0.75, 1.0];
pub const TRANSMISSION_FACTOR_VALUES: [f64; 3] = [0.98, 1.0, 1.02];
pub const CIP_SENS_VALUES: [f64; 3] = [0.5, 0.75, 1.0];
pub const CIP_SPEC_VALUES: [f64; 3] = [0.9, 0.95, 1.0];
pub const TET_SENS_VALUES: [f64; 3] = [0.5, 0.75, 1.0];
pub const TET_SPEC_VALUES: [f64; 3] = [0.9, 0.95, 1.0];

pub const STATUS_QUO: &str = "Status quo (no rapid test)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    pub cip_test: TestAccuracy,
    pub tet_test: TestAccuracy,
    pub coverage: f64,
    pub transmission_factor: f64,
}

impl ScenarioDefinition {
    pub fn status_quo() -> Self {
        Self {
            name: STATUS_QUO.into(),
            cip_test: TestAccuracy::fixed(0.0, 1.0),
            tet_test: TestAccuracy::fixed(0.0, 1.0),
            coverage: 0.0,
            transmission_factor: 1.0,
        }
    }

    pub fn new(cip_test: TestAccuracy, tet_test: TestAccuracy, coverage: f64, transmission_factor: f64) -> Self {
        Self {
            name: analysis_name(&cip_test, &tet_test, coverage, transmission_factor),
            cip_test,
            tet_test,
            coverage,
            transmission_factor,
        }
    }

    /// `base` with this scenario's test characteristics, coverage and factor.
    pub fn apply(&self, base: &ModelSettings) -> ModelSettings {
        ModelSettings {
            cip_test: self.cip_test,
            tet_test: self.tet_test,
            rapid_test_coverage: self.coverage,
            transmission_factor: self.transmission_factor,
            ..base.clone()
        }
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "None".to_string(), |v| format!("{v:.3}"))
}

/// Name of a scenario, e.g. `p=(None, 0.750), q=(None, 0.950), c=0.500, f=1.00)`.
pub fn analysis_name(cip: &TestAccuracy, tet: &TestAccuracy, coverage: f64, transmission_factor: f64) -> String {
    format!(
        "p=({}, {}), q=({}, {}), c={coverage:.3}, f={transmission_factor:.2})",
        fmt_opt(cip.sensitivity),
        fmt_opt(tet.sensitivity),
        fmt_opt(cip.specificity),
        fmt_opt(tet.specificity),
    )
}

/// Status quo, then the coverage sweep (crossed with transmission factors
/// when `vary_transmission_factor`), then optional TET and CIP sens/spec sweeps.
pub fn sensitivity_scenarios(vary_sens_spec: bool, vary_transmission_factor: bool) -> Vec<ScenarioDefinition> {
    let prior = TestAccuracy::default();
    let mut out = vec![ScenarioDefinition::status_quo()];

    let factors: &[f64] = if vary_transmission_factor {
        &TRANSMISSION_FACTOR_VALUES
    } else {
        &[1.0]
    };
    for f in factors {
        for cov in COVERAGE_VALUES {
            out.push(ScenarioDefinition::new(prior, prior, cov, *f));
        }
    }

    if vary_sens_spec {
        for cov in COVERAGE_VALUES {
            for sens in TET_SENS_VALUES.iter().rev() {
                for spec in TET_SPEC_VALUES {
                    out.push(ScenarioDefinition::new(prior, TestAccuracy::fixed(*sens, spec), cov, 1.0));
                }
            }
        }
        for cov in COVERAGE_VALUES {
            for sens in CIP_SENS_VALUES.iter().rev() {
                for spec in CIP_SPEC_VALUES {
                    out.push(ScenarioDefinition::new(TestAccuracy::fixed(*sens, spec), prior, cov, 1.0));
                }
            }
        }
    }
    out
}

/// Name of a simulation run, used for output folders.
pub fn scenario_name(
    reserve_drug_available: bool,
    sim_duration: Option<f64>,
    calibration_seed: Option<u64>,
    wider_priors: bool,
    varying_transmission_factor: bool,
) -> String {
    let mut name = String::from(if reserve_drug_available { "with M" } else { "no M" });
    if let Some(d) = sim_duration {
        name.push_str(&format!("-{d}yrs"));
    }
    if let Some(seed) = calibration_seed {
        name.push_str(&format!("-seed{seed}"));
    }
    if wider_priors {
        name.push_str("-wider priors");
    }
    if varying_transmission_factor {
        name.push_str("-varying f");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::validate_settings;

    #[test]
    fn test_catalogue_sizes() {
        assert_eq!(sensitivity_scenarios(false, false).len(), 4);
        assert_eq!(sensitivity_scenarios(false, true).len(), 10);
        assert_eq!(sensitivity_scenarios(true, false).len(), 4 + 27 + 27);
    }

    #[test]
    fn test_names() {
        let s = sensitivity_scenarios(false, false);
        assert_eq!(s[0].name, STATUS_QUO);
        assert_eq!(s[1].name, "p=(None, None), q=(None, None), c=0.500, f=1.00)");
        let t = ScenarioDefinition::new(TestAccuracy::default(), TestAccuracy::fixed(1.0, 0.9), 0.75, 1.0);
        assert_eq!(t.name, "p=(None, 1.000), q=(None, 0.900), c=0.750, f=1.00)");
    }

    #[test]
    fn test_scenario_run_name() {
        assert_eq!(scenario_name(true, None, None, false, false), "with M");
        assert_eq!(
            scenario_name(false, Some(25.0), Some(3), true, true),
            "no M-25yrs-seed3-wider priors-varying f"
        );
    }

    #[test]
    fn test_apply_keeps_base() {
        let base = ModelSettings::projection(true);
        for sc in sensitivity_scenarios(true, true) {
            let s = sc.apply(&base);
            assert!(s.reserve_drug_available);
            assert_eq!(s.rapid_test_coverage, sc.coverage);
            assert!(validate_settings(&s).is_empty(), "{}", sc.name);
        }
    }
}
