//! Model settings: the record a model build is constructed from.
//!
//! Settings are read once at construction time and never consulted by the
//! simulation engine afterwards. Two presets mirror how the model is used:
//!
//! - [`ModelSettings::calibration`]: runs to the end of the calibration
//!   window, no rapid testing, calibration targets attached.
//! - [`ModelSettings::projection`]: full horizon with rapid testing.
//!
//! ```
//! use gonoamr_logic::settings::{validate_settings, ModelSettings};
//!
//! let settings = ModelSettings::projection(true).with_rapid_test(0.98, 0.98, 0.85, 0.96, 0.75, 1.0);
//! assert!(validate_settings(&settings).is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::taxonomy::Antibiotic;

/// Simulation horizon in years.
pub const SIM_DURATION: f64 = 25.0;
/// End of the epidemic warm-up period (years).
pub const END_OF_WARM_UP: f64 = 1.0;
/// End of the calibration window (years).
pub const END_OF_CALIBRATION: f64 = 15.0;
/// Default rapid-test coverage in projection scenarios.
pub const RAPID_TEST_COVERAGE: f64 = 0.75;
/// Default surveilled CRO-NS threshold for switching first-line therapy.
pub const SWITCH_THRESHOLD: f64 = 0.05;
/// Widening factor applied to uniform priors when `wider_priors` is set.
pub const WIDER_PRIOR_FACTOR: f64 = 1.5;

/// Whether the build is for calibration or for projecting scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Calibration,
    Projection,
}

/// How the initial shares of non-susceptible profiles are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileSharePrior {
    /// Joint Dirichlet prior; shares always sum to at most 1.
    Dirichlet,
    /// Independent bounded priors; draws summing above 1 fail the build.
    Independent,
}

/// Sensitivity/specificity of a rapid susceptibility test.
/// `None` means "draw from the default Beta prior".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestAccuracy {
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl TestAccuracy {
    pub fn fixed(sensitivity: f64, specificity: f64) -> Self {
        Self {
            sensitivity: Some(sensitivity),
            specificity: Some(specificity),
        }
    }
}

/// Settings record for one model build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub mode: RunMode,
    /// Engine time step (years).
    pub delta_t: f64,
    /// Simulation horizon (years).
    pub sim_duration: f64,
    pub end_of_warm_up: f64,
    /// Period of simulation outputs (years).
    pub output_period: f64,
    /// Period of surveillance observations (years).
    pub observation_period: f64,
    pub cip_test: TestAccuracy,
    pub tet_test: TestAccuracy,
    /// Probability that a care-seeker receives a rapid test after warm-up.
    pub rapid_test_coverage: f64,
    /// Probability of CIP (vs TET) when testing susceptible to both.
    pub prob_cip_if_susceptible_to_both: f64,
    /// Multiplier on the transmission parameter.
    pub transmission_factor: f64,
    /// Whether drug M can replace CRO as first-line therapy.
    pub reserve_drug_available: bool,
    pub switch_threshold: f64,
    pub wider_priors: bool,
    pub profile_share_prior: ProfileSharePrior,
    /// Ask the engine to keep prevalence/incidence histories of every
    /// compartment and chance node.
    pub collect_compartment_trajectories: bool,
    pub calibration_seed: Option<u64>,
    /// Number of periods the last observed calibration target is repeated for.
    pub periods_to_hold_constant: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            mode: RunMode::Projection,
            delta_t: 7.0 / 364.0,
            sim_duration: SIM_DURATION,
            end_of_warm_up: END_OF_WARM_UP,
            output_period: 1.0,
            observation_period: 1.0,
            cip_test: TestAccuracy::default(),
            tet_test: TestAccuracy::default(),
            rapid_test_coverage: 1.0,
            prob_cip_if_susceptible_to_both: 0.5,
            transmission_factor: 1.0,
            reserve_drug_available: false,
            switch_threshold: SWITCH_THRESHOLD,
            wider_priors: false,
            profile_share_prior: ProfileSharePrior::Dirichlet,
            collect_compartment_trajectories: true,
            calibration_seed: None,
            periods_to_hold_constant: 5,
        }
    }
}

impl ModelSettings {
    /// Settings for calibrating the model.
    pub fn calibration() -> Self {
        Self {
            mode: RunMode::Calibration,
            sim_duration: END_OF_CALIBRATION,
            rapid_test_coverage: 0.0,
            collect_compartment_trajectories: false,
            reserve_drug_available: true,
            ..Self::default()
        }
    }

    /// Settings for projecting scenarios.
    pub fn projection(reserve_drug_available: bool) -> Self {
        Self {
            reserve_drug_available,
            ..Self::default()
        }
    }

    /// Update the rapid-test characteristics, coverage, and transmission factor.
    pub fn with_rapid_test(
        mut self,
        cip_sens: f64,
        cip_spec: f64,
        tet_sens: f64,
        tet_spec: f64,
        coverage: f64,
        transmission_factor: f64,
    ) -> Self {
        self.cip_test = TestAccuracy::fixed(cip_sens, cip_spec);
        self.tet_test = TestAccuracy::fixed(tet_sens, tet_spec);
        self.rapid_test_coverage = coverage;
        self.transmission_factor = transmission_factor;
        self
    }

    pub fn is_calibrating(&self) -> bool {
        self.mode == RunMode::Calibration
    }

    /// Test characteristics for a drug with a rapid test.
    pub fn test_accuracy(&self, antibiotic: Antibiotic) -> Option<&TestAccuracy> {
        match antibiotic {
            Antibiotic::Cip => Some(&self.cip_test),
            Antibiotic::Tet => Some(&self.tet_test),
            Antibiotic::Cro => None,
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: ModelSettings = serde_json::from_str(json)?;
        settings.validated()
    }

    /// Return `self` if it passes [`validate_settings`].
    pub fn validated(self) -> Result<Self> {
        let reasons = validate_settings(&self);
        if reasons.is_empty() {
            Ok(self)
        } else {
            Err(ModelError::InvalidSettings { reasons })
        }
    }
}

fn check_probability(errors: &mut Vec<String>, name: &str, v: f64) {
    if !(0.0..=1.0).contains(&v) {
        errors.push(format!("{name} must be in [0, 1], got {v}"));
    }
}

/// Validate settings. Returns a list of problems (empty = valid).
pub fn validate_settings(s: &ModelSettings) -> Vec<String> {
    let mut errors = Vec::new();

    if s.delta_t <= 0.0 {
        errors.push("delta_t must be positive".into());
    }
    if s.sim_duration <= 0.0 {
        errors.push("sim_duration must be positive".into());
    }
    if s.end_of_warm_up < 0.0 || s.end_of_warm_up >= s.sim_duration {
        errors.push(format!(
            "end_of_warm_up must be in [0, sim_duration), got {}",
            s.end_of_warm_up
        ));
    }
    if s.output_period <= 0.0 || s.observation_period <= 0.0 {
        errors.push("output and observation periods must be positive".into());
    }

    for (name, acc) in [("CIP", &s.cip_test), ("TET", &s.tet_test)] {
        if let Some(v) = acc.sensitivity {
            check_probability(&mut errors, &format!("{name} sensitivity"), v);
        }
        if let Some(v) = acc.specificity {
            check_probability(&mut errors, &format!("{name} specificity"), v);
        }
    }
    check_probability(&mut errors, "rapid_test_coverage", s.rapid_test_coverage);
    check_probability(
        &mut errors,
        "prob_cip_if_susceptible_to_both",
        s.prob_cip_if_susceptible_to_both,
    );
    check_probability(&mut errors, "switch_threshold", s.switch_threshold);

    if s.transmission_factor <= 0.0 {
        errors.push("transmission_factor must be positive".into());
    }
    if s.periods_to_hold_constant == 0 {
        errors.push("periods_to_hold_constant must be at least 1".into());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(validate_settings(&ModelSettings::default()).is_empty());
        assert!(validate_settings(&ModelSettings::calibration()).is_empty());
        assert!(validate_settings(&ModelSettings::projection(false)).is_empty());
    }

    #[test]
    fn test_calibration_preset() {
        let s = ModelSettings::calibration();
        assert!(s.is_calibrating());
        assert_eq!(s.sim_duration, END_OF_CALIBRATION);
        assert_eq!(s.rapid_test_coverage, 0.0);
    }

    #[test]
    fn test_invalid_values_reported() {
        let mut s = ModelSettings::default().with_rapid_test(1.2, 0.9, 0.8, 0.9, -0.1, 0.0);
        s.end_of_warm_up = 30.0;
        let errors = validate_settings(&s);
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(matches!(
            s.validated(),
            Err(ModelError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let s = ModelSettings::from_json(r#"{"rapid_test_coverage": 0.5, "reserve_drug_available": true}"#)
            .unwrap();
        assert_eq!(s.rapid_test_coverage, 0.5);
        assert!(s.reserve_drug_available);
        assert_eq!(s.sim_duration, SIM_DURATION);
        assert!(ModelSettings::from_json("{not json").is_err());
    }

    #[test]
    fn test_test_accuracy_lookup() {
        let s = ModelSettings::default().with_rapid_test(0.9, 0.95, 0.8, 0.85, 1.0, 1.0);
        assert_eq!(s.test_accuracy(Antibiotic::Cip).unwrap().sensitivity, Some(0.9));
        assert_eq!(s.test_accuracy(Antibiotic::Tet).unwrap().specificity, Some(0.85));
        assert!(s.test_accuracy(Antibiotic::Cro).is_none());
    }
}
