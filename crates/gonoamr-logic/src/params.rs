//! Model parameters: priors and derived quantities of the gonorrhea model.
//!
//! [`Parameters::build`] registers every parameter in dependency order:
//! structural constants, rapid-test characteristics, population, initial
//! shares, transmission and fitness, resistance emergence, time-to-event
//! priors, then the derived rates and compartment sizes.

use std::fmt;

use rand::Rng;

use crate::error::Result;
use crate::graph::{Derived, ParamGraph, ParamRef};
use crate::priors::Prior;
use crate::settings::{ModelSettings, ProfileSharePrior};
use crate::taxonomy::{Antibiotic, ResistanceProfile, SymptomState};

/// Population size of the modeled population.
pub const POP_SIZE: f64 = 2.78 * 10e6;
/// Number of isolates surveyed per year for resistance surveillance.
pub const ANNUAL_SURVEY_SIZE: f64 = 1500.0;
/// Dirichlet concentrations of the initial share of cases by profile
/// (`ResistanceProfile` order).
pub const PROFILE_SHARE_CONCENTRATIONS: [f64; ResistanceProfile::COUNT] =
    [55.0, 2.0, 270.0, 0.0, 170.0, 0.0, 0.0, 0.0];

/// (mean, st_dev) of the Beta priors used when test accuracy is not fixed.
pub const CIP_SENS_DIST: (f64, f64) = (0.98, 0.01);
pub const CIP_SPEC_DIST: (f64, f64) = (0.98, 0.01);
pub const TET_SENS_DIST: (f64, f64) = (0.855, 0.014);
pub const TET_SPEC_DIST: (f64, f64) = (0.965, 0.008);

const ONE_OVER_364: f64 = 1.0 / 364.0;

/// Identifier of every model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    Zero,
    One,
    // rapid test
    Sensitivity(Antibiotic),
    Specificity(Antibiotic),
    /// Probability the rapid test for a drug reports "susceptible".
    PositiveTest(Antibiotic, ResistanceProfile),
    ProbRapidTest,
    ProbTxCipIfSusceptibleToBoth,
    // population
    PopSize,
    AnnualSurveySize,
    ObservationPeriod,
    SurveySize,
    PrevI0,
    PrevS,
    ShareBySymptom(SymptomState),
    ProfileShareJoint,
    ProfileShare(ResistanceProfile),
    // transmission
    Transmission,
    TransmissionFactor,
    AdjustedTransmission,
    FitnessMin(ResistanceProfile),
    FitnessSlope(ResistanceProfile),
    FitnessMidpoint(ResistanceProfile),
    FitnessMax,
    RelativeFitness(ResistanceProfile),
    Infectivity(ResistanceProfile),
    // resistance emergence
    EmergenceExponent(Antibiotic),
    ProbEmergence(Antibiotic),
    // natural history and care seeking
    ProbSymptomatic,
    TimeToNaturalRecovery,
    TimeToScreening,
    TimeToTreatment,
    TimeToRetreatment,
    RateNaturalRecovery,
    RateScreening,
    RateTreatment,
    RateRetreatment,
    // compartment sizes
    SizeS,
    SizeI,
    SizeI0(SymptomState, ResistanceProfile),
}

impl ParamId {
    /// Display name used in parameter exports.
    pub fn name(&self) -> String {
        use ParamId::*;
        match self {
            Zero => "0".into(),
            One => "1".into(),
            Sensitivity(a) => format!("Sensitivity for {a}"),
            Specificity(a) => format!("Specificity for {a}"),
            PositiveTest(a, p) => format!("prob {a} test positive | {p}"),
            ProbRapidTest => "Prob of receiving a rapid test".into(),
            ProbTxCipIfSusceptibleToBoth => "Prob Tx-CIP if susceptible to CIP and TET".into(),
            PopSize => "Pop size".into(),
            AnnualSurveySize => "Annual survey size".into(),
            ObservationPeriod => "Observation period".into(),
            SurveySize => "Survey size (over observation periods)".into(),
            PrevI0 => "Initial prevalence".into(),
            PrevS => "Initial % Susceptible".into(),
            ShareBySymptom(s) => format!("Initial % I by symptom states-{}", *s as u8),
            ProfileShareJoint => "Dirichlet dist. of % I by resistance profile".into(),
            ProfileShare(p) => format!("Initial % I by resistance profile-{}", *p as u8),
            Transmission => "Transmission parameter".into(),
            TransmissionFactor => "Transmission factor".into(),
            AdjustedTransmission => "Adjusted transmission parameter".into(),
            FitnessMin(p) => format!("Fitness-f_min-{}", *p as u8),
            FitnessSlope(p) => format!("Fitness-b-{}", *p as u8),
            FitnessMidpoint(p) => format!("Fitness-t_mid-{}", *p as u8),
            FitnessMax => "Fitness-f_max".into(),
            RelativeFitness(p) => {
                format!("Relative infectivity by infectivity profile-{}", *p as u8)
            }
            Infectivity(p) => format!("Infectivity of {p}"),
            EmergenceExponent(a) => format!(
                "Exponent for the prob of resistance by antibiotics-{}",
                *a as u8
            ),
            ProbEmergence(a) => format!("Prob of resistance by antibiotics-{}", *a as u8),
            ProbSymptomatic => "Prob symptomatic".into(),
            TimeToNaturalRecovery => "Time until natural recovery".into(),
            TimeToScreening => "Time until screened".into(),
            TimeToTreatment => "Time until seeking treatment (symptomatic)".into(),
            TimeToRetreatment => "Time until seeking retreatment (symptomatic)".into(),
            RateNaturalRecovery => "Rate of natural recovery".into(),
            RateScreening => "Rate of screening".into(),
            RateTreatment => "Rate of seeking treatment".into(),
            RateRetreatment => "Rate of seeking retreatment".into(),
            SizeS => "Size of S".into(),
            SizeI => "Size of I".into(),
            SizeI0(s, p) => format!("Size of I | {}-{}", s.label(), p.label()),
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Bounds of the independent share priors (used with
/// [`ProfileSharePrior::Independent`]). Zero-width entries are pinned at 0.
fn independent_share_bounds(p: ResistanceProfile) -> (f64, f64) {
    match p {
        ResistanceProfile::Cip => (0.0, 0.02),
        ResistanceProfile::Tet => (0.4, 0.7),
        ResistanceProfile::CipTet => (0.2, 0.45),
        _ => (0.0, 0.0),
    }
}

/// The sampled parameter set of one trial.
#[derive(Debug, Clone)]
pub struct Parameters {
    graph: ParamGraph,
}

impl Parameters {
    /// Register every parameter for `settings`. Nothing is sampled yet.
    pub fn build(settings: &ModelSettings) -> Result<Self> {
        let mut g = ParamGraph::new();
        let widen = if settings.wider_priors {
            crate::settings::WIDER_PRIOR_FACTOR
        } else {
            1.0
        };
        let uniform =
            |min: f64, max: f64, floor: f64, ceil: f64| Prior::widened_uniform(min, max, widen, floor, ceil);

        g.add_constant(ParamId::Zero, 0.0)?;
        g.add_constant(ParamId::One, 1.0)?;

        // ── Rapid test characteristics ──
        let mut sens = Vec::new();
        let mut spec = Vec::new();
        for ab in Antibiotic::ALL {
            let Some(acc) = settings.test_accuracy(ab) else {
                continue;
            };
            let (sens_dist, spec_dist) = match ab {
                Antibiotic::Cip => (CIP_SENS_DIST, CIP_SPEC_DIST),
                _ => (TET_SENS_DIST, TET_SPEC_DIST),
            };
            sens.push((ab, g.add_prior(ParamId::Sensitivity(ab), accuracy_prior(acc.sensitivity, sens_dist))?));
            spec.push((ab, g.add_prior(ParamId::Specificity(ab), accuracy_prior(acc.specificity, spec_dist))?));
        }
        for ((ab, sens_ref), (_, spec_ref)) in sens.iter().zip(&spec) {
            for p in ResistanceProfile::ALL {
                let derived = if p.is_resistant_to(*ab) {
                    Derived::OneMinus(*spec_ref)
                } else {
                    Derived::Equal(*sens_ref)
                };
                g.add_derived(ParamId::PositiveTest(*ab, p), derived)?;
            }
        }

        g.add_step_wise(
            ParamId::ProbRapidTest,
            vec![settings.end_of_warm_up],
            vec![settings.rapid_test_coverage],
            0.0,
        )?;
        g.add_constant(
            ParamId::ProbTxCipIfSusceptibleToBoth,
            settings.prob_cip_if_susceptible_to_both,
        )?;

        // ── Population ──
        let pop = g.add_constant(ParamId::PopSize, POP_SIZE)?;
        let annual = g.add_constant(ParamId::AnnualSurveySize, ANNUAL_SURVEY_SIZE)?;
        let obs = g.add_constant(ParamId::ObservationPeriod, settings.observation_period)?;
        g.add_derived(ParamId::SurveySize, Derived::Product(vec![annual, obs]))?;

        let prev_i0 = g.add_prior(ParamId::PrevI0, uniform(0.03, 0.06, 0.0, 1.0))?;
        let prev_s = g.add_derived(ParamId::PrevS, Derived::OneMinus(prev_i0))?;

        let symp_share = g.add_prior(
            ParamId::ShareBySymptom(SymptomState::Symptomatic),
            uniform(0.0, 0.05, 0.0, 1.0),
        )?;
        let asym_share = g.add_derived(
            ParamId::ShareBySymptom(SymptomState::Asymptomatic),
            Derived::OneMinus(symp_share),
        )?;

        // ── Initial shares by resistance profile ──
        // The susceptible share is always the remainder of the others.
        let mut others = Vec::with_capacity(ResistanceProfile::NON_SUSCEPTIBLE.len());
        match settings.profile_share_prior {
            ProfileSharePrior::Dirichlet => {
                let joint = g.add_prior(
                    ParamId::ProfileShareJoint,
                    Prior::Dirichlet {
                        concentrations: PROFILE_SHARE_CONCENTRATIONS.to_vec(),
                    },
                )?;
                for p in ResistanceProfile::NON_SUSCEPTIBLE {
                    others.push(g.add_derived(
                        ParamId::ProfileShare(p),
                        Derived::Component {
                            source: joint,
                            index: p as usize,
                        },
                    )?);
                }
            }
            ProfileSharePrior::Independent => {
                for p in ResistanceProfile::NON_SUSCEPTIBLE {
                    let (lo, hi) = independent_share_bounds(p);
                    others.push(g.add_prior(ParamId::ProfileShare(p), uniform(lo, hi, 0.0, 1.0))?);
                }
            }
        }
        let sus_share = g.add_derived(
            ParamId::ProfileShare(ResistanceProfile::Susceptible),
            Derived::Remainder(others.clone()),
        )?;
        let mut profile_share = vec![sus_share];
        profile_share.extend(others);

        // ── Transmission and fitness ──
        let transm = g.add_prior(ParamId::Transmission, uniform(0.5, 3.0, 0.0, f64::INFINITY))?;
        let factor = g.add_constant(ParamId::TransmissionFactor, settings.transmission_factor)?;
        let transm = g.add_derived(
            ParamId::AdjustedTransmission,
            Derived::Product(vec![transm, factor]),
        )?;
        let f_max = g.add_constant(ParamId::FitnessMax, 1.0)?;
        for p in ResistanceProfile::ALL {
            let f_min = match p.resistance_count() {
                0 => g.add_constant(ParamId::FitnessMin(p), 1.0)?,
                1 => g.add_prior(ParamId::FitnessMin(p), uniform(0.9, 1.0, 0.0, 1.0))?,
                2 => g.add_prior(ParamId::FitnessMin(p), uniform(0.8, 1.0, 0.0, 1.0))?,
                _ => g.add_prior(ParamId::FitnessMin(p), uniform(0.7, 1.0, 0.0, 1.0))?,
            };
            let slope = g.add_prior(ParamId::FitnessSlope(p), uniform(0.1, 0.5, 0.0, f64::INFINITY))?;
            let mid = g.add_prior(ParamId::FitnessMidpoint(p), uniform(7.0, 13.0, 0.0, f64::INFINITY))?;
            let fitness = g.add_derived(
                ParamId::RelativeFitness(p),
                Derived::Logistic {
                    min: f_min,
                    max: f_max,
                    slope,
                    midpoint: mid,
                    t_start: 0.0,
                },
            )?;
            g.add_derived(
                ParamId::Infectivity(p),
                Derived::Product(vec![transm, fitness]),
            )?;
        }

        // ── Resistance emergence ──
        for ab in Antibiotic::ALL {
            let expon = g.add_prior(ParamId::EmergenceExponent(ab), uniform(-5.0, -3.0, -12.0, -1.0))?;
            g.add_derived(ParamId::ProbEmergence(ab), Derived::TenToPower(expon))?;
        }

        // ── Natural history and care seeking ──
        g.add_prior(ParamId::ProbSymptomatic, uniform(0.2, 0.8, 0.0, 1.0))?;
        let t_rec = g.add_prior(
            ParamId::TimeToNaturalRecovery,
            uniform(1.0 / 12.0, 5.0, ONE_OVER_364, f64::INFINITY),
        )?;
        let t_scr = g.add_prior(ParamId::TimeToScreening, uniform(0.5, 5.0, ONE_OVER_364, f64::INFINITY))?;
        let t_tx = g.add_prior(
            ParamId::TimeToTreatment,
            uniform(ONE_OVER_364, 14.0 * ONE_OVER_364, 0.5 * ONE_OVER_364, f64::INFINITY),
        )?;
        let t_retx = g.add_prior(
            ParamId::TimeToRetreatment,
            uniform(ONE_OVER_364, 14.0 * ONE_OVER_364, 0.5 * ONE_OVER_364, f64::INFINITY),
        )?;
        g.add_derived(ParamId::RateNaturalRecovery, Derived::Inverse(t_rec))?;
        g.add_derived(ParamId::RateScreening, Derived::Inverse(t_scr))?;
        g.add_derived(ParamId::RateTreatment, Derived::Inverse(t_tx))?;
        g.add_derived(ParamId::RateRetreatment, Derived::Inverse(t_retx))?;

        // ── Compartment sizes ──
        g.add_derived(ParamId::SizeS, Derived::Product(vec![pop, prev_s]))?;
        let size_i = g.add_derived(ParamId::SizeI, Derived::Product(vec![pop, prev_i0]))?;
        for s in SymptomState::ALL {
            let share = match s {
                SymptomState::Symptomatic => symp_share,
                SymptomState::Asymptomatic => asym_share,
            };
            for p in ResistanceProfile::ALL {
                g.add_derived(
                    ParamId::SizeI0(s, p),
                    Derived::Product(vec![size_i, share, profile_share[p as usize]]),
                )?;
            }
        }

        log::debug!("registered {} parameters", g.len());
        Ok(Self { graph: g })
    }

    /// Draw every prior from `rng`, then check the derived share invariant.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.graph.sample(rng)?;
        let sus = self.get(ParamId::ProfileShare(ResistanceProfile::Susceptible))?;
        if let Err(e) = self.graph.value(sus, 0.0) {
            log::warn!("rejected initial profile shares: {e}");
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: ParamId) -> Result<ParamRef> {
        self.graph.get(id)
    }

    /// Value of `r` at simulation time `t`.
    pub fn value(&self, r: ParamRef, t: f64) -> Result<f64> {
        self.graph.value(r, t)
    }

    /// Value of a parameter by id at simulation time `t`.
    pub fn value_of(&self, id: ParamId, t: f64) -> Result<f64> {
        self.graph.value(self.graph.get(id)?, t)
    }

    pub fn graph(&self) -> &ParamGraph {
        &self.graph
    }

    /// Initial profile shares in `ResistanceProfile` order.
    pub fn profile_shares(&self) -> Result<Vec<f64>> {
        ResistanceProfile::ALL
            .iter()
            .map(|p| self.value_of(ParamId::ProfileShare(*p), 0.0))
            .collect()
    }
}

fn accuracy_prior(fixed: Option<f64>, (mean, st_dev): (f64, f64)) -> Prior {
    match fixed {
        Some(v) => Prior::Constant(v),
        None => Prior::Beta {
            mean,
            st_dev,
            min: 0.0,
            max: 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sampled(settings: &ModelSettings, seed: u64) -> Parameters {
        let mut p = Parameters::build(settings).unwrap();
        p.sample(&mut StdRng::seed_from_u64(seed)).unwrap();
        p
    }

    #[test]
    fn test_rates_are_inverses() {
        let p = sampled(&ModelSettings::default(), 1);
        let t = p.value_of(ParamId::TimeToScreening, 0.0).unwrap();
        let r = p.value_of(ParamId::RateScreening, 0.0).unwrap();
        assert!((t * r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_emergence_probabilities_in_unit_interval() {
        for seed in 0..50 {
            let p = sampled(&ModelSettings::default(), seed);
            for ab in Antibiotic::ALL {
                let v = p.value_of(ParamId::ProbEmergence(ab), 0.0).unwrap();
                assert!(v > 0.0 && v < 1.0);
                assert!((1e-5..=1e-3).contains(&v), "v={v}");
            }
        }
    }

    #[test]
    fn test_positive_test_depends_on_true_status() {
        let s = ModelSettings::default().with_rapid_test(0.9, 0.8, 0.7, 0.6, 1.0, 1.0);
        let p = sampled(&s, 2);
        let v = |ab, prof| p.value_of(ParamId::PositiveTest(ab, prof), 0.0).unwrap();
        assert!((v(Antibiotic::Cip, ResistanceProfile::Susceptible) - 0.9).abs() < 1e-12);
        assert!((v(Antibiotic::Cip, ResistanceProfile::Cip) - 0.2).abs() < 1e-12);
        assert!((v(Antibiotic::Tet, ResistanceProfile::Cip) - 0.7).abs() < 1e-12);
        assert!((v(Antibiotic::Tet, ResistanceProfile::TetCro) - 0.4).abs() < 1e-12);
        assert!(p.get(ParamId::PositiveTest(Antibiotic::Cro, ResistanceProfile::Susceptible)).is_err());
    }

    #[test]
    fn test_profile_shares_sum_to_one() {
        for seed in 0..50 {
            let p = sampled(&ModelSettings::default(), seed);
            let shares = p.profile_shares().unwrap();
            assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(shares.iter().all(|v| (0.0..=1.0).contains(v)));
            assert_eq!(shares[ResistanceProfile::Cro as usize], 0.0);
        }
    }

    #[test]
    fn test_initial_sizes_partition_infected() {
        let p = sampled(&ModelSettings::default(), 5);
        let size_i = p.value_of(ParamId::SizeI, 0.0).unwrap();
        let mut total = 0.0;
        for s in SymptomState::ALL {
            for prof in ResistanceProfile::ALL {
                total += p.value_of(ParamId::SizeI0(s, prof), 0.0).unwrap();
            }
        }
        assert!((total - size_i).abs() / size_i < 1e-9);
        let size_s = p.value_of(ParamId::SizeS, 0.0).unwrap();
        assert!((size_s + size_i - POP_SIZE).abs() / POP_SIZE < 1e-9);
    }

    #[test]
    fn test_transmission_factor_scales_infectivity() {
        let base = sampled(&ModelSettings::default(), 9);
        let mut s = ModelSettings::default();
        s.transmission_factor = 1.02;
        let scaled = sampled(&s, 9);
        let id = ParamId::Infectivity(ResistanceProfile::Tet);
        let a = base.value_of(id, 3.0).unwrap();
        let b = scaled.value_of(id, 3.0).unwrap();
        assert!((b / a - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_susceptible_fitness_is_one() {
        let p = sampled(&ModelSettings::default(), 4);
        for t in [0.0, 5.0, 20.0] {
            let f = p
                .value_of(ParamId::RelativeFitness(ResistanceProfile::Susceptible), t)
                .unwrap();
            assert!((f - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_independent_shares_can_overflow() {
        let mut s = ModelSettings::default();
        s.profile_share_prior = ProfileSharePrior::Independent;
        let mut accepted = 0;
        let mut rejected = 0;
        for seed in 0..200 {
            let mut p = Parameters::build(&s).unwrap();
            match p.sample(&mut StdRng::seed_from_u64(seed)) {
                Ok(()) => {
                    accepted += 1;
                    let shares = p.profile_shares().unwrap();
                    assert!(shares[0] >= 0.0 && shares[0] <= 1.0);
                }
                Err(crate::error::ModelError::ShareOverflow { sum }) => {
                    assert!(sum > 1.0);
                    rejected += 1;
                }
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert!(accepted > 0 && rejected > 0, "{accepted}/{rejected}");
    }
}
