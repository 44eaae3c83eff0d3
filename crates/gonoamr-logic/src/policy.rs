//! Adaptive first-line drug switching.
//!
//! Two interventions compete for first-line therapy: CRO and the reserve
//! drug M. A surveilled estimate of the share of cases non-susceptible to
//! CRO drives the switch:
//!
//! - CRO is on by default and turns off once the estimate reaches the
//!   switch threshold.
//! - M turns on at the same moment and never turns off.
//! - CRO may only come back while M has never been used.
//!
//! When M is not available both rules are predetermined: CRO on, M off.

use rand::Rng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};

use crate::outputs::RatioSeriesId;
use crate::settings::ModelSettings;
use crate::taxonomy::RESERVE_DRUG;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Intervention {
    FirstLineCro = 0,
    FirstLineReserve = 1,
}

impl Intervention {
    pub const COUNT: usize = 2;
    pub const ALL: [Intervention; 2] = [Intervention::FirstLineCro, Intervention::FirstLineReserve];

    pub fn name(self) -> String {
        match self {
            Intervention::FirstLineCro => "1st line therapy with CRO".into(),
            Intervention::FirstLineReserve => format!("1st line therapy with Drug {RESERVE_DRUG}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionId(pub usize);

/// Quantity a condition can test.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// Latest surveilled value of a ratio series.
    Surveilled { name: String, ratio: RatioSeriesId },
    /// 1 if the intervention has ever been on, 0 otherwise.
    EverSwitchedOn { name: String, intervention: Intervention },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    GreaterOrEqual,
    Equal,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Less => value < threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::Equal => value == threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    OnFeature {
        name: String,
        feature: FeatureId,
        comparison: Comparison,
        threshold: f64,
    },
    /// All listed conditions hold.
    All { name: String, conditions: Vec<ConditionId> },
    AlwaysFalse,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionRule {
    Predetermined(bool),
    ConditionBased {
        default: bool,
        turn_on: ConditionId,
        turn_off: ConditionId,
    },
}

impl DecisionRule {
    fn initial(&self) -> bool {
        match self {
            DecisionRule::Predetermined(v) => *v,
            DecisionRule::ConditionBased { default, .. } => *default,
        }
    }
}

/// On/off switches of every intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyState {
    on: [bool; Intervention::COUNT],
    ever_on: [bool; Intervention::COUNT],
}

impl PolicyState {
    pub fn is_on(&self, intervention: Intervention) -> bool {
        self.on[intervention as usize]
    }

    pub fn ever_on(&self, intervention: Intervention) -> bool {
        self.ever_on[intervention as usize]
    }

    /// The first-line intervention currently in use.
    pub fn active(&self) -> Option<Intervention> {
        let mut on = Intervention::ALL.into_iter().filter(|i| self.is_on(*i));
        match (on.next(), on.next()) {
            (Some(i), None) => Some(i),
            _ => None,
        }
    }
}

/// Features, conditions and decision rules of the switching policy.
#[derive(Debug, Clone)]
pub struct DrugSwitchPolicy {
    pub features: Vec<Feature>,
    pub conditions: Vec<Condition>,
    pub rules: [DecisionRule; Intervention::COUNT],
}

impl DrugSwitchPolicy {
    /// Policy surveilling `cro_ns`, the ratio series of CRO-NS cases.
    pub fn build(settings: &ModelSettings, cro_ns: RatioSeriesId) -> Self {
        if !settings.reserve_drug_available {
            return Self {
                features: Vec::new(),
                conditions: Vec::new(),
                rules: [DecisionRule::Predetermined(true), DecisionRule::Predetermined(false)],
            };
        }

        let features = vec![
            Feature::Surveilled {
                name: "Surveyed % of cases non-susceptible to CRO".into(),
                ratio: cro_ns,
            },
            Feature::EverSwitchedOn {
                name: format!("If Drug {RESERVE_DRUG} ever switched on"),
                intervention: Intervention::FirstLineReserve,
            },
        ];
        let (perc_cro_ns, reserve_used) = (FeatureId(0), FeatureId(1));
        let (cro_in, cro_out, reserve_never_used, turn_on_cro) =
            (ConditionId(0), ConditionId(1), ConditionId(2), ConditionId(3));
        let conditions = vec![
            Condition::OnFeature {
                name: "If % resistant is below threshold".into(),
                feature: perc_cro_ns,
                comparison: Comparison::Less,
                threshold: settings.switch_threshold,
            },
            Condition::OnFeature {
                name: "If % resistant passes threshold".into(),
                feature: perc_cro_ns,
                comparison: Comparison::GreaterOrEqual,
                threshold: settings.switch_threshold,
            },
            Condition::OnFeature {
                name: format!("If {RESERVE_DRUG} was never used as 1st-line therapy"),
                feature: reserve_used,
                comparison: Comparison::Equal,
                threshold: 0.0,
            },
            Condition::All {
                name: "If CRO can return as 1st-line therapy".into(),
                conditions: vec![cro_in, reserve_never_used],
            },
            Condition::AlwaysFalse,
        ];
        let never = ConditionId(4);

        Self {
            features,
            conditions,
            rules: [
                DecisionRule::ConditionBased {
                    default: true,
                    turn_on: turn_on_cro,
                    turn_off: cro_out,
                },
                DecisionRule::ConditionBased {
                    default: false,
                    turn_on: cro_out,
                    turn_off: never,
                },
            ],
        }
    }

    pub fn initial_state(&self) -> PolicyState {
        let on = [self.rules[0].initial(), self.rules[1].initial()];
        PolicyState { on, ever_on: on }
    }

    fn feature_value(&self, id: FeatureId, state: &PolicyState, surveilled: Option<f64>) -> Option<f64> {
        match self.features.get(id.0)? {
            Feature::Surveilled { .. } => surveilled,
            Feature::EverSwitchedOn { intervention, .. } => {
                Some(if state.ever_on(*intervention) { 1.0 } else { 0.0 })
            }
        }
    }

    /// Conditions without a value (no surveillance yet) are false.
    fn holds(&self, id: ConditionId, state: &PolicyState, surveilled: Option<f64>) -> bool {
        match self.conditions.get(id.0) {
            Some(Condition::OnFeature {
                feature,
                comparison,
                threshold,
                ..
            }) => self
                .feature_value(*feature, state, surveilled)
                .is_some_and(|v| comparison.holds(v, *threshold)),
            Some(Condition::All { conditions, .. }) => {
                conditions.iter().all(|c| self.holds(*c, state, surveilled))
            }
            Some(Condition::AlwaysFalse) | None => false,
        }
    }

    /// Apply every decision rule to `state` given the latest surveilled value.
    /// All conditions are read from the state before the step.
    pub fn step(&self, state: &PolicyState, surveilled: Option<f64>) -> PolicyState {
        let mut next = *state;
        for (i, rule) in self.rules.iter().enumerate() {
            if let DecisionRule::ConditionBased { turn_on, turn_off, .. } = rule {
                if state.on[i] {
                    if self.holds(*turn_off, state, surveilled) {
                        next.on[i] = false;
                    }
                } else if self.holds(*turn_on, state, surveilled) {
                    next.on[i] = true;
                }
            }
            next.ever_on[i] |= next.on[i];
        }
        if next != *state {
            log::info!(
                "first-line therapy switched: CRO {} / {RESERVE_DRUG} {} (surveilled {:?})",
                next.is_on(Intervention::FirstLineCro),
                next.is_on(Intervention::FirstLineReserve),
                surveilled
            );
        }
        next
    }
}

/// Time-averaged, sample-based estimate of a ratio series.
///
/// Numerator and denominator are accumulated over an observation period;
/// closing the period samples `survey_size` cases from the averaged ratio.
#[derive(Debug, Clone)]
pub struct SurveillanceEstimator {
    survey_size: u64,
    numerator: f64,
    denominator: f64,
}

impl SurveillanceEstimator {
    pub fn new(survey_size: f64) -> Self {
        Self {
            survey_size: survey_size.round().max(0.0) as u64,
            numerator: 0.0,
            denominator: 0.0,
        }
    }

    pub fn record(&mut self, numerator: f64, denominator: f64) {
        self.numerator += numerator;
        self.denominator += denominator;
    }

    /// Estimate for the period just ended; `None` if nothing was recorded.
    pub fn close_period<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<f64> {
        let (num, den) = (self.numerator, self.denominator);
        self.numerator = 0.0;
        self.denominator = 0.0;
        if den <= 0.0 {
            return None;
        }
        let ratio = (num / den).clamp(0.0, 1.0);
        if self.survey_size == 0 {
            return Some(ratio);
        }
        match Binomial::new(self.survey_size, ratio) {
            Ok(b) => Some(b.sample(rng) as f64 / self.survey_size as f64),
            Err(e) => {
                log::warn!("surveillance sample failed: {e}");
                Some(ratio)
            }
        }
    }
}
