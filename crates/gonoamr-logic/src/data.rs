//! Survey estimates the model is calibrated against.
//!
//! Values are percentages (prevalence, % symptomatic, % by profile) or
//! cases per 100,000 (gonorrhea rate). Period 0 has no observation.

use crate::taxonomy::ResistanceProfile;

/// One observation period of a survey estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub period: usize,
    pub mean: Option<f64>,
    /// 95% confidence interval, same units as `mean`.
    pub interval: Option<(f64, f64)>,
}

impl Estimate {
    const fn missing(period: usize) -> Self {
        Self {
            period,
            mean: None,
            interval: None,
        }
    }

    const fn observed(period: usize, mean: f64, lower: f64, upper: f64) -> Self {
        Self {
            period,
            mean: Some(mean),
            interval: Some((lower, upper)),
        }
    }

    const fn point(period: usize, mean: f64) -> Self {
        Self {
            period,
            mean: Some(mean),
            interval: None,
        }
    }
}

/// Multiplier turning percentages into proportions.
pub const PERCENT: f64 = 0.01;
/// Multiplier turning rates per 100,000 into proportions.
pub const PER_100K: f64 = 0.00001;

/// Gonorrhea rate; its interval is taken as ±10% of the mean.
const GONORRHEA_RATE_2018: f64 = 6508.0;

pub const PREVALENCE: [Estimate; 2] = [Estimate::missing(0), Estimate::observed(1, 4.47, 3.58, 5.36)];

pub const GONORRHEA_RATE: [Estimate; 2] = [
    Estimate::missing(0),
    Estimate::observed(
        1,
        GONORRHEA_RATE_2018,
        GONORRHEA_RATE_2018 * 0.9,
        GONORRHEA_RATE_2018 * 1.1,
    ),
];

pub const PERC_SYMPTOMATIC: [Estimate; 2] =
    [Estimate::missing(0), Estimate::observed(1, 67.9, 63.0, 72.9)];

/// % of cases by resistance profile (`ResistanceProfile` order).
pub const PERC_BY_PROFILE: [[Estimate; 2]; ResistanceProfile::COUNT] = [
    [Estimate::missing(0), Estimate::observed(1, 11.0, 8.3, 13.8)],
    [Estimate::missing(0), Estimate::observed(1, 0.6, 0.0, 1.3)],
    [Estimate::missing(0), Estimate::observed(1, 54.1, 49.7, 58.5)],
    [Estimate::missing(0), Estimate::point(1, 0.0)],
    [Estimate::missing(0), Estimate::observed(1, 34.1, 29.9, 38.3)],
    [Estimate::missing(0), Estimate::point(1, 0.0)],
    [Estimate::missing(0), Estimate::point(1, 0.0)],
    [Estimate::missing(0), Estimate::point(1, 0.0)],
];
