//! Calibration targets and feasible ranges on ratio series.
//!
//! A feasible range is a hard filter on a simulated trajectory. A
//! calibration target is a (mean, survey size) pair per observation
//! period, where the survey size is the effective sample size implied by
//! the reported 95% confidence interval:
//!
//! ```text
//! n = mean * (1 - mean) * (z / half_width)^2,   z = Φ⁻¹(0.975)
//! ```

use crate::data::{self, Estimate};
use crate::error::{ModelError, Result};
use crate::outputs::{Outputs, RatioSeriesId};
use crate::settings::ModelSettings;

/// Standard normal quantile at 0.975.
pub const Z_975: f64 = 1.959963984540054;

/// Effective survey size of an estimate with interval `[lower, upper]`.
/// All three values are scaled by `multiplier` first.
pub fn survey_size(mean: f64, lower: f64, upper: f64, multiplier: f64) -> Result<f64> {
    let (mean, lower, upper) = (mean * multiplier, lower * multiplier, upper * multiplier);
    let half_width = (upper - lower) / 2.0;
    if half_width <= 0.0 || !half_width.is_finite() {
        return Err(ModelError::InvalidConfidenceInterval { lower, upper });
    }
    Ok(mean * (1.0 - mean) * (Z_975 / half_width).powi(2))
}

/// Bounds a trajectory must respect to be kept.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeasibleRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Trajectory must reach at least this value at some point.
    pub min_threshold_to_hit: Option<f64>,
}

impl FeasibleRange {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_threshold_to_hit: None,
        }
    }

    pub fn must_reach(threshold: f64) -> Self {
        Self {
            min_threshold_to_hit: Some(threshold),
            ..Self::default()
        }
    }

    /// Whether a single value lies within `[min, max]`.
    pub fn admits(&self, value: f64) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }

    /// Whether a whole trajectory is feasible. Missing values are skipped.
    pub fn admits_trajectory(&self, values: &[Option<f64>]) -> bool {
        let observed = values.iter().flatten();
        if !observed.clone().all(|v| self.admits(*v)) {
            return false;
        }
        match self.min_threshold_to_hit {
            Some(threshold) => observed.into_iter().any(|v| *v >= threshold),
            None => true,
        }
    }
}

/// Target for one observation period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationTarget {
    /// No data for this period.
    Unconstrained,
    Observed { mean: f64, survey_size: f64 },
}

impl CalibrationTarget {
    fn from_estimate(e: &Estimate, multiplier: f64) -> Result<Self> {
        match (e.mean, e.interval) {
            (Some(mean), Some((lower, upper))) => Ok(CalibrationTarget::Observed {
                mean: mean * multiplier,
                survey_size: survey_size(mean, lower, upper, multiplier)?,
            }),
            _ => Ok(CalibrationTarget::Unconstrained),
        }
    }
}

/// Targets for each observation period. The last estimate is held for
/// `hold` periods in total, so the result has `estimates.len() + hold - 1`
/// entries.
pub fn build_targets(estimates: &[Estimate], multiplier: f64, hold: usize) -> Result<Vec<CalibrationTarget>> {
    let Some(last) = estimates.len().checked_sub(1) else {
        return Ok(Vec::new());
    };
    (0..estimates.len() + hold.saturating_sub(1))
        .map(|i| CalibrationTarget::from_estimate(&estimates[i.min(last)], multiplier))
        .collect()
}

/// Attach feasible ranges and targets to the ratio series of a calibration
/// build. Projection builds are left unfiltered.
pub fn bind_calibration(outputs: &mut Outputs, settings: &ModelSettings) -> Result<()> {
    if !settings.is_calibrating() {
        log::debug!("projection build: no feasible ranges or targets bound");
        return Ok(());
    }
    let hold = settings.periods_to_hold_constant;
    let handles = outputs.ratio.clone();

    let bind = |outputs: &mut Outputs, id: RatioSeriesId, range: FeasibleRange, estimates: Option<(&[Estimate], f64)>| -> Result<()> {
        let series = outputs.ratio_series_mut(id);
        series.feasible = Some(range);
        if let Some((estimates, multiplier)) = estimates {
            series.targets = build_targets(estimates, multiplier, hold)?;
        }
        Ok(())
    };

    bind(
        outputs,
        handles.prevalence,
        FeasibleRange::between(0.025, 0.065),
        Some((&data::PREVALENCE[..], data::PERCENT)),
    )?;
    bind(
        outputs,
        handles.gonorrhea_rate,
        FeasibleRange::between(0.045, 0.085),
        Some((&data::GONORRHEA_RATE[..], data::PER_100K)),
    )?;
    bind(
        outputs,
        handles.perc_symptomatic,
        FeasibleRange::between(0.5, 1.0),
        Some((&data::PERC_SYMPTOMATIC[..], data::PERCENT)),
    )?;
    bind(outputs, handles.perc_cro_ns, FeasibleRange::must_reach(0.05), None)?;

    for (id, estimates) in handles.perc_by_profile.iter().zip(data::PERC_BY_PROFILE.iter()) {
        outputs.ratio_series_mut(*id).targets = build_targets(estimates, data::PERCENT, hold)?;
    }

    log::debug!("calibration feasible ranges and targets bound");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survey_size_prevalence() {
        // 4.47% with CI 3.58–5.36%
        let n = survey_size(4.47, 3.58, 5.36, 0.01).unwrap();
        let hw = 0.0089;
        let expected = 0.0447 * (1.0 - 0.0447) * (Z_975 / hw).powi(2);
        assert!((n - expected).abs() < 1e-6);
        assert!(n > 2000.0 && n < 2100.0, "{n}");
    }

    #[test]
    fn test_degenerate_interval_rejected() {
        assert!(matches!(
            survey_size(0.5, 0.5, 0.5, 1.0),
            Err(ModelError::InvalidConfidenceInterval { .. })
        ));
    }

    #[test]
    fn test_targets_hold_last_observation() {
        let targets = build_targets(&data::PREVALENCE, data::PERCENT, 5).unwrap();
        assert_eq!(targets.len(), 6);
        assert_eq!(targets[0], CalibrationTarget::Unconstrained);
        for t in &targets[1..] {
            assert_eq!(*t, targets[1]);
            assert!(matches!(t, CalibrationTarget::Observed { mean, .. } if (*mean - 0.0447).abs() < 1e-12));
        }
    }

    #[test]
    fn test_point_estimate_is_unconstrained() {
        let targets = build_targets(&data::PERC_BY_PROFILE[3], data::PERCENT, 1).unwrap();
        assert_eq!(
            targets,
            vec![CalibrationTarget::Unconstrained, CalibrationTarget::Unconstrained]
        );
    }

    #[test]
    fn test_feasible_range() {
        let r = FeasibleRange::between(0.025, 0.065);
        assert!(r.admits(0.03));
        assert!(!r.admits(0.07));
        assert!(r.admits_trajectory(&[None, Some(0.03), Some(0.05)]));
        assert!(!r.admits_trajectory(&[Some(0.01)]));

        let hit = FeasibleRange::must_reach(0.05);
        assert!(hit.admits_trajectory(&[Some(0.01), Some(0.06)]));
        assert!(!hit.admits_trajectory(&[Some(0.01), None, Some(0.04)]));
    }
}
