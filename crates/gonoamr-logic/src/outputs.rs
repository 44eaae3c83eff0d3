//! Summary and ratio time series handed to the engine.
//!
//! A sum series adds up the prevalence of a set of compartments or the
//! incidence through a set of chance nodes. A ratio series divides one sum
//! series by another and may carry surveillance, feasibility and
//! calibration metadata.

use crate::calibration::{CalibrationTarget, FeasibleRange};
use crate::cascade::{Cascade, NodeId};
use crate::compartments::{CompartmentId, CompartmentNetwork};
use crate::error::{ModelError, Result};
use crate::graph::ParamRef;
use crate::params::{ParamId, Parameters};
use crate::taxonomy::{Antibiotic, ResistanceProfile, SymptomState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SumSeriesId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RatioSeriesId(pub usize);

/// What a sum series adds up.
#[derive(Debug, Clone, PartialEq)]
pub enum SumSource {
    /// Current size of these compartments.
    Prevalence(Vec<CompartmentId>),
    /// Cases passing through these nodes during the period.
    Incidence(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct SumSeries {
    pub id: SumSeriesId,
    pub name: String,
    pub source: SumSource,
}

impl SumSeries {
    /// Sum over `prevalence` (by compartment) or `incidence` (by node).
    pub fn evaluate(&self, prevalence: &[f64], incidence: &[f64]) -> Result<f64> {
        match &self.source {
            SumSource::Prevalence(ids) => ids
                .iter()
                .map(|c| lookup(prevalence, c.0, "compartment"))
                .sum(),
            SumSource::Incidence(ids) => ids
                .iter()
                .map(|n| lookup(incidence, n.0, "chance node"))
                .sum(),
        }
    }
}

fn lookup(values: &[f64], index: usize, what: &'static str) -> Result<f64> {
    values.get(index).copied().ok_or(ModelError::IndexOutOfRange {
        what,
        index,
        len: values.len(),
    })
}

#[derive(Debug, Clone)]
pub struct RatioSeries {
    pub id: RatioSeriesId,
    pub name: String,
    pub numerator: SumSeriesId,
    pub denominator: SumSeriesId,
    /// Observed through surveillance (subject to sampling error).
    pub surveyed: bool,
    /// Time-averaged statistics only count periods after warm-up.
    pub after_warm_up: bool,
    /// Number of cases sampled per observation period.
    pub survey_size: Option<ParamRef>,
    pub feasible: Option<FeasibleRange>,
    /// One target per observation period; empty when not calibrated.
    pub targets: Vec<CalibrationTarget>,
}

impl RatioSeries {
    /// `None` when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
        if denominator == 0.0 {
            None
        } else {
            Some(numerator / denominator)
        }
    }
}

/// Handles to the named sum series.
#[derive(Debug, Clone)]
pub struct SumHandles {
    pub population: SumSeriesId,
    pub infected: SumSeriesId,
    pub new_cases: SumSeriesId,
    pub new_cases_symptomatic: SumSeriesId,
    pub cases_by_profile: Vec<SumSeriesId>,
    pub cases_cro_ns: SumSeriesId,
    pub treated: SumSeriesId,
    pub treated_first_line: SumSeriesId,
    pub treated_by_drug: Vec<SumSeriesId>,
}

/// Handles to the named ratio series.
#[derive(Debug, Clone)]
pub struct RatioHandles {
    pub prevalence: RatioSeriesId,
    pub gonorrhea_rate: RatioSeriesId,
    pub perc_symptomatic: RatioSeriesId,
    pub perc_by_profile: Vec<RatioSeriesId>,
    pub perc_cro_ns: RatioSeriesId,
    pub perc_treated_first_line: RatioSeriesId,
}

#[derive(Debug, Clone)]
pub struct Outputs {
    sums: Vec<SumSeries>,
    ratios: Vec<RatioSeries>,
    pub sum: SumHandles,
    pub ratio: RatioHandles,
}

struct SeriesBuilder {
    sums: Vec<SumSeries>,
    ratios: Vec<RatioSeries>,
}

impl SeriesBuilder {
    fn sum(&mut self, name: impl Into<String>, source: SumSource) -> SumSeriesId {
        let id = SumSeriesId(self.sums.len());
        self.sums.push(SumSeries {
            id,
            name: name.into(),
            source,
        });
        id
    }

    fn ratio(
        &mut self,
        name: impl Into<String>,
        numerator: SumSeriesId,
        denominator: SumSeriesId,
        surveyed: bool,
        after_warm_up: bool,
        survey_size: Option<ParamRef>,
    ) -> RatioSeriesId {
        let id = RatioSeriesId(self.ratios.len());
        self.ratios.push(RatioSeries {
            id,
            name: name.into(),
            numerator,
            denominator,
            surveyed,
            after_warm_up,
            survey_size,
            feasible: None,
            targets: Vec::new(),
        });
        id
    }
}

impl Outputs {
    pub fn build(params: &Parameters, net: &CompartmentNetwork, cascade: &Cascade) -> Result<Self> {
        let survey_size = params.get(ParamId::SurveySize)?;
        let mut b = SeriesBuilder {
            sums: Vec::new(),
            ratios: Vec::new(),
        };

        // A new case is counted when it enters the testing gate or is sent
        // straight to first-line M.
        let case_nodes = |s: SymptomState, p: ResistanceProfile| {
            [
                cascade.rapid_test_gate(s, p),
                cascade.count_first_line_reserve_by(s, p),
            ]
        };

        let all: Vec<CompartmentId> = net.iter().map(|c| c.id).collect();
        let population = b.sum("Population size", SumSource::Prevalence(all));
        let mut infected_ids = net.all_infectious().to_vec();
        infected_ids.extend_from_slice(net.all_awaiting());
        let infected = b.sum("Infected", SumSource::Prevalence(infected_ids));

        let mut cases = Vec::new();
        let mut cases_symp = Vec::new();
        for s in SymptomState::ALL {
            for p in ResistanceProfile::ALL {
                cases.extend(case_nodes(s, p));
                if s == SymptomState::Symptomatic {
                    cases_symp.extend(case_nodes(s, p));
                }
            }
        }
        let new_cases = b.sum("New cases", SumSource::Incidence(cases));
        let new_cases_symptomatic = b.sum("New cases symptomatic", SumSource::Incidence(cases_symp));

        let mut cases_by_profile = Vec::with_capacity(ResistanceProfile::COUNT);
        let mut cro_ns = Vec::new();
        for p in ResistanceProfile::ALL {
            let nodes: Vec<NodeId> = SymptomState::ALL
                .iter()
                .flat_map(|s| case_nodes(*s, p))
                .collect();
            if p.is_resistant_to(Antibiotic::Cro) {
                cro_ns.extend(nodes.iter().copied());
            }
            cases_by_profile.push(b.sum(
                format!("Cases resistant to {p}"),
                SumSource::Incidence(nodes),
            ));
        }
        let cases_cro_ns = b.sum("Cases CRO-NS", SumSource::Incidence(cro_ns));

        let treated = b.sum(
            "Cases treated",
            SumSource::Incidence(vec![cascade.count_success_first_line, cascade.count_reserve]),
        );
        let treated_first_line = b.sum(
            "Treated with CIP, TET, or CRO",
            SumSource::Incidence(vec![cascade.count_success_first_line]),
        );
        let treated_by_drug = Antibiotic::ALL
            .iter()
            .map(|ab| {
                b.sum(
                    format!("Treated successfully with {ab}"),
                    SumSource::Incidence(vec![cascade.count_success(*ab)]),
                )
            })
            .collect();

        // ── Ratios ──
        let prevalence = b.ratio("Prevalence", infected, population, true, false, None);
        let gonorrhea_rate = b.ratio("Rate of gonorrhea cases", new_cases, population, true, true, None);
        let perc_symptomatic = b.ratio(
            "Proportion of cases symptomatic",
            new_cases_symptomatic,
            new_cases,
            true,
            false,
            None,
        );
        let perc_by_profile = ResistanceProfile::ALL
            .iter()
            .zip(&cases_by_profile)
            .map(|(p, num)| {
                b.ratio(
                    format!("Proportion of cases resistant to {p}"),
                    *num,
                    new_cases,
                    true,
                    false,
                    Some(survey_size),
                )
            })
            .collect();
        let perc_cro_ns = b.ratio(
            "Proportion of cases CRO-NS",
            cases_cro_ns,
            new_cases,
            true,
            false,
            Some(survey_size),
        );
        let perc_treated_first_line = b.ratio(
            "Proportion of cases treated with CIP, TET, or CRO",
            treated_first_line,
            treated,
            false,
            true,
            None,
        );

        log::debug!("built {} sum and {} ratio series", b.sums.len(), b.ratios.len());
        Ok(Self {
            sums: b.sums,
            ratios: b.ratios,
            sum: SumHandles {
                population,
                infected,
                new_cases,
                new_cases_symptomatic,
                cases_by_profile,
                cases_cro_ns,
                treated,
                treated_first_line,
                treated_by_drug,
            },
            ratio: RatioHandles {
                prevalence,
                gonorrhea_rate,
                perc_symptomatic,
                perc_by_profile,
                perc_cro_ns,
                perc_treated_first_line,
            },
        })
    }

    pub fn sums(&self) -> &[SumSeries] {
        &self.sums
    }

    pub fn ratios(&self) -> &[RatioSeries] {
        &self.ratios
    }

    pub fn sum_series(&self, id: SumSeriesId) -> &SumSeries {
        &self.sums[id.0]
    }

    pub fn ratio_series(&self, id: RatioSeriesId) -> &RatioSeries {
        &self.ratios[id.0]
    }

    pub(crate) fn ratio_series_mut(&mut self, id: RatioSeriesId) -> &mut RatioSeries {
        &mut self.ratios[id.0]
    }

    /// Value of one ratio series given compartment sizes and node counts.
    pub fn evaluate_ratio(
        &self,
        id: RatioSeriesId,
        prevalence: &[f64],
        incidence: &[f64],
    ) -> Result<Option<f64>> {
        let r = self.ratio_series(id);
        let num = self.sum_series(r.numerator).evaluate(prevalence, incidence)?;
        let den = self.sum_series(r.denominator).evaluate(prevalence, incidence)?;
        Ok(RatioSeries::ratio(num, den))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ModelSettings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn outputs() -> (Parameters, CompartmentNetwork, Cascade, Outputs) {
        let mut params = Parameters::build(&ModelSettings::default()).unwrap();
        params.sample(&mut StdRng::seed_from_u64(9)).unwrap();
        let mut net = CompartmentNetwork::build(&params, true).unwrap();
        let cascade = Cascade::build(&params, &mut net, true).unwrap();
        let out = Outputs::build(&params, &net, &cascade).unwrap();
        (params, net, cascade, out)
    }

    #[test]
    fn test_initial_prevalence_matches_prior() {
        let (params, net, cascade, out) = outputs();
        let sizes = net.initial_sizes(&params).unwrap();
        let incidence = vec![0.0; cascade.nodes().len()];
        let prev = out
            .evaluate_ratio(out.ratio.prevalence, &sizes, &incidence)
            .unwrap()
            .unwrap();
        let expected = params.value_of(ParamId::PrevI0, 0.0).unwrap();
        assert!((prev - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominator_is_none() {
        let (_, net, cascade, out) = outputs();
        let prevalence = vec![0.0; net.len()];
        let incidence = vec![0.0; cascade.nodes().len()];
        assert_eq!(
            out.evaluate_ratio(out.ratio.perc_symptomatic, &prevalence, &incidence)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_profile_shares_of_cases_sum_to_one() {
        let (_, net, cascade, out) = outputs();
        let prevalence = vec![0.0; net.len()];
        let incidence: Vec<f64> = (0..cascade.nodes().len()).map(|i| (i % 7) as f64).collect();
        let total: f64 = out
            .ratio
            .perc_by_profile
            .iter()
            .map(|r| {
                out.evaluate_ratio(*r, &prevalence, &incidence)
                    .unwrap()
                    .unwrap_or(0.0)
            })
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_survey_size_on_resistance_series() {
        let (_, _, _, out) = outputs();
        assert!(out.ratio_series(out.ratio.perc_cro_ns).survey_size.is_some());
        assert!(out.ratio_series(out.ratio.gonorrhea_rate).after_warm_up);
        assert!(!out.ratio_series(out.ratio.perc_treated_first_line).surveyed);
    }

    #[test]
    fn test_short_slice_is_error() {
        let (_, _, _, out) = outputs();
        assert!(out.evaluate_ratio(out.ratio.prevalence, &[1.0], &[]).is_err());
    }
}
