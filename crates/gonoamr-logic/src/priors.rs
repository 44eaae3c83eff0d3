//! Prior distributions for leaf parameters.
//!
//! All priors are bounded. A draw is either a scalar or, for the
//! Dirichlet prior over resistance-profile shares, a vector that sums to 1.

use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A sampled leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// Prior distribution of a leaf parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prior {
    /// Fixed value.
    Constant(f64),
    /// Uniform on `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Beta on `[min, max]` parameterised by mean and standard deviation.
    Beta {
        mean: f64,
        st_dev: f64,
        min: f64,
        max: f64,
    },
    /// Dirichlet over shares. Zero concentrations pin that share to 0.
    Dirichlet { concentrations: Vec<f64> },
}

impl Prior {
    pub fn uniform(min: f64, max: f64) -> Self {
        Prior::Uniform { min, max }
    }

    /// Uniform prior widened by `factor` around its midpoint, clipped to
    /// `[floor, ceil]`. `factor == 1.0` returns the prior unchanged.
    pub fn widened_uniform(min: f64, max: f64, factor: f64, floor: f64, ceil: f64) -> Self {
        let mid = (min + max) / 2.0;
        let half = (max - min) / 2.0 * factor;
        Prior::Uniform {
            min: (mid - half).max(floor),
            max: (mid + half).min(ceil),
        }
    }

    /// Check that the prior is well formed. `name` is used in the error.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(ModelError::InvalidPrior {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        match self {
            Prior::Constant(v) => {
                if !v.is_finite() {
                    return invalid("constant is not finite");
                }
            }
            Prior::Uniform { min, max } => {
                if !(min.is_finite() && max.is_finite()) || min > max {
                    return invalid("uniform bounds must be finite with min <= max");
                }
            }
            Prior::Beta {
                mean,
                st_dev,
                min,
                max,
            } => {
                if min >= max || mean <= min || mean >= max || *st_dev <= 0.0 {
                    return invalid("beta needs min < mean < max and st_dev > 0");
                }
                let (a, b) = beta_shape(*mean, *st_dev, *min, *max);
                if a <= 0.0 || b <= 0.0 {
                    return invalid("beta variance too large for its mean");
                }
            }
            Prior::Dirichlet { concentrations } => {
                if concentrations.is_empty() {
                    return invalid("dirichlet has no components");
                }
                if concentrations.iter().any(|c| *c < 0.0 || !c.is_finite()) {
                    return invalid("dirichlet concentrations must be finite and >= 0");
                }
                if concentrations.iter().all(|c| *c == 0.0) {
                    return invalid("dirichlet needs at least one positive concentration");
                }
            }
        }
        Ok(())
    }

    /// Draw a value. The prior must have passed [`Prior::validate`].
    pub fn sample<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> Result<Draw> {
        let invalid = |reason: String| ModelError::InvalidPrior {
            name: name.to_string(),
            reason,
        };
        match self {
            Prior::Constant(v) => Ok(Draw::Scalar(*v)),
            Prior::Uniform { min, max } => {
                if min == max {
                    Ok(Draw::Scalar(*min))
                } else {
                    Ok(Draw::Scalar(rng.gen_range(*min..=*max)))
                }
            }
            Prior::Beta {
                mean,
                st_dev,
                min,
                max,
            } => {
                let (a, b) = beta_shape(*mean, *st_dev, *min, *max);
                let dist = Beta::new(a, b).map_err(|e| invalid(e.to_string()))?;
                let x: f64 = dist.sample(rng);
                Ok(Draw::Scalar(min + (max - min) * x))
            }
            Prior::Dirichlet { concentrations } => {
                let mut out = Vec::with_capacity(concentrations.len());
                for &alpha in concentrations {
                    if alpha == 0.0 {
                        out.push(0.0);
                    } else {
                        let gamma = Gamma::new(alpha, 1.0).map_err(|e| invalid(e.to_string()))?;
                        out.push(gamma.sample(rng));
                    }
                }
                let total: f64 = out.iter().sum();
                if total <= 0.0 {
                    return Err(invalid("dirichlet draw collapsed to zero".into()));
                }
                for v in &mut out {
                    *v /= total;
                }
                Ok(Draw::Vector(out))
            }
        }
    }

    /// Support of a scalar prior, if it has one.
    pub fn support(&self) -> Option<(f64, f64)> {
        match self {
            Prior::Constant(v) => Some((*v, *v)),
            Prior::Uniform { min, max } => Some((*min, *max)),
            Prior::Beta { min, max, .. } => Some((*min, *max)),
            Prior::Dirichlet { .. } => None,
        }
    }
}

/// Method-of-moments shape parameters for a Beta on `[min, max]`.
fn beta_shape(mean: f64, st_dev: f64, min: f64, max: f64) -> (f64, f64) {
    let width = max - min;
    let m = (mean - min) / width;
    let v = (st_dev / width).powi(2);
    let common = m * (1.0 - m) / v - 1.0;
    (m * common, (1.0 - m) * common)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scalar(d: Draw) -> f64 {
        match d {
            Draw::Scalar(v) => v,
            Draw::Vector(_) => panic!("expected scalar"),
        }
    }

    #[test]
    fn test_uniform_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = Prior::uniform(0.5, 3.0);
        for _ in 0..1000 {
            let v = scalar(p.sample("transm", &mut rng).unwrap());
            assert!((0.5..=3.0).contains(&v));
        }
    }

    #[test]
    fn test_degenerate_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = scalar(Prior::uniform(0.0, 0.0).sample("x", &mut rng).unwrap());
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_beta_mean_close() {
        let mut rng = StdRng::seed_from_u64(11);
        let p = Prior::Beta {
            mean: 0.98,
            st_dev: 0.01,
            min: 0.0,
            max: 1.0,
        };
        p.validate("sens").unwrap();
        let n = 4000;
        let mean: f64 = (0..n)
            .map(|_| scalar(p.sample("sens", &mut rng).unwrap()))
            .sum::<f64>()
            / n as f64;
        assert!((mean - 0.98).abs() < 0.005, "mean={mean}");
    }

    #[test]
    fn test_beta_too_wide_rejected() {
        let p = Prior::Beta {
            mean: 0.5,
            st_dev: 0.6,
            min: 0.0,
            max: 1.0,
        };
        assert!(p.validate("x").is_err());
    }

    #[test]
    fn test_dirichlet_sums_to_one_and_respects_zeros() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = Prior::Dirichlet {
            concentrations: vec![55.0, 2.0, 270.0, 0.0, 170.0, 0.0, 0.0, 0.0],
        };
        p.validate("shares").unwrap();
        for _ in 0..200 {
            let Draw::Vector(v) = p.sample("shares", &mut rng).unwrap() else {
                panic!("expected vector");
            };
            assert_eq!(v.len(), 8);
            assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert_eq!(v[3], 0.0);
            assert_eq!(v[7], 0.0);
        }
    }

    #[test]
    fn test_widened_uniform() {
        let (lo, hi) = Prior::widened_uniform(0.2, 0.8, 1.5, 0.0, 1.0)
            .support()
            .unwrap();
        assert!((lo - 0.05).abs() < 1e-9 && (hi - 0.95).abs() < 1e-9);
        let clipped = Prior::widened_uniform(0.5, 1.0, 2.0, 0.0, 1.0);
        assert_eq!(clipped, Prior::uniform(0.25, 1.0));
        assert_eq!(Prior::widened_uniform(1.0, 2.0, 1.0, 0.0, 10.0), Prior::uniform(1.0, 2.0));
    }
}
