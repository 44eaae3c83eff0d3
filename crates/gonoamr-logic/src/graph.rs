//! Parameter dependency graph.
//!
//! Nodes are leaves (priors or known time-step functions) or derived
//! quantities over other nodes. A [`ParamRef`] can only be obtained by
//! inserting a node, and derived nodes are built from `ParamRef`s, so every
//! derived node is constructed strictly after its inputs and the graph is
//! acyclic by construction.
//!
//! Leaves are sampled once per trial ([`ParamGraph::sample`]); derived values
//! are computed on demand at a given simulation time ([`ParamGraph::value`]).

use std::collections::HashMap;

use rand::Rng;

use crate::error::{ModelError, Result};
use crate::params::ParamId;
use crate::priors::{Draw, Prior};

/// Shares within this tolerance above 1 are treated as exactly 1.
pub const SHARE_TOLERANCE: f64 = 1e-9;

/// Handle to a node already inserted into a [`ParamGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamRef(usize);

impl ParamRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pure function of other parameters (and possibly of time).
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    Equal(ParamRef),
    OneMinus(ParamRef),
    Inverse(ParamRef),
    Product(Vec<ParamRef>),
    /// `10^x`. With a negative exponent this is a probability in (0, 1).
    TenToPower(ParamRef),
    /// One entry of a multivariate leaf.
    Component { source: ParamRef, index: usize },
    /// `1 - Σ inputs`. Fails if the inputs sum above 1.
    Remainder(Vec<ParamRef>),
    /// `min + (max - min) / (1 + exp(-slope * (t - t_start - midpoint)))`.
    Logistic {
        min: ParamRef,
        max: ParamRef,
        slope: ParamRef,
        midpoint: ParamRef,
        t_start: f64,
    },
}

impl Derived {
    fn inputs(&self) -> Vec<ParamRef> {
        match self {
            Derived::Equal(r)
            | Derived::OneMinus(r)
            | Derived::Inverse(r)
            | Derived::TenToPower(r) => vec![*r],
            Derived::Component { source, .. } => vec![*source],
            Derived::Product(rs) | Derived::Remainder(rs) => rs.clone(),
            Derived::Logistic {
                min,
                max,
                slope,
                midpoint,
                ..
            } => vec![*min, *max, *slope, *midpoint],
        }
    }
}

/// What a graph node is.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Prior),
    /// Known step function of time: `before` until the first breakpoint,
    /// then `values[i]` from `breakpoints[i]` on.
    StepWise {
        breakpoints: Vec<f64>,
        values: Vec<f64>,
        before: f64,
    },
    Derived(Derived),
}

#[derive(Debug, Clone)]
struct Entry {
    id: ParamId,
    node: Node,
    draw: Option<Draw>,
}

/// Typed registry of parameters in construction order.
#[derive(Debug, Clone, Default)]
pub struct ParamGraph {
    entries: Vec<Entry>,
    lookup: HashMap<ParamId, ParamRef>,
}

impl ParamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, id: ParamId, node: Node) -> Result<ParamRef> {
        if self.lookup.contains_key(&id) {
            return Err(ModelError::DuplicateParameter { name: id.name() });
        }
        let r = ParamRef(self.entries.len());
        self.entries.push(Entry {
            id,
            node,
            draw: None,
        });
        self.lookup.insert(id, r);
        Ok(r)
    }

    /// Insert a leaf with a prior.
    pub fn add_prior(&mut self, id: ParamId, prior: Prior) -> Result<ParamRef> {
        prior.validate(&id.name())?;
        self.insert(id, Node::Leaf(prior))
    }

    pub fn add_constant(&mut self, id: ParamId, value: f64) -> Result<ParamRef> {
        self.add_prior(id, Prior::Constant(value))
    }

    /// Insert a known step function of time.
    pub fn add_step_wise(
        &mut self,
        id: ParamId,
        breakpoints: Vec<f64>,
        values: Vec<f64>,
        before: f64,
    ) -> Result<ParamRef> {
        if breakpoints.len() != values.len() || breakpoints.windows(2).any(|w| w[0] > w[1]) {
            return Err(ModelError::InvalidPrior {
                name: id.name(),
                reason: "step-wise breakpoints must be sorted and match values".into(),
            });
        }
        self.insert(
            id,
            Node::StepWise {
                breakpoints,
                values,
                before,
            },
        )
    }

    /// Insert a derived node. Inputs must already be in this graph.
    pub fn add_derived(&mut self, id: ParamId, derived: Derived) -> Result<ParamRef> {
        for input in derived.inputs() {
            if input.0 >= self.entries.len() {
                return Err(ModelError::DanglingDestination {
                    owner: id.name(),
                    target: format!("parameter #{}", input.0),
                });
            }
        }
        if let Derived::Component { source, index } = &derived {
            if let Node::Leaf(Prior::Dirichlet { concentrations }) = self.node(*source)? {
                if *index >= concentrations.len() {
                    return Err(ModelError::ComponentOutOfRange {
                        name: self.id_of(*source)?.name(),
                        index: *index,
                        len: concentrations.len(),
                    });
                }
            }
        }
        self.insert(id, Node::Derived(derived))
    }

    /// Look up a registered parameter.
    pub fn get(&self, id: ParamId) -> Result<ParamRef> {
        self.lookup
            .get(&id)
            .copied()
            .ok_or_else(|| ModelError::UnknownParameter { name: id.name() })
    }

    fn entry(&self, r: ParamRef) -> Result<&Entry> {
        self.entries
            .get(r.0)
            .ok_or_else(|| ModelError::UnknownParameter {
                name: format!("#{}", r.0),
            })
    }

    pub fn id_of(&self, r: ParamRef) -> Result<ParamId> {
        Ok(self.entry(r)?.id)
    }

    pub fn node(&self, r: ParamRef) -> Result<&Node> {
        Ok(&self.entry(r)?.node)
    }

    /// Every registered id in construction order.
    pub fn ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Draw every leaf prior, in construction order.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for entry in &mut self.entries {
            if let Node::Leaf(prior) = &entry.node {
                entry.draw = Some(prior.sample(&entry.id.name(), rng)?);
            }
        }
        Ok(())
    }

    /// Sampled vector of a multivariate leaf.
    pub fn vector(&self, r: ParamRef) -> Result<&[f64]> {
        let entry = self.entry(r)?;
        match &entry.draw {
            Some(Draw::Vector(v)) => Ok(v),
            Some(Draw::Scalar(_)) => Err(ModelError::InvalidPrior {
                name: entry.id.name(),
                reason: "scalar parameter used as a vector".into(),
            }),
            None => Err(ModelError::ParameterNotSampled {
                name: entry.id.name(),
            }),
        }
    }

    /// Scalar value of `r` at simulation time `t`.
    pub fn value(&self, r: ParamRef, t: f64) -> Result<f64> {
        let entry = self.entry(r)?;
        match &entry.node {
            Node::Leaf(_) => match &entry.draw {
                Some(Draw::Scalar(v)) => Ok(*v),
                Some(Draw::Vector(_)) => Err(ModelError::NotScalar {
                    name: entry.id.name(),
                }),
                None => Err(ModelError::ParameterNotSampled {
                    name: entry.id.name(),
                }),
            },
            Node::StepWise {
                breakpoints,
                values,
                before,
            } => {
                let mut v = *before;
                for (bp, val) in breakpoints.iter().zip(values) {
                    if t >= *bp {
                        v = *val;
                    }
                }
                Ok(v)
            }
            Node::Derived(d) => self.eval_derived(entry.id, d, t),
        }
    }

    fn eval_derived(&self, id: ParamId, d: &Derived, t: f64) -> Result<f64> {
        Ok(match d {
            Derived::Equal(r) => self.value(*r, t)?,
            Derived::OneMinus(r) => 1.0 - self.value(*r, t)?,
            Derived::Inverse(r) => {
                let v = self.value(*r, t)?;
                if v == 0.0 {
                    return Err(ModelError::InvalidPrior {
                        name: id.name(),
                        reason: "inverse of zero".into(),
                    });
                }
                1.0 / v
            }
            Derived::Product(rs) => {
                let mut acc = 1.0;
                for r in rs {
                    acc *= self.value(*r, t)?;
                }
                acc
            }
            Derived::TenToPower(r) => 10f64.powf(self.value(*r, t)?),
            Derived::Component { source, index } => {
                let v = self.vector(*source)?;
                match v.get(*index) {
                    Some(x) => *x,
                    None => {
                        return Err(ModelError::ComponentOutOfRange {
                            name: self.id_of(*source)?.name(),
                            index: *index,
                            len: v.len(),
                        })
                    }
                }
            }
            Derived::Remainder(rs) => {
                let mut others = Vec::with_capacity(rs.len());
                for r in rs {
                    others.push(self.value(*r, t)?);
                }
                remainder_share(&others)?
            }
            Derived::Logistic {
                min,
                max,
                slope,
                midpoint,
                t_start,
            } => {
                let lo = self.value(*min, t)?;
                let hi = self.value(*max, t)?;
                let b = self.value(*slope, t)?;
                let mid = self.value(*midpoint, t)?;
                lo + (hi - lo) / (1.0 + (-b * (t - t_start - mid)).exp())
            }
        })
    }

    /// Values of every scalar node at time `t`, keyed by display name.
    pub fn scalar_values(&self, t: f64) -> Result<Vec<(String, f64)>> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if matches!(entry.draw, Some(Draw::Vector(_))) {
                continue;
            }
            out.push((entry.id.name(), self.value(ParamRef(i), t)?));
        }
        Ok(out)
    }
}

/// Share left for the remainder slot: `1 - Σ others`, required to be in [0, 1].
pub fn remainder_share(others: &[f64]) -> Result<f64> {
    let mut sum = 0.0;
    for &v in others {
        if v < 0.0 {
            return Err(ModelError::NegativeShare { value: v });
        }
        sum += v;
    }
    if sum > 1.0 + SHARE_TOLERANCE {
        return Err(ModelError::ShareOverflow { sum });
    }
    Ok((1.0 - sum).max(0.0))
}
