//! Error types for model construction.
//!
//! Every error here is a construction-time defect: the build that raised it
//! is aborted. Statistical infeasibility of a simulated trial is not an
//! error and never appears here; it is carried as feasible-range metadata
//! on the ratio time series (see [`crate::calibration`]).

use thiserror::Error;

/// Errors raised while building a model graph.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Index {index} is out of range for {what} (length {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Unknown {what} id {value}")]
    UnknownTaxonomyValue { what: &'static str, value: u8 },

    #[error("Antibiotic dimension required by this indexer but not supplied")]
    MissingAntibiotic,

    #[error("Antibiotic supplied to an indexer that has no antibiotic dimension")]
    UnexpectedAntibiotic,

    #[error("Routing defect for {profile} treated with {antibiotic}: {reason}")]
    RoutingDefect {
        profile: String,
        antibiotic: String,
        reason: String,
    },

    #[error("Parameter '{name}' is already registered")]
    DuplicateParameter { name: String },

    #[error("Parameter '{name}' is not registered")]
    UnknownParameter { name: String },

    #[error("Parameter '{name}' was evaluated before it was sampled")]
    ParameterNotSampled { name: String },

    #[error("Parameter '{name}' is multivariate and has no scalar value")]
    NotScalar { name: String },

    #[error("Component {index} requested from multivariate parameter '{name}' of length {len}")]
    ComponentOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid prior for '{name}': {reason}")]
    InvalidPrior { name: String, reason: String },

    #[error("Resistance profile shares sum to {sum}, which exceeds 1")]
    ShareOverflow { sum: f64 },

    #[error("Resistance profile share {value} is negative")]
    NegativeShare { value: f64 },

    #[error("Chance node '{node}' has branch probability {value} outside [0, 1]")]
    InvalidProbability { node: String, value: f64 },

    #[error("'{owner}' points at {target}, which has not been constructed yet")]
    DanglingDestination { owner: String, target: String },

    #[error("Confidence interval [{lower}, {upper}] has no positive half-width")]
    InvalidConfidenceInterval { lower: f64, upper: f64 },

    #[error("Invalid settings: {reasons:?}")]
    InvalidSettings { reasons: Vec<String> },

    #[error("Settings could not be parsed: {0}")]
    SettingsParse(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::SettingsParse(err.to_string())
    }
}

/// Result alias for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;
