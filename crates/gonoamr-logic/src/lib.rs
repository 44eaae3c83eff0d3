//! Model construction for a gonorrhea transmission model with antibiotic
//! resistance.
//!
//! This crate builds the state space of the model: resistance profiles,
//! population compartments, the clinical care cascade, the parameter graph
//! that feeds them, and the calibration and drug-switching metadata. It has
//! no simulation engine dependency. A built [`model::GonoModel`] is handed
//! to any [`model::EpidemicEngine`] in a single call.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`taxonomy`] | Symptom states, antibiotics, resistance profiles (u8 IDs) |
//! | [`indexer`] | Flat index ↔ (symptom, profile[, antibiotic]) bijection and labels |
//! | [`routing`] | Treatment-outcome lookup table and its exhaustiveness check |
//! | [`priors`] | Constant, uniform, Beta and Dirichlet priors |
//! | [`graph`] | Typed parameter DAG of leaf and derived nodes |
//! | [`params`] | Every model parameter, registered in dependency order |
//! | [`settings`] | Settings record, presets and validation |
//! | [`compartments`] | S, I(s,p) and F(s,p) pools |
//! | [`cascade`] | Chance nodes, epidemic events, seeded case walker |
//! | [`outputs`] | Summary and ratio time series |
//! | [`calibration`] | Survey sizes, feasible ranges, calibration targets |
//! | [`data`] | Survey estimates used as calibration targets |
//! | [`policy`] | CRO → M first-line switching rules and surveillance |
//! | [`scenarios`] | Rapid-test scenario catalogue and run names |
//! | [`model`] | Whole-model assembly and engine hand-off |
//! | [`error`] | Construction errors |

pub mod calibration;
pub mod cascade;
pub mod compartments;
pub mod data;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod model;
pub mod outputs;
pub mod params;
pub mod policy;
pub mod priors;
pub mod routing;
pub mod scenarios;
pub mod settings;
pub mod taxonomy;

pub use error::{ModelError, Result};
pub use model::{build_model, EpidemicEngine, GonoModel};
