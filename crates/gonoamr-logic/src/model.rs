//! Model assembly and hand-off to a simulation engine.
//!
//! [`build_model`] constructs the whole graph for one trial in dependency
//! order: parameters, compartments, chance nodes, output series,
//! calibration bindings and the switching policy. The result is handed to
//! an engine exactly once through [`GonoModel::hand_off`].

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::calibration::bind_calibration;
use crate::cascade::Cascade;
use crate::compartments::CompartmentNetwork;
use crate::error::Result;
use crate::outputs::Outputs;
use crate::params::Parameters;
use crate::policy::DrugSwitchPolicy;
use crate::routing::verify_routing_table;
use crate::settings::ModelSettings;

/// Everything an engine needs to simulate one trial.
#[derive(Debug, Clone)]
pub struct GonoModel {
    pub settings: ModelSettings,
    pub seed: u64,
    pub parameters: Parameters,
    pub compartments: CompartmentNetwork,
    pub cascade: Cascade,
    pub outputs: Outputs,
    pub policy: DrugSwitchPolicy,
}

/// A discrete-event engine that executes a built model.
pub trait EpidemicEngine {
    type Error;

    fn populate(&mut self, model: GonoModel) -> std::result::Result<(), Self::Error>;
}

/// Build the model of one trial. Deterministic in `(settings, seed)`.
pub fn build_model(settings: &ModelSettings, seed: u64) -> Result<GonoModel> {
    let settings = settings.clone().validated()?;
    verify_routing_table()?;

    let mut parameters = Parameters::build(&settings)?;
    let mut rng = StdRng::seed_from_u64(seed);
    parameters.sample(&mut rng)?;

    let collect = settings.collect_compartment_trajectories;
    let mut compartments = CompartmentNetwork::build(&parameters, collect)?;
    let cascade = Cascade::build(&parameters, &mut compartments, collect)?;
    cascade.verify_probabilities(&parameters, 0.0)?;
    cascade.verify_probabilities(&parameters, settings.end_of_warm_up)?;

    let mut outputs = Outputs::build(&parameters, &compartments, &cascade)?;
    bind_calibration(&mut outputs, &settings)?;
    let policy = DrugSwitchPolicy::build(&settings, outputs.ratio.perc_cro_ns);

    log::info!(
        "built model (seed {seed}): {} parameters, {} compartments, {} chance nodes",
        parameters.graph().len(),
        compartments.len(),
        cascade.nodes().len()
    );
    Ok(GonoModel {
        settings,
        seed,
        parameters,
        compartments,
        cascade,
        outputs,
        policy,
    })
}

impl GonoModel {
    /// Give the whole model to `engine`.
    pub fn hand_off<E: EpidemicEngine>(self, engine: &mut E) -> std::result::Result<(), E::Error> {
        log::debug!("handing model (seed {}) to engine", self.seed);
        engine.populate(self)
    }

    pub fn initial_sizes(&self) -> Result<Vec<f64>> {
        self.compartments.initial_sizes(&self.parameters)
    }

    /// Branch probabilities of every chance node at time `t`.
    pub fn chance_node_probabilities(&self, t: f64) -> Result<Vec<[f64; 2]>> {
        self.cascade
            .nodes()
            .iter()
            .map(|n| n.probabilities(&self.parameters, t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    struct Recorder {
        models: Vec<GonoModel>,
    }

    impl EpidemicEngine for Recorder {
        type Error = String;

        fn populate(&mut self, model: GonoModel) -> std::result::Result<(), String> {
            self.models.push(model);
            Ok(())
        }
    }

    #[test]
    fn test_build_and_hand_off() {
        let model = build_model(&ModelSettings::default(), 1).unwrap();
        let mut engine = Recorder { models: Vec::new() };
        model.hand_off(&mut engine).unwrap();
        assert_eq!(engine.models.len(), 1);
        assert_eq!(engine.models[0].compartments.len(), 33);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut s = ModelSettings::default();
        s.delta_t = 0.0;
        assert!(matches!(
            build_model(&s, 1),
            Err(ModelError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_calibration_build_has_targets() {
        let model = build_model(&ModelSettings::calibration(), 2).unwrap();
        let prev = model.outputs.ratio_series(model.outputs.ratio.prevalence);
        assert_eq!(prev.targets.len(), 6);
        let proj = build_model(&ModelSettings::default(), 2).unwrap();
        assert!(proj
            .outputs
            .ratio_series(proj.outputs.ratio.prevalence)
            .targets
            .is_empty());
    }
}
