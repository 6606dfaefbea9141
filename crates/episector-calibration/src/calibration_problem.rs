//! Calibration problem definition and implementation

use argmin::core::{CostFunction, Error};
use episector_core::{
    CompartmentState, ConfigError, ModelVariant, Parameters, SimulationEngine, Trajectory,
};
use log::debug;

use crate::error::CalibrationError;
use crate::types::{
    CalibrationParameter, FixedInputs, FreeParameter, InitialSeeds, LossConfig, LossKind,
    ObservedDay, TrackedField,
};

/// Maps a search vector onto a day-0 state and a parameter set.
///
/// The searched initial values (exposed, infected, unknown recovered) and the observed
/// ones (quarantined, recovered, deceased) are combined with the total population to
/// back-compute the susceptible pool, which is then split by the sector fractions.
#[derive(Debug, Clone)]
pub struct ParameterLayout {
    variant: ModelVariant,
    parameters: Vec<CalibrationParameter>,
    inputs: FixedInputs,
}

impl ParameterLayout {
    /// Every free parameter of `variant` must appear exactly once, in any order
    pub fn new(
        variant: ModelVariant,
        parameters: Vec<CalibrationParameter>,
        inputs: FixedInputs,
    ) -> Result<Self, CalibrationError> {
        inputs.validate()?;
        for parameter in &parameters {
            parameter.validate()?;
        }

        let expected = FreeParameter::for_variant(variant);
        let mut found: Vec<FreeParameter> = parameters.iter().map(|p| p.parameter).collect();
        found.sort();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        if found != expected_sorted {
            let join = |list: &[FreeParameter]| {
                list.iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(CalibrationError::ParameterLayout {
                variant,
                expected: join(&expected),
                found: join(&parameters.iter().map(|p| p.parameter).collect::<Vec<_>>()),
            });
        }

        Ok(Self {
            variant,
            parameters,
            inputs,
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn inputs(&self) -> &FixedInputs {
        &self.inputs
    }

    pub fn parameters(&self) -> &[CalibrationParameter] {
        &self.parameters
    }

    /// Get the number of parameters being calibrated
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name().to_string()).collect()
    }

    /// Get initial parameter values
    pub fn initial_values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.initial_value()).collect()
    }

    /// Get parameter bounds as (min, max) tuples
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.min_bound, p.max_bound))
            .collect()
    }

    /// Build the candidate model inputs.
    ///
    /// Returns `None` when the searched initial values exceed what the population leaves
    /// after the observed compartments, i.e. the susceptible pool would be negative.
    pub fn assemble(&self, values: &[f64]) -> Option<(CompartmentState, Parameters)> {
        let mut seeds = InitialSeeds::default();
        let mut parameters = Parameters {
            r_u: 0.0,
            quarantine: self.inputs.quarantine,
            ..Parameters::default()
        };
        for (value, parameter) in values.iter().zip(&self.parameters) {
            parameter.parameter.assign(*value, &mut seeds, &mut parameters);
        }

        let initial = self.inputs.initial_state(&seeds, self.variant)?;
        Some((initial, parameters))
    }
}

/// Calibration problem over any [`SimulationEngine`].
///
/// Simulated and observed days are paired by index: the engine runs for as many days as
/// there are observations, and both series skip the same leading offset.
///
/// ```rust,ignore
/// let problem = CalibrationProblem::new(
///     OdeSimulator::new(ModelVariant::Basic),
///     ground_truth,
///     CalibrationParameter::for_variant(ModelVariant::Basic, n, &guesses, &BoundsOverride::new()),
///     inputs,
///     LossConfig::default(),
/// )?;
/// let loss = problem.evaluate(&problem.layout().initial_values())?;
/// ```
pub struct CalibrationProblem<E: SimulationEngine> {
    engine: E,

    observed: Vec<ObservedDay>,

    layout: ParameterLayout,

    loss_config: LossConfig,

    /// Last simulated day, one less than the number of observations
    simulation_duration: u32,
}

impl<E: SimulationEngine> CalibrationProblem<E> {
    /// Create a new calibration problem
    ///
    /// # Errors
    ///
    /// Fails before any simulation if:
    /// - No observed data is provided, or a day lacks a quarantined or deceased count
    /// - An observed count is negative or non-finite
    /// - The loss offset skips every observation, or a loss weight is negative
    /// - The parameters do not cover the engine's model variant, or a bound or guess is invalid
    /// - The fixed inputs (population, sector fractions, observed initial values) are invalid
    pub fn new(
        engine: E,
        observed: Vec<ObservedDay>,
        parameters: Vec<CalibrationParameter>,
        inputs: FixedInputs,
        loss_config: LossConfig,
    ) -> Result<Self, CalibrationError> {
        validate_observations(&observed)?;
        validate_loss_config(&loss_config, observed.len())?;
        let layout = ParameterLayout::new(engine.variant(), parameters, inputs)?;

        let simulation_duration = u32::try_from(observed.len() - 1).map_err(|_| {
            ConfigError::InvalidValue {
                name: "observed_days".to_string(),
                value: observed.len() as f64,
            }
        })?;

        Ok(Self {
            engine,
            observed,
            layout,
            loss_config,
            simulation_duration,
        })
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn loss_config(&self) -> &LossConfig {
        &self.loss_config
    }

    pub fn simulation_duration(&self) -> u32 {
        self.simulation_duration
    }

    /// Simulate a candidate; `Ok(None)` if it leaves no room for susceptibles
    pub fn simulate_candidate(
        &self,
        values: &[f64],
    ) -> Result<Option<Trajectory>, CalibrationError> {
        self.validate_parameter_count(values)?;
        let Some((initial, parameters)) = self.layout.assemble(values) else {
            return Ok(None);
        };
        let trajectory = self
            .engine
            .simulate(&initial, &parameters, self.simulation_duration)?;
        Ok(Some(trajectory))
    }

    /// Loss of a candidate; infinite for infeasible initial values
    pub fn evaluate(&self, values: &[f64]) -> Result<f64, CalibrationError> {
        Ok(self
            .simulate_candidate(values)?
            .map_or(f64::INFINITY, |trajectory| self.calculate_loss(&trajectory)))
    }

    /// Calculate loss between a simulated trajectory and the observed data
    pub fn calculate_loss(&self, trajectory: &Trajectory) -> f64 {
        let mut errors = [0.0; TrackedField::ALL.len()];
        let mut count = 0usize;

        for (observed, simulated) in self
            .observed
            .iter()
            .zip(trajectory.iter())
            .skip(self.loss_config.offset)
        {
            for (error, field) in errors.iter_mut().zip(TrackedField::ALL) {
                // presence checked in `new`
                let diff = field.observed(observed).unwrap_or(0.0) - field.simulated(simulated);
                *error += match self.loss_config.kind {
                    LossKind::WeightedMeanAbsoluteError => diff.abs(),
                    LossKind::SumSquaredError => diff * diff,
                };
            }
            count += 1;
        }

        if count == 0 {
            return 0.0;
        }

        errors
            .iter()
            .zip(TrackedField::ALL)
            .map(|(error, field)| {
                let weighted = self.loss_config.weight(field) * error;
                match self.loss_config.kind {
                    LossKind::WeightedMeanAbsoluteError => weighted / count as f64,
                    LossKind::SumSquaredError => weighted,
                }
            })
            .sum()
    }

    /// Validate parameter vector length
    fn validate_parameter_count(&self, values: &[f64]) -> Result<(), CalibrationError> {
        if values.len() != self.layout.len() {
            return Err(CalibrationError::Optimization(format!(
                "Expected {} parameters, got {}",
                self.layout.len(),
                values.len()
            )));
        }
        Ok(())
    }
}

fn validate_observations(observed: &[ObservedDay]) -> Result<(), ConfigError> {
    if observed.is_empty() {
        return Err(ConfigError::NoObservedData);
    }
    for (day, record) in observed.iter().enumerate() {
        for field in TrackedField::ALL {
            let value = field.observed(record).ok_or(ConfigError::MissingField {
                day,
                field: field.name(),
            })?;
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    name: format!("{}[{}]", field.name(), day),
                    value,
                });
            }
        }
    }
    Ok(())
}

fn validate_loss_config(config: &LossConfig, observed_days: usize) -> Result<(), ConfigError> {
    if config.offset >= observed_days {
        return Err(ConfigError::InvalidValue {
            name: "loss_offset".to_string(),
            value: config.offset as f64,
        });
    }
    for field in TrackedField::ALL {
        let weight = config.weight(field);
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(ConfigError::InvalidValue {
                name: format!("{}_weight", field.name()),
                value: weight,
            });
        }
    }
    Ok(())
}

/// Implement argmin's CostFunction trait
///
/// Candidates are evaluated as given; keeping them inside their bounds is the optimizer's job.
/// A candidate the engine fails to simulate costs `+inf`, like an infeasible one, so the
/// search moves away from it instead of stopping.
impl<E: SimulationEngine> CostFunction for CalibrationProblem<E> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param_values: &Self::Param) -> Result<Self::Output, Error> {
        match self.evaluate(param_values) {
            Err(CalibrationError::Simulation(error)) => {
                debug!("Candidate rejected: {error}");
                Ok(f64::INFINITY)
            }
            result => result.map_err(Error::new),
        }
    }
}
