//! Type definitions for calibration

use std::collections::{BTreeMap, HashMap};

use episector_core::{
    CompartmentState, ConfigError, ModelVariant, Parameters, QuarantineSchedule, Sector,
    SectorFractions, SimulationEngine, SimulationError, Snapshot, Trajectory,
};
use serde::{Deserialize, Serialize};

/// Type of value being calibrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationParameterType {
    /// Model parameter (e.g., gamma, alpha)
    Parameter,
    /// Initial population in a compartment (e.g., initial infected)
    InitialCondition,
}

/// A value searched by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeParameter {
    ExposedInitial,
    InfectedInitial,
    UnknownRecoveredInitial,
    Gamma,
    MGammaReduction1,
    EGammaReduction1,
    OGammaReduction1,
    MGammaReduction2,
    EGammaReduction2,
    OGammaReduction2,
    Alpha,
    Delta,
    Sigma,
    RI,
    RU,
    RQ,
    DI,
    DQ,
}

impl FreeParameter {
    const ALL: [FreeParameter; 18] = [
        FreeParameter::ExposedInitial,
        FreeParameter::InfectedInitial,
        FreeParameter::UnknownRecoveredInitial,
        FreeParameter::Gamma,
        FreeParameter::MGammaReduction1,
        FreeParameter::EGammaReduction1,
        FreeParameter::OGammaReduction1,
        FreeParameter::MGammaReduction2,
        FreeParameter::EGammaReduction2,
        FreeParameter::OGammaReduction2,
        FreeParameter::Alpha,
        FreeParameter::Delta,
        FreeParameter::Sigma,
        FreeParameter::RI,
        FreeParameter::RU,
        FreeParameter::RQ,
        FreeParameter::DI,
        FreeParameter::DQ,
    ];

    /// Search vector layout for a model variant: 16 entries for the basic model, 18 otherwise
    pub fn for_variant(variant: ModelVariant) -> Vec<FreeParameter> {
        FreeParameter::ALL
            .into_iter()
            .filter(|parameter| {
                variant.tracks_unknown_recovered() || !parameter.needs_unknown_recovered()
            })
            .collect()
    }

    fn needs_unknown_recovered(self) -> bool {
        matches!(
            self,
            FreeParameter::UnknownRecoveredInitial | FreeParameter::RU
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FreeParameter::ExposedInitial => "exposed_initial",
            FreeParameter::InfectedInitial => "infected_initial",
            FreeParameter::UnknownRecoveredInitial => "unknown_recovered_initial",
            FreeParameter::Gamma => "gamma",
            FreeParameter::MGammaReduction1 => "m_gamma_reduction_1",
            FreeParameter::EGammaReduction1 => "e_gamma_reduction_1",
            FreeParameter::OGammaReduction1 => "o_gamma_reduction_1",
            FreeParameter::MGammaReduction2 => "m_gamma_reduction_2",
            FreeParameter::EGammaReduction2 => "e_gamma_reduction_2",
            FreeParameter::OGammaReduction2 => "o_gamma_reduction_2",
            FreeParameter::Alpha => "alpha",
            FreeParameter::Delta => "delta",
            FreeParameter::Sigma => "sigma",
            FreeParameter::RI => "r_i",
            FreeParameter::RU => "r_u",
            FreeParameter::RQ => "r_q",
            FreeParameter::DI => "d_i",
            FreeParameter::DQ => "d_q",
        }
    }

    pub fn parameter_type(self) -> CalibrationParameterType {
        match self {
            FreeParameter::ExposedInitial
            | FreeParameter::InfectedInitial
            | FreeParameter::UnknownRecoveredInitial => CalibrationParameterType::InitialCondition,
            _ => CalibrationParameterType::Parameter,
        }
    }

    /// Search interval used when the caller does not override it
    pub fn default_bounds(self, total_population: f64) -> (f64, f64) {
        match self {
            FreeParameter::ExposedInitial
            | FreeParameter::InfectedInitial
            | FreeParameter::UnknownRecoveredInitial => (0.0, total_population),
            FreeParameter::Gamma => (0.0, 10.0),
            FreeParameter::MGammaReduction1
            | FreeParameter::EGammaReduction1
            | FreeParameter::OGammaReduction1
            | FreeParameter::MGammaReduction2
            | FreeParameter::EGammaReduction2
            | FreeParameter::OGammaReduction2 => (1.0, 100.0),
            FreeParameter::Alpha
            | FreeParameter::Delta
            | FreeParameter::Sigma
            | FreeParameter::RI
            | FreeParameter::RU
            | FreeParameter::RQ
            | FreeParameter::DI
            | FreeParameter::DQ => (0.0, 1.0),
        }
    }

    /// Write `value` into the candidate this parameter belongs to
    pub(crate) fn assign(self, value: f64, seeds: &mut InitialSeeds, parameters: &mut Parameters) {
        match self {
            FreeParameter::ExposedInitial => seeds.exposed = value,
            FreeParameter::InfectedInitial => seeds.infected = value,
            FreeParameter::UnknownRecoveredInitial => seeds.unknown_recovered = value,
            FreeParameter::Gamma => parameters.gamma = value,
            FreeParameter::MGammaReduction1 => parameters.medical.phase_1 = value,
            FreeParameter::EGammaReduction1 => parameters.essential.phase_1 = value,
            FreeParameter::OGammaReduction1 => parameters.other.phase_1 = value,
            FreeParameter::MGammaReduction2 => parameters.medical.phase_2 = value,
            FreeParameter::EGammaReduction2 => parameters.essential.phase_2 = value,
            FreeParameter::OGammaReduction2 => parameters.other.phase_2 = value,
            FreeParameter::Alpha => parameters.alpha = value,
            FreeParameter::Delta => parameters.delta = value,
            FreeParameter::Sigma => parameters.sigma = value,
            FreeParameter::RI => parameters.r_i = value,
            FreeParameter::RU => parameters.r_u = value,
            FreeParameter::RQ => parameters.r_q = value,
            FreeParameter::DI => parameters.d_i = value,
            FreeParameter::DQ => parameters.d_q = value,
        }
    }
}

impl std::fmt::Display for FreeParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Initial values of the compartments that are searched rather than observed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct InitialSeeds {
    pub exposed: f64,
    pub infected: f64,
    pub unknown_recovered: f64,
}

/// Starting point of the search, one value per free parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGuesses {
    pub exposed_initial: f64,
    pub infected_initial: f64,
    pub unknown_recovered_initial: f64,
    pub gamma: f64,
    pub m_gamma_reduction_1: f64,
    pub e_gamma_reduction_1: f64,
    pub o_gamma_reduction_1: f64,
    pub m_gamma_reduction_2: f64,
    pub e_gamma_reduction_2: f64,
    pub o_gamma_reduction_2: f64,
    pub alpha: f64,
    pub delta: f64,
    pub sigma: f64,
    pub r_i: f64,
    pub r_u: f64,
    pub r_q: f64,
    pub d_i: f64,
    pub d_q: f64,
}

impl Default for ParameterGuesses {
    fn default() -> Self {
        Self {
            exposed_initial: 1.0,
            infected_initial: 0.0,
            unknown_recovered_initial: 0.0,
            gamma: 1.0,
            m_gamma_reduction_1: 1.0,
            e_gamma_reduction_1: 1.0,
            o_gamma_reduction_1: 1.0,
            m_gamma_reduction_2: 1.0,
            e_gamma_reduction_2: 1.0,
            o_gamma_reduction_2: 1.0,
            alpha: 0.5,
            delta: 0.0,
            sigma: 0.9,
            r_i: 0.9,
            r_u: 0.1,
            r_q: 0.7,
            d_i: 0.0,
            d_q: 0.034,
        }
    }
}

impl ParameterGuesses {
    /// Guesses taken from a known parameter set and initial state
    pub fn from_parameters(parameters: &Parameters, initial: &CompartmentState) -> Self {
        Self {
            exposed_initial: initial.exposed,
            infected_initial: initial.infected,
            unknown_recovered_initial: initial.unknown_recovered,
            gamma: parameters.gamma,
            m_gamma_reduction_1: parameters.medical.phase_1,
            e_gamma_reduction_1: parameters.essential.phase_1,
            o_gamma_reduction_1: parameters.other.phase_1,
            m_gamma_reduction_2: parameters.medical.phase_2,
            e_gamma_reduction_2: parameters.essential.phase_2,
            o_gamma_reduction_2: parameters.other.phase_2,
            alpha: parameters.alpha,
            delta: parameters.delta,
            sigma: parameters.sigma,
            r_i: parameters.r_i,
            r_u: parameters.r_u,
            r_q: parameters.r_q,
            d_i: parameters.d_i,
            d_q: parameters.d_q,
        }
    }

    pub fn get(&self, parameter: FreeParameter) -> f64 {
        match parameter {
            FreeParameter::ExposedInitial => self.exposed_initial,
            FreeParameter::InfectedInitial => self.infected_initial,
            FreeParameter::UnknownRecoveredInitial => self.unknown_recovered_initial,
            FreeParameter::Gamma => self.gamma,
            FreeParameter::MGammaReduction1 => self.m_gamma_reduction_1,
            FreeParameter::EGammaReduction1 => self.e_gamma_reduction_1,
            FreeParameter::OGammaReduction1 => self.o_gamma_reduction_1,
            FreeParameter::MGammaReduction2 => self.m_gamma_reduction_2,
            FreeParameter::EGammaReduction2 => self.e_gamma_reduction_2,
            FreeParameter::OGammaReduction2 => self.o_gamma_reduction_2,
            FreeParameter::Alpha => self.alpha,
            FreeParameter::Delta => self.delta,
            FreeParameter::Sigma => self.sigma,
            FreeParameter::RI => self.r_i,
            FreeParameter::RU => self.r_u,
            FreeParameter::RQ => self.r_q,
            FreeParameter::DI => self.d_i,
            FreeParameter::DQ => self.d_q,
        }
    }
}

/// Per-parameter search intervals replacing the defaults
pub type BoundsOverride = HashMap<FreeParameter, (f64, f64)>;

/// Parameter to be calibrated with its bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationParameter {
    pub parameter: FreeParameter,

    /// Minimum allowed value
    pub min_bound: f64,

    /// Maximum allowed value
    pub max_bound: f64,

    /// Optional initial guess (if None, will use midpoint of bounds)
    pub initial_guess: Option<f64>,
}

impl CalibrationParameter {
    pub fn new(parameter: FreeParameter, min_bound: f64, max_bound: f64) -> Self {
        Self {
            parameter,
            min_bound,
            max_bound,
            initial_guess: None,
        }
    }

    pub fn with_initial_guess(
        parameter: FreeParameter,
        min_bound: f64,
        max_bound: f64,
        initial_guess: f64,
    ) -> Self {
        Self {
            parameter,
            min_bound,
            max_bound,
            initial_guess: Some(initial_guess),
        }
    }

    /// Build the full search layout for a variant from guesses and optional bound overrides
    pub fn for_variant(
        variant: ModelVariant,
        total_population: f64,
        guesses: &ParameterGuesses,
        bounds_override: &BoundsOverride,
    ) -> Vec<Self> {
        FreeParameter::for_variant(variant)
            .into_iter()
            .map(|parameter| {
                let (min_bound, max_bound) = bounds_override
                    .get(&parameter)
                    .copied()
                    .unwrap_or_else(|| parameter.default_bounds(total_population));
                Self::with_initial_guess(parameter, min_bound, max_bound, guesses.get(parameter))
            })
            .collect()
    }

    pub fn name(&self) -> &'static str {
        self.parameter.name()
    }

    /// Get the initial value, or midpoint of bounds if not specified
    pub fn initial_value(&self) -> f64 {
        self.initial_guess
            .unwrap_or_else(|| (self.min_bound + self.max_bound) / 2.0)
    }

    /// Check if a value is within the parameter bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min_bound && value <= self.max_bound
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_bound.is_finite()
            && self.max_bound.is_finite()
            && self.min_bound <= self.max_bound)
        {
            return Err(ConfigError::InvalidBounds {
                name: self.name().to_string(),
                lower: self.min_bound,
                upper: self.max_bound,
            });
        }
        let value = self.initial_value();
        if !self.is_within_bounds(value) {
            return Err(ConfigError::GuessOutOfBounds {
                name: self.name().to_string(),
                value,
                lower: self.min_bound,
                upper: self.max_bound,
            });
        }
        Ok(())
    }
}

/// One day of ground truth. Only `quarantined` and `deceased` are fitted against
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedDay {
    #[serde(default, alias = "hospitalized")]
    pub quarantined: Option<f64>,

    #[serde(default)]
    pub deceased: Option<f64>,

    /// Case counts are unreliable and never enter the loss
    #[serde(default)]
    pub infected: Option<f64>,

    #[serde(default)]
    pub recovered: Option<f64>,
}

impl ObservedDay {
    pub fn new(quarantined: f64, deceased: f64) -> Self {
        Self {
            quarantined: Some(quarantined),
            deceased: Some(deceased),
            ..Default::default()
        }
    }

    /// Observation matching a simulated day
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            quarantined: Some(snapshot.quarantined),
            deceased: Some(snapshot.deceased),
            infected: Some(snapshot.infected),
            recovered: Some(snapshot.recovered),
        }
    }
}

/// Quantities compared between simulation and observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackedField {
    Quarantined,
    Deceased,
}

impl TrackedField {
    pub const ALL: [TrackedField; 2] = [TrackedField::Quarantined, TrackedField::Deceased];

    pub fn name(self) -> &'static str {
        match self {
            TrackedField::Quarantined => "quarantined",
            TrackedField::Deceased => "deceased",
        }
    }

    pub fn observed(self, day: &ObservedDay) -> Option<f64> {
        match self {
            TrackedField::Quarantined => day.quarantined,
            TrackedField::Deceased => day.deceased,
        }
    }

    pub fn simulated(self, snapshot: &Snapshot) -> f64 {
        match self {
            TrackedField::Quarantined => snapshot.quarantined,
            TrackedField::Deceased => snapshot.deceased,
        }
    }
}

/// Day-0 values of compartments that are observed instead of fitted
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FixedInitialValues {
    pub quarantined: f64,
    pub recovered: f64,
    pub deceased: f64,
}

impl FixedInitialValues {
    pub fn new(quarantined: f64, recovered: f64, deceased: f64) -> Self {
        Self {
            quarantined,
            recovered,
            deceased,
        }
    }

    /// Missing fields count as zero
    pub fn from_observation(day: &ObservedDay) -> Self {
        Self::new(
            day.quarantined.unwrap_or(0.0),
            day.recovered.unwrap_or(0.0),
            day.deceased.unwrap_or(0.0),
        )
    }

    pub fn total(&self) -> f64 {
        self.quarantined + self.recovered + self.deceased
    }
}

/// Loss function family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LossKind {
    /// Per channel: sum(weight * abs(observed - predicted)) / n
    #[default]
    WeightedMeanAbsoluteError,

    /// Per channel: sum(weight * (observed - predicted) ** 2)
    SumSquaredError,
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossKind::WeightedMeanAbsoluteError => write!(f, "Weighted Mean Absolute Error"),
            LossKind::SumSquaredError => write!(f, "Sum Squared Error"),
        }
    }
}

/// Configuration for loss function calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    pub kind: LossKind,

    pub quarantined_weight: f64,

    /// Deaths are the least noisy observation and weigh the most
    pub deceased_weight: f64,

    /// Leading days skipped in both series
    pub offset: usize,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            kind: LossKind::default(),
            quarantined_weight: 1.0,
            deceased_weight: 10.0,
            offset: 0,
        }
    }
}

impl LossConfig {
    pub fn with_kind(mut self, kind: LossKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_weights(mut self, quarantined: f64, deceased: f64) -> Self {
        self.quarantined_weight = quarantined;
        self.deceased_weight = deceased;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn weight(&self, field: TrackedField) -> f64 {
        match field {
            TrackedField::Quarantined => self.quarantined_weight,
            TrackedField::Deceased => self.deceased_weight,
        }
    }
}

/// Result from a calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Best parameter values found
    pub best_parameters: Vec<f64>,

    /// Parameter names (in same order as best_parameters)
    pub parameter_names: Vec<String>,

    /// Final loss value achieved
    pub final_loss: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Whether the solver met its convergence criterion (false when the iteration cap was hit)
    pub converged: bool,

    /// Termination reason
    pub termination_reason: String,
}

impl CalibrationResult {
    /// Get parameters as a HashMap for easy lookup
    pub fn parameters_map(&self) -> HashMap<String, f64> {
        self.parameter_names
            .iter()
            .zip(self.best_parameters.iter())
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}

/// Best-fit parameters and the day-0 state they imply, ready to be fed back into a simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameterSet {
    pub variant: ModelVariant,
    pub parameters: Parameters,
    pub initial_state: CompartmentState,
    pub loss: f64,
    pub converged: bool,
    pub iterations: usize,
    pub termination_reason: String,
}

impl FittedParameterSet {
    pub fn quarantine(&self) -> &QuarantineSchedule {
        &self.parameters.quarantine
    }

    /// Project the fitted epidemic forward
    pub fn simulate<E: SimulationEngine>(
        &self,
        engine: &E,
        simulation_duration: u32,
    ) -> Result<Trajectory, SimulationError> {
        engine.simulate(&self.initial_state, &self.parameters, simulation_duration)
    }

    /// Flat `name -> value` view of every fitted, derived and pass-through scalar
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let p = &self.parameters;
        let s = &self.initial_state;
        let mut map = BTreeMap::new();
        let mut insert = |name: &str, value: f64| {
            map.insert(name.to_string(), value);
        };

        insert("susceptible_medical_initial", s.susceptible_medical);
        insert("susceptible_essential_initial", s.susceptible_essential);
        insert("susceptible_other_initial", s.susceptible_other);
        insert("exposed_initial", s.exposed);
        insert("infected_initial", s.infected);
        insert("quarantined_initial", s.quarantined);
        insert("recovered_initial", s.recovered);
        insert("deceased_initial", s.deceased);

        insert("gamma", p.gamma);
        for sector in Sector::ALL {
            let reductions = p.reductions(sector);
            insert(
                &format!("{}_gamma_reduction_1", sector.prefix()),
                reductions.phase_1,
            );
            insert(
                &format!("{}_gamma_reduction_2", sector.prefix()),
                reductions.phase_2,
            );
        }
        insert("alpha", p.alpha);
        insert("delta", p.delta);
        insert("sigma", p.sigma);
        insert("r_i", p.r_i);
        insert("r_q", p.r_q);
        insert("d_i", p.d_i);
        insert("d_q", p.d_q);
        if self.variant.tracks_unknown_recovered() {
            insert("unknown_recovered_initial", s.unknown_recovered);
            insert("r_u", p.r_u);
        }

        insert("quarantine_start", p.quarantine.start);
        insert("quarantine_1_duration", p.quarantine.phase_1_duration);
        insert("quarantine_2_duration", p.quarantine.phase_2_duration);
        map
    }
}

/// Everything about the population that the search does not touch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedInputs {
    pub total_population: f64,
    pub sector_fractions: SectorFractions,
    pub fixed_initial: FixedInitialValues,
    pub quarantine: QuarantineSchedule,
}

impl FixedInputs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.total_population.is_finite() && self.total_population > 0.0) {
            return Err(ConfigError::NonPositivePopulation(self.total_population));
        }
        self.sector_fractions.validate()?;
        for (name, value) in [
            ("initial_quarantined", self.fixed_initial.quarantined),
            ("initial_recovered", self.fixed_initial.recovered),
            ("initial_deceased", self.fixed_initial.deceased),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    value,
                });
            }
        }
        if self.fixed_initial.total() > self.total_population {
            return Err(ConfigError::InfeasibleInitialValues {
                fixed: self.fixed_initial.total(),
                total: self.total_population,
            });
        }
        self.quarantine.validate()
    }

    /// Day-0 state implied by searched seeds; `None` if the seeds leave no room for susceptibles
    pub(crate) fn initial_state(
        &self,
        seeds: &InitialSeeds,
        variant: ModelVariant,
    ) -> Option<CompartmentState> {
        let unknown_recovered = if variant.tracks_unknown_recovered() {
            seeds.unknown_recovered
        } else {
            0.0
        };
        let susceptible = self.total_population
            - seeds.exposed
            - seeds.infected
            - unknown_recovered
            - self.fixed_initial.total();
        if susceptible < 0.0 {
            return None;
        }

        let (susceptible_medical, susceptible_essential, susceptible_other) =
            self.sector_fractions.split(susceptible);
        Some(CompartmentState {
            susceptible_medical,
            susceptible_essential,
            susceptible_other,
            exposed: seeds.exposed,
            infected: seeds.infected,
            quarantined: self.fixed_initial.quarantined,
            recovered: self.fixed_initial.recovered,
            unknown_recovered,
            deceased: self.fixed_initial.deceased,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_dimensions() {
        let basic = FreeParameter::for_variant(ModelVariant::Basic);
        let full = FreeParameter::for_variant(ModelVariant::WithUnknownRecovered);
        assert_eq!(basic.len(), 16);
        assert_eq!(full.len(), 18);
        assert!(!basic.contains(&FreeParameter::RU));
        assert_eq!(full[0], FreeParameter::ExposedInitial);
    }

    #[test]
    fn test_default_bounds() {
        assert_eq!(FreeParameter::InfectedInitial.default_bounds(5e4), (0.0, 5e4));
        assert_eq!(FreeParameter::Gamma.default_bounds(5e4), (0.0, 10.0));
        assert_eq!(FreeParameter::OGammaReduction2.default_bounds(5e4), (1.0, 100.0));
        assert_eq!(FreeParameter::DQ.default_bounds(5e4), (0.0, 1.0));
        assert_eq!(
            FreeParameter::ExposedInitial.parameter_type(),
            CalibrationParameterType::InitialCondition
        );
    }

    #[test]
    fn test_layout_uses_overrides_and_guesses() {
        let mut bounds = BoundsOverride::new();
        bounds.insert(FreeParameter::Gamma, (0.5, 3.0));
        let guesses = ParameterGuesses {
            gamma: 2.0,
            ..Default::default()
        };
        let layout =
            CalibrationParameter::for_variant(ModelVariant::Basic, 1000.0, &guesses, &bounds);
        let gamma = layout
            .iter()
            .find(|p| p.parameter == FreeParameter::Gamma)
            .unwrap();
        assert_eq!((gamma.min_bound, gamma.max_bound), (0.5, 3.0));
        assert_eq!(gamma.initial_value(), 2.0);
        assert!(layout.iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn test_parameter_validation() {
        let inverted = CalibrationParameter::new(FreeParameter::Alpha, 1.0, 0.0);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));

        let outside = CalibrationParameter::with_initial_guess(FreeParameter::Alpha, 0.0, 1.0, 2.0);
        assert!(matches!(
            outside.validate(),
            Err(ConfigError::GuessOutOfBounds { .. })
        ));

        let midpoint = CalibrationParameter::new(FreeParameter::Gamma, 0.0, 10.0);
        assert_eq!(midpoint.initial_value(), 5.0);
    }

    #[test]
    fn test_observed_day_accepts_hospitalized_alias() {
        let day: ObservedDay =
            serde_json::from_str(r#"{"hospitalized": 12, "deceased": 3, "infected": 40}"#)
                .unwrap();
        assert_eq!(day.quarantined, Some(12.0));
        assert_eq!(day.deceased, Some(3.0));

        let partial: ObservedDay = serde_json::from_str(r#"{"deceased": 1}"#).unwrap();
        assert_eq!(partial.quarantined, None);
    }

    #[test]
    fn test_guesses_fill_missing_fields_with_defaults() {
        let guesses: ParameterGuesses = serde_json::from_str(r#"{"gamma": 3.5}"#).unwrap();
        assert_eq!(guesses.gamma, 3.5);
        assert_eq!(guesses.sigma, 0.9);
        assert_eq!(guesses.d_q, 0.034);
    }

    #[test]
    fn test_fixed_inputs_initial_state_conserves_population() {
        let inputs = FixedInputs {
            total_population: 10_000.0,
            sector_fractions: SectorFractions::new(0.1, 0.2, 0.7),
            fixed_initial: FixedInitialValues::new(5.0, 2.0, 1.0),
            quarantine: QuarantineSchedule::default(),
        };
        let seeds = InitialSeeds {
            exposed: 30.0,
            infected: 12.0,
            unknown_recovered: 4.0,
        };

        let full = inputs
            .initial_state(&seeds, ModelVariant::WithUnknownRecovered)
            .unwrap();
        assert_relative_eq!(full.total(), 10_000.0);
        assert_relative_eq!(full.susceptible(), 10_000.0 - 30.0 - 12.0 - 4.0 - 8.0);
        assert_relative_eq!(full.susceptible_medical, 0.1 * full.susceptible());

        let basic = inputs.initial_state(&seeds, ModelVariant::Basic).unwrap();
        assert_eq!(basic.unknown_recovered, 0.0);
        assert_relative_eq!(basic.total(), 10_000.0);

        let crowded = InitialSeeds {
            exposed: 9_000.0,
            infected: 1_000.0,
            unknown_recovered: 0.0,
        };
        assert!(inputs.initial_state(&crowded, ModelVariant::Basic).is_none());
    }

    #[test]
    fn test_fixed_inputs_validation() {
        let inputs = FixedInputs {
            total_population: 100.0,
            sector_fractions: SectorFractions::default(),
            fixed_initial: FixedInitialValues::new(60.0, 30.0, 20.0),
            quarantine: QuarantineSchedule::default(),
        };
        assert!(matches!(
            inputs.validate(),
            Err(ConfigError::InfeasibleInitialValues { .. })
        ));

        let empty = FixedInputs {
            total_population: 0.0,
            ..inputs
        };
        assert_eq!(empty.validate(), Err(ConfigError::NonPositivePopulation(0.0)));
    }

    #[test]
    fn test_flat_map_contents() {
        let fitted = FittedParameterSet {
            variant: ModelVariant::Basic,
            parameters: Parameters {
                quarantine: QuarantineSchedule::new(20.0, 10.0, 5.0),
                ..Default::default()
            },
            initial_state: CompartmentState {
                susceptible_other: 99.0,
                infected: 1.0,
                ..Default::default()
            },
            loss: 0.5,
            converged: true,
            iterations: 3,
            termination_reason: "SolverConverged".to_string(),
        };
        let map = fitted.to_flat_map();
        assert_eq!(map["infected_initial"], 1.0);
        assert_eq!(map["o_gamma_reduction_2"], 1.0);
        assert_eq!(map["quarantine_start"], 20.0);
        assert_eq!(map["quarantine_2_duration"], 5.0);
        assert!(!map.contains_key("r_u"));
    }
}
