//! Error types shared by the simulator and the estimator

use crate::types::ModelVariant;

/// Invalid inputs detected before any integration or optimization starts
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Total population must be positive, got {0}")]
    NonPositivePopulation(f64),

    #[error("Sector fractions must each lie in [0, 1] and sum to 1, got {medical} + {essential} + {other}")]
    SectorFractions {
        medical: f64,
        essential: f64,
        other: f64,
    },

    #[error("'{name}' must be a finite non-negative number, got {value}")]
    InvalidValue { name: String, value: f64 },

    #[error("Reduction factor '{name}' must be positive, got {value}")]
    NonPositiveReduction { name: String, value: f64 },

    #[error("Bounds for '{name}' are invalid: [{lower}, {upper}]")]
    InvalidBounds {
        name: String,
        lower: f64,
        upper: f64,
    },

    #[error("Initial guess {value} for '{name}' lies outside [{lower}, {upper}]")]
    GuessOutOfBounds {
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Observation for day {day} is missing '{field}'")]
    MissingField { day: usize, field: &'static str },

    #[error("No observed data provided")]
    NoObservedData,

    #[error("Compartments sum to zero: the population is empty")]
    EmptyPopulation,

    #[error("Compartment '{compartment}' is not tracked by the {variant} model")]
    UntrackedCompartment {
        compartment: &'static str,
        variant: ModelVariant,
    },

    #[error("Non-susceptible initial values ({fixed}) exceed the total population ({total})")]
    InfeasibleInitialValues { fixed: f64, total: f64 },
}

/// Failure of a single `simulate` call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Integration failed while advancing from day {day}: {reason}")]
    Integration { day: u32, reason: String },

    #[error("Non-finite compartment value on day {day}")]
    NonFinite { day: u32 },
}

/// Check that a scalar input is finite and non-negative
pub(crate) fn ensure_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        })
    }
}
