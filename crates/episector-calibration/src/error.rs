use episector_core::{ConfigError, ModelVariant, SimulationError};

/// Errors surfaced by a fit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Calibration parameters do not match the {variant} model: expected [{expected}], got [{found}]")]
    ParameterLayout {
        variant: ModelVariant,
        expected: String,
        found: String,
    },

    #[error("Optimization failed: {0}")]
    Optimization(String),
}
