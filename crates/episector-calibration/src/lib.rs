//! Parameter estimation for the sector quarantine model.
//!
//! Given daily counts of quarantined and deceased individuals, [`fit`] searches the
//! epidemic parameters and the unobserved initial values (exposed, infected and, in the
//! 9-compartment model, unknown recovered) that minimise a weighted error between
//! simulation and observation. The search is a local, bounded optimization built on
//! `argmin`; the simulation is pluggable through [`SimulationEngine`].
//!
//! [`SimulationEngine`]: episector_core::SimulationEngine

pub mod calibration_problem;
pub mod error;
pub mod fit;
pub mod observer;
pub mod optimization;
pub mod projected_gradient;
pub mod types;

pub use calibration_problem::{CalibrationProblem, ParameterLayout};
pub use error::CalibrationError;
pub use fit::{fit, FitRequest};
pub use observer::LogObserver;
pub use optimization::{
    optimize, NelderMeadConfig, OptimizationAlgorithm, OptimizationConfig,
    ProjectedGradientConfig,
};
pub use projected_gradient::ProjectedGradient;
pub use types::{
    BoundsOverride, CalibrationParameter, CalibrationParameterType, CalibrationResult,
    FittedParameterSet, FixedInitialValues, FixedInputs, FreeParameter, LossConfig, LossKind,
    ObservedDay, ParameterGuesses, TrackedField,
};
