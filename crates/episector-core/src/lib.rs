//! Core types for the sector-resolved quarantine epidemic model.
//!
//! This crate holds the typed compartment state, the parameter set, the daily trajectory
//! record and the ODE right-hand side. Integration lives in `episector-ode`, parameter
//! estimation in `episector-calibration`; both meet at [`SimulationEngine`].

pub mod error;
pub mod model;
pub mod types;

pub use error::{ConfigError, SimulationError};
pub use model::EpidemicModel;
pub use types::{
    Compartment, CompartmentState, EffectiveContactRates, ModelVariant, Parameters,
    QuarantinePhase, QuarantineSchedule, Sector, SectorFractions, SectorReductions, Snapshot,
    Trajectory, NUM_COMPARTMENTS,
};

/// Anything able to turn an initial state and a parameter set into a daily trajectory.
///
/// Implementations must be deterministic and must not carry state between calls: the
/// estimator evaluates many candidate parameter vectors against the same engine.
pub trait SimulationEngine {
    /// Compartment set this engine integrates
    fn variant(&self) -> ModelVariant;

    /// Simulate days `0..=simulation_duration`
    fn simulate(
        &self,
        initial: &CompartmentState,
        parameters: &Parameters,
        simulation_duration: u32,
    ) -> Result<Trajectory, SimulationError>;
}
