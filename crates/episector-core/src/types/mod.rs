pub mod parameters;
pub mod population;
pub mod trajectory;

pub use parameters::{
    EffectiveContactRates, Parameters, QuarantinePhase, QuarantineSchedule, SectorReductions,
};
pub use population::{
    Compartment, CompartmentState, ModelVariant, Sector, SectorFractions, NUM_COMPARTMENTS,
};
pub use trajectory::{Snapshot, Trajectory};
