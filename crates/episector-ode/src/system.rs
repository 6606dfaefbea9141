use episector_core::{EpidemicModel, NUM_COMPARTMENTS};
use ode_solvers::{SVector, System};

/// State vector handed to the Runge-Kutta stepper
pub type State = SVector<f64, NUM_COMPARTMENTS>;

/// Adapter exposing the model right-hand side to `ode_solvers`
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectorSystem {
    model: EpidemicModel,
}

impl SectorSystem {
    pub(crate) fn new(model: EpidemicModel) -> Self {
        Self { model }
    }
}

impl System<f64, State> for SectorSystem {
    fn system(&self, t: f64, y: &State, dy: &mut State) {
        self.model.derivatives(t, y.as_slice(), dy.as_mut_slice());
    }
}
