//! Day-by-day integration of the sector quarantine model.
//!
//! The simulator restarts a Dormand-Prince 5(4) stepper on every interval `[d, d + 1]`, so
//! reported values always sit exactly on integer days whatever adaptive sub-steps the
//! integrator takes. A stepper that exhausts its step budget fails the whole call: a
//! trajectory returned by [`OdeSimulator::simulate`] always holds
//! `simulation_duration + 1` snapshots.

pub mod scenarios;
mod system;

use episector_core::{
    CompartmentState, EpidemicModel, ModelVariant, Parameters, SimulationEngine,
    SimulationError, Snapshot, Trajectory,
};
use log::{debug, warn};
use ode_solvers::dop_shared::OutputType;
use ode_solvers::Dopri5;
use serde::{Deserialize, Serialize};

pub use scenarios::{project_quarantine_end, QuarantineEndScenario, ScenarioOutcome};
pub use system::State;

// Step-size controller settings, the Hairer-Wanner defaults
const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.333;
const FAC_MAX: f64 = 6.0;
const STIFFNESS_CHECK_INTERVAL: u32 = 1000;

/// Adaptive Runge-Kutta simulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdeSimulator {
    pub variant: ModelVariant,

    /// Relative error tolerance of the embedded error estimate
    pub relative_tolerance: f64,

    /// Absolute error tolerance of the embedded error estimate
    pub absolute_tolerance: f64,

    /// Step ceiling for advancing a single day
    pub max_steps_per_day: u32,
}

impl Default for OdeSimulator {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-9,
            max_steps_per_day: 10_000,
        }
    }
}

impl OdeSimulator {
    pub fn new(variant: ModelVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn with_tolerances(mut self, relative: f64, absolute: f64) -> Self {
        self.relative_tolerance = relative;
        self.absolute_tolerance = absolute;
        self
    }

    pub fn with_max_steps_per_day(mut self, max_steps: u32) -> Self {
        self.max_steps_per_day = max_steps;
        self
    }

    /// Integrate from day 0 to `simulation_duration`, one snapshot per day
    pub fn simulate(
        &self,
        initial: &CompartmentState,
        parameters: &Parameters,
        simulation_duration: u32,
    ) -> Result<Trajectory, SimulationError> {
        initial.validate(self.variant)?;
        parameters.validate()?;

        let model = EpidemicModel::new(*parameters, self.variant);
        let mut snapshots = Vec::with_capacity(simulation_duration as usize + 1);
        snapshots.push(Snapshot::from_state(0, initial, self.variant));

        let mut y = State::from_column_slice(&initial.to_vector());
        for day in 0..simulation_duration {
            y = self.advance_day(model, day, y).inspect_err(|e| {
                warn!("Simulation stopped: {}", e);
            })?;
            let state = CompartmentState::from_vector(y.as_slice());
            snapshots.push(Snapshot::from_state(day + 1, &state, self.variant));
        }

        debug!(
            "Simulated {} days with the {} model",
            simulation_duration, self.variant
        );
        Ok(Trajectory::new(self.variant, snapshots))
    }

    /// Advance `y` from `day` to `day + 1` with a fresh stepper
    fn advance_day(
        &self,
        model: EpidemicModel,
        day: u32,
        y: State,
    ) -> Result<State, SimulationError> {
        let t0 = f64::from(day);
        let t1 = t0 + 1.0;
        let mut stepper = Dopri5::from_param(
            system::SectorSystem::new(model),
            t0,
            t1,
            1.0,
            y,
            self.relative_tolerance,
            self.absolute_tolerance,
            SAFETY_FACTOR,
            BETA,
            FAC_MIN,
            FAC_MAX,
            1.0,
            0.0,
            self.max_steps_per_day,
            STIFFNESS_CHECK_INTERVAL,
            OutputType::Dense,
        );

        stepper
            .integrate()
            .map_err(|e| SimulationError::Integration {
                day,
                reason: e.to_string(),
            })?;

        let end = stepper
            .y_out()
            .last()
            .copied()
            .ok_or_else(|| SimulationError::Integration {
                day,
                reason: "solver produced no output".to_string(),
            })?;

        if end.iter().any(|value| !value.is_finite()) {
            return Err(SimulationError::NonFinite { day: day + 1 });
        }
        Ok(end)
    }
}

impl SimulationEngine for OdeSimulator {
    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn simulate(
        &self,
        initial: &CompartmentState,
        parameters: &Parameters,
        simulation_duration: u32,
    ) -> Result<Trajectory, SimulationError> {
        OdeSimulator::simulate(self, initial, parameters, simulation_duration)
    }
}

/// Simulate with the default simulator settings
pub fn simulate(
    initial: &CompartmentState,
    parameters: &Parameters,
    simulation_duration: u32,
) -> Result<Trajectory, SimulationError> {
    OdeSimulator::default().simulate(initial, parameters, simulation_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use episector_core::{Compartment, ConfigError, QuarantineSchedule, SectorReductions};

    fn outbreak_state() -> CompartmentState {
        CompartmentState {
            susceptible_medical: 999.0,
            infected: 1.0,
            ..Default::default()
        }
    }

    fn outbreak_parameters() -> Parameters {
        Parameters {
            gamma: 2.0,
            medical: SectorReductions::new(1.0, 1.0),
            essential: SectorReductions::new(1.0, 1.0),
            other: SectorReductions::new(1.0, 1.0),
            alpha: 0.2,
            delta: 0.0,
            sigma: 0.2,
            r_i: 0.2,
            d_i: 0.2,
            r_u: 0.0,
            r_q: 0.2,
            d_q: 0.2,
            quarantine: QuarantineSchedule::default(),
        }
    }

    fn mixed_state() -> CompartmentState {
        CompartmentState {
            susceptible_medical: 5_000.0,
            susceptible_essential: 20_000.0,
            susceptible_other: 74_000.0,
            exposed: 600.0,
            infected: 300.0,
            quarantined: 80.0,
            recovered: 15.0,
            unknown_recovered: 3.0,
            deceased: 2.0,
        }
    }

    fn mixed_parameters() -> Parameters {
        Parameters {
            gamma: 1.4,
            medical: SectorReductions::new(1.5, 1.2),
            essential: SectorReductions::new(2.0, 1.5),
            other: SectorReductions::new(5.0, 2.0),
            alpha: 0.1,
            delta: 0.05,
            sigma: 0.25,
            r_i: 0.1,
            d_i: 0.005,
            r_u: 0.08,
            r_q: 0.07,
            d_q: 0.01,
            quarantine: QuarantineSchedule::new(12.5, 20.0, 30.0),
        }
    }

    #[test]
    fn test_outbreak_without_quarantine() {
        let simulator = OdeSimulator::new(ModelVariant::Basic);
        let trajectory = simulator
            .simulate(&outbreak_state(), &outbreak_parameters(), 10)
            .unwrap();

        assert_eq!(trajectory.len(), 11);
        for snapshot in &trajectory {
            assert_relative_eq!(snapshot.total(), 1000.0, max_relative = 1e-6);
        }
        let infected = trajectory.series(Compartment::Infected);
        assert!(infected[10] > infected[0]);
        assert_eq!(trajectory.snapshots()[0].quarantined, 0.0);
        assert!(trajectory.snapshots()[10].quarantined > 0.0);
    }

    #[test]
    fn test_quarantine_slows_growth() {
        let simulator = OdeSimulator::new(ModelVariant::Basic);
        let free = simulator
            .simulate(&outbreak_state(), &outbreak_parameters(), 10)
            .unwrap();

        let mut parameters = outbreak_parameters();
        parameters.medical = SectorReductions::new(100.0, 1.0);
        parameters.quarantine = QuarantineSchedule::new(0.0, 10_000.0, 0.0);
        let quarantined = simulator
            .simulate(&outbreak_state(), &parameters, 10)
            .unwrap();

        let free_infected = free.series(Compartment::Infected)[10];
        let quarantined_infected = quarantined.series(Compartment::Infected)[10];
        assert!(quarantined_infected < 0.5 * free_infected);
        assert!(quarantined.last().unwrap().susceptible > free.last().unwrap().susceptible);
    }

    #[test]
    fn test_conservation_and_non_negativity() {
        for variant in [ModelVariant::Basic, ModelVariant::WithUnknownRecovered] {
            let mut initial = mixed_state();
            if variant == ModelVariant::Basic {
                initial.unknown_recovered = 0.0;
            }
            let total = initial.total();
            let trajectory = OdeSimulator::new(variant)
                .simulate(&initial, &mixed_parameters(), 120)
                .unwrap();

            assert_eq!(trajectory.len(), 121);
            for snapshot in &trajectory {
                assert_relative_eq!(snapshot.total(), total, max_relative = 1e-6);
                for compartment in variant.compartments() {
                    let value = snapshot.get(compartment).unwrap();
                    assert!(value > -1e-6 * total, "{compartment} = {value}");
                }
            }
        }
    }

    #[test]
    fn test_day_zero_is_literal_initial_state() {
        let initial = mixed_state();
        let trajectory = simulate(&initial, &mixed_parameters(), 5).unwrap();
        let day_0 = &trajectory.snapshots()[0];
        assert_eq!(day_0.day, 0);
        assert_eq!(day_0.to_state(), initial);
        assert_eq!(day_0.susceptible, initial.susceptible());
        assert_eq!(day_0.unknown_recovered, Some(3.0));
    }

    #[test]
    fn test_zero_duration_returns_single_snapshot() {
        let initial = mixed_state();
        let trajectory = simulate(&initial, &mixed_parameters(), 0).unwrap();
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.snapshots()[0].to_state(), initial);
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let first = simulate(&mixed_state(), &mixed_parameters(), 60).unwrap();
        let second = simulate(&mixed_state(), &mixed_parameters(), 60).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_quarantine_beyond_horizon_has_no_effect() {
        let simulator = OdeSimulator::new(ModelVariant::Basic);
        let mut late = outbreak_parameters();
        late.other = SectorReductions::new(50.0, 2.0);
        late.medical = SectorReductions::new(50.0, 2.0);
        late.quarantine = QuarantineSchedule::new(40.0, 10.0, 10.0);

        let baseline = simulator
            .simulate(&outbreak_state(), &outbreak_parameters(), 20)
            .unwrap();
        let delayed = simulator.simulate(&outbreak_state(), &late, 20).unwrap();
        assert_eq!(baseline, delayed);
    }

    #[test]
    fn test_basic_variant_omits_unknown_recovered() {
        let trajectory = OdeSimulator::new(ModelVariant::Basic)
            .simulate(&outbreak_state(), &outbreak_parameters(), 3)
            .unwrap();
        assert!(trajectory.iter().all(|s| s.unknown_recovered.is_none()));
    }

    #[test]
    fn test_exhausted_step_budget_fails_the_call() {
        let simulator = OdeSimulator::new(ModelVariant::WithUnknownRecovered)
            .with_tolerances(1e-12, 1e-12)
            .with_max_steps_per_day(1);
        let result = simulator.simulate(&mixed_state(), &mixed_parameters(), 10);
        assert!(matches!(
            result,
            Err(SimulationError::Integration { day: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_inputs_fail_fast() {
        let empty = CompartmentState::default();
        assert_eq!(
            simulate(&empty, &mixed_parameters(), 5),
            Err(SimulationError::Config(ConfigError::EmptyPopulation))
        );

        let mut parameters = mixed_parameters();
        parameters.alpha = -0.1;
        assert!(matches!(
            simulate(&mixed_state(), &parameters, 5),
            Err(SimulationError::Config(ConfigError::InvalidValue { .. }))
        ));
    }
}
