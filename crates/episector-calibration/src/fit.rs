//! Fit the model to observed quarantined and deceased counts

use episector_core::{ConfigError, ModelVariant, QuarantineSchedule, SectorFractions};
use episector_ode::OdeSimulator;
use log::info;

use crate::calibration_problem::CalibrationProblem;
use crate::error::CalibrationError;
use crate::optimization::{optimize, OptimizationConfig};
use crate::types::{
    BoundsOverride, CalibrationParameter, CalibrationParameterType, FittedParameterSet,
    FixedInitialValues, FixedInputs, FreeParameter, LossConfig, ObservedDay, ParameterGuesses,
};

/// Everything a fit needs. Only the ground truth, population and sector split are required;
/// the rest starts from documented defaults.
#[derive(Debug, Clone)]
pub struct FitRequest {
    /// One record per day, day 0 first
    pub ground_truth: Vec<ObservedDay>,

    pub total_population: f64,

    pub sector_fractions: SectorFractions,

    /// Observed day-0 values; taken from the first ground-truth record when `None`
    pub fixed_initial: Option<FixedInitialValues>,

    pub guesses: ParameterGuesses,

    pub bounds_override: BoundsOverride,

    /// Passed through to every simulation, never fitted
    pub quarantine: QuarantineSchedule,

    pub loss: LossConfig,

    pub optimizer: OptimizationConfig,

    /// Also selects the model variant
    pub simulator: OdeSimulator,
}

impl FitRequest {
    pub fn new(
        ground_truth: Vec<ObservedDay>,
        total_population: f64,
        sector_fractions: SectorFractions,
    ) -> Self {
        Self {
            ground_truth,
            total_population,
            sector_fractions,
            fixed_initial: None,
            guesses: ParameterGuesses::default(),
            bounds_override: BoundsOverride::new(),
            quarantine: QuarantineSchedule::default(),
            loss: LossConfig::default(),
            optimizer: OptimizationConfig::default(),
            simulator: OdeSimulator::default(),
        }
    }

    pub fn with_fixed_initial(mut self, fixed_initial: FixedInitialValues) -> Self {
        self.fixed_initial = Some(fixed_initial);
        self
    }

    pub fn with_guesses(mut self, guesses: ParameterGuesses) -> Self {
        self.guesses = guesses;
        self
    }

    pub fn with_bounds(mut self, parameter: FreeParameter, lower: f64, upper: f64) -> Self {
        self.bounds_override.insert(parameter, (lower, upper));
        self
    }

    pub fn with_quarantine(mut self, quarantine: QuarantineSchedule) -> Self {
        self.quarantine = quarantine;
        self
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.simulator.variant = variant;
        self
    }

    pub fn with_loss(mut self, loss: LossConfig) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizationConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_simulator(mut self, simulator: OdeSimulator) -> Self {
        self.simulator = simulator;
        self
    }

    /// Validate the request and build the calibration problem it describes
    pub fn into_problem(self) -> Result<CalibrationProblem<OdeSimulator>, CalibrationError> {
        let first = self
            .ground_truth
            .first()
            .ok_or(ConfigError::NoObservedData)?;
        let fixed_initial = self
            .fixed_initial
            .unwrap_or_else(|| FixedInitialValues::from_observation(first));

        let variant = self.simulator.variant;
        let inputs = FixedInputs {
            total_population: self.total_population,
            sector_fractions: self.sector_fractions,
            fixed_initial,
            quarantine: self.quarantine,
        };
        let parameters = CalibrationParameter::for_variant(
            variant,
            self.total_population,
            &self.guesses,
            &self.bounds_override,
        );

        CalibrationProblem::new(
            self.simulator,
            self.ground_truth,
            parameters,
            inputs,
            self.loss,
        )
    }
}

/// Estimate the free parameters from the ground truth.
///
/// The result depends on the guesses: only a local search is run. Hitting the optimizer's
/// iteration cap still returns the best point found, flagged with `converged == false`.
pub fn fit(request: FitRequest) -> Result<FittedParameterSet, CalibrationError> {
    let optimizer = request.optimizer.clone();
    let problem = request.into_problem()?;
    let layout = problem.layout().clone();

    let initial_values = layout.initial_values();
    let initial_loss = problem.evaluate(&initial_values)?;
    if !initial_loss.is_finite() {
        let inputs = layout.inputs();
        let seeded: f64 = layout
            .parameters()
            .iter()
            .filter(|p| {
                p.parameter.parameter_type() == CalibrationParameterType::InitialCondition
            })
            .map(|p| p.initial_value())
            .sum();
        return Err(ConfigError::InfeasibleInitialValues {
            fixed: seeded + inputs.fixed_initial.total(),
            total: inputs.total_population,
        }
        .into());
    }

    info!(
        "Fitting {} free parameters of the {} model to {} observed days with {} (initial loss {:.6e})",
        layout.len(),
        layout.variant(),
        problem.simulation_duration() + 1,
        optimizer.algorithm(),
        initial_loss
    );

    let result = optimize(problem, optimizer)?;
    let (initial_state, parameters) =
        layout.assemble(&result.best_parameters).ok_or_else(|| {
            CalibrationError::Optimization(
                "best candidate leaves no room for a susceptible population".to_string(),
            )
        })?;

    if !result.converged {
        info!(
            "Optimizer stopped without converging ({}); returning the best point found",
            result.termination_reason
        );
    }

    Ok(FittedParameterSet {
        variant: layout.variant(),
        parameters,
        initial_state,
        loss: result.final_loss,
        converged: result.converged,
        iterations: result.iterations,
        termination_reason: result.termination_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{NelderMeadConfig, ProjectedGradientConfig};
    use crate::types::{InitialSeeds, LossKind};
    use approx::assert_relative_eq;
    use episector_core::{CompartmentState, Parameters, SectorReductions};

    const DAYS: u32 = 29;

    fn inputs() -> FixedInputs {
        FixedInputs {
            total_population: 10_000.0,
            sector_fractions: SectorFractions::new(0.05, 0.25, 0.7),
            fixed_initial: FixedInitialValues::new(2.0, 1.0, 0.0),
            quarantine: QuarantineSchedule::new(8.0, 10.0, 10.0),
        }
    }

    fn truth(variant: ModelVariant) -> (CompartmentState, Parameters) {
        let inputs = inputs();
        let seeds = InitialSeeds {
            exposed: 40.0,
            infected: 20.0,
            unknown_recovered: if variant.tracks_unknown_recovered() {
                5.0
            } else {
                0.0
            },
        };
        let initial = inputs.initial_state(&seeds, variant).unwrap();
        let parameters = Parameters {
            gamma: 1.5,
            medical: SectorReductions::new(2.0, 1.5),
            essential: SectorReductions::new(3.0, 1.2),
            other: SectorReductions::new(5.0, 1.1),
            alpha: 0.25,
            delta: 0.1,
            sigma: 0.2,
            r_i: 0.1,
            r_u: if variant.tracks_unknown_recovered() {
                0.1
            } else {
                0.0
            },
            r_q: 0.1,
            d_i: 0.002,
            d_q: 0.01,
            quarantine: inputs.quarantine,
        };
        (initial, parameters)
    }

    fn request(variant: ModelVariant) -> FitRequest {
        let (initial, parameters) = truth(variant);
        let simulator = OdeSimulator::new(variant);
        let ground_truth = simulator
            .simulate(&initial, &parameters, DAYS)
            .unwrap()
            .iter()
            .map(ObservedDay::from_snapshot)
            .collect();

        FitRequest::new(ground_truth, 10_000.0, inputs().sector_fractions)
            .with_quarantine(inputs().quarantine)
            .with_simulator(simulator)
            .with_guesses(ParameterGuesses::from_parameters(&parameters, &initial))
    }

    fn initial_loss(request: &FitRequest) -> f64 {
        let problem = request.clone().into_problem().unwrap();
        problem.evaluate(&problem.layout().initial_values()).unwrap()
    }

    #[test]
    fn test_exact_guess_is_a_fixed_point() {
        for variant in [ModelVariant::Basic, ModelVariant::WithUnknownRecovered] {
            let (initial, parameters) = truth(variant);
            let request = request(variant);
            assert_eq!(initial_loss(&request), 0.0);

            let fitted = fit(request).unwrap();
            assert_eq!(fitted.variant, variant);
            assert!(fitted.loss < 1e-9);
            assert!(fitted.converged, "{}", fitted.termination_reason);
            assert_relative_eq!(fitted.parameters.gamma, parameters.gamma);
            assert_relative_eq!(fitted.parameters.d_q, parameters.d_q);
            assert_relative_eq!(fitted.parameters.other.phase_1, 5.0);
            assert_relative_eq!(fitted.initial_state.exposed, initial.exposed);
            assert_relative_eq!(
                fitted.initial_state.unknown_recovered,
                initial.unknown_recovered
            );
            assert_relative_eq!(fitted.initial_state.total(), 10_000.0);
        }
    }

    #[test]
    fn test_perturbed_guess_is_improved() {
        let mut request = request(ModelVariant::Basic).with_optimizer(
            OptimizationConfig::ProjectedGradient(
                ProjectedGradientConfig::new().with_max_iterations(5),
            ),
        );
        request.guesses.gamma = 2.2;
        request.guesses.sigma = 0.35;
        let start = initial_loss(&request);
        assert!(start > 0.0);

        let fitted = fit(request.clone()).unwrap();
        assert!(fitted.loss < start, "{} >= {}", fitted.loss, start);
        assert!(fitted.iterations <= 5);

        // the reported loss is reproducible from the returned set
        let problem = request.into_problem().unwrap();
        let trajectory = fitted.simulate(&OdeSimulator::new(ModelVariant::Basic), DAYS).unwrap();
        assert_eq!(problem.calculate_loss(&trajectory), fitted.loss);
    }

    #[test]
    fn test_recovers_perturbed_parameters() {
        let (initial, parameters) = truth(ModelVariant::Basic);
        let truth_guesses = ParameterGuesses::from_parameters(&parameters, &initial);
        let simulator = OdeSimulator::new(ModelVariant::Basic).with_tolerances(1e-10, 1e-12);

        let mut request = request(ModelVariant::Basic)
            .with_simulator(simulator)
            .with_loss(LossConfig::default().with_kind(LossKind::SumSquaredError));
        request.ground_truth = simulator
            .simulate(&initial, &parameters, DAYS)
            .unwrap()
            .iter()
            .map(ObservedDay::from_snapshot)
            .collect();
        for parameter in FreeParameter::for_variant(ModelVariant::Basic) {
            let value = truth_guesses.get(parameter);
            request = match parameter {
                FreeParameter::Gamma => request.with_bounds(parameter, 1.4, 1.6),
                FreeParameter::DQ => request.with_bounds(parameter, 0.0, 0.05),
                _ => request.with_bounds(parameter, value, value),
            };
        }
        request.guesses.gamma = 1.55;
        request.guesses.d_q = 0.02;

        let start = initial_loss(&request);
        assert!(start > 0.0);

        let fitted = fit(request).unwrap();
        assert!(fitted.converged, "{}", fitted.termination_reason);
        assert!(fitted.loss < 1e-4 * start, "{} vs {}", fitted.loss, start);
        assert_relative_eq!(fitted.parameters.gamma, 1.5, max_relative = 1e-3);
        assert_relative_eq!(fitted.parameters.d_q, 0.01, max_relative = 1e-2);
        assert_relative_eq!(fitted.parameters.sigma, parameters.sigma);
        assert_relative_eq!(fitted.initial_state.exposed, initial.exposed);
    }

    #[test]
    fn test_iteration_cap_is_flagged() {
        let mut request = request(ModelVariant::Basic).with_optimizer(
            OptimizationConfig::NelderMead(NelderMeadConfig::new().with_max_iterations(3)),
        );
        request.guesses.gamma = 2.2;
        let start = initial_loss(&request);

        let fitted = fit(request).unwrap();
        assert!(!fitted.converged);
        assert!(fitted.termination_reason.contains("MaxItersReached"));
        assert!(fitted.loss <= start);
    }

    #[test]
    fn test_result_depends_on_guess() {
        let config = OptimizationConfig::ProjectedGradient(
            ProjectedGradientConfig::new().with_max_iterations(3),
        );
        let mut low = request(ModelVariant::Basic).with_optimizer(config.clone());
        low.guesses.gamma = 1.0;
        let mut high = request(ModelVariant::Basic).with_optimizer(config);
        high.guesses.gamma = 2.5;

        let low = fit(low).unwrap();
        let high = fit(high).unwrap();
        assert!((low.parameters.gamma - high.parameters.gamma).abs() > 1e-6);
    }

    #[test]
    fn test_fitted_set_round_trips_through_json() {
        let fitted = fit(request(ModelVariant::WithUnknownRecovered)).unwrap();
        let json = serde_json::to_string(&fitted).unwrap();
        let restored: FittedParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, fitted);

        let map = restored.to_flat_map();
        assert_eq!(map["gamma"], 1.5);
        assert_eq!(map["r_u"], 0.1);
        assert_eq!(map["quarantine_start"], 8.0);

        let trajectory = restored
            .simulate(&OdeSimulator::new(ModelVariant::WithUnknownRecovered), 60)
            .unwrap();
        assert_eq!(trajectory.len(), 61);
    }

    #[test]
    fn test_fixed_initial_values_default_to_first_observation() {
        let request = request(ModelVariant::Basic);
        let problem = request.into_problem().unwrap();
        assert_eq!(
            problem.layout().inputs().fixed_initial,
            FixedInitialValues::new(2.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_invalid_requests_fail_before_fitting() {
        let empty = FitRequest::new(Vec::new(), 100.0, SectorFractions::default());
        assert!(matches!(
            fit(empty),
            Err(CalibrationError::Config(ConfigError::NoObservedData))
        ));

        let mut missing = request(ModelVariant::Basic);
        missing.ground_truth[3].quarantined = None;
        assert!(matches!(
            fit(missing),
            Err(CalibrationError::Config(ConfigError::MissingField {
                day: 3,
                field: "quarantined"
            }))
        ));

        let mut fractions = request(ModelVariant::Basic);
        fractions.sector_fractions = SectorFractions::new(0.5, 0.5, 0.5);
        assert!(matches!(
            fit(fractions),
            Err(CalibrationError::Config(ConfigError::SectorFractions { .. }))
        ));

        let mut outside = request(ModelVariant::Basic);
        outside.guesses.gamma = 20.0;
        assert!(matches!(
            fit(outside),
            Err(CalibrationError::Config(ConfigError::GuessOutOfBounds { .. }))
        ));

        let inverted = request(ModelVariant::Basic).with_bounds(FreeParameter::Alpha, 0.9, 0.1);
        assert!(matches!(
            fit(inverted),
            Err(CalibrationError::Config(ConfigError::InvalidBounds { .. }))
        ));

        let mut crowded = request(ModelVariant::Basic);
        crowded.guesses.exposed_initial = 9_000.0;
        crowded.guesses.infected_initial = 1_000.0;
        assert!(matches!(
            fit(crowded),
            Err(CalibrationError::Config(
                ConfigError::InfeasibleInitialValues { .. }
            ))
        ));

        let mut population = request(ModelVariant::Basic);
        population.total_population = -1.0;
        assert!(matches!(
            fit(population),
            Err(CalibrationError::Config(ConfigError::NonPositivePopulation(_)))
        ));
    }
}
