//! Optimization solver setup and execution
//!
//! Both solvers are local and keep every evaluated candidate inside the parameter bounds:
//! the projected gradient method by construction, Nelder-Mead through [`BoxProjected`].

use argmin::core::observers::ObserverMode;
use argmin::core::{
    CostFunction, Error, Executor, IterState, OptimizationResult, Solver, State,
    TerminationReason, TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use argmin_observer_slog::SlogLogger;
use episector_core::SimulationEngine;
use log::info;

use crate::calibration_problem::CalibrationProblem;
use crate::error::CalibrationError;
use crate::observer::LogObserver;
use crate::projected_gradient::ProjectedGradient;
use crate::types::CalibrationResult;

/// Initial simplex edge along each coordinate, as a fraction of its bound width
const SIMPLEX_STEP: f64 = 0.05;

/// Log optimization header for verbose output
fn log_optimization_header(
    algorithm: OptimizationAlgorithm,
    parameter_names: &[String],
    initial_values: &[f64],
    max_iterations: u64,
) {
    info!("=== {} Optimization (Verbose Mode) ===", algorithm);
    info!("Parameters: {:?}", parameter_names);
    info!("Initial values: {:?}", initial_values);
    info!("Max iterations: {}", max_iterations);
}

/// Run executor with the progress observers attached
fn run_with_logging<O, S, I>(
    executor: Executor<O, S, I>,
    verbose: bool,
) -> Result<OptimizationResult<O, S, I>, CalibrationError>
where
    O: CostFunction,
    S: Solver<O, I>,
    I: State,
    <I as State>::Float: std::fmt::LowerExp,
{
    let executor = executor.add_observer(LogObserver::new(), ObserverMode::Always);
    let executor = if verbose {
        executor.add_observer(SlogLogger::term(), ObserverMode::Always)
    } else {
        executor
    };

    executor
        .run()
        .map_err(|e| CalibrationError::Optimization(e.to_string()))
}

/// Configuration for the projected gradient method
#[derive(Debug, Clone)]
pub struct ProjectedGradientConfig {
    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Stop once a full projected gradient step moves less than this (in bound-width units)
    pub gradient_tolerance: f64,

    /// Stop once an accepted step lowers the loss by less than this, relative to the loss
    pub cost_tolerance: f64,

    /// Starting trust radius, in bound-width units
    pub initial_radius: f64,

    /// Stop once the trust radius shrinks below this
    pub min_radius: f64,

    /// Finite-difference step as a fraction of each bound width
    pub finite_difference_step: f64,

    /// Enable verbose output
    pub verbose: bool,
}

impl Default for ProjectedGradientConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tolerance: 1e-6,
            cost_tolerance: 1e-10,
            initial_radius: 0.1,
            min_radius: 1e-8,
            finite_difference_step: 1e-4,
            verbose: false,
        }
    }
}

impl ProjectedGradientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    pub fn with_cost_tolerance(mut self, tolerance: f64) -> Self {
        self.cost_tolerance = tolerance;
        self
    }

    pub fn with_initial_radius(mut self, radius: f64) -> Self {
        self.initial_radius = radius;
        self
    }

    pub fn with_min_radius(mut self, radius: f64) -> Self {
        self.min_radius = radius;
        self
    }

    pub fn with_finite_difference_step(mut self, step: f64) -> Self {
        self.finite_difference_step = step;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Configuration for Nelder-Mead optimization
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Sample standard deviation tolerance (convergence criterion)
    /// Must be non-negative
    pub sd_tolerance: f64,

    /// Reflection parameter (alpha)
    /// Must be > 0, defaults to 1.0
    pub alpha: Option<f64>,

    /// Expansion parameter (gamma)
    /// Must be > 1, defaults to 2.0
    pub gamma: Option<f64>,

    /// Contraction parameter (rho)
    /// Must be in (0, 0.5], defaults to 0.5
    pub rho: Option<f64>,

    /// Shrinking parameter (sigma)
    /// Must be in (0, 1], defaults to 0.5
    pub sigma: Option<f64>,

    /// Enable verbose output
    pub verbose: bool,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            sd_tolerance: 1e-6,
            alpha: None, // Use argmin's default: 1.0
            gamma: None, // Use argmin's default: 2.0
            rho: None,   // Use argmin's default: 0.5
            sigma: None, // Use argmin's default: 0.5
            verbose: false,
        }
    }
}

impl NelderMeadConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set sample standard deviation tolerance (convergence criterion)
    pub fn with_sd_tolerance(mut self, tolerance: f64) -> Self {
        self.sd_tolerance = tolerance;
        self
    }

    /// Set reflection parameter (alpha)
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Set expansion parameter (gamma)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Set contraction parameter (rho)
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = Some(rho);
        self
    }

    /// Set shrinking parameter (sigma)
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Algorithm-specific optimization configuration
#[derive(Debug, Clone)]
pub enum OptimizationConfig {
    /// Bounded projected gradient with finite-difference gradients.
    /// Each iteration costs one simulation per free parameter plus the trial steps
    ProjectedGradient(ProjectedGradientConfig),

    /// Nelder-Mead simplex method (gradient-free), evaluated on the box projection.
    /// Slower to settle with many parameters, but indifferent to noisy losses
    NelderMead(NelderMeadConfig),
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        OptimizationConfig::ProjectedGradient(ProjectedGradientConfig::default())
    }
}

impl OptimizationConfig {
    pub fn algorithm(&self) -> OptimizationAlgorithm {
        match self {
            OptimizationConfig::ProjectedGradient(_) => OptimizationAlgorithm::ProjectedGradient,
            OptimizationConfig::NelderMead(_) => OptimizationAlgorithm::NelderMead,
        }
    }

    pub fn max_iterations(&self) -> u64 {
        match self {
            OptimizationConfig::ProjectedGradient(config) => config.max_iterations,
            OptimizationConfig::NelderMead(config) => config.max_iterations,
        }
    }
}

/// Available optimization algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationAlgorithm {
    ProjectedGradient,
    NelderMead,
}

impl std::fmt::Display for OptimizationAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationAlgorithm::ProjectedGradient => write!(f, "Projected Gradient"),
            OptimizationAlgorithm::NelderMead => write!(f, "Nelder-Mead"),
        }
    }
}

/// Evaluates the wrapped problem at the projection of each candidate onto the bounds
struct BoxProjected<P> {
    problem: P,
    bounds: Vec<(f64, f64)>,
}

impl<P> CostFunction for BoxProjected<P>
where
    P: CostFunction<Param = Vec<f64>, Output = f64>,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        self.problem.cost(&project(param, &self.bounds))
    }
}

fn project(param: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    param
        .iter()
        .zip(bounds)
        .map(|(value, (lower, upper))| value.clamp(*lower, *upper))
        .collect()
}

/// Only an explicit convergence criterion counts; the iteration cap does not
fn is_converged(status: &TerminationStatus) -> bool {
    matches!(
        status,
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached
        )
    )
}

fn calibration_result<G>(
    state: &IterState<Vec<f64>, G, (), (), (), f64>,
    initial_params: Vec<f64>,
    parameter_names: Vec<String>,
    bounds: &[(f64, f64)],
) -> CalibrationResult {
    let best = state.best_param.as_deref().unwrap_or(&initial_params);
    CalibrationResult {
        best_parameters: project(best, bounds),
        parameter_names,
        final_loss: state.best_cost,
        iterations: state.iter as usize,
        converged: is_converged(&state.termination_status),
        termination_reason: format!("{:?}", state.termination_status),
    }
}

/// Run optimization on a calibration problem
///
/// Hitting the iteration cap is not an error: the result then has `converged == false`.
///
/// ```rust,ignore
/// let config = OptimizationConfig::NelderMead(
///     NelderMeadConfig::new()
///         .with_max_iterations(1000)
///         .with_sd_tolerance(1e-6)
/// );
///
/// let result = optimize(problem, config)?;
/// println!("Best parameters: {:?}", result.best_parameters);
/// println!("Final loss: {}", result.final_loss);
/// ```
pub fn optimize<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    config: OptimizationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let layout = problem.layout();
    let initial_params = layout.initial_values();
    let parameter_names = layout.names();
    let bounds = layout.bounds();

    let result = match config {
        OptimizationConfig::ProjectedGradient(pg_config) => optimize_projected_gradient(
            problem,
            initial_params,
            parameter_names,
            bounds,
            pg_config,
        ),
        OptimizationConfig::NelderMead(nm_config) => {
            optimize_nelder_mead(problem, initial_params, parameter_names, bounds, nm_config)
        }
    }?;

    info!(
        "Optimization finished after {} iterations: loss {:.6e}, {}",
        result.iterations, result.final_loss, result.termination_reason
    );
    Ok(result)
}

fn solver_error(setting: &str) -> impl Fn(Error) -> CalibrationError + '_ {
    move |e| CalibrationError::Optimization(format!("Failed to set {}: {}", setting, e))
}

/// Build the projected gradient solver from configuration
fn build_projected_gradient_solver(
    bounds: &[(f64, f64)],
    config: &ProjectedGradientConfig,
) -> Result<ProjectedGradient, CalibrationError> {
    ProjectedGradient::new(bounds)
        .map_err(solver_error("bounds"))?
        .with_radius(config.initial_radius)
        .map_err(solver_error("initial_radius"))?
        .with_min_radius(config.min_radius)
        .map_err(solver_error("min_radius"))?
        .with_gradient_tolerance(config.gradient_tolerance)
        .map_err(solver_error("gradient_tolerance"))?
        .with_cost_tolerance(config.cost_tolerance)
        .map_err(solver_error("cost_tolerance"))?
        .with_finite_difference_step(config.finite_difference_step)
        .map_err(solver_error("finite_difference_step"))
}

fn optimize_projected_gradient<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    initial_params: Vec<f64>,
    parameter_names: Vec<String>,
    bounds: Vec<(f64, f64)>,
    config: ProjectedGradientConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let solver = build_projected_gradient_solver(&bounds, &config)?;

    if config.verbose {
        log_optimization_header(
            OptimizationAlgorithm::ProjectedGradient,
            &parameter_names,
            &initial_params,
            config.max_iterations,
        );
        info!("Bounds: {:?}", bounds);
        info!(
            "Gradient tolerance: {}, cost tolerance: {}",
            config.gradient_tolerance, config.cost_tolerance
        );
    }

    let start = initial_params.clone();
    let executor = Executor::new(problem, solver)
        .configure(|state| state.param(start).max_iters(config.max_iterations));
    let result = run_with_logging(executor, config.verbose)?;

    Ok(calibration_result(
        result.state(),
        initial_params,
        parameter_names,
        &bounds,
    ))
}

/// Initial simplex: the start point plus one vertex per coordinate, stepped toward the
/// interior of its bounds
fn initial_simplex(initial_params: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let mut vertices = vec![initial_params.to_vec()];
    for (i, (lower, upper)) in bounds.iter().enumerate() {
        let mut vertex = initial_params.to_vec();
        let step = SIMPLEX_STEP * (upper - lower);
        vertex[i] = if vertex[i] + step <= *upper {
            vertex[i] + step
        } else {
            (vertex[i] - step).max(*lower)
        };
        vertices.push(vertex);
    }
    vertices
}

/// Build Nelder-Mead solver from configuration
fn build_nelder_mead_solver(
    initial_params: &[f64],
    bounds: &[(f64, f64)],
    config: &NelderMeadConfig,
) -> Result<NelderMead<Vec<f64>, f64>, CalibrationError> {
    let mut solver = NelderMead::new(initial_simplex(initial_params, bounds))
        .with_sd_tolerance(config.sd_tolerance)
        .map_err(solver_error("sd_tolerance"))?;

    if let Some(alpha) = config.alpha {
        solver = solver.with_alpha(alpha).map_err(solver_error("alpha"))?;
    }

    if let Some(gamma) = config.gamma {
        solver = solver.with_gamma(gamma).map_err(solver_error("gamma"))?;
    }

    if let Some(rho) = config.rho {
        solver = solver.with_rho(rho).map_err(solver_error("rho"))?;
    }

    if let Some(sigma) = config.sigma {
        solver = solver.with_sigma(sigma).map_err(solver_error("sigma"))?;
    }

    Ok(solver)
}

/// Optimize using Nelder-Mead algorithm
fn optimize_nelder_mead<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    initial_params: Vec<f64>,
    parameter_names: Vec<String>,
    bounds: Vec<(f64, f64)>,
    config: NelderMeadConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let solver = build_nelder_mead_solver(&initial_params, &bounds, &config)?;

    if config.verbose {
        log_optimization_header(
            OptimizationAlgorithm::NelderMead,
            &parameter_names,
            &initial_params,
            config.max_iterations,
        );
        info!("SD tolerance: {}", config.sd_tolerance);
    }

    let projected = BoxProjected {
        problem,
        bounds: bounds.clone(),
    };
    let executor =
        Executor::new(projected, solver).configure(|state| state.max_iters(config.max_iterations));
    let result = run_with_logging(executor, config.verbose)?;

    Ok(calibration_result(
        result.state(),
        initial_params,
        parameter_names,
        &bounds,
    ))
}
