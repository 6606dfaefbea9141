//! Box-constrained projected gradient solver for argmin
//!
//! Each iteration estimates the gradient by one-sided finite differences, steps along the
//! negative gradient inside a trust radius and projects the trial point back onto the box.
//! All geometry is done in coordinates scaled by the bound widths, so a population-sized
//! initial value and a unit-interval rate move on comparable scales.

use argmin::core::{
    CostFunction, Error, IterState, Problem, Solver, State, TerminationReason, TerminationStatus,
    KV,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Fraction of the predicted decrease a trial step must achieve to be accepted
const SUFFICIENT_DECREASE: f64 = 1e-4;

/// Steps achieving at least this fraction of the predicted decrease grow the radius
const VERY_SUCCESSFUL: f64 = 0.75;

type ProjectedGradientState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedGradient {
    lower: Vec<f64>,
    upper: Vec<f64>,
    radius: f64,
    min_radius: f64,
    max_radius: f64,
    gradient_tolerance: f64,
    cost_tolerance: f64,
    finite_difference_step: f64,
    /// Set once a convergence criterion fires
    converged: Option<String>,
}

impl ProjectedGradient {
    pub fn new(bounds: &[(f64, f64)]) -> Result<Self, Error> {
        if bounds.is_empty() {
            return Err(Error::msg("Projected Gradient: no bounds given"));
        }
        if let Some((lower, upper)) = bounds
            .iter()
            .find(|(lower, upper)| !(lower.is_finite() && upper.is_finite() && lower <= upper))
        {
            return Err(Error::msg(format!(
                "Projected Gradient: invalid bounds [{lower}, {upper}]"
            )));
        }
        Ok(Self {
            lower: bounds.iter().map(|(lower, _)| *lower).collect(),
            upper: bounds.iter().map(|(_, upper)| *upper).collect(),
            radius: 0.1,
            min_radius: 1e-8,
            max_radius: 1.0,
            gradient_tolerance: 1e-6,
            cost_tolerance: 1e-10,
            finite_difference_step: 1e-4,
            converged: None,
        })
    }

    /// Initial trust radius, in bound-width units; must be in (0, 1]
    pub fn with_radius(mut self, radius: f64) -> Result<Self, Error> {
        if !(radius > 0.0 && radius <= 1.0) {
            return Err(Error::msg(format!(
                "Projected Gradient: radius must be in (0, 1], got {radius}"
            )));
        }
        self.radius = radius;
        self.max_radius = self.max_radius.max(radius);
        Ok(self)
    }

    /// Radius below which the search is considered converged; must be positive
    pub fn with_min_radius(mut self, min_radius: f64) -> Result<Self, Error> {
        if !(min_radius > 0.0 && min_radius.is_finite()) {
            return Err(Error::msg(format!(
                "Projected Gradient: min_radius must be positive, got {min_radius}"
            )));
        }
        self.min_radius = min_radius;
        Ok(self)
    }

    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Result<Self, Error> {
        if !(tolerance >= 0.0 && tolerance.is_finite()) {
            return Err(Error::msg(format!(
                "Projected Gradient: gradient tolerance must be non-negative, got {tolerance}"
            )));
        }
        self.gradient_tolerance = tolerance;
        Ok(self)
    }

    /// Relative decrease below which an accepted step ends the search
    pub fn with_cost_tolerance(mut self, tolerance: f64) -> Result<Self, Error> {
        if !(tolerance >= 0.0 && tolerance.is_finite()) {
            return Err(Error::msg(format!(
                "Projected Gradient: cost tolerance must be non-negative, got {tolerance}"
            )));
        }
        self.cost_tolerance = tolerance;
        Ok(self)
    }

    /// Finite-difference step as a fraction of each bound width; must be in (0, 0.5]
    pub fn with_finite_difference_step(mut self, step: f64) -> Result<Self, Error> {
        if !(step > 0.0 && step <= 0.5) {
            return Err(Error::msg(format!(
                "Projected Gradient: finite-difference step must be in (0, 0.5], got {step}"
            )));
        }
        self.finite_difference_step = step;
        Ok(self)
    }

    fn width(&self, k: usize) -> f64 {
        self.upper[k] - self.lower[k]
    }

    fn project(&self, param: &[f64]) -> Vec<f64> {
        param
            .iter()
            .enumerate()
            .map(|(k, value)| value.clamp(self.lower[k], self.upper[k]))
            .collect()
    }

    fn to_unit(&self, param: &[f64]) -> Vec<f64> {
        param
            .iter()
            .enumerate()
            .map(|(k, value)| match self.width(k) {
                width if width > 0.0 => (value - self.lower[k]) / width,
                _ => 0.0,
            })
            .collect()
    }

    fn from_unit(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .enumerate()
            .map(|(k, u)| (self.lower[k] + u * self.width(k)).clamp(self.lower[k], self.upper[k]))
            .collect()
    }

    /// One-sided differences that never leave the box.
    ///
    /// A forward step is used unless it would cross the upper bound or lands on an
    /// infeasible point; zero-width coordinates get a zero component.
    fn estimate_gradient<O>(
        &self,
        problem: &mut Problem<O>,
        param: &[f64],
        cost: f64,
    ) -> Result<Vec<f64>, Error>
    where
        O: CostFunction<Param = Vec<f64>, Output = f64>,
    {
        let mut gradient = Vec::with_capacity(param.len());
        let mut probe = param.to_vec();

        for k in 0..param.len() {
            let width = self.width(k);
            if width <= 0.0 {
                gradient.push(0.0);
                continue;
            }
            let step = self.finite_difference_step * width;

            let mut slope = None;
            for direction in [1.0, -1.0] {
                let shifted = param[k] + direction * step;
                if shifted < self.lower[k] || shifted > self.upper[k] {
                    continue;
                }
                probe[k] = shifted;
                let shifted_cost = problem.cost(&probe)?;
                probe[k] = param[k];
                if shifted_cost.is_finite() {
                    slope = Some(direction * (shifted_cost - cost) / step);
                    break;
                }
            }

            match slope {
                Some(slope) => gradient.push(slope),
                None => {
                    return Err(Error::msg(format!(
                        "Non-finite loss on both sides of coordinate {k} while estimating the gradient"
                    )))
                }
            }
        }

        Ok(gradient)
    }

    fn stop(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!("Projected Gradient converged: {reason}");
        self.converged = Some(reason);
    }
}

impl<O> Solver<O, ProjectedGradientState> for ProjectedGradient
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    const NAME: &'static str = "Projected Gradient";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: ProjectedGradientState,
    ) -> Result<(ProjectedGradientState, Option<KV>), Error> {
        let param = state
            .get_param()
            .ok_or_else(|| Error::msg("Projected Gradient: initial parameter vector required"))?;
        if param.len() != self.lower.len() {
            return Err(Error::msg(format!(
                "Projected Gradient: {} bounds for {} parameters",
                self.lower.len(),
                param.len()
            )));
        }
        let param = self.project(param);
        let cost = problem.cost(&param)?;
        if !cost.is_finite() {
            return Err(Error::msg(format!(
                "Projected Gradient: loss at the initial point is {cost}"
            )));
        }
        Ok((state.param(param).cost(cost), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: ProjectedGradientState,
    ) -> Result<(ProjectedGradientState, Option<KV>), Error> {
        let param = state
            .take_param()
            .ok_or_else(|| Error::msg("Projected Gradient: parameter vector missing from state"))?;
        let cost = state.cost;

        let gradient = self.estimate_gradient(problem, &param, cost)?;
        let scaled: Vec<f64> = gradient
            .iter()
            .enumerate()
            .map(|(k, g)| g * self.width(k))
            .collect();
        let unit = self.to_unit(&param);

        // distance moved by a full projected gradient step
        let stationarity = unit
            .iter()
            .zip(&scaled)
            .map(|(u, g)| (u - (u - g).clamp(0.0, 1.0)).abs())
            .fold(0.0, f64::max);
        if stationarity <= self.gradient_tolerance {
            self.stop(format!("projected gradient {stationarity:e} within tolerance"));
            return Ok((state.param(param).cost(cost).gradient(gradient), None));
        }

        let norm = scaled.iter().map(|g| g * g).sum::<f64>().sqrt();
        loop {
            let trial_unit: Vec<f64> = unit
                .iter()
                .zip(&scaled)
                .map(|(u, g)| (u - self.radius * g / norm).clamp(0.0, 1.0))
                .collect();
            let predicted: f64 = unit
                .iter()
                .zip(&trial_unit)
                .zip(&scaled)
                .map(|((u, t), g)| g * (u - t))
                .sum();
            let trial = self.from_unit(&trial_unit);
            let trial_cost = problem.cost(&trial)?;
            let decrease = cost - trial_cost;

            let sufficient = decrease >= SUFFICIENT_DECREASE * predicted;
            if trial_cost.is_finite() && predicted > 0.0 && sufficient {
                if decrease >= VERY_SUCCESSFUL * predicted {
                    self.radius = (2.0 * self.radius).min(self.max_radius);
                }
                if decrease <= self.cost_tolerance * (1.0 + cost.abs()) {
                    self.stop(format!("loss decrease {decrease:e} within tolerance"));
                }
                return Ok((state.param(trial).cost(trial_cost).gradient(gradient), None));
            }

            self.radius *= 0.5;
            if self.radius < self.min_radius {
                self.stop(format!("trust radius {:e} below minimum", self.radius));
                return Ok((state.param(param).cost(cost).gradient(gradient), None));
            }
        }
    }

    fn terminate(&mut self, _state: &ProjectedGradientState) -> TerminationStatus {
        match self.converged {
            Some(_) => TerminationStatus::Terminated(TerminationReason::SolverConverged),
            None => TerminationStatus::NotTerminated,
        }
    }
}
