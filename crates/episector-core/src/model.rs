//! # Sector quarantine model
//!
//! Right-hand side of the compartmental ODE system. Susceptibles are split by sector
//! (medical, essential, other); each sector's contact rate is `gamma` divided by its
//! phase-dependent reduction factor. Medical susceptibles are also infected by quarantined
//! (hospitalized) individuals through `delta`.
//!
//! All flows are normalised by the current total population `n`, so the model behaves the
//! same for absolute counts and for fractions. Every flow leaves one compartment and enters
//! another, which keeps `n` constant along exact solutions.

use crate::types::{Compartment, ModelVariant, Parameters, QuarantinePhase, Sector};

const SM: usize = Compartment::SusceptibleMedical as usize;
const SE: usize = Compartment::SusceptibleEssential as usize;
const SO: usize = Compartment::SusceptibleOther as usize;
const E: usize = Compartment::Exposed as usize;
const I: usize = Compartment::Infected as usize;
const Q: usize = Compartment::Quarantined as usize;
const R: usize = Compartment::Recovered as usize;
const U: usize = Compartment::UnknownRecovered as usize;
const D: usize = Compartment::Deceased as usize;

/// A parameter set bound to a model variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpidemicModel {
    parameters: Parameters,
    variant: ModelVariant,
}

impl EpidemicModel {
    pub fn new(parameters: Parameters, variant: ModelVariant) -> Self {
        Self {
            parameters,
            variant,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn phase_at(&self, t: f64) -> QuarantinePhase {
        self.parameters.quarantine.phase_at(t)
    }

    /// Undetected recovery rate, zero when the variant has no such compartment
    fn unknown_recovery_rate(&self) -> f64 {
        if self.variant.tracks_unknown_recovered() {
            self.parameters.r_u
        } else {
            0.0
        }
    }

    /// Write the instantaneous rate of change of `y` at time `t` into `dy`.
    ///
    /// Both slices use the [`Compartment`] order. An empty population (`n <= 0`) has no
    /// flows; callers are expected to reject it before integrating.
    pub fn derivatives(&self, t: f64, y: &[f64], dy: &mut [f64]) {
        dy.fill(0.0);

        let n: f64 = y.iter().sum();
        if n <= 0.0 {
            return;
        }

        let p = &self.parameters;
        let phase = self.phase_at(t);
        let rate_m = p.contact_rate_in(Sector::Medical, phase);
        let rate_e = p.contact_rate_in(Sector::Essential, phase);
        let rate_o = p.contact_rate_in(Sector::Other, phase);
        let r_u = self.unknown_recovery_rate();

        let (e, i, q) = (y[E], y[I], y[Q]);

        dy[SM] = -y[SM] * (rate_m * i + p.delta * q) / n;
        dy[SE] = -y[SE] * rate_e * i / n;
        dy[SO] = -y[SO] * rate_o * i / n;
        dy[E] = -(dy[SM] + dy[SE] + dy[SO]) - p.sigma * e;
        dy[I] = p.sigma * e - (p.alpha + p.r_i + p.d_i + r_u) * i;
        dy[Q] = p.alpha * i - (p.r_q + p.d_q) * q;
        dy[R] = p.r_i * i + p.r_q * q;
        dy[U] = r_u * i;
        dy[D] = p.d_i * i + p.d_q * q;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CompartmentState, QuarantineSchedule, SectorReductions, NUM_COMPARTMENTS,
    };
    use approx::assert_relative_eq;

    fn state() -> [f64; NUM_COMPARTMENTS] {
        CompartmentState {
            susceptible_medical: 100.0,
            susceptible_essential: 300.0,
            susceptible_other: 500.0,
            exposed: 40.0,
            infected: 30.0,
            quarantined: 20.0,
            recovered: 5.0,
            unknown_recovered: 3.0,
            deceased: 2.0,
        }
        .to_vector()
    }

    fn params() -> Parameters {
        Parameters {
            gamma: 2.0,
            medical: SectorReductions::new(2.0, 2.0),
            essential: SectorReductions::new(4.0, 1.0),
            other: SectorReductions::new(10.0, 3.0),
            alpha: 0.2,
            delta: 0.1,
            sigma: 0.3,
            r_i: 0.1,
            d_i: 0.01,
            r_u: 0.05,
            r_q: 0.2,
            d_q: 0.02,
            quarantine: QuarantineSchedule::new(10.0, 10.0, 10.0),
        }
    }

    fn derivatives(model: &EpidemicModel, t: f64) -> [f64; NUM_COMPARTMENTS] {
        let mut dy = [0.0; NUM_COMPARTMENTS];
        model.derivatives(t, &state(), &mut dy);
        dy
    }

    #[test]
    fn test_flows_cancel_in_aggregate() {
        for variant in [ModelVariant::Basic, ModelVariant::WithUnknownRecovered] {
            let model = EpidemicModel::new(params(), variant);
            for t in [0.0, 10.0, 15.0, 25.0, 40.0] {
                let total: f64 = derivatives(&model, t).iter().sum();
                assert!(total.abs() < 1e-12, "net flow {total} at t={t}");
            }
        }
    }

    #[test]
    fn test_baseline_flows() {
        let model = EpidemicModel::new(params(), ModelVariant::WithUnknownRecovered);
        let dy = derivatives(&model, 0.0);
        let n = 1000.0;

        assert_relative_eq!(dy[SM], -100.0 * (2.0 * 30.0 + 0.1 * 20.0) / n);
        assert_relative_eq!(dy[SE], -300.0 * 2.0 * 30.0 / n);
        assert_relative_eq!(dy[I], 0.3 * 40.0 - (0.2 + 0.1 + 0.01 + 0.05) * 30.0);
        assert_relative_eq!(dy[Q], 0.2 * 30.0 - (0.2 + 0.02) * 20.0);
        assert_relative_eq!(dy[R], 0.1 * 30.0 + 0.2 * 20.0);
        assert_relative_eq!(dy[U], 0.05 * 30.0);
        assert_relative_eq!(dy[D], 0.01 * 30.0 + 0.02 * 20.0);
    }

    #[test]
    fn test_basic_variant_has_no_silent_recovery() {
        let model = EpidemicModel::new(params(), ModelVariant::Basic);
        let dy = derivatives(&model, 0.0);
        assert_eq!(dy[U], 0.0);
        assert_relative_eq!(dy[I], 0.3 * 40.0 - (0.2 + 0.1 + 0.01) * 30.0);
    }

    #[test]
    fn test_outflow_discontinuous_at_phase_boundaries() {
        let model = EpidemicModel::new(params(), ModelVariant::Basic);
        let before = derivatives(&model, 10.0 - 1e-9)[SO];
        let at_start = derivatives(&model, 10.0)[SO];
        let inside = derivatives(&model, 15.0)[SO];
        let at_phase_2 = derivatives(&model, 20.0)[SO];
        let after_end = derivatives(&model, 30.0)[SO];

        // phase 1 divides the baseline outflow by 10, phase 2 by a further 3
        assert_relative_eq!(at_start, before / 10.0, max_relative = 1e-12);
        assert_relative_eq!(inside, at_start);
        assert_relative_eq!(at_phase_2, at_start / 3.0, max_relative = 1e-12);
        assert_relative_eq!(after_end, before);
    }

    #[test]
    fn test_empty_population_has_no_flows() {
        let model = EpidemicModel::new(params(), ModelVariant::Basic);
        let mut dy = [1.0; NUM_COMPARTMENTS];
        model.derivatives(0.0, &[0.0; NUM_COMPARTMENTS], &mut dy);
        assert!(dy.iter().all(|v| *v == 0.0));
    }
}
