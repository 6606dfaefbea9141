use serde::{Deserialize, Serialize};

use super::population::Sector;
use crate::error::{ensure_non_negative, ConfigError};

/// Transmission regime in effect at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantinePhase {
    /// Before the quarantine starts or after it ends
    Baseline,
    Phase1,
    Phase2,
}

/// Quarantine timing in days; the three windows are contiguous and half-open
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuarantineSchedule {
    pub start: f64,
    pub phase_1_duration: f64,
    pub phase_2_duration: f64,
}

impl QuarantineSchedule {
    pub fn new(start: f64, phase_1_duration: f64, phase_2_duration: f64) -> Self {
        Self {
            start,
            phase_1_duration,
            phase_2_duration,
        }
    }

    pub fn phase_1_end(&self) -> f64 {
        self.start + self.phase_1_duration
    }

    /// First day on which the baseline rate applies again
    pub fn end(&self) -> f64 {
        self.phase_1_end() + self.phase_2_duration
    }

    pub fn phase_at(&self, t: f64) -> QuarantinePhase {
        if t < self.start || t >= self.end() {
            QuarantinePhase::Baseline
        } else if t < self.phase_1_end() {
            QuarantinePhase::Phase1
        } else {
            QuarantinePhase::Phase2
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_negative("quarantine_start", self.start)?;
        ensure_non_negative("quarantine_1_duration", self.phase_1_duration)?;
        ensure_non_negative("quarantine_2_duration", self.phase_2_duration)
    }
}

/// Per-sector divisors applied to `gamma` during the two quarantine phases
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorReductions {
    pub phase_1: f64,
    /// Compounds with `phase_1`
    pub phase_2: f64,
}

impl SectorReductions {
    pub fn new(phase_1: f64, phase_2: f64) -> Self {
        Self { phase_1, phase_2 }
    }

    /// Total divisor applied to `gamma` in the given phase
    pub fn factor(&self, phase: QuarantinePhase) -> f64 {
        match phase {
            QuarantinePhase::Baseline => 1.0,
            QuarantinePhase::Phase1 => self.phase_1,
            QuarantinePhase::Phase2 => self.phase_1 * self.phase_2,
        }
    }
}

impl Default for SectorReductions {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Epidemiological parameters of the sector quarantine model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Baseline transmission rate
    pub gamma: f64,
    pub medical: SectorReductions,
    pub essential: SectorReductions,
    pub other: SectorReductions,
    /// Infected -> quarantined
    pub alpha: f64,
    /// Quarantined -> medical susceptible back-transmission
    pub delta: f64,
    /// Exposed -> infected
    pub sigma: f64,
    pub r_i: f64,
    pub d_i: f64,
    /// Undetected recovery, ignored by the basic variant
    #[serde(default)]
    pub r_u: f64,
    pub r_q: f64,
    pub d_q: f64,
    #[serde(default)]
    pub quarantine: QuarantineSchedule,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            medical: SectorReductions::default(),
            essential: SectorReductions::default(),
            other: SectorReductions::default(),
            alpha: 0.5,
            delta: 0.0,
            sigma: 0.9,
            r_i: 0.9,
            d_i: 0.0,
            r_u: 0.1,
            r_q: 0.7,
            d_q: 0.034,
            quarantine: QuarantineSchedule::default(),
        }
    }
}

impl Parameters {
    pub fn reductions(&self, sector: Sector) -> &SectorReductions {
        match sector {
            Sector::Medical => &self.medical,
            Sector::Essential => &self.essential,
            Sector::Other => &self.other,
        }
    }

    pub fn reductions_mut(&mut self, sector: Sector) -> &mut SectorReductions {
        match sector {
            Sector::Medical => &mut self.medical,
            Sector::Essential => &mut self.essential,
            Sector::Other => &mut self.other,
        }
    }

    pub fn contact_rate_in(&self, sector: Sector, phase: QuarantinePhase) -> f64 {
        self.gamma / self.reductions(sector).factor(phase)
    }

    /// Effective contact rate of a sector at time `t`
    pub fn contact_rate(&self, sector: Sector, t: f64) -> f64 {
        self.contact_rate_in(sector, self.quarantine.phase_at(t))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("gamma", self.gamma),
            ("alpha", self.alpha),
            ("delta", self.delta),
            ("sigma", self.sigma),
            ("r_i", self.r_i),
            ("d_i", self.d_i),
            ("r_u", self.r_u),
            ("r_q", self.r_q),
            ("d_q", self.d_q),
        ];
        for (name, value) in rates {
            ensure_non_negative(name, value)?;
        }

        for sector in Sector::ALL {
            let reductions = self.reductions(sector);
            for (phase, value) in [(1, reductions.phase_1), (2, reductions.phase_2)] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::NonPositiveReduction {
                        name: format!("{}_gamma_reduction_{}", sector.prefix(), phase),
                        value,
                    });
                }
            }
        }

        self.quarantine.validate()
    }

    pub fn effective_contact_rates(&self) -> EffectiveContactRates {
        let rates = |sector| {
            let reductions = self.reductions(sector);
            let phase_1 = self.gamma / reductions.phase_1;
            (phase_1, phase_1 / reductions.phase_2)
        };
        let (gamma_m_1, gamma_m_2) = rates(Sector::Medical);
        let (gamma_e_1, gamma_e_2) = rates(Sector::Essential);
        let (gamma_o_1, gamma_o_2) = rates(Sector::Other);
        EffectiveContactRates {
            gamma: self.gamma,
            gamma_m_1,
            gamma_m_2,
            gamma_e_1,
            gamma_e_2,
            gamma_o_1,
            gamma_o_2,
        }
    }
}

/// Contact rates per sector and phase, the encoding used by stored parameter files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveContactRates {
    pub gamma: f64,
    pub gamma_m_1: f64,
    pub gamma_m_2: f64,
    pub gamma_e_1: f64,
    pub gamma_e_2: f64,
    pub gamma_o_1: f64,
    pub gamma_o_2: f64,
}

impl EffectiveContactRates {
    fn sector_rates(&self, sector: Sector) -> (f64, f64) {
        match sector {
            Sector::Medical => (self.gamma_m_1, self.gamma_m_2),
            Sector::Essential => (self.gamma_e_1, self.gamma_e_2),
            Sector::Other => (self.gamma_o_1, self.gamma_o_2),
        }
    }

    /// Overwrite `gamma` and the reduction factors of `parameters` with this encoding
    pub fn apply_to(&self, parameters: &mut Parameters) -> Result<(), ConfigError> {
        ensure_non_negative("gamma", self.gamma)?;
        for sector in Sector::ALL {
            let (phase_1_rate, phase_2_rate) = self.sector_rates(sector);
            for (phase, rate) in [(1, phase_1_rate), (2, phase_2_rate)] {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(ConfigError::InvalidValue {
                        name: format!("gamma_{}_{}", sector.prefix(), phase),
                        value: rate,
                    });
                }
            }
            *parameters.reductions_mut(sector) =
                SectorReductions::new(self.gamma / phase_1_rate, phase_1_rate / phase_2_rate);
        }
        parameters.gamma = self.gamma;
        Ok(())
    }
}
