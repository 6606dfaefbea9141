use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ConfigError};

/// Number of slots in the state vector (the basic variant keeps `unknown_recovered` at zero)
pub const NUM_COMPARTMENTS: usize = 9;

/// A disease state (compartment) in the model, in state-vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compartment {
    SusceptibleMedical,
    SusceptibleEssential,
    SusceptibleOther,
    Exposed,
    Infected,
    Quarantined,
    Recovered,
    UnknownRecovered,
    Deceased,
}

impl Compartment {
    pub const ALL: [Compartment; NUM_COMPARTMENTS] = [
        Compartment::SusceptibleMedical,
        Compartment::SusceptibleEssential,
        Compartment::SusceptibleOther,
        Compartment::Exposed,
        Compartment::Infected,
        Compartment::Quarantined,
        Compartment::Recovered,
        Compartment::UnknownRecovered,
        Compartment::Deceased,
    ];

    /// Position of the compartment in the state vector
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Compartment::SusceptibleMedical => "susceptible_medical",
            Compartment::SusceptibleEssential => "susceptible_essential",
            Compartment::SusceptibleOther => "susceptible_other",
            Compartment::Exposed => "exposed",
            Compartment::Infected => "infected",
            Compartment::Quarantined => "quarantined",
            Compartment::Recovered => "recovered",
            Compartment::UnknownRecovered => "unknown_recovered",
            Compartment::Deceased => "deceased",
        }
    }
}

impl std::fmt::Display for Compartment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which compartment set the model tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelVariant {
    /// Eight compartments, no silent recovery channel
    #[serde(rename = "basic")]
    Basic,

    /// Nine compartments, infected individuals may recover undetected (`r_u`)
    #[default]
    #[serde(rename = "unknown_recovered")]
    WithUnknownRecovered,
}

impl ModelVariant {
    pub fn tracks_unknown_recovered(self) -> bool {
        matches!(self, ModelVariant::WithUnknownRecovered)
    }

    pub fn num_compartments(self) -> usize {
        match self {
            ModelVariant::Basic => NUM_COMPARTMENTS - 1,
            ModelVariant::WithUnknownRecovered => NUM_COMPARTMENTS,
        }
    }

    /// Compartments present in this variant, in state-vector order
    pub fn compartments(self) -> impl Iterator<Item = Compartment> {
        Compartment::ALL.into_iter().filter(move |compartment| {
            self.tracks_unknown_recovered() || *compartment != Compartment::UnknownRecovered
        })
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVariant::Basic => write!(f, "8-compartment"),
            ModelVariant::WithUnknownRecovered => write!(f, "9-compartment (unknown recovered)"),
        }
    }
}

/// Population sector used to stratify susceptibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Medical,
    Essential,
    Other,
}

impl Sector {
    pub const ALL: [Sector; 3] = [Sector::Medical, Sector::Essential, Sector::Other];

    pub fn name(self) -> &'static str {
        match self {
            Sector::Medical => "medical",
            Sector::Essential => "essential",
            Sector::Other => "other",
        }
    }

    /// One-letter prefix used in parameter names (`m_gamma_reduction_1`, ...)
    pub fn prefix(self) -> &'static str {
        match self {
            Sector::Medical => "m",
            Sector::Essential => "e",
            Sector::Other => "o",
        }
    }

    pub fn susceptible_compartment(self) -> Compartment {
        match self {
            Sector::Medical => Compartment::SusceptibleMedical,
            Sector::Essential => Compartment::SusceptibleEssential,
            Sector::Other => Compartment::SusceptibleOther,
        }
    }
}

/// Share of the population belonging to each sector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorFractions {
    pub medical: f64,
    pub essential: f64,
    pub other: f64,
}

impl SectorFractions {
    const SUM_TOLERANCE: f64 = 1e-9;

    pub fn new(medical: f64, essential: f64, other: f64) -> Self {
        Self {
            medical,
            essential,
            other,
        }
    }

    /// Medical and essential shares given, the rest of the population is `other`
    pub fn from_medical_essential(medical: f64, essential: f64) -> Self {
        Self::new(medical, essential, 1.0 - medical - essential)
    }

    pub fn get(&self, sector: Sector) -> f64 {
        match sector {
            Sector::Medical => self.medical,
            Sector::Essential => self.essential,
            Sector::Other => self.other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
        let sum = self.medical + self.essential + self.other;
        if in_unit(self.medical)
            && in_unit(self.essential)
            && in_unit(self.other)
            && (sum - 1.0).abs() <= Self::SUM_TOLERANCE
        {
            Ok(())
        } else {
            Err(ConfigError::SectorFractions {
                medical: self.medical,
                essential: self.essential,
                other: self.other,
            })
        }
    }

    /// Split a susceptible pool across sectors, `other` absorbs rounding so the parts sum exactly
    pub fn split(&self, susceptible: f64) -> (f64, f64, f64) {
        let medical = susceptible * self.medical;
        let essential = susceptible * self.essential;
        (medical, essential, susceptible - medical - essential)
    }
}

impl Default for SectorFractions {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

/// Population counts per compartment at a single instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompartmentState {
    pub susceptible_medical: f64,
    pub susceptible_essential: f64,
    pub susceptible_other: f64,
    pub exposed: f64,
    pub infected: f64,
    pub quarantined: f64,
    pub recovered: f64,
    #[serde(default)]
    pub unknown_recovered: f64,
    pub deceased: f64,
}

impl CompartmentState {
    pub fn from_vector(y: &[f64]) -> Self {
        let at = |compartment: Compartment| y[compartment.index()];
        Self {
            susceptible_medical: at(Compartment::SusceptibleMedical),
            susceptible_essential: at(Compartment::SusceptibleEssential),
            susceptible_other: at(Compartment::SusceptibleOther),
            exposed: at(Compartment::Exposed),
            infected: at(Compartment::Infected),
            quarantined: at(Compartment::Quarantined),
            recovered: at(Compartment::Recovered),
            unknown_recovered: at(Compartment::UnknownRecovered),
            deceased: at(Compartment::Deceased),
        }
    }

    pub fn to_vector(&self) -> [f64; NUM_COMPARTMENTS] {
        Compartment::ALL.map(|compartment| self.get(compartment))
    }

    pub fn get(&self, compartment: Compartment) -> f64 {
        match compartment {
            Compartment::SusceptibleMedical => self.susceptible_medical,
            Compartment::SusceptibleEssential => self.susceptible_essential,
            Compartment::SusceptibleOther => self.susceptible_other,
            Compartment::Exposed => self.exposed,
            Compartment::Infected => self.infected,
            Compartment::Quarantined => self.quarantined,
            Compartment::Recovered => self.recovered,
            Compartment::UnknownRecovered => self.unknown_recovered,
            Compartment::Deceased => self.deceased,
        }
    }

    pub fn susceptible(&self) -> f64 {
        self.susceptible_medical + self.susceptible_essential + self.susceptible_other
    }

    pub fn total(&self) -> f64 {
        self.to_vector().iter().sum()
    }

    /// Reject negative, non-finite or empty initial states
    pub fn validate(&self, variant: ModelVariant) -> Result<(), ConfigError> {
        for compartment in Compartment::ALL {
            ensure_non_negative(compartment.name(), self.get(compartment))?;
        }
        if !variant.tracks_unknown_recovered() && self.unknown_recovered != 0.0 {
            return Err(ConfigError::UntrackedCompartment {
                compartment: Compartment::UnknownRecovered.name(),
                variant,
            });
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::EmptyPopulation);
        }
        Ok(())
    }
}
