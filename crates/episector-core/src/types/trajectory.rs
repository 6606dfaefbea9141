use serde::{Deserialize, Serialize};

use super::population::{Compartment, CompartmentState, ModelVariant};

/// Compartment values at the end of one simulated day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub day: u32,
    /// Sum of the three sector susceptibles
    pub susceptible: f64,
    pub susceptible_medical: f64,
    pub susceptible_essential: f64,
    pub susceptible_other: f64,
    pub exposed: f64,
    pub infected: f64,
    pub quarantined: f64,
    pub recovered: f64,
    /// Only present in the unknown-recovered variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_recovered: Option<f64>,
    pub deceased: f64,
}

impl Snapshot {
    pub fn from_state(day: u32, state: &CompartmentState, variant: ModelVariant) -> Self {
        Self {
            day,
            susceptible: state.susceptible(),
            susceptible_medical: state.susceptible_medical,
            susceptible_essential: state.susceptible_essential,
            susceptible_other: state.susceptible_other,
            exposed: state.exposed,
            infected: state.infected,
            quarantined: state.quarantined,
            recovered: state.recovered,
            unknown_recovered: variant
                .tracks_unknown_recovered()
                .then_some(state.unknown_recovered),
            deceased: state.deceased,
        }
    }

    /// Value of a compartment, `None` when the variant does not track it
    pub fn get(&self, compartment: Compartment) -> Option<f64> {
        match compartment {
            Compartment::SusceptibleMedical => Some(self.susceptible_medical),
            Compartment::SusceptibleEssential => Some(self.susceptible_essential),
            Compartment::SusceptibleOther => Some(self.susceptible_other),
            Compartment::Exposed => Some(self.exposed),
            Compartment::Infected => Some(self.infected),
            Compartment::Quarantined => Some(self.quarantined),
            Compartment::Recovered => Some(self.recovered),
            Compartment::UnknownRecovered => self.unknown_recovered,
            Compartment::Deceased => Some(self.deceased),
        }
    }

    pub fn to_state(&self) -> CompartmentState {
        CompartmentState {
            susceptible_medical: self.susceptible_medical,
            susceptible_essential: self.susceptible_essential,
            susceptible_other: self.susceptible_other,
            exposed: self.exposed,
            infected: self.infected,
            quarantined: self.quarantined,
            recovered: self.recovered,
            unknown_recovered: self.unknown_recovered.unwrap_or(0.0),
            deceased: self.deceased,
        }
    }

    pub fn total(&self) -> f64 {
        self.to_state().total()
    }
}

/// Daily snapshots from day 0 to the simulation horizon, inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    variant: ModelVariant,
    snapshots: Vec<Snapshot>,
}

impl Trajectory {
    pub fn new(variant: ModelVariant, snapshots: Vec<Snapshot>) -> Self {
        Self { variant, snapshots }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, day: usize) -> Option<&Snapshot> {
        self.snapshots.get(day)
    }

    pub fn first(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Daily values of one compartment; empty if the variant does not track it
    pub fn series(&self, compartment: Compartment) -> Vec<f64> {
        self.snapshots
            .iter()
            .filter_map(|snapshot| snapshot.get(compartment))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
