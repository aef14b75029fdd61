//! Trailer loading state
//!
//! `TrailerState` is created from a preset when a vehicle is selected and
//! replaced on re-selection. Tanker compartments always mirror the preset's
//! capacity list (see `TrailerState::ensure_rows_match_caps`).

use serde::{Deserialize, Serialize};

use crate::units::{liters_from_m3, m3_from_liters, valid_density, KG_PER_TON};

/// Live ledger of one tanker compartment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    pub capacity_liters: f64,
    pub cargo_type_key: String,
    /// kg per liter; 0 marks "unknown"
    pub density: f64,
    pub liters: f64,
    pub tons: f64,
}

impl Compartment {
    pub fn empty(capacity_liters: f64, cargo_type_key: &str, density: f64) -> Self {
        Self {
            capacity_liters: capacity_liters.max(0.0),
            cargo_type_key: cargo_type_key.to_string(),
            density,
            liters: 0.0,
            tons: 0.0,
        }
    }

    /// Headroom below capacity
    pub fn free_liters(&self) -> f64 {
        (self.capacity_liters - self.liters.max(0.0)).max(0.0)
    }

    pub fn m3(&self) -> f64 {
        m3_from_liters(self.liters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrailerState {
    #[serde(rename_all = "camelCase")]
    Tanker {
        capacities_liters: Vec<f64>,
        compartments: Vec<Compartment>,
    },
    #[serde(rename_all = "camelCase")]
    Platform {
        /// kg per loading position
        position_masses: Vec<f64>,
    },
}

impl TrailerState {
    /// Fresh tanker with every compartment empty
    pub fn tanker(capacities_liters: &[f64], cargo_type_key: &str, density: f64) -> Self {
        let capacities: Vec<f64> = capacities_liters
            .iter()
            .map(|c| if c.is_finite() { c.max(0.0) } else { 0.0 })
            .collect();
        let compartments = capacities
            .iter()
            .map(|&cap| Compartment::empty(cap, cargo_type_key, density))
            .collect();
        Self::Tanker {
            capacities_liters: capacities,
            compartments,
        }
    }

    pub fn platform(positions: usize) -> Self {
        Self::Platform {
            position_masses: vec![0.0; positions],
        }
    }

    pub fn is_tanker(&self) -> bool {
        matches!(self, Self::Tanker { .. })
    }

    pub fn compartments(&self) -> &[Compartment] {
        match self {
            Self::Tanker { compartments, .. } => compartments,
            Self::Platform { .. } => &[],
        }
    }

    pub fn compartments_mut(&mut self) -> Option<&mut Vec<Compartment>> {
        match self {
            Self::Tanker { compartments, .. } => Some(compartments),
            Self::Platform { .. } => None,
        }
    }

    pub fn capacities(&self) -> &[f64] {
        match self {
            Self::Tanker { capacities_liters, .. } => capacities_liters,
            Self::Platform { .. } => &[],
        }
    }

    /// Sum of non-negative capacities
    pub fn capacity_total(&self) -> f64 {
        self.capacities()
            .iter()
            .filter(|c| c.is_finite())
            .map(|c| c.max(0.0))
            .sum()
    }

    /// Pad or truncate compartments to the capacity list and copy each
    /// capacity onto its compartment
    pub fn ensure_rows_match_caps(&mut self, cargo_type_key: &str, density: f64) {
        if let Self::Tanker {
            capacities_liters,
            compartments,
        } = self
        {
            compartments.truncate(capacities_liters.len());
            while compartments.len() < capacities_liters.len() {
                compartments.push(Compartment::empty(0.0, cargo_type_key, density));
            }
            for (c, &cap) in compartments.iter_mut().zip(capacities_liters.iter()) {
                c.capacity_liters = if cap.is_finite() { cap.max(0.0) } else { 0.0 };
            }
        }
    }

    /// Zero every liters/tons figure (or platform mass)
    pub fn clear(&mut self) {
        match self {
            Self::Tanker { compartments, .. } => {
                for c in compartments {
                    c.liters = 0.0;
                    c.tons = 0.0;
                }
            }
            Self::Platform { position_masses } => position_masses.iter_mut().for_each(|m| *m = 0.0),
        }
    }
}

/// How cargo is assigned to compartments
#[derive(Debug, Clone, PartialEq)]
pub enum CargoMode {
    /// One cargo type and density for every compartment
    Single { type_key: String, density: f64 },
    /// Each compartment keeps its own type and density
    Mixed,
}

impl CargoMode {
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single { .. })
    }
}

/// Which field the user touched last; that field is the source of truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum LastEdit {
    #[default]
    None,
    Liters { index: usize },
    Tons { index: usize },
}

impl LastEdit {
    pub fn tons_edited(self, index: usize) -> bool {
        matches!(self, Self::Tons { index: i } if i == index)
    }
}

/// What the user asked the bulk distribution for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    #[default]
    VolumeLiters,
    VolumeM3,
    MassTons,
    FillMax,
}

impl RequestSource {
    /// Parse a persisted source name; unknown names read as liters
    pub fn from_name(name: &str) -> Self {
        match name {
            "volume_m3" => Self::VolumeM3,
            "mass_tons" => Self::MassTons,
            "fill_max" => Self::FillMax,
            _ => Self::VolumeLiters,
        }
    }
}

/// The last bulk-distribution intent, kept in every unit.
///
/// `None` means the unit could not be derived (no usable density).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub source: RequestSource,
    pub liters: Option<f64>,
    pub kg: Option<f64>,
    pub tons: Option<f64>,
    pub m3: Option<f64>,
    pub density: Option<f64>,
}

impl LoadRequest {
    /// Fill in whatever units are missing from the ones present.
    ///
    /// liters ← m3 ← kg/density; kg ← tons ← liters*density;
    /// tons ← kg; m3 ← liters.
    pub fn cross_derived(self) -> Self {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let density = finite(self.density).and_then(valid_density);
        let (liters, kg, tons, m3) = (finite(self.liters), finite(self.kg), finite(self.tons), finite(self.m3));

        let liters = liters
            .or_else(|| m3.map(liters_from_m3))
            .or_else(|| kg.zip(density).map(|(kg, rho)| kg / rho));
        let kg = kg
            .or_else(|| tons.map(|t| t * KG_PER_TON))
            .or_else(|| liters.zip(density).map(|(l, rho)| l * rho));
        let tons = tons.or_else(|| kg.map(|kg| kg / KG_PER_TON));
        let m3 = m3.or_else(|| liters.map(m3_from_liters));

        Self {
            source: self.source,
            liters,
            kg,
            tons,
            m3,
            density,
        }
    }
}
