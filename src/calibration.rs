//! Calibration documents and per-vehicle tables
//!
//! A document lists dip levels with one volume per section:
//!
//! ```json
//! { "id": "7958", "sections": 3, "table": [ { "mm": 10, "s": [40, 22, 40] }, ... ] }
//! ```
//!
//! Cells may be numbers or numeric strings. Rows arrive in any order and are
//! sorted per section by level when the document is normalized.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CalibrationError;
use crate::interpolation::{level_to_volume, volume_to_level, CalibrationSample};
use crate::resolver::extract_vehicle_id;
use crate::units::number_from_json;

/// Calibration curve of one physical compartment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompartmentCalibration {
    pub samples: Vec<CalibrationSample>,
}

impl CompartmentCalibration {
    /// Build from unsorted samples
    pub fn from_samples(mut samples: Vec<CalibrationSample>) -> Self {
        samples.sort_by(|a, b| a.level_mm.total_cmp(&b.level_mm));
        Self { samples }
    }

    /// Full volume: the last sample's volume
    pub fn capacity_liters(&self) -> f64 {
        self.samples.last().map(|s| s.volume_liters).unwrap_or(0.0)
    }

    /// Highest calibrated level
    pub fn max_level_mm(&self) -> f64 {
        self.samples.last().map(|s| s.level_mm).unwrap_or(0.0)
    }

    pub fn level_to_volume(&self, level_mm: f64) -> f64 {
        level_to_volume(&self.samples, level_mm)
    }

    pub fn volume_to_level(&self, liters: f64) -> f64 {
        volume_to_level(&self.samples, liters)
    }

    /// True when volumes never decrease with level
    pub fn is_monotonic(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].level_mm <= w[1].level_mm && w[0].volume_liters <= w[1].volume_liters)
    }
}

/// Calibration state of one vehicle.
///
/// `Missing` means the vehicle is known but has no calibration resource:
/// the UI still renders, mm ↔ liters conversions are disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VehicleCalibration {
    #[serde(rename_all = "camelCase")]
    Present {
        vehicle_id: String,
        name: String,
        compartments: Vec<CompartmentCalibration>,
    },
    #[serde(rename_all = "camelCase")]
    Missing { vehicle_id: String },
}

impl VehicleCalibration {
    pub fn missing(vehicle_id: impl Into<String>) -> Self {
        Self::Missing { vehicle_id: vehicle_id.into() }
    }

    pub fn vehicle_id(&self) -> &str {
        match self {
            Self::Present { vehicle_id, .. } | Self::Missing { vehicle_id } => vehicle_id,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    /// Compartment tables; empty for `Missing`
    pub fn compartments(&self) -> &[CompartmentCalibration] {
        match self {
            Self::Present { compartments, .. } => compartments,
            Self::Missing { .. } => &[],
        }
    }

    pub fn compartment(&self, index: usize) -> Option<&CompartmentCalibration> {
        self.compartments().get(index)
    }

    /// Display name ("Бочка 7958" unless the document names it)
    pub fn display_name(&self) -> String {
        match self {
            Self::Present { name, .. } => name.clone(),
            Self::Missing { vehicle_id } => default_name(vehicle_id),
        }
    }

    /// Sum of compartment capacities
    pub fn total_capacity_liters(&self) -> f64 {
        self.compartments()
            .iter()
            .map(|c| c.capacity_liters().max(0.0))
            .sum()
    }
}

fn default_name(vehicle_id: &str) -> String {
    format!("Бочка {}", vehicle_id)
}

/// Raw document as served; every field optional so shape checks stay ours
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    cistern_id: Option<Value>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sections: Option<Value>,
    #[serde(default)]
    table: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    mm: Value,
    #[serde(default)]
    s: Vec<Value>,
}

impl RawDocument {
    /// First non-empty id-like field, as text
    fn id_text(&self) -> String {
        [&self.id, &self.cistern_id, &self.code]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .or_else(|| self.name.clone())
            .unwrap_or_default()
    }
}

/// Parse and normalize a calibration document into a `Present` calibration.
///
/// Section count comes from `sections` when positive, otherwise from the
/// width of the first row.
pub fn parse_document(json: &str) -> Result<VehicleCalibration, CalibrationError> {
    let raw: RawDocument = serde_json::from_str(json)?;

    let vehicle_id = extract_vehicle_id(&raw.id_text()).ok_or(CalibrationError::MissingId)?;
    if raw.table.is_empty() {
        return Err(CalibrationError::EmptyTable);
    }

    let widest = raw.table.iter().map(|row| row.s.len()).max().unwrap_or(0);
    let declared = raw
        .sections
        .as_ref()
        .and_then(number_from_json)
        .filter(|n| *n >= 1.0);
    if let Some(n) = declared {
        if n > widest as f64 {
            return Err(CalibrationError::SectionsExceedTable { declared: n, widest });
        }
    }
    let sections = match declared {
        Some(n) => n as usize,
        None => raw.table[0].s.len(),
    };
    if sections == 0 {
        return Err(CalibrationError::NoSections);
    }

    let compartments = (0..sections)
        .map(|i| {
            let samples = raw
                .table
                .iter()
                .map(|row| {
                    let mm = number_from_json(&row.mm).unwrap_or(0.0);
                    let liters = row.s.get(i).and_then(number_from_json).unwrap_or(0.0);
                    CalibrationSample::new(mm, liters)
                })
                .collect();
            CompartmentCalibration::from_samples(samples)
        })
        .collect();

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_name(&vehicle_id));

    Ok(VehicleCalibration::Present { vehicle_id, name, compartments })
}
