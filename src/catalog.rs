//! Built-in cargo types, trailer presets and tractors
//!
//! Embeds catalog.json at compile time via `include_str!`. Custom entries
//! from the user are layered on top; on key collision the custom entry wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::units::round_to;

/// Raw JSON embedded at compile time
const CATALOG_JSON: &str = include_str!("../catalog.json");

/// Parsed catalog.json (singleton)
pub static CATALOG: LazyLock<BuiltinCatalog> = LazyLock::new(|| {
    serde_json::from_str(CATALOG_JSON).expect("Failed to parse embedded catalog.json")
});

/// Top-level built-in catalog
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinCatalog {
    pub version: String,
    pub cargo_types: Vec<CargoType>,
    pub tractors: Vec<String>,
    pub trailers: Vec<TrailerPreset>,
    /// Vehicles known to have calibration documents
    pub barrel_ids: Vec<String>,
}

/// Cargo type with its density in kg/L
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoType {
    pub key: String,
    pub label: String,
    #[serde(alias = "rho")]
    pub density: f64,
}

/// Trailer preset: fixed capacities per vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailerPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub axles: u8,
    #[serde(default)]
    pub tare_kg: f64,
    #[serde(flatten)]
    pub body: TrailerBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrailerBody {
    Tanker {
        #[serde(rename = "compartmentsLiters")]
        compartments_liters: Vec<f64>,
    },
    Platform {
        #[serde(default)]
        positions: Option<usize>,
    },
}

impl TrailerPreset {
    pub fn is_tanker(&self) -> bool {
        matches!(self.body, TrailerBody::Tanker { .. })
    }

    /// Compartment capacities; empty for platforms
    pub fn capacities(&self) -> &[f64] {
        match &self.body {
            TrailerBody::Tanker { compartments_liters } => compartments_liters,
            TrailerBody::Platform { .. } => &[],
        }
    }
}

// ─── Cargo types ─────────────────────────────────────────────────────

/// Validate a cargo entry: non-empty key and label, positive density.
///
/// Density is rounded to 3 decimals.
pub fn sanitize_cargo(item: &CargoType) -> Option<CargoType> {
    let key = item.key.trim();
    let label = item.label.trim();
    if key.is_empty() || label.is_empty() || !item.density.is_finite() || item.density <= 0.0 {
        return None;
    }
    Some(CargoType {
        key: key.to_string(),
        label: label.to_string(),
        density: round_to(item.density, 3),
    })
}

/// Key for a user-added cargo type: `custom_<label>` lowercased, whitespace
/// runs to `_`, anything but word characters, Cyrillic, `_` and `-` dropped
pub fn custom_key(label: &str) -> String {
    let raw = format!("custom_{}", label).to_lowercase();
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        let keep = c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('а'..='я').contains(&c) || c == 'ё';
        if keep {
            out.push(c);
        }
    }
    out
}

/// Built-in cargo types overlaid with custom ones
#[derive(Debug, Clone, PartialEq)]
pub struct CargoCatalog {
    entries: Vec<CargoType>,
    custom: Vec<CargoType>,
}

impl Default for CargoCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CargoCatalog {
    pub fn builtin() -> Self {
        Self::with_custom(&[])
    }

    /// Merge built-in and custom entries, dropping invalid ones.
    /// A custom entry replaces a built-in with the same key in place.
    pub fn with_custom(custom: &[CargoType]) -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
            custom: Vec::new(),
        };
        for item in CATALOG.cargo_types.iter().filter_map(sanitize_cargo) {
            catalog.upsert(item);
        }
        for item in custom.iter().filter_map(sanitize_cargo) {
            catalog.custom.push(item.clone());
            catalog.upsert(item);
        }
        catalog
    }

    fn upsert(&mut self, item: CargoType) {
        match self.entries.iter_mut().find(|e| e.key == item.key) {
            Some(existing) => *existing = item,
            None => self.entries.push(item),
        }
    }

    /// Add a user cargo type; returns its key
    pub fn add_custom(&mut self, label: &str, density: f64) -> Option<String> {
        let item = sanitize_cargo(&CargoType {
            key: custom_key(label),
            label: label.to_string(),
            density,
        })?;
        let key = item.key.clone();
        self.custom.retain(|c| c.key != key);
        self.custom.push(item.clone());
        self.upsert(item);
        Some(key)
    }

    pub fn get(&self, key: &str) -> Option<&CargoType> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn density_of(&self, key: &str) -> Option<f64> {
        self.get(key).map(|c| c.density)
    }

    pub fn label_of(&self, key: &str) -> Option<&str> {
        self.get(key).map(|c| c.label.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|c| c.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CargoType> {
        self.entries.iter()
    }

    /// User-added entries only (what gets persisted)
    pub fn custom_entries(&self) -> &[CargoType] {
        &self.custom
    }
}

// ─── Trailers and tractors ───────────────────────────────────────────

/// Built-in trailer presets followed by custom ones
pub fn trailer_presets(custom: &[TrailerPreset]) -> Vec<TrailerPreset> {
    CATALOG.trailers.iter().chain(custom.iter()).cloned().collect()
}

/// Preset by id, else the first preset
pub fn find_trailer<'a>(presets: &'a [TrailerPreset], id: &str) -> Option<&'a TrailerPreset> {
    presets.iter().find(|t| t.id == id).or_else(|| presets.first())
}

/// Built-in tractor plates followed by custom ones
pub fn tractor_plates(custom: &[String]) -> Vec<String> {
    CATALOG.tractors.iter().chain(custom.iter()).cloned().collect()
}

/// Tractor plate → axle count, user-maintained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxleRegistry {
    axles: HashMap<String, u8>,
}

impl AxleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axles(&self, plate: &str) -> Option<u8> {
        self.axles.get(plate).copied()
    }

    pub fn set(&mut self, plate: &str, axles: u8) {
        if plate.is_empty() {
            return;
        }
        self.axles.insert(plate.to_string(), axles);
    }
}
