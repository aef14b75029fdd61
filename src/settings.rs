//! Engine settings
//!
//! Every field has a serde default so a partial settings object (or none at
//! all) still yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::catalog::CATALOG;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Cargo type assigned to new compartments
    #[serde(default = "default_cargo_key")]
    pub default_cargo_key: String,

    /// Density (kg/L) used when nothing better is known
    #[serde(default = "default_density")]
    pub default_density: f64,

    /// Where calibration documents live (`<base><id>.json`)
    #[serde(default = "default_calibration_base")]
    pub calibration_base: String,

    /// Decimal places kept on liters/tons after each reconciliation
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Platform positions when a preset does not say
    #[serde(default = "default_platform_positions")]
    pub platform_positions: usize,

    /// Vehicles whose calibration is loaded ahead of selection
    #[serde(default = "default_barrel_ids")]
    pub barrel_ids: Vec<String>,
}

fn default_cargo_key() -> String {
    "diesel".to_string()
}

fn default_density() -> f64 {
    0.84
}

fn default_calibration_base() -> String {
    "/premium/calc/data/barrels/".to_string()
}

fn default_decimals() -> u32 {
    3
}

fn default_platform_positions() -> usize {
    4
}

fn default_barrel_ids() -> Vec<String> {
    CATALOG.barrel_ids.clone()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_cargo_key: default_cargo_key(),
            default_density: default_density(),
            calibration_base: default_calibration_base(),
            decimals: default_decimals(),
            platform_positions: default_platform_positions(),
            barrel_ids: default_barrel_ids(),
        }
    }
}

impl Settings {
    /// Parse settings JSON; malformed input falls back to defaults
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "settings rejected, using defaults");
            Self::default()
        })
    }

    /// Resource path of a calibration document
    pub fn calibration_url(&self, candidate_id: &str) -> String {
        format!("{}{}.json", self.calibration_base, candidate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.default_cargo_key, "diesel");
        assert!((s.default_density - 0.84).abs() < f64::EPSILON);
        assert_eq!(s.decimals, 3);
        assert_eq!(s.platform_positions, 4);
        assert_eq!(s.barrel_ids.len(), 16);
        assert_eq!(s.barrel_ids[0], "7958");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s = Settings::from_json(r#"{"defaultDensity": 0.75}"#);
        assert!((s.default_density - 0.75).abs() < f64::EPSILON);
        assert_eq!(s.default_cargo_key, "diesel");
        assert_eq!(s.barrel_ids, CATALOG.barrel_ids);

        let s = Settings::from_json(r#"{"barrelIds": ["0310"]}"#);
        assert_eq!(s.barrel_ids, vec!["0310".to_string()]);
    }

    #[test]
    fn test_malformed_json_uses_defaults() {
        assert_eq!(Settings::from_json("{oops"), Settings::default());
    }

    #[test]
    fn test_calibration_url() {
        let s = Settings::default();
        assert_eq!(s.calibration_url("0310"), "/premium/calc/data/barrels/0310.json");
    }
}
