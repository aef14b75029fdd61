//! Piecewise-linear calibration lookup
//!
//! One bracketing algorithm serves both directions: level is the x axis for
//! mm → liters, volume is the x axis for liters → mm.
//!
//! - input below zero clamps to zero
//! - at or below the first sample: first sample's paired value
//! - at or above the last sample: last sample's paired value (saturates)
//! - otherwise: y = a.y + (b.y - a.y) * (v - a.x) / (b.x - a.x)

use serde::{Deserialize, Serialize};

/// One dip-stick reading: liquid level and contained volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSample {
    pub level_mm: f64,
    pub volume_liters: f64,
}

impl CalibrationSample {
    pub fn new(level_mm: f64, volume_liters: f64) -> Self {
        Self { level_mm, volume_liters }
    }
}

/// Volume in liters at dip level `level_mm`.
///
/// `table` must be sorted ascending by level. Empty table yields 0.
pub fn level_to_volume(table: &[CalibrationSample], level_mm: f64) -> f64 {
    interpolate(table, level_mm, |s| s.level_mm, |s| s.volume_liters)
}

/// Dip level in mm for `liters`.
///
/// Requires non-decreasing volumes. Inside a flat run of equal volumes the
/// highest level of the run is returned.
pub fn volume_to_level(table: &[CalibrationSample], liters: f64) -> f64 {
    interpolate(table, liters, |s| s.volume_liters, |s| s.level_mm)
}

fn interpolate<T>(points: &[T], value: f64, x: impl Fn(&T) -> f64, y: impl Fn(&T) -> f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    // NaN also lands on zero here
    let value = if value > 0.0 { value } else { 0.0 };

    if value <= x(first) {
        return y(first);
    }
    if value >= x(last) {
        return y(last);
    }

    // first.x < value < last.x, so 1 <= hi <= len - 1
    let hi = points.partition_point(|p| x(p) <= value);
    let a = &points[hi - 1];
    let b = &points[hi];

    let span = x(b) - x(a);
    if span == 0.0 {
        return y(a);
    }
    y(a) + (y(b) - y(a)) * (value - x(a)) / span
}

/// WASM-friendly versions (table passed as JSON array of samples)
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "levelToVolume")]
pub fn level_to_volume_wasm(table_json: &str, level_mm: f64) -> f64 {
    let table: Vec<CalibrationSample> = serde_json::from_str(table_json).unwrap_or_default();
    level_to_volume(&table, level_mm)
}

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "volumeToLevel")]
pub fn volume_to_level_wasm(table_json: &str, liters: f64) -> f64 {
    let table: Vec<CalibrationSample> = serde_json::from_str(table_json).unwrap_or_default();
    volume_to_level(&table, liters)
}
