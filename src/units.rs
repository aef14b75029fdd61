//! Unit conversion and lenient number parsing
//!
//! Density is always kilograms per liter, so:
//! - kg = liters * density
//! - t = liters * density / 1000
//! - m³ = liters / 1000

/// Liters per cubic meter
pub const LITERS_PER_M3: f64 = 1000.0;

/// Kilograms per metric ton
pub const KG_PER_TON: f64 = 1000.0;

/// Mass in tons of `liters` at `density` kg/L
pub fn tons_from_liters(liters: f64, density: f64) -> f64 {
    liters * density / KG_PER_TON
}

/// Volume in liters of `tons` at `density` kg/L
pub fn liters_from_tons(tons: f64, density: f64) -> f64 {
    tons * KG_PER_TON / density
}

pub fn m3_from_liters(liters: f64) -> f64 {
    liters / LITERS_PER_M3
}

pub fn liters_from_m3(m3: f64) -> f64 {
    m3 * LITERS_PER_M3
}

/// A density usable for conversions (finite and strictly positive)
pub fn valid_density(density: f64) -> Option<f64> {
    (density.is_finite() && density > 0.0).then_some(density)
}

/// Round to `decimals` places. Non-finite input passes through unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Parse user or document input leniently.
///
/// Whitespace (including NBSP group separators) is stripped and the first
/// comma is read as a decimal point, so `"1 234,5"` parses as `1234.5`.
/// Returns `None` for anything that is not a finite number.
pub fn parse_number(text: &str) -> Option<f64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = compact.replacen(',', ".", 1);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a JSON value that may be a number or a numeric string
pub fn number_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => parse_number(s),
        _ => None,
    }
}
