//! Dip levels and fill fractions for the tank gauge
//!
//! Everything here degrades quietly: a `Missing` calibration disables level
//! sync and the gauge falls back to liters over capacity.

use crate::calibration::VehicleCalibration;
use crate::error::InputError;
use crate::report::group_digits;
use crate::units::round_to;

/// Fill fraction in [0, 1] for compartment `index`.
///
/// With a calibration: level / highest calibrated level. Without one:
/// liters / capacity.
pub fn fill_fraction(calibration: Option<&VehicleCalibration>, index: usize, liters: f64, capacity_liters: f64) -> f64 {
    let liters = if liters.is_finite() { liters } else { 0.0 };
    let fraction = match calibration.and_then(|c| c.compartment(index)) {
        Some(table) if !table.samples.is_empty() => {
            let max_mm = table.max_level_mm();
            if max_mm > 0.0 {
                table.volume_to_level(liters) / max_mm
            } else {
                0.0
            }
        }
        _ if capacity_liters > 0.0 => liters / capacity_liters,
        _ => 0.0,
    };
    fraction.clamp(0.0, 1.0)
}

/// Capacity caption for one compartment: `"12 000 л · 1 850 мм"`
pub fn compartment_label(calibration: &VehicleCalibration, index: usize) -> Option<String> {
    let table = calibration.compartment(index)?;
    let mut parts = Vec::new();
    let max_l = table.capacity_liters();
    let max_mm = table.max_level_mm();
    if max_l.round() != 0.0 {
        parts.push(format!("{} л", group_digits(max_l)));
    }
    if max_mm.round() != 0.0 {
        parts.push(format!("{} мм", group_digits(max_mm)));
    }
    (!parts.is_empty()).then(|| parts.join(" · "))
}

fn plural_ru<'a>(n: usize, one: &'a str, few: &'a str, many: &'a str) -> &'a str {
    let (m10, m100) = (n % 10, n % 100);
    if m10 == 1 && m100 != 11 {
        one
    } else if (2..=4).contains(&m10) && !(12..=14).contains(&m100) {
        few
    } else {
        many
    }
}

/// One-line description: `"7958 · 3 отсека · ∑ 26 000 л"`
pub fn calibration_summary(calibration: &VehicleCalibration) -> String {
    let mut parts = vec![calibration.vehicle_id().to_string()];
    let count = calibration.compartments().len();
    if count > 0 {
        parts.push(format!("{} {}", count, plural_ru(count, "отсек", "отсека", "отсеков")));
    }
    let total = calibration.total_capacity_liters();
    if total.round() != 0.0 {
        parts.push(format!("∑ {} л", group_digits(total)));
    }
    parts.join(" · ")
}

/// Dip level (whole mm) for each compartment's liters.
///
/// `None` for a `Missing` calibration. Compartments beyond the calibrated
/// ones read as 0 mm.
pub fn levels_for(calibration: &VehicleCalibration, liters: &[f64]) -> Option<Vec<f64>> {
    if calibration.is_missing() {
        return None;
    }
    let levels = liters
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            calibration
                .compartment(i)
                .map_or(0.0, |table| table.volume_to_level(l).round())
        })
        .collect();
    Some(levels)
}

/// Liters for a dip level entered on compartment `index`, rounded to
/// `decimals`
pub fn liters_from_level(
    calibration: &VehicleCalibration,
    index: usize,
    level_mm: f64,
    decimals: u32,
) -> Result<f64, InputError> {
    if !level_mm.is_finite() {
        return Err(InputError::NotNumeric);
    }
    if level_mm < 0.0 {
        return Err(InputError::Negative);
    }
    if calibration.is_missing() {
        return Err(InputError::CalibrationUnavailable {
            vehicle_id: calibration.vehicle_id().to_string(),
        });
    }
    let table = calibration
        .compartment(index)
        .ok_or(InputError::NoSuchCompartment { index })?;
    Ok(round_to(table.level_to_volume(level_mm), decimals))
}
