//! Bulk distribution of a requested volume or mass across compartments
//!
//! Greedy, in fixed compartment order:
//!   free      = max(0, capacity - current)
//!   take      = min(remaining, free)          (mass mode: free * density)
//!   remaining -= take
//!   leftover  = max(requested - allocated, 0)
//!
//! Single cargo starts from empty compartments; mixed cargo keeps what is
//! already loaded and only tops up the headroom.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InputError;
use crate::state::{CargoMode, Compartment};
use crate::units::{liters_from_m3, round_to, tons_from_liters, valid_density};

/// Unit of a bulk request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestUnit {
    Liters,
    CubicMeters,
    Tons,
}

/// Outcome of one distribution pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub unit: RequestUnit,
    /// Final liters per compartment (existing load included)
    pub per_compartment_liters: Vec<f64>,
    /// Requested, allocated and leftover amounts in the request's unit
    pub requested: f64,
    pub allocated: f64,
    pub leftover: f64,
    pub allocated_liters: f64,
    pub allocated_kg: f64,
    /// Σ kg / Σ liters over what was actually placed
    pub average_density: Option<f64>,
    /// Compartments passed over for lack of a usable density
    pub skipped: Vec<usize>,
}

/// Spread `total` across `compartments` without touching them.
///
/// Negative or non-finite totals are rejected. In single mode the shared
/// density must be valid; in mixed mode a compartment without a valid
/// density is skipped and listed in `Allocation::skipped`.
pub fn distribute(
    total: f64,
    unit: RequestUnit,
    compartments: &[Compartment],
    mode: &CargoMode,
) -> Result<Allocation, InputError> {
    if !total.is_finite() {
        return Err(InputError::NotNumeric);
    }
    if total < 0.0 {
        return Err(InputError::Negative);
    }
    let single_density = match mode {
        CargoMode::Single { density, .. } => Some(valid_density(*density).ok_or(InputError::InvalidDensity)?),
        CargoMode::Mixed => None,
    };

    // Mass mode works in kg, volume modes in liters
    let (requested_base, in_mass) = match unit {
        RequestUnit::Liters => (total, false),
        RequestUnit::CubicMeters => (liters_from_m3(total), false),
        RequestUnit::Tons => (total * 1000.0, true),
    };

    let mut per_compartment_liters = Vec::with_capacity(compartments.len());
    let mut skipped = Vec::new();
    let mut remaining = requested_base;
    let mut allocated_base = 0.0;
    let mut allocated_liters = 0.0;
    let mut allocated_kg = 0.0;

    for (idx, c) in compartments.iter().enumerate() {
        let current = match single_density {
            Some(_) => 0.0,
            None => c.liters.max(0.0),
        };
        per_compartment_liters.push(current);

        if remaining <= 0.0 {
            continue;
        }
        let Some(density) = single_density.or_else(|| valid_density(c.density)) else {
            debug!(compartment = idx, "skipping compartment without density");
            skipped.push(idx);
            continue;
        };

        let free = (c.capacity_liters.max(0.0) - current).max(0.0);
        if free <= 0.0 {
            continue;
        }

        let (add_liters, add_base) = if in_mass {
            let add_kg = remaining.min(free * density);
            (add_kg / density, add_kg)
        } else {
            let add = remaining.min(free);
            (add, add)
        };

        per_compartment_liters[idx] = current + add_liters;
        allocated_liters += add_liters;
        allocated_kg += add_liters * density;
        allocated_base += add_base;
        remaining -= add_base;
    }

    let average_density = if allocated_liters > 0.0 && allocated_kg > 0.0 {
        Some(allocated_kg / allocated_liters)
    } else {
        single_density
    };

    let to_unit = |base: f64| match unit {
        RequestUnit::Liters => base,
        RequestUnit::CubicMeters => base / 1000.0,
        RequestUnit::Tons => base / 1000.0,
    };
    // Summation drift may overshoot; derive allocated back from leftover so
    // allocated + leftover == total holds exactly.
    let leftover = (total - to_unit(allocated_base).min(total)).max(0.0);
    let allocated = total - leftover;

    Ok(Allocation {
        unit,
        per_compartment_liters,
        requested: total,
        allocated,
        leftover,
        allocated_liters,
        allocated_kg,
        average_density,
        skipped,
    })
}

/// Fill every compartment to capacity (no leftover by construction)
pub fn fill_to_capacity(compartments: &[Compartment], mode: &CargoMode) -> Result<Allocation, InputError> {
    let single_density = match mode {
        CargoMode::Single { density, .. } => Some(valid_density(*density).ok_or(InputError::InvalidDensity)?),
        CargoMode::Mixed => None,
    };

    let per_compartment_liters: Vec<f64> = compartments.iter().map(|c| c.capacity_liters.max(0.0)).collect();
    let allocated_liters: f64 = per_compartment_liters.iter().sum();
    let allocated_kg: f64 = compartments
        .iter()
        .zip(&per_compartment_liters)
        .filter_map(|(c, &l)| single_density.or_else(|| valid_density(c.density)).map(|rho| l * rho))
        .sum();
    let average_density = if allocated_liters > 0.0 && allocated_kg > 0.0 {
        Some(allocated_kg / allocated_liters)
    } else {
        single_density
    };

    Ok(Allocation {
        unit: RequestUnit::Liters,
        per_compartment_liters,
        requested: allocated_liters,
        allocated: allocated_liters,
        leftover: 0.0,
        allocated_liters,
        allocated_kg,
        average_density,
        skipped: Vec::new(),
    })
}

impl Allocation {
    /// Write the allocation into the compartments.
    ///
    /// Liters are rounded to `decimals`; tons follow from the compartment's
    /// density (the shared one in single mode). Without a usable density the
    /// tons figure is left alone.
    pub fn apply(&self, compartments: &mut [Compartment], mode: &CargoMode, decimals: u32) {
        for (c, &liters) in compartments.iter_mut().zip(&self.per_compartment_liters) {
            if let CargoMode::Single { type_key, density } = mode {
                c.cargo_type_key = type_key.clone();
                c.density = *density;
            }
            c.liters = round_to(liters, decimals);
            match valid_density(c.density) {
                Some(rho) => c.tons = round_to(tons_from_liters(liters, rho), decimals),
                None if mode.is_single() => c.tons = 0.0,
                None => {}
            }
        }
    }
}

/// WASM-friendly version: compartments and mode as JSON, allocation as JSON
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "distribute")]
pub fn distribute_wasm(total: f64, unit: &str, compartments_json: &str, single_density: Option<f64>) -> String {
    let unit = match unit {
        "m3" | "volume_m3" => RequestUnit::CubicMeters,
        "t" | "tons" | "mass_tons" => RequestUnit::Tons,
        _ => RequestUnit::Liters,
    };
    let compartments: Vec<Compartment> = serde_json::from_str(compartments_json).unwrap_or_default();
    let mode = match single_density {
        Some(density) => CargoMode::Single { type_key: String::new(), density },
        None => CargoMode::Mixed,
    };
    match distribute(total, unit, &compartments, &mode) {
        Ok(a) => serde_json::to_string(&a).unwrap_or_else(|_| "{}".to_string()),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tanker(caps: &[f64]) -> Vec<Compartment> {
        caps.iter().map(|&c| Compartment::empty(c, "diesel", 0.84)).collect()
    }

    fn single() -> CargoMode {
        CargoMode::Single { type_key: "diesel".into(), density: 0.84 }
    }

    #[test]
    fn test_fits_sequentially() {
        let comps = tanker(&[12000.0, 8000.0]);
        let a = distribute(15000.0, RequestUnit::Liters, &comps, &single()).unwrap();
        assert_eq!(a.per_compartment_liters, vec![12000.0, 3000.0]);
        assert!(a.leftover.abs() < f64::EPSILON);
        assert!((a.allocated_kg / 1000.0 - 12.6).abs() < 1e-9);
        assert_eq!(a.average_density, Some(0.84));
    }

    #[test]
    fn test_overflow_leftover() {
        let comps = tanker(&[12000.0, 8000.0]);
        let a = distribute(25000.0, RequestUnit::Liters, &comps, &single()).unwrap();
        assert_eq!(a.per_compartment_liters, vec![12000.0, 8000.0]);
        assert_eq!(a.allocated, 20000.0);
        assert_eq!(a.leftover, 5000.0);
    }

    #[test]
    fn test_conservation() {
        let comps = tanker(&[7500.0, 11000.0, 7500.0, 6000.0]);
        for total in [0.0, 1.0, 7500.0, 18499.0, 32000.0, 50000.0] {
            let a = distribute(total, RequestUnit::Liters, &comps, &single()).unwrap();
            assert_eq!(a.allocated + a.leftover, total, "total={}", total);
        }
        for tons in [0.5, 10.0, 26.88, 40.0] {
            let a = distribute(tons, RequestUnit::Tons, &comps, &single()).unwrap();
            assert!((a.allocated + a.leftover - tons).abs() < 1e-9, "tons={}", tons);
        }
    }

    #[test]
    fn test_conservation_with_fractional_amounts() {
        let comps = tanker(&[0.1, 0.2, 0.7]);
        for unit in [RequestUnit::Liters, RequestUnit::Tons, RequestUnit::CubicMeters] {
            for i in 0..2000 {
                let total = i as f64 * 0.0007;
                let a = distribute(total, unit, &comps, &single()).unwrap();
                assert_eq!(a.allocated + a.leftover, total, "{:?} total={}", unit, total);
                assert!(a.allocated <= total);
                assert!(a.leftover >= 0.0);
            }
        }
    }

    #[test]
    fn test_negative_rejected() {
        let comps = tanker(&[1000.0]);
        assert_eq!(
            distribute(-100.0, RequestUnit::Liters, &comps, &single()),
            Err(InputError::Negative)
        );
        assert_eq!(
            distribute(f64::NAN, RequestUnit::Liters, &comps, &single()),
            Err(InputError::NotNumeric)
        );
    }

    #[test]
    fn test_single_requires_density() {
        let comps = tanker(&[1000.0]);
        let mode = CargoMode::Single { type_key: "diesel".into(), density: 0.0 };
        assert_eq!(
            distribute(100.0, RequestUnit::Liters, &comps, &mode),
            Err(InputError::InvalidDensity)
        );
    }

    #[test]
    fn test_single_mode_starts_from_empty() {
        let mut comps = tanker(&[12000.0, 8000.0]);
        comps[0].liters = 11000.0;
        let a = distribute(5000.0, RequestUnit::Liters, &comps, &single()).unwrap();
        assert_eq!(a.per_compartment_liters, vec![5000.0, 0.0]);
    }

    #[test]
    fn test_mixed_mode_tops_up_only() {
        let mut comps = tanker(&[12000.0, 8000.0]);
        comps[0].liters = 11000.0;
        comps[1].liters = 2000.0;
        let a = distribute(4000.0, RequestUnit::Liters, &comps, &CargoMode::Mixed).unwrap();
        assert_eq!(a.per_compartment_liters, vec![12000.0, 5000.0]);
        for (before, after) in comps.iter().zip(&a.per_compartment_liters) {
            assert!(*after >= before.liters);
        }
    }

    #[test]
    fn test_mixed_mode_never_decreases_overfilled() {
        let mut comps = tanker(&[1000.0, 1000.0]);
        comps[0].liters = 1500.0;
        let a = distribute(500.0, RequestUnit::Liters, &comps, &CargoMode::Mixed).unwrap();
        assert_eq!(a.per_compartment_liters, vec![1500.0, 500.0]);
    }

    #[test]
    fn test_mixed_mode_skips_missing_density() {
        let mut comps = tanker(&[1000.0, 1000.0]);
        comps[0].density = 0.0;
        let a = distribute(1500.0, RequestUnit::Liters, &comps, &CargoMode::Mixed).unwrap();
        assert_eq!(a.skipped, vec![0]);
        assert_eq!(a.per_compartment_liters, vec![0.0, 1000.0]);
        assert_eq!(a.leftover, 500.0);
    }

    #[test]
    fn test_mass_mode_uses_compartment_density() {
        let mut comps = tanker(&[1000.0, 1000.0]);
        comps[0].density = 1.4;
        comps[1].density = 0.7;
        // first takes 1000 L * 1.4 = 1400 kg, second 600 kg / 0.7
        let a = distribute(2.0, RequestUnit::Tons, &comps, &CargoMode::Mixed).unwrap();
        assert!((a.per_compartment_liters[0] - 1000.0).abs() < 1e-9);
        assert!((a.per_compartment_liters[1] - 600.0 / 0.7).abs() < 1e-9);
        assert!(a.leftover.abs() < 1e-12);
        let expected_avg = 2000.0 / (1000.0 + 600.0 / 0.7);
        assert!((a.average_density.unwrap() - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn test_cubic_meters() {
        let comps = tanker(&[12000.0, 8000.0]);
        let a = distribute(21.0, RequestUnit::CubicMeters, &comps, &single()).unwrap();
        assert_eq!(a.per_compartment_liters, vec![12000.0, 8000.0]);
        assert!((a.leftover - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_request_allocates_nothing() {
        let comps = tanker(&[100.0]);
        let a = distribute(0.0, RequestUnit::Liters, &comps, &single()).unwrap();
        assert_eq!(a.allocated, 0.0);
        assert_eq!(a.leftover, 0.0);
        assert_eq!(a.average_density, Some(0.84));
    }

    #[test]
    fn test_apply_sets_tons() {
        let mut comps = tanker(&[12000.0, 8000.0]);
        let a = distribute(15000.0, RequestUnit::Liters, &comps, &single()).unwrap();
        a.apply(&mut comps, &single(), 3);
        assert_eq!(comps[0].liters, 12000.0);
        assert_eq!(comps[1].liters, 3000.0);
        assert!((comps[0].tons - 10.08).abs() < 1e-9);
        assert!((comps[1].tons - 2.52).abs() < 1e-9);
    }

    #[test]
    fn test_fill_to_capacity() {
        let comps = tanker(&[12000.0, 8000.0]);
        let a = fill_to_capacity(&comps, &single()).unwrap();
        assert_eq!(a.per_compartment_liters, vec![12000.0, 8000.0]);
        assert_eq!(a.allocated_liters, 20000.0);
        assert!((a.allocated_kg - 16800.0).abs() < 1e-9);
        assert_eq!(a.leftover, 0.0);
    }
}
