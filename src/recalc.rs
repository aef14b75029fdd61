//! Reconciliation of compartment figures
//!
//! For every compartment:
//!   density = shared (single cargo) | own | catalog default for its type
//!   tons edited  → liters = tons * 1000 / density
//!   otherwise    → tons   = liters * density / 1000
//!
//! Then totals, overflow against each compartment's capacity, and the
//! shortfall of the last bulk request. Leftover is the larger of
//! (request shortfall, capacity excess).
//!
//! Running the pass twice yields identical figures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::CargoCatalog;
use crate::report::group_digits;
use crate::state::{CargoMode, LastEdit, LoadRequest, TrailerState};
use crate::units::{m3_from_liters, round_to, valid_density, KG_PER_TON};

/// One amount in every unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    pub liters: f64,
    pub kg: f64,
    pub tons: f64,
    pub m3: f64,
}

impl Quantity {
    /// Mass fields stay zero without a usable density
    pub fn from_liters(liters: f64, density: Option<f64>) -> Self {
        let kg = density.and_then(valid_density).map_or(0.0, |rho| liters * rho);
        Self {
            liters,
            kg,
            tons: kg / KG_PER_TON,
            m3: m3_from_liters(liters),
        }
    }
}

/// Non-fatal problem found while reconciling.
///
/// `Display` yields the text shown in the warning box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    InvalidSharedDensity,
    MissingDensity { index: usize },
    NegativeLiters { index: usize },
    NegativeMass { index: usize },
    CompartmentOverflow { index: usize, liters: f64, capacity: f64 },
    RequestExceedsCapacity { requested: f64, capacity: f64 },
    NegativePositionMass { index: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSharedDensity => write!(f, "Укажите корректную плотность для общего груза (>0)"),
            Self::MissingDensity { index } => write!(f, "Отсек #{}: укажите плотность (>0)", index + 1),
            Self::NegativeLiters { index } => write!(f, "Отсек #{}: отрицательные литры", index + 1),
            Self::NegativeMass { index } => write!(f, "Отсек #{}: отрицательная масса", index + 1),
            Self::CompartmentOverflow { index, liters, capacity } => write!(
                f,
                "Переполнение отсека #{}: {} л > лимита {} л",
                index + 1,
                group_digits(*liters),
                group_digits(*capacity)
            ),
            Self::RequestExceedsCapacity { requested, capacity } => write!(
                f,
                "Общий объём превышает лимит цистерны: {} л > {} л",
                group_digits(*requested),
                group_digits(*capacity)
            ),
            Self::NegativePositionMass { index } => write!(f, "Позиция #{}: отрицательная масса", index + 1),
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub totals: Quantity,
    /// What did not fit, in every unit
    pub leftover: Quantity,
    pub capacity_liters: f64,
    /// Last request minus what is loaded (0 without a request)
    pub request_shortfall_liters: f64,
    /// Sum of each compartment's excess over its own capacity.
    ///
    /// Not `total - capacity_total`: one overfilled compartment counts even
    /// when its neighbours have room.
    pub capacity_excess_liters: f64,
    /// Σ kg / Σ liters, else the shared density in single mode
    pub average_density: Option<f64>,
    /// Set for platform trailers
    pub platform_positions: Option<usize>,
    pub warnings: Vec<Warning>,
}

impl Reconciliation {
    pub fn warning_texts(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Everything the pass reads besides the trailer itself
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    pub mode: &'a CargoMode,
    pub edit: LastEdit,
    pub request: Option<&'a LoadRequest>,
    pub catalog: &'a CargoCatalog,
    pub decimals: u32,
}

/// Reconcile `state` in place and report totals and warnings
pub fn reconcile(state: &mut TrailerState, ctx: &ReconcileContext<'_>) -> Reconciliation {
    match state {
        TrailerState::Tanker { .. } => reconcile_tanker(state, ctx),
        TrailerState::Platform { position_masses } => reconcile_platform(position_masses, ctx.decimals),
    }
}

fn reconcile_tanker(state: &mut TrailerState, ctx: &ReconcileContext<'_>) -> Reconciliation {
    let fallback_key = match ctx.mode {
        CargoMode::Single { type_key, .. } => type_key.clone(),
        CargoMode::Mixed => ctx.catalog.first_key().unwrap_or("diesel").to_string(),
    };
    state.ensure_rows_match_caps(&fallback_key, 0.0);
    let capacity_total = state.capacity_total();

    let mut warnings = Vec::new();
    let shared_density = match ctx.mode {
        CargoMode::Single { density, .. } => {
            if valid_density(*density).is_none() {
                warnings.push(Warning::InvalidSharedDensity);
            }
            Some(*density)
        }
        CargoMode::Mixed => None,
    };

    let mut total_liters = 0.0;
    let mut total_kg = 0.0;
    let mut capacity_excess = 0.0;

    for (i, c) in state.compartments_mut().into_iter().flatten().enumerate() {
        let mut type_key = match ctx.mode {
            CargoMode::Single { type_key, .. } => type_key.clone(),
            CargoMode::Mixed => c.cargo_type_key.clone(),
        };
        if ctx.catalog.first_key().is_some() && !ctx.catalog.contains(&type_key) {
            type_key = fallback_key_for(ctx.catalog, &type_key);
        }

        let density = match shared_density {
            Some(shared) => valid_density(shared),
            None => valid_density(c.density).or_else(|| ctx.catalog.density_of(&type_key)),
        };
        if density.is_none() {
            warnings.push(Warning::MissingDensity { index: i });
        }

        let mut liters = if c.liters.is_finite() { c.liters } else { 0.0 };
        let mut tons = if c.tons.is_finite() { c.tons } else { 0.0 };
        if liters < 0.0 {
            warnings.push(Warning::NegativeLiters { index: i });
            liters = 0.0;
        }
        if tons < 0.0 {
            warnings.push(Warning::NegativeMass { index: i });
            tons = 0.0;
        }

        // Round the source field first so a second pass reproduces the first
        match density {
            Some(rho) if ctx.edit.tons_edited(i) => {
                tons = round_to(tons, ctx.decimals);
                liters = round_to(tons * KG_PER_TON / rho, ctx.decimals);
            }
            Some(rho) => {
                liters = round_to(liters, ctx.decimals);
                tons = round_to(liters * rho / KG_PER_TON, ctx.decimals);
            }
            None => {
                liters = round_to(liters, ctx.decimals);
                tons = round_to(tons, ctx.decimals);
            }
        }

        if liters > c.capacity_liters {
            warnings.push(Warning::CompartmentOverflow {
                index: i,
                liters,
                capacity: c.capacity_liters,
            });
            capacity_excess += liters - c.capacity_liters;
        }

        c.cargo_type_key = type_key;
        c.density = density.unwrap_or(0.0);
        c.liters = liters;
        c.tons = tons;

        total_liters += liters;
        total_kg += tons * KG_PER_TON;
    }

    let totals = Quantity {
        liters: total_liters,
        kg: total_kg,
        tons: total_kg / KG_PER_TON,
        m3: m3_from_liters(total_liters),
    };
    let average_density = if total_liters > 0.0 && total_kg > 0.0 {
        Some(total_kg / total_liters)
    } else {
        shared_density.and_then(valid_density)
    };

    let mut leftover = Quantity::default();
    let mut request_shortfall = 0.0;
    if let Some(req) = ctx.request {
        if let Some(req_liters) = req.liters.filter(|l| l.is_finite()) {
            request_shortfall = (req_liters - total_liters).max(0.0);
            leftover.liters = request_shortfall;

            let mut kg = req.kg.map_or(0.0, |kg| (kg - total_kg).max(0.0));
            if kg <= 0.0 {
                if let Some(rho) = req.density.and_then(valid_density) {
                    kg = request_shortfall * rho;
                }
            }
            leftover.kg = kg;
            leftover.tons = req.tons.map_or(kg / KG_PER_TON, |t| (t - totals.tons).max(0.0));
            leftover.m3 = req.m3.map_or(m3_from_liters(request_shortfall), |m3| (m3 - totals.m3).max(0.0));

            if req_liters > capacity_total {
                warnings.push(Warning::RequestExceedsCapacity {
                    requested: req_liters,
                    capacity: capacity_total,
                });
            }
        }
    }

    if capacity_excess > 0.0 && capacity_excess > leftover.liters {
        leftover.liters = capacity_excess;
        if let Some(rho) = average_density {
            leftover.kg = capacity_excess * rho;
            leftover.tons = leftover.kg / KG_PER_TON;
        }
        leftover.m3 = m3_from_liters(capacity_excess);
    }

    Reconciliation {
        totals,
        leftover,
        capacity_liters: capacity_total,
        request_shortfall_liters: request_shortfall,
        capacity_excess_liters: capacity_excess,
        average_density,
        platform_positions: None,
        warnings,
    }
}

fn fallback_key_for(catalog: &CargoCatalog, key: &str) -> String {
    tracing::debug!(cargo_type = key, "unknown cargo type, using first catalog entry");
    catalog.first_key().unwrap_or(key).to_string()
}

fn reconcile_platform(position_masses: &mut [f64], decimals: u32) -> Reconciliation {
    let mut warnings = Vec::new();
    let mut total_kg = 0.0;
    for (i, mass) in position_masses.iter_mut().enumerate() {
        let mut tons = if mass.is_finite() { *mass / KG_PER_TON } else { 0.0 };
        if tons < 0.0 {
            warnings.push(Warning::NegativePositionMass { index: i });
            tons = 0.0;
        }
        let tons = round_to(tons, decimals);
        *mass = tons * KG_PER_TON;
        total_kg += *mass;
    }

    Reconciliation {
        totals: Quantity {
            liters: 0.0,
            kg: total_kg,
            tons: total_kg / KG_PER_TON,
            m3: 0.0,
        },
        platform_positions: Some(position_masses.len()),
        warnings,
        ..Reconciliation::default()
    }
}

/// JSON-in/JSON-out pass for the browser shell.
///
/// `single_density` set means single-cargo mode. Returns the reconciled
/// trailer, the reconciliation and its warning texts, or `{"error": ...}`
/// when the trailer JSON is unreadable.
pub fn reconcile_json(
    trailer_json: &str,
    edit_json: &str,
    request_json: &str,
    single_type_key: &str,
    single_density: Option<f64>,
) -> String {
    let mut trailer: TrailerState = match serde_json::from_str(trailer_json) {
        Ok(t) => t,
        Err(e) => return serde_json::json!({ "error": e.to_string() }).to_string(),
    };
    let edit: LastEdit = serde_json::from_str(edit_json).unwrap_or_default();
    let request: Option<LoadRequest> = serde_json::from_str(request_json).ok();
    let mode = match single_density {
        Some(density) => CargoMode::Single { type_key: single_type_key.to_string(), density },
        None => CargoMode::Mixed,
    };
    let catalog = CargoCatalog::builtin();
    let rec = reconcile(
        &mut trailer,
        &ReconcileContext {
            mode: &mode,
            edit,
            request: request.as_ref(),
            catalog: &catalog,
            decimals: 3,
        },
    );
    serde_json::json!({
        "trailerState": trailer,
        "reconciliation": rec,
        "warnings": rec.warning_texts(),
    })
    .to_string()
}

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "reconcile")]
pub fn reconcile_wasm(
    trailer_json: &str,
    edit_json: &str,
    request_json: &str,
    single_type_key: &str,
    single_density: Option<f64>,
) -> String {
    reconcile_json(trailer_json, edit_json, request_json, single_type_key, single_density)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::GROUP_SEPARATOR as S;
    use crate::state::RequestSource;
    use pretty_assertions::assert_eq;

    fn single() -> CargoMode {
        CargoMode::Single { type_key: "diesel".into(), density: 0.84 }
    }

    fn ctx<'a>(mode: &'a CargoMode, catalog: &'a CargoCatalog, request: Option<&'a LoadRequest>) -> ReconcileContext<'a> {
        ReconcileContext {
            mode,
            edit: LastEdit::None,
            request,
            catalog,
            decimals: 3,
        }
    }

    fn set_liters(state: &mut TrailerState, values: &[f64]) {
        for (c, &v) in state.compartments_mut().unwrap().iter_mut().zip(values) {
            c.liters = v;
        }
    }

    #[test]
    fn test_tons_follow_liters() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[12000.0, 8000.0], "diesel", 0.84);
        set_liters(&mut state, &[12000.0, 3000.0]);

        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(state.compartments()[0].tons, 10.08);
        assert_eq!(state.compartments()[1].tons, 2.52);
        assert!((rec.totals.tons - 12.6).abs() < 1e-9);
        assert_eq!(rec.totals.liters, 15000.0);
        assert!(rec.warnings.is_empty());
        assert_eq!(rec.leftover, Quantity::default());
    }

    #[test]
    fn test_liters_follow_edited_tons() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[12000.0], "diesel", 0.84);
        state.compartments_mut().unwrap()[0].tons = 8.4;

        let mut c = ctx(&mode, &catalog, None);
        c.edit = LastEdit::Tons { index: 0 };
        reconcile(&mut state, &c);
        assert_eq!(state.compartments()[0].liters, 10000.0);
    }

    #[test]
    fn test_idempotent() {
        let catalog = CargoCatalog::builtin();
        let mode = CargoMode::Mixed;
        let mut state = TrailerState::tanker(&[7500.0, 11000.0, 7500.0], "diesel", 0.84);
        {
            let comps = state.compartments_mut().unwrap();
            comps[0].liters = 1234.5678;
            comps[1].density = 0.0;
            comps[1].cargo_type_key = "ai95".into();
            comps[1].liters = 9999.9999;
            comps[2].liters = 8000.0;
        }
        let request = LoadRequest {
            source: RequestSource::VolumeLiters,
            liters: Some(20000.0),
            density: Some(0.84),
            ..Default::default()
        }
        .cross_derived();

        let first = reconcile(&mut state, &ctx(&mode, &catalog, Some(&request)));
        let snapshot = state.clone();
        let second = reconcile(&mut state, &ctx(&mode, &catalog, Some(&request)));
        assert_eq!(first, second);
        assert_eq!(snapshot, state);
    }

    #[test]
    fn test_density_from_catalog() {
        let catalog = CargoCatalog::builtin();
        let mode = CargoMode::Mixed;
        let mut state = TrailerState::tanker(&[1000.0], "diesel", 0.0);
        set_liters(&mut state, &[1000.0]);
        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert!(rec.warnings.is_empty());
        assert_eq!(state.compartments()[0].density, 0.84);
        assert_eq!(state.compartments()[0].tons, 0.84);
    }

    #[test]
    fn test_unknown_cargo_key_replaced() {
        let catalog = CargoCatalog::builtin();
        let mode = CargoMode::Mixed;
        let mut state = TrailerState::tanker(&[1000.0], "gone", 0.9);
        reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(state.compartments()[0].cargo_type_key, "diesel");
        assert_eq!(state.compartments()[0].density, 0.9);
    }

    #[test]
    fn test_invalid_shared_density_warns() {
        let catalog = CargoCatalog::builtin();
        let mode = CargoMode::Single { type_key: "diesel".into(), density: 0.0 };
        let mut state = TrailerState::tanker(&[1000.0], "diesel", 0.84);
        set_liters(&mut state, &[500.0]);
        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(
            rec.warning_texts(),
            vec![
                "Укажите корректную плотность для общего груза (>0)".to_string(),
                "Отсек #1: укажите плотность (>0)".to_string(),
            ]
        );
        assert_eq!(state.compartments()[0].liters, 500.0);
        assert_eq!(rec.average_density, None);
    }

    #[test]
    fn test_negative_values_clamped() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[1000.0], "diesel", 0.84);
        state.compartments_mut().unwrap()[0].liters = -5.0;
        state.compartments_mut().unwrap()[0].tons = -1.0;
        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(
            rec.warnings,
            vec![Warning::NegativeLiters { index: 0 }, Warning::NegativeMass { index: 0 }]
        );
        assert_eq!(state.compartments()[0].liters, 0.0);
    }

    #[test]
    fn test_manual_overflow() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[12000.0, 8000.0], "diesel", 0.84);
        set_liters(&mut state, &[13000.0, 0.0]);

        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(rec.capacity_excess_liters, 1000.0);
        assert_eq!(rec.leftover.liters, 1000.0);
        assert!((rec.leftover.kg - 840.0).abs() < 1e-9);
        assert_eq!(
            rec.warning_texts(),
            vec![format!("Переполнение отсека #1: 13{S}000 л > лимита 12{S}000 л")]
        );
    }

    #[test]
    fn test_request_shortfall() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[12000.0, 8000.0], "diesel", 0.84);
        set_liters(&mut state, &[12000.0, 8000.0]);
        let request = LoadRequest {
            liters: Some(25000.0),
            density: Some(0.84),
            ..Default::default()
        }
        .cross_derived();

        let rec = reconcile(&mut state, &ctx(&mode, &catalog, Some(&request)));
        assert_eq!(rec.request_shortfall_liters, 5000.0);
        assert_eq!(rec.leftover.liters, 5000.0);
        assert!((rec.leftover.tons - 4.2).abs() < 1e-9);
        assert!((rec.leftover.m3 - 5.0).abs() < 1e-9);
        assert_eq!(
            rec.warnings,
            vec![Warning::RequestExceedsCapacity { requested: 25000.0, capacity: 20000.0 }]
        );
    }

    #[test]
    fn test_leftover_is_larger_of_shortfall_and_excess() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::tanker(&[1000.0, 1000.0], "diesel", 0.84);
        set_liters(&mut state, &[1500.0, 0.0]);
        let request = LoadRequest {
            liters: Some(1700.0),
            density: Some(0.84),
            ..Default::default()
        }
        .cross_derived();

        let rec = reconcile(&mut state, &ctx(&mode, &catalog, Some(&request)));
        assert_eq!(rec.request_shortfall_liters, 200.0);
        assert_eq!(rec.capacity_excess_liters, 500.0);
        assert_eq!(rec.leftover.liters, 500.0);
    }

    #[test]
    fn test_platform_positions() {
        let catalog = CargoCatalog::builtin();
        let mode = single();
        let mut state = TrailerState::Platform {
            position_masses: vec![5000.0, -100.0, 3500.4444, f64::NAN],
        };
        let rec = reconcile(&mut state, &ctx(&mode, &catalog, None));
        assert_eq!(rec.platform_positions, Some(4));
        assert_eq!(rec.warnings, vec![Warning::NegativePositionMass { index: 1 }]);
        assert_eq!(rec.warning_texts(), vec!["Позиция #2: отрицательная масса".to_string()]);
        assert!((rec.totals.kg - 8500.0).abs() < 1e-6);
        if let TrailerState::Platform { position_masses } = &state {
            assert_eq!(position_masses[1], 0.0);
            assert_eq!(position_masses[3], 0.0);
        }
    }

    #[test]
    fn test_reconcile_json() {
        let trailer = r#"{
            "type": "tanker",
            "capacitiesLiters": [12000, 6500],
            "compartments": [
                { "capacityLiters": 12000, "cargoTypeKey": "diesel", "density": 0.84, "liters": 13000, "tons": 0 },
                { "capacityLiters": 6500, "cargoTypeKey": "diesel", "density": 0.84, "liters": 0, "tons": 0 }
            ]
        }"#;
        let out: serde_json::Value = serde_json::from_str(&reconcile_json(
            trailer,
            r#"{ "field": "liters", "index": 0 }"#,
            "null",
            "diesel",
            Some(0.84),
        ))
        .unwrap();
        assert_eq!(out["reconciliation"]["leftover"]["liters"], 1000.0);
        assert_eq!(out["trailerState"]["compartments"][0]["tons"], 10.92);
        assert_eq!(out["warnings"].as_array().unwrap().len(), 1);
        assert!(out["warnings"][0].as_str().unwrap().starts_with("Переполнение отсека #1"));

        let err: serde_json::Value =
            serde_json::from_str(&reconcile_json("{ broken", "", "", "", None)).unwrap();
        assert!(err["error"].is_string());
    }
}
