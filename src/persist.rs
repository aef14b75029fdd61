//! Session persistence
//!
//! Saved state is plain JSON under a versioned key. Loading accepts the
//! current shape and the older v4–v6 shapes: every field is optional and
//! anything malformed falls back to its default instead of failing the load.
//! Storage failures are logged and otherwise ignored.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog::{AxleRegistry, CargoType, TrailerPreset};
use crate::delivery::{normalize_trips, DeliveryInputs, DistanceMode, MapProvider};
use crate::error::PersistError;
use crate::settings::Settings;
use crate::state::{Compartment, LoadRequest, RequestSource, TrailerState};
use crate::units::{number_from_json, valid_density, KG_PER_TON};

/// Current state key
pub const STATE_KEY: &str = "vigard_state_v7";

/// Older state keys, newest first; removed after a successful save
pub const LEGACY_STATE_KEYS: [&str; 3] = ["vigard_state_v6", "vigard_state_v5", "vigard_state_v4"];

pub const CUSTOM_TRAILERS_KEY: &str = "vigard_custom_trailers_v1";
pub const CUSTOM_CARGO_KEY: &str = "vigard_custom_products_v1";
pub const CUSTOM_TRACTORS_KEY: &str = "vigard_custom_trucks_v1";
pub const AXLES_KEY: &str = "vigard_truck_axles_map_v1";

// ─── Persisted state ─────────────────────────────────────────────────

/// Everything that survives a reload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub tractor_plate: Option<String>,
    pub tractor_axles: u8,
    pub selected_trailer_id: Option<String>,
    pub trailer_state: Option<TrailerState>,
    pub single_cargo: bool,
    pub single_cargo_type_key: String,
    pub single_cargo_density: f64,
    pub last_load_request: Option<LoadRequest>,
    #[serde(flatten)]
    pub delivery: DeliveryInputs,
    pub last_overflow_liters: f64,
}

impl SessionState {
    pub fn fresh(settings: &Settings) -> Self {
        Self {
            tractor_plate: None,
            tractor_axles: 2,
            selected_trailer_id: None,
            trailer_state: None,
            single_cargo: true,
            single_cargo_type_key: settings.default_cargo_key.clone(),
            single_cargo_density: settings.default_density,
            last_load_request: None,
            delivery: DeliveryInputs::default(),
            last_overflow_liters: 0.0,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::fresh(&Settings::default())
    }
}

/// Serialize for storage
pub fn save(state: &SessionState) -> Result<String, PersistError> {
    Ok(serde_json::to_string(state)?)
}

/// Parse stored JSON of any known version.
///
/// Only invalid JSON (or a non-object top level) is an error; field-level
/// problems are normalized away.
pub fn restore(json: &str, settings: &Settings) -> Result<SessionState, PersistError> {
    let raw: Value = serde_json::from_str(json)?;
    let Value::Object(raw) = raw else {
        return Err(PersistError::Storage("state is not an object".to_string()));
    };
    Ok(normalize(&raw, settings))
}

// ─── Normalization ───────────────────────────────────────────────────

fn num(raw: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| raw.get(*k).and_then(number_from_json))
}

fn text(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truthy(raw: &Map<String, Value>, key: &str) -> bool {
    match raw.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn not_false(raw: &Map<String, Value>, key: &str) -> bool {
    !matches!(raw.get(key), Some(Value::Bool(false)))
}

fn normalize(raw: &Map<String, Value>, settings: &Settings) -> SessionState {
    let type_key = text(raw, "singleCargoTypeKey").unwrap_or_else(|| settings.default_cargo_key.clone());
    let density = num(raw, &["singleCargoDensity", "singleCargoRho"])
        .and_then(valid_density)
        .unwrap_or(settings.default_density);

    let distance_mode = match raw.get("distanceMode").and_then(Value::as_str) {
        Some("maps") | Some("gmaps") => DistanceMode::Maps,
        _ => DistanceMode::Manual,
    };
    let provider = match raw.get("provider").and_then(Value::as_str) {
        Some("yandex") => MapProvider::Yandex,
        _ => MapProvider::Google,
    };
    let delivery = DeliveryInputs {
        distance_mode,
        provider,
        distance_km: num(raw, &["distanceKm"]).unwrap_or(0.0),
        rate_per_km: num(raw, &["ratePerKm"]).unwrap_or(0.0),
        trips: normalize_trips(num(raw, &["trips"]).unwrap_or(1.0)),
        route_from: raw.get("routeFrom").and_then(Value::as_str).unwrap_or_default().to_string(),
        route_to: raw.get("routeTo").and_then(Value::as_str).unwrap_or_default().to_string(),
        avoid_tolls: truthy(raw, "avoidTolls"),
        truck_mode: not_false(raw, "truckMode"),
        avoid_scales: truthy(raw, "avoidScales"),
        cargo_target_tons: num(raw, &["cargoTargetTons", "cargoTargetT"])
            .filter(|t| *t >= 0.0)
            .unwrap_or(0.0),
    };

    let tractor_axles = num(raw, &["tractorAxles"])
        .filter(|a| *a >= 1.0 && *a <= f64::from(u8::MAX))
        .map_or(2, |a| a.trunc() as u8);

    SessionState {
        tractor_plate: text(raw, "tractorPlate"),
        tractor_axles,
        selected_trailer_id: text(raw, "selectedTrailerId"),
        trailer_state: raw
            .get("trailerState")
            .and_then(Value::as_object)
            .and_then(|t| normalize_trailer(t, settings)),
        single_cargo: not_false(raw, "singleCargo"),
        single_cargo_type_key: type_key,
        single_cargo_density: density,
        last_load_request: raw.get("lastLoadRequest").and_then(Value::as_object).map(normalize_request),
        delivery,
        last_overflow_liters: num(raw, &["lastOverflowLiters"]).filter(|l| *l > 0.0).unwrap_or(0.0),
    }
}

fn normalize_request(raw: &Map<String, Value>) -> LoadRequest {
    let source = ["source", "kind"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_str))
        .map(RequestSource::from_name)
        .unwrap_or_default();
    LoadRequest {
        source,
        liters: num(raw, &["liters"]),
        kg: num(raw, &["kg", "massKg"]),
        tons: num(raw, &["tons"]),
        m3: num(raw, &["m3"]),
        density: num(raw, &["density", "rho"]),
    }
    .cross_derived()
}

fn array<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn normalize_trailer(raw: &Map<String, Value>, settings: &Settings) -> Option<TrailerState> {
    match raw.get("type").and_then(Value::as_str) {
        Some("tanker") => {
            let caps: Vec<f64> = array(raw, &["capacitiesLiters", "caps"])
                .iter()
                .map(|c| number_from_json(c).unwrap_or(0.0).max(0.0))
                .collect();
            let compartments = array(raw, &["compartments", "rows"])
                .iter()
                .enumerate()
                .map(|(i, row)| normalize_row(row, caps.get(i).copied().unwrap_or(0.0), settings))
                .collect();
            let mut state = TrailerState::Tanker {
                capacities_liters: caps,
                compartments,
            };
            state.ensure_rows_match_caps(&settings.default_cargo_key, settings.default_density);
            Some(state)
        }
        Some("platform") => {
            let mut masses: Vec<f64> = array(raw, &["positionMasses", "masses"])
                .iter()
                .map(|m| number_from_json(m).unwrap_or(0.0).max(0.0))
                .collect();
            let fallback = if masses.is_empty() { settings.platform_positions } else { masses.len() };
            let bound = masses.len().max(settings.platform_positions);
            let positions = match num(raw, &["positions"]).filter(|p| *p >= 1.0) {
                Some(p) if p <= bound as f64 => p as usize,
                Some(p) => {
                    debug!(positions = p, bound, "platform position count out of range");
                    fallback
                }
                None => fallback,
            };
            masses.resize(positions, 0.0);
            Some(TrailerState::Platform { position_masses: masses })
        }
        other => {
            debug!(trailer_type = ?other, "dropping trailer state of unknown type");
            None
        }
    }
}

fn normalize_row(row: &Value, capacity: f64, settings: &Settings) -> Compartment {
    let empty = Map::new();
    let row = row.as_object().unwrap_or(&empty);
    let tons = num(row, &["tons"]).or_else(|| num(row, &["kg"]).map(|kg| kg / KG_PER_TON));
    Compartment {
        capacity_liters: capacity,
        cargo_type_key: text(row, "cargoTypeKey")
            .or_else(|| text(row, "typeKey"))
            .unwrap_or_else(|| settings.default_cargo_key.clone()),
        density: num(row, &["density", "rho"])
            .and_then(valid_density)
            .unwrap_or(settings.default_density),
        liters: num(row, &["liters"]).unwrap_or(0.0).max(0.0),
        tons: tons.unwrap_or(0.0).max(0.0),
    }
}

// ─── Storage ─────────────────────────────────────────────────────────

/// Key-value store the state lives in (browser localStorage, a file, ...)
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

/// In-process storage
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Load the newest stored state; `None` when nothing usable is stored
pub fn load_state(storage: &impl Storage, settings: &Settings) -> Option<SessionState> {
    for key in std::iter::once(STATE_KEY).chain(LEGACY_STATE_KEYS) {
        let raw = match storage.get(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => continue,
            Err(e) => {
                warn!(key, error = %e, "state read failed");
                return None;
            }
        };
        return match restore(&raw, settings) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(key, error = %e, "stored state rejected");
                None
            }
        };
    }
    None
}

/// Store under the current key and drop legacy keys
pub fn save_state(storage: &mut impl Storage, state: &SessionState) {
    match save(state).and_then(|json| storage.set(STATE_KEY, &json)) {
        Ok(()) => debug!("state saved"),
        Err(e) => warn!(error = %e, "state save failed"),
    }
    for key in LEGACY_STATE_KEYS {
        if let Err(e) = storage.remove(key) {
            debug!(key, error = %e, "legacy key removal failed");
        }
    }
}

// ─── User catalog overlays ───────────────────────────────────────────

/// User-added catalog entries, stored under their own keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub trailers: Vec<TrailerPreset>,
    pub cargo: Vec<CargoType>,
    pub tractors: Vec<String>,
    pub axles: AxleRegistry,
}

fn read_json<T: DeserializeOwned + Default>(storage: &impl Storage, key: &str) -> T {
    match storage.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "overlay rejected");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "overlay read failed");
            T::default()
        }
    }
}

/// Read overlays; each list is kept only if it parses as a whole
pub fn load_overlays(storage: &impl Storage) -> Overlays {
    Overlays {
        trailers: read_json(storage, CUSTOM_TRAILERS_KEY),
        cargo: read_json(storage, CUSTOM_CARGO_KEY),
        tractors: read_json(storage, CUSTOM_TRACTORS_KEY),
        axles: read_json(storage, AXLES_KEY),
    }
}

pub fn save_overlays(storage: &mut impl Storage, overlays: &Overlays) {
    let writes = [
        (CUSTOM_TRAILERS_KEY, serde_json::to_string(&overlays.trailers)),
        (CUSTOM_CARGO_KEY, serde_json::to_string(&overlays.cargo)),
        (CUSTOM_TRACTORS_KEY, serde_json::to_string(&overlays.tractors)),
        (AXLES_KEY, serde_json::to_string(&overlays.axles)),
    ];
    for (key, json) in writes {
        let result = json.map_err(PersistError::from).and_then(|j| storage.set(key, &j));
        if let Err(e) = result {
            warn!(key, error = %e, "overlay save failed");
        }
    }
}
