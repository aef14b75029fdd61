//! Delivery cost and trip count
//!
//! cost  = distance_km * rate_per_km * trips   (all positive, trips ≥ 1)
//! trips = ceil(target_tons / tons_per_trip)

use serde::{Deserialize, Serialize};

use crate::report::group_digits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    #[default]
    Manual,
    /// Legacy states call this `gmaps`
    #[serde(alias = "gmaps")]
    Maps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapProvider {
    #[default]
    Google,
    Yandex,
}

/// Route and tariff inputs persisted with the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInputs {
    #[serde(default)]
    pub distance_mode: DistanceMode,
    #[serde(default)]
    pub provider: MapProvider,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub rate_per_km: f64,
    #[serde(default = "default_trips")]
    pub trips: u32,
    #[serde(default)]
    pub route_from: String,
    #[serde(default)]
    pub route_to: String,
    #[serde(default)]
    pub avoid_tolls: bool,
    #[serde(default = "default_truck_mode")]
    pub truck_mode: bool,
    #[serde(default)]
    pub avoid_scales: bool,
    /// Tons to deliver in total (0 = not set)
    #[serde(default)]
    pub cargo_target_tons: f64,
}

fn default_trips() -> u32 {
    1
}

fn default_truck_mode() -> bool {
    true
}

impl Default for DeliveryInputs {
    fn default() -> Self {
        Self {
            distance_mode: DistanceMode::default(),
            provider: MapProvider::default(),
            distance_km: 0.0,
            rate_per_km: 0.0,
            trips: default_trips(),
            route_from: String::new(),
            route_to: String::new(),
            avoid_tolls: false,
            truck_mode: default_truck_mode(),
            avoid_scales: false,
            cargo_target_tons: 0.0,
        }
    }
}

/// Trip count as typed: rounded, at least 1
pub fn normalize_trips(raw: f64) -> u32 {
    if !raw.is_finite() {
        return 1;
    }
    raw.round().clamp(1.0, u32::MAX as f64) as u32
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

impl DeliveryInputs {
    /// Total cost; `None` unless distance, rate and trips are all positive
    pub fn cost(&self) -> Option<f64> {
        let distance = positive(self.distance_km)?;
        let rate = positive(self.rate_per_km)?;
        if self.trips == 0 {
            return None;
        }
        Some(distance * rate * f64::from(self.trips))
    }

    /// `"12 345 ₽"` or `—`
    pub fn cost_text(&self) -> String {
        self.cost()
            .map_or_else(|| "—".to_string(), |c| format!("{} ₽", group_digits(c)))
    }

    /// Trips needed for the target tonnage at `tons_per_trip`
    pub fn trips_for_target(&self, tons_per_trip: f64) -> Option<u64> {
        trips_needed(self.cargo_target_tons, tons_per_trip)
    }
}

/// ceil(target / per_trip) when both are positive
pub fn trips_needed(target_tons: f64, tons_per_trip: f64) -> Option<u64> {
    let target = positive(target_tons)?;
    let per_trip = positive(tons_per_trip)?;
    Some((target / per_trip).ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::GROUP_SEPARATOR as S;

    #[test]
    fn test_cost() {
        let d = DeliveryInputs {
            distance_km: 120.0,
            rate_per_km: 85.5,
            trips: 2,
            ..Default::default()
        };
        assert_eq!(d.cost(), Some(20520.0));
        assert_eq!(d.cost_text(), format!("20{S}520 ₽"));
    }

    #[test]
    fn test_cost_requires_all_inputs() {
        let d = DeliveryInputs {
            distance_km: 120.0,
            ..Default::default()
        };
        assert_eq!(d.cost(), None);
        assert_eq!(d.cost_text(), "—");
    }

    #[test]
    fn test_normalize_trips() {
        assert_eq!(normalize_trips(0.0), 1);
        assert_eq!(normalize_trips(2.6), 3);
        assert_eq!(normalize_trips(-4.0), 1);
        assert_eq!(normalize_trips(f64::NAN), 1);
    }

    #[test]
    fn test_trips_needed() {
        assert_eq!(trips_needed(100.0, 25.0), Some(4));
        assert_eq!(trips_needed(101.0, 25.0), Some(5));
        assert_eq!(trips_needed(0.0, 25.0), None);
        assert_eq!(trips_needed(10.0, 0.0), None);
    }

    #[test]
    fn test_legacy_distance_mode() {
        let d: DeliveryInputs = serde_json::from_str(r#"{"distanceMode":"gmaps","provider":"yandex"}"#).unwrap();
        assert_eq!(d.distance_mode, DistanceMode::Maps);
        assert_eq!(d.provider, MapProvider::Yandex);
        assert_eq!(d.trips, 1);
        assert!(d.truck_mode);
    }
}
