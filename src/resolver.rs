//! Calibration lookup by vehicle id
//!
//! Provides the `CalibrationSource` trait and `CalibrationCatalog`, the cache
//! that turns a vehicle hint into a `VehicleCalibration`. The browser shell
//! and native tools implement the source differently (fetch vs. filesystem);
//! the candidate order and the degrade-to-`Missing` rule live here so both
//! behave the same.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::calibration::{parse_document, VehicleCalibration};
use crate::error::SourceError;
use crate::settings::Settings;

// ─── Vehicle ids ─────────────────────────────────────────────────────

/// First run of four consecutive digits in `hint` ("МО 7958 23" → "7958")
pub fn extract_vehicle_id(hint: &str) -> Option<String> {
    let chars: Vec<char> = hint.chars().collect();
    chars
        .windows(4)
        .find(|w| w.iter().all(|c| c.is_ascii_digit()))
        .map(|w| w.iter().collect())
}

/// Lookup candidates for a hint: raw 4 digits, zero-padded, integer form.
///
/// Deduplicated, in that order. Empty when the hint has no 4-digit run.
pub fn id_candidates(hint: &str) -> Vec<String> {
    let Some(raw) = extract_vehicle_id(hint) else {
        return Vec::new();
    };
    let mut out = vec![raw.clone()];
    if let Ok(n) = raw.parse::<u32>() {
        for candidate in [format!("{:04}", n), n.to_string()] {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Case- and punctuation-insensitive form used for id comparisons
fn normalize_key(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── CalibrationSource trait ─────────────────────────────────────────

/// Where calibration documents come from.
///
/// `Ok(None)` means the resource does not exist for that candidate id.
pub trait CalibrationSource {
    fn fetch(&self, candidate_id: &str) -> Result<Option<String>, SourceError>;
}

/// In-memory source keyed by candidate id
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, id: impl Into<String>, json: impl Into<String>) -> Self {
        self.documents.insert(id.into(), json.into());
        self
    }
}

impl CalibrationSource for StaticSource {
    fn fetch(&self, candidate_id: &str) -> Result<Option<String>, SourceError> {
        Ok(self.documents.get(candidate_id).cloned())
    }
}

/// Documents read from disk at `Settings::calibration_url`
#[derive(Debug, Clone)]
pub struct DirSource {
    settings: Settings,
}

impl DirSource {
    pub fn new(settings: &Settings) -> Self {
        Self { settings: settings.clone() }
    }
}

impl CalibrationSource for DirSource {
    fn fetch(&self, candidate_id: &str) -> Result<Option<String>, SourceError> {
        let path = self.settings.calibration_url(candidate_id);
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SourceError {
                candidate: candidate_id.to_string(),
                message: format!("{}: {}", path, e),
            }),
        }
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────

/// Cache of resolved calibrations, present or missing.
///
/// A resolved id is never fetched again until `invalidate` or `clear`.
pub struct CalibrationCatalog<S> {
    source: S,
    cache: HashMap<String, Arc<VehicleCalibration>>,
    order: Vec<String>,
}

impl<S: CalibrationSource> CalibrationCatalog<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve a vehicle hint (plate, id, padded or not) to its calibration.
    ///
    /// Candidates are tried in order; the first document that fetches and
    /// parses wins. Anything else ends as `Missing`.
    pub fn resolve(&mut self, vehicle_hint: &str) -> Arc<VehicleCalibration> {
        let key = cache_key(vehicle_hint);
        if let Some(hit) = self.cache.get(&key) {
            return Arc::clone(hit);
        }

        let resolved = Arc::new(self.load(vehicle_hint, &key));
        self.cache.insert(key.clone(), Arc::clone(&resolved));
        self.order.push(key);
        resolved
    }

    fn load(&self, vehicle_hint: &str, key: &str) -> VehicleCalibration {
        for candidate in id_candidates(vehicle_hint) {
            match self.source.fetch(&candidate) {
                Ok(Some(json)) => match parse_document(&json) {
                    Ok(cal) => {
                        debug!(candidate = %candidate, "calibration loaded");
                        return cal;
                    }
                    Err(e) => warn!(candidate = %candidate, error = %e, "calibration document rejected"),
                },
                Ok(None) => debug!(candidate = %candidate, "no calibration resource"),
                Err(e) => warn!(error = %e, "calibration fetch failed"),
            }
        }
        warn!(vehicle = %key, "calibration not found");
        VehicleCalibration::missing(key)
    }

    /// Resolve every id up front; duplicates by normalized id are skipped
    pub fn prefetch<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            if extract_vehicle_id(id).is_some() {
                self.resolve(id);
            }
        }
    }

    /// Cached entry for a hint, without fetching
    pub fn cached(&self, vehicle_hint: &str) -> Option<Arc<VehicleCalibration>> {
        self.cache.get(&cache_key(vehicle_hint)).cloned()
    }

    /// All cached calibrations in resolution order
    pub fn entries(&self) -> Vec<Arc<VehicleCalibration>> {
        self.order
            .iter()
            .filter_map(|k| self.cache.get(k).cloned())
            .collect()
    }

    pub fn invalidate(&mut self, vehicle_hint: &str) {
        let key = cache_key(vehicle_hint);
        self.cache.remove(&key);
        self.order.retain(|k| k != &key);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.order.clear();
    }
}

fn cache_key(vehicle_hint: &str) -> String {
    extract_vehicle_id(vehicle_hint).unwrap_or_else(|| vehicle_hint.trim().to_string())
}

// ─── Matching a trailer to a calibration ─────────────────────────────

/// Pick the calibration for a trailer among loaded ones.
///
/// Tries an exact normalized id match, then a 4-digit containment match;
/// either is only taken when its compartment count agrees with
/// `compartment_count` (0 = unknown). `None` when neither matches; another
/// vehicle's curve is never substituted.
pub fn match_calibration<'a>(
    entries: &'a [Arc<VehicleCalibration>],
    trailer_id: &str,
    trailer_name: &str,
    compartment_count: usize,
) -> Option<&'a VehicleCalibration> {
    let present: Vec<&VehicleCalibration> = entries
        .iter()
        .map(|e| e.as_ref())
        .filter(|e| !e.is_missing())
        .collect();
    let fits = |c: &VehicleCalibration| compartment_count == 0 || c.compartments().len() == compartment_count;

    let wanted = if trailer_id.trim().is_empty() { trailer_name } else { trailer_id };
    let wanted = normalize_key(wanted);
    if !wanted.is_empty() {
        if let Some(c) = present.iter().copied().find(|c| normalize_key(c.vehicle_id()) == wanted) {
            if fits(c) {
                return Some(c);
            }
        }
    }

    let digits = extract_vehicle_id(trailer_id).or_else(|| extract_vehicle_id(trailer_name));
    if let Some(d4) = digits {
        if let Some(c) = present.iter().copied().find(|c| c.vehicle_id().contains(d4.as_str())) {
            if fits(c) {
                return Some(c);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Source that records every candidate it was asked for
    struct RecordingSource {
        inner: StaticSource,
        calls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl RecordingSource {
        fn new(inner: StaticSource) -> Self {
            Self { inner, calls: RefCell::new(Vec::new()), fail: false }
        }

        fn failing() -> Self {
            Self { inner: StaticSource::new(), calls: RefCell::new(Vec::new()), fail: true }
        }
    }

    impl CalibrationSource for RecordingSource {
        fn fetch(&self, candidate_id: &str) -> Result<Option<String>, SourceError> {
            self.calls.borrow_mut().push(candidate_id.to_string());
            if self.fail {
                return Err(SourceError {
                    candidate: candidate_id.to_string(),
                    message: "network down".into(),
                });
            }
            self.inner.fetch(candidate_id)
        }
    }

    fn doc(id: &str, sections: usize) -> String {
        let s: Vec<String> = (0..sections).map(|_| "1000".to_string()).collect();
        format!(
            r#"{{"id":"{}","table":[{{"mm":0,"s":[{}]}},{{"mm":1000,"s":[{}]}}]}}"#,
            id,
            vec!["0"; sections].join(","),
            s.join(",")
        )
    }

    #[test]
    fn test_extract_vehicle_id() {
        assert_eq!(extract_vehicle_id("МО 7958 23").as_deref(), Some("7958"));
        assert_eq!(extract_vehicle_id("MO0310_23").as_deref(), Some("0310"));
        assert_eq!(extract_vehicle_id("123456").as_deref(), Some("1234"));
        assert_eq!(extract_vehicle_id("ЕР 897 23"), None);
        assert_eq!(extract_vehicle_id(""), None);
    }

    #[test]
    fn test_candidates_order_and_dedup() {
        assert_eq!(id_candidates("MO0310_23"), vec!["0310", "310"]);
        assert_eq!(id_candidates("7958"), vec!["7958"]);
        assert_eq!(id_candidates("0000"), vec!["0000", "0"]);
        assert!(id_candidates("no digits").is_empty());
    }

    #[test]
    fn test_resolve_uses_unpadded_fallback() {
        let source = RecordingSource::new(StaticSource::new().with_document("310", doc("0310", 4)));
        let mut catalog = CalibrationCatalog::new(source);
        let cal = catalog.resolve("МО 0310 23");
        assert!(!cal.is_missing());
        assert_eq!(cal.compartments().len(), 4);
        assert_eq!(*catalog.source().calls.borrow(), vec!["0310", "310"]);
    }

    #[test]
    fn test_resolve_caches_hits() {
        let source = RecordingSource::new(StaticSource::new().with_document("7958", doc("7958", 3)));
        let mut catalog = CalibrationCatalog::new(source);
        let a = catalog.resolve("MO7958_23");
        let b = catalog.resolve("7958");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.source().calls.borrow().len(), 1);
    }

    #[test]
    fn test_resolve_caches_missing() {
        let mut catalog = CalibrationCatalog::new(RecordingSource::new(StaticSource::new()));
        let a = catalog.resolve("5555");
        assert!(a.is_missing());
        assert_eq!(a.vehicle_id(), "5555");
        catalog.resolve("5555");
        assert_eq!(catalog.source().calls.borrow().len(), 1);
    }

    #[test]
    fn test_fetch_failure_degrades_to_missing() {
        let mut catalog = CalibrationCatalog::new(RecordingSource::failing());
        let cal = catalog.resolve("ЕУ 2938 23");
        assert!(cal.is_missing());
        assert_eq!(cal.vehicle_id(), "2938");
    }

    #[test]
    fn test_bad_document_tries_next_candidate() {
        let source = StaticSource::new()
            .with_document("0683", "{ broken")
            .with_document("683", doc("0683", 1));
        let mut catalog = CalibrationCatalog::new(source);
        assert!(!catalog.resolve("ЕТ 0683 23").is_missing());
    }

    #[test]
    fn test_dir_source_reads_documents() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("0310.json"), doc("0310", 4)).unwrap();
        let settings = Settings {
            calibration_base: format!("{}/", dir.path().display()),
            ..Settings::default()
        };
        let source = DirSource::new(&settings);
        assert!(source.fetch("0310").unwrap().is_some());
        assert!(source.fetch("9999").unwrap().is_none());

        let mut catalog = CalibrationCatalog::new(source);
        assert_eq!(catalog.resolve("МО 0310 23").compartments().len(), 4);
        assert!(catalog.resolve("8877").is_missing());
    }

    #[test]
    fn test_oversized_section_count_degrades_to_missing() {
        let huge = r#"{"id":"1234","sections":1e19,"table":[{"mm":0,"s":[0]},{"mm":900,"s":[5000]}]}"#;
        let mut catalog = CalibrationCatalog::new(StaticSource::new().with_document("1234", huge));
        let cal = catalog.resolve("1234");
        assert!(cal.is_missing());
        assert_eq!(cal.vehicle_id(), "1234");
    }

    #[test]
    fn test_invalidate_refetches() {
        let source = RecordingSource::new(StaticSource::new());
        let mut catalog = CalibrationCatalog::new(source);
        catalog.resolve("2562");
        catalog.invalidate("2562");
        assert!(catalog.cached("2562").is_none());
        catalog.resolve("2562");
        assert_eq!(catalog.source().calls.borrow().len(), 2);
    }

    #[test]
    fn test_prefetch_dedupes() {
        let source = RecordingSource::new(StaticSource::new().with_document("5123", doc("5123", 3)));
        let mut catalog = CalibrationCatalog::new(source);
        catalog.prefetch(["5123", "ЕУ 5123 23", "5702", "bad"]);
        let entries = catalog.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_missing());
        assert!(entries[1].is_missing());
    }

    #[test]
    fn test_match_calibration_prefers_id_with_matching_count() {
        let entries = vec![
            Arc::new(parse_document(&doc("5123", 3)).unwrap()),
            Arc::new(VehicleCalibration::missing("7958")),
            Arc::new(parse_document(&doc("7958", 3)).unwrap()),
        ];
        let m = match_calibration(&entries, "MO7958_23", "МО 7958 23", 3).unwrap();
        assert_eq!(m.vehicle_id(), "7958");
    }

    #[test]
    fn test_match_calibration_count_mismatch_gives_none() {
        let entries = vec![
            Arc::new(parse_document(&doc("5123", 3)).unwrap()),
            Arc::new(parse_document(&doc("0310", 4)).unwrap()),
        ];
        assert!(match_calibration(&entries, "MO0310_23", "", 3).is_none());
    }

    #[test]
    fn test_match_calibration_ignores_other_vehicles() {
        let entries = vec![Arc::new(parse_document(&doc("7958", 3)).unwrap())];
        assert!(match_calibration(&entries, "EU2938_23", "ЕУ 2938 23", 3).is_none());
        assert!(match_calibration(&entries, "", "", 0).is_none());
    }

    #[test]
    fn test_match_calibration_none_when_all_missing() {
        let entries = vec![Arc::new(VehicleCalibration::missing("7958"))];
        assert!(match_calibration(&entries, "7958", "", 0).is_none());
    }
}
