//! Error types for the loading engine
//!
//! Only input validation reaches the caller as an `Err`. Calibration and
//! persistence problems are absorbed at the boundary (degraded mode).

use thiserror::Error;

/// User input rejected before any state mutation.
///
/// `Display` yields the message shown to the user as a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("Введите валидное значение")]
    NotNumeric,

    #[error("Отрицательные значения запрещены")]
    Negative,

    #[error("Введите валидную ρ")]
    InvalidDensity,

    #[error("Цистерна не выбрана")]
    NoTanker,

    #[error("Отсек #{} не существует", .index + 1)]
    NoSuchCompartment { index: usize },

    #[error("{vehicle_id}: нет тарировки")]
    CalibrationUnavailable { vehicle_id: String },
}

/// Calibration document could not be turned into tables
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Calibration JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calibration document has no 4-digit id")]
    MissingId,

    #[error("Calibration table is empty")]
    EmptyTable,

    #[error("Calibration document declares no sections")]
    NoSections,

    #[error("Calibration document declares {declared} sections, rows hold at most {widest}")]
    SectionsExceedTable { declared: f64, widest: usize },
}

/// Transport failure reported by a calibration source
#[derive(Debug, Clone, Error)]
#[error("Calibration fetch failed for {candidate}: {message}")]
pub struct SourceError {
    pub candidate: String,
    pub message: String,
}

/// Session persistence failure (callers log and ignore it)
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("State JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Storage(String),
}
