//! tanker-core: road tanker loading engine
//!
//! Calibration interpolation (dip level ↔ liters), the capacity-constrained
//! distribution of a requested volume or mass across compartments, and the
//! reconciliation pass that keeps liters, tons and overflow consistent.
//!
//! Compiles to both native (rlib) and WebAssembly (cdylib via wasm-pack).

pub mod allocation;
pub mod calibration;
pub mod catalog;
pub mod delivery;
pub mod error;
pub mod gauge;
pub mod interpolation;
pub mod persist;
pub mod recalc;
pub mod report;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod state;
pub mod units;
pub mod validation;

// Re-exports for convenience
pub use allocation::{distribute, fill_to_capacity, Allocation, RequestUnit};
pub use calibration::{parse_document, CompartmentCalibration, VehicleCalibration};
pub use catalog::{AxleRegistry, CargoCatalog, CargoType, TrailerBody, TrailerPreset, CATALOG};
pub use delivery::{trips_needed, DeliveryInputs};
pub use error::{CalibrationError, InputError, PersistError, SourceError};
pub use interpolation::{level_to_volume, volume_to_level, CalibrationSample};
pub use persist::{MemoryStorage, Overlays, SessionState, Storage};
pub use recalc::{reconcile, reconcile_json, Quantity, ReconcileContext, Reconciliation, Warning};
pub use report::Report;
pub use resolver::{CalibrationCatalog, CalibrationSource, DirSource, StaticSource};
pub use session::{CalibrationTicket, Session};
pub use settings::Settings;
pub use state::{CargoMode, Compartment, LastEdit, LoadRequest, RequestSource, TrailerState};
