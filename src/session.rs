//! Loading session: one explicit state object and the operations on it
//!
//! ```text
//! Idle ──select_trailer──▶ VehicleSelected ◀─┐
//!                             │               │
//!          edit_* / distribute_* / clear ─────┘   (re-selection resets)
//! ```
//!
//! Every operation validates its input first; a rejected input returns
//! `Err(InputError)` and leaves the state untouched. Accepted inputs end in a
//! reconciliation pass whose result is returned.
//!
//! Calibration arrives asynchronously in the browser. `select_trailer` hands
//! out a `CalibrationTicket`; a calibration merged with a ticket from an
//! earlier selection is discarded.

use std::sync::Arc;

use tracing::debug;

use crate::allocation::{distribute, fill_to_capacity, Allocation, RequestUnit};
use crate::calibration::VehicleCalibration;
use crate::catalog::{find_trailer, tractor_plates, trailer_presets, AxleRegistry, CargoCatalog, TrailerBody, TrailerPreset};
use crate::delivery::DeliveryInputs;
use crate::error::{InputError, PersistError};
use crate::gauge::{fill_fraction, levels_for, liters_from_level};
use crate::persist::{self, Overlays, SessionState};
use crate::recalc::{reconcile, ReconcileContext, Reconciliation};
use crate::report::{overflow_notice, render, BriefHeader, Report};
use crate::resolver::{match_calibration, CalibrationCatalog, CalibrationSource};
use crate::settings::Settings;
use crate::state::{CargoMode, Compartment, LastEdit, LoadRequest, RequestSource, TrailerState};
use crate::units::KG_PER_TON;
use crate::validation::{check_amount, check_density};

/// Claim on the calibration of one trailer selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTicket {
    generation: u64,
    vehicle_hint: String,
    compartment_count: usize,
}

impl CalibrationTicket {
    /// Hint to resolve (trailer id or plate)
    pub fn vehicle_hint(&self) -> &str {
        &self.vehicle_hint
    }
}

#[derive(Debug, Default)]
struct CalibrationSlot {
    generation: u64,
    current: Option<Arc<VehicleCalibration>>,
}

pub struct Session<S> {
    state: SessionState,
    settings: Settings,
    cargo: CargoCatalog,
    custom_trailers: Vec<TrailerPreset>,
    trailers: Vec<TrailerPreset>,
    custom_tractors: Vec<String>,
    axles: AxleRegistry,
    calibrations: CalibrationCatalog<S>,
    slot: CalibrationSlot,
    last_edit: LastEdit,
    overflow_pending: bool,
}

impl<S: CalibrationSource> Session<S> {
    pub fn new(source: S, settings: Settings) -> Self {
        Self {
            state: SessionState::fresh(&settings),
            settings,
            cargo: CargoCatalog::builtin(),
            custom_trailers: Vec::new(),
            trailers: trailer_presets(&[]),
            custom_tractors: Vec::new(),
            axles: AxleRegistry::new(),
            calibrations: CalibrationCatalog::new(source),
            slot: CalibrationSlot::default(),
            last_edit: LastEdit::None,
            overflow_pending: false,
        }
    }

    /// Session from stored JSON; unreadable JSON starts a fresh session
    pub fn restore(source: S, settings: Settings, json: &str) -> Self {
        let mut session = Self::new(source, settings);
        match persist::restore(json, &session.settings) {
            Ok(state) => session.state = state,
            Err(e) => tracing::warn!(error = %e, "stored session rejected, starting fresh"),
        }
        session
    }

    /// Layer user catalog entries over the built-in ones
    pub fn with_overlays(mut self, overlays: Overlays) -> Self {
        self.cargo = CargoCatalog::with_custom(&overlays.cargo);
        self.trailers = trailer_presets(&overlays.trailers);
        self.custom_trailers = overlays.trailers;
        self.custom_tractors = overlays.tractors;
        self.axles = overlays.axles;
        self
    }

    pub fn overlays(&self) -> Overlays {
        Overlays {
            trailers: self.custom_trailers.clone(),
            cargo: self.cargo.custom_entries().to_vec(),
            tractors: self.custom_tractors.clone(),
            axles: self.axles.clone(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cargo_catalog(&self) -> &CargoCatalog {
        &self.cargo
    }

    pub fn trailers(&self) -> &[TrailerPreset] {
        &self.trailers
    }

    pub fn tractors(&self) -> Vec<String> {
        tractor_plates(&self.custom_tractors)
    }

    pub fn save(&self) -> Result<String, PersistError> {
        persist::save(&self.state)
    }

    pub fn delivery_mut(&mut self) -> &mut DeliveryInputs {
        &mut self.state.delivery
    }

    pub fn cargo_mode(&self) -> CargoMode {
        if self.state.single_cargo {
            CargoMode::Single {
                type_key: self.state.single_cargo_type_key.clone(),
                density: self.state.single_cargo_density,
            }
        } else {
            CargoMode::Mixed
        }
    }

    fn selected_preset(&self) -> Option<&TrailerPreset> {
        let id = self.state.selected_trailer_id.as_deref()?;
        find_trailer(&self.trailers, id)
    }

    // ─── Vehicle selection ───────────────────────────────────────────

    /// Select a trailer preset (unknown ids fall back to the first preset).
    ///
    /// Replaces the trailer state, drops the pending request and invalidates
    /// any calibration still in flight. Returns a ticket for tankers.
    pub fn select_trailer(&mut self, trailer_id: &str) -> Option<CalibrationTicket> {
        let Some(preset) = find_trailer(&self.trailers, trailer_id).cloned() else {
            self.state.selected_trailer_id = None;
            self.state.trailer_state = None;
            return None;
        };

        let trailer = match &preset.body {
            TrailerBody::Tanker { compartments_liters } => {
                let (key, density) = self.row_defaults();
                TrailerState::tanker(compartments_liters, &key, density)
            }
            TrailerBody::Platform { positions } => {
                TrailerState::platform(positions.unwrap_or(self.settings.platform_positions))
            }
        };
        debug!(trailer = %preset.id, "trailer selected");

        self.state.selected_trailer_id = Some(preset.id.clone());
        self.state.trailer_state = Some(trailer);
        self.state.last_load_request = None;
        self.last_edit = LastEdit::None;
        self.overflow_pending = false;

        self.slot.generation += 1;
        self.slot.current = None;
        self.reconcile();
        self.calibration_ticket()
    }

    /// Cargo key and density for fresh compartments
    fn row_defaults(&self) -> (String, f64) {
        match self.cargo_mode() {
            CargoMode::Single { type_key, density } => (type_key, density),
            CargoMode::Mixed => {
                let key = self.settings.default_cargo_key.clone();
                let density = self.cargo.density_of(&key).unwrap_or(self.settings.default_density);
                (key, density)
            }
        }
    }

    /// Ticket for the current selection (e.g. after `restore`)
    pub fn calibration_ticket(&self) -> Option<CalibrationTicket> {
        let preset = self.selected_preset()?;
        if !preset.is_tanker() {
            return None;
        }
        Some(CalibrationTicket {
            generation: self.slot.generation,
            vehicle_hint: preset.id.clone(),
            compartment_count: preset.capacities().len(),
        })
    }

    /// Attach a calibration resolved elsewhere.
    ///
    /// Returns false (and drops it) when the ticket belongs to an earlier
    /// selection. Compartment figures are not touched.
    pub fn merge_calibration(&mut self, ticket: &CalibrationTicket, calibration: Arc<VehicleCalibration>) -> bool {
        if ticket.generation != self.slot.generation {
            debug!(vehicle = %ticket.vehicle_hint, "discarding stale calibration");
            return false;
        }
        self.slot.current = Some(calibration);
        true
    }

    /// Resolve through the session's own catalog and merge.
    ///
    /// A present calibration whose compartment count disagrees with the
    /// trailer is swapped for the best match among loaded ones, else
    /// degraded to `Missing`.
    pub fn resolve_calibration(&mut self, ticket: &CalibrationTicket) -> bool {
        let resolved = self.calibrations.resolve(&ticket.vehicle_hint);
        let count = ticket.compartment_count;
        let fits = |c: &VehicleCalibration| count == 0 || c.compartments().len() == count;

        let chosen = if resolved.is_missing() || fits(resolved.as_ref()) {
            resolved
        } else {
            debug!(
                vehicle = %resolved.vehicle_id(),
                sections = resolved.compartments().len(),
                expected = count,
                "calibration does not fit trailer"
            );
            let entries = self.calibrations.entries();
            let name = self.selected_preset().map(|p| p.name.clone()).unwrap_or_default();
            match match_calibration(&entries, &ticket.vehicle_hint, &name, count) {
                Some(found) if fits(found) => Arc::new(found.clone()),
                _ => Arc::new(VehicleCalibration::missing(resolved.vehicle_id())),
            }
        };
        self.merge_calibration(ticket, chosen)
    }

    /// Load every calibration listed in `Settings::barrel_ids` into the cache
    pub fn prefetch_calibrations(&mut self) {
        self.calibrations
            .prefetch(self.settings.barrel_ids.iter().map(String::as_str));
        debug!(cached = self.calibrations.entries().len(), "calibrations prefetched");
    }

    pub fn calibrations_mut(&mut self) -> &mut CalibrationCatalog<S> {
        &mut self.calibrations
    }

    /// Calibration of the selected trailer, once merged
    pub fn calibration(&self) -> Option<&VehicleCalibration> {
        self.slot.current.as_deref()
    }

    pub fn select_tractor(&mut self, plate: &str) {
        let plate = plate.trim();
        self.state.tractor_plate = (!plate.is_empty()).then(|| plate.to_string());
        if let Some(axles) = self.axles.axles(plate) {
            self.state.tractor_axles = axles;
        }
    }

    /// Set the axle count and remember it for the selected tractor
    pub fn set_tractor_axles(&mut self, axles: u8) {
        self.state.tractor_axles = axles;
        if let Some(plate) = self.state.tractor_plate.clone() {
            self.axles.set(&plate, axles);
        }
    }

    // ─── Catalog overlays ────────────────────────────────────────────

    pub fn add_custom_cargo(&mut self, label: &str, density: f64) -> Result<String, InputError> {
        check_density(density)?;
        self.cargo.add_custom(label, density).ok_or(InputError::NotNumeric)
    }

    pub fn add_custom_trailer(&mut self, preset: TrailerPreset) {
        self.custom_trailers.retain(|t| t.id != preset.id);
        self.custom_trailers.push(preset);
        self.trailers = trailer_presets(&self.custom_trailers);
    }

    pub fn add_custom_tractor(&mut self, plate: &str) {
        let plate = plate.trim();
        if !plate.is_empty() && !self.tractors().iter().any(|p| p == plate) {
            self.custom_tractors.push(plate.to_string());
        }
    }

    // ─── Cargo ───────────────────────────────────────────────────────

    /// Toggle single-cargo mode; switching on copies the shared cargo to
    /// every compartment
    pub fn set_single_cargo(&mut self, enabled: bool) -> Reconciliation {
        self.state.single_cargo = enabled;
        if enabled {
            let (key, density) = (self.state.single_cargo_type_key.clone(), self.state.single_cargo_density);
            if let Some(rows) = self.compartments_mut() {
                for c in rows {
                    c.cargo_type_key = key.clone();
                    c.density = density;
                }
            }
        }
        self.reconcile()
    }

    /// Shared cargo type; its catalog density becomes the shared density
    pub fn set_single_cargo_type(&mut self, type_key: &str) -> Reconciliation {
        self.state.single_cargo_type_key = type_key.to_string();
        if let Some(density) = self.cargo.density_of(type_key) {
            self.state.single_cargo_density = density;
        }
        self.reconcile()
    }

    pub fn set_single_density(&mut self, density: f64) -> Result<Reconciliation, InputError> {
        let density = check_density(density)?;
        self.state.single_cargo_density = density;
        Ok(self.reconcile())
    }

    /// Per-compartment cargo type; density follows the catalog
    pub fn set_compartment_cargo(&mut self, index: usize, type_key: &str) -> Result<Reconciliation, InputError> {
        let density = self.cargo.density_of(type_key).unwrap_or(0.0);
        let c = self.compartment_mut(index)?;
        c.cargo_type_key = type_key.to_string();
        c.density = density;
        Ok(self.reconcile())
    }

    pub fn set_compartment_density(&mut self, index: usize, density: f64) -> Result<Reconciliation, InputError> {
        let density = check_density(density)?;
        self.compartment_mut(index)?.density = density;
        Ok(self.reconcile())
    }

    // ─── Direct edits ────────────────────────────────────────────────

    /// Tanker compartments; `None` without a tanker
    fn compartments(&self) -> Option<&[Compartment]> {
        self.state
            .trailer_state
            .as_ref()
            .filter(|t| t.is_tanker())
            .map(TrailerState::compartments)
    }

    fn compartments_mut(&mut self) -> Option<&mut Vec<Compartment>> {
        self.state.trailer_state.as_mut()?.compartments_mut()
    }

    fn compartment_mut(&mut self, index: usize) -> Result<&mut Compartment, InputError> {
        self.compartments_mut()
            .ok_or(InputError::NoTanker)?
            .get_mut(index)
            .ok_or(InputError::NoSuchCompartment { index })
    }

    /// Liters typed into a compartment; the pending request is kept
    pub fn edit_liters(&mut self, index: usize, liters: f64) -> Result<Reconciliation, InputError> {
        let liters = check_amount(liters)?;
        self.compartment_mut(index)?.liters = liters;
        self.last_edit = LastEdit::Liters { index };
        Ok(self.reconcile())
    }

    /// Tons typed into a compartment; liters follow from density
    pub fn edit_tons(&mut self, index: usize, tons: f64) -> Result<Reconciliation, InputError> {
        let tons = check_amount(tons)?;
        self.compartment_mut(index)?.tons = tons;
        self.last_edit = LastEdit::Tons { index };
        Ok(self.reconcile())
    }

    /// Dip level typed into a compartment (needs a present calibration)
    pub fn edit_level(&mut self, index: usize, level_mm: f64) -> Result<Reconciliation, InputError> {
        let vehicle_id = self.selected_preset().map(|p| p.id.clone()).unwrap_or_default();
        let liters = match self.calibration() {
            Some(cal) => liters_from_level(cal, index, level_mm, self.settings.decimals)?,
            None => return Err(InputError::CalibrationUnavailable { vehicle_id }),
        };
        self.edit_liters(index, liters)
    }

    /// Platform position mass in tons
    pub fn set_position_mass(&mut self, index: usize, tons: f64) -> Result<Reconciliation, InputError> {
        let tons = check_amount(tons)?;
        let Some(TrailerState::Platform { position_masses }) = self.state.trailer_state.as_mut() else {
            return Err(InputError::NoSuchCompartment { index });
        };
        let slot = position_masses
            .get_mut(index)
            .ok_or(InputError::NoSuchCompartment { index })?;
        *slot = tons * KG_PER_TON;
        Ok(self.reconcile())
    }

    // ─── Bulk distribution ───────────────────────────────────────────

    pub fn distribute_volume(&mut self, liters: f64) -> Result<Reconciliation, InputError> {
        self.bulk(liters, RequestUnit::Liters)
    }

    pub fn distribute_volume_m3(&mut self, m3: f64) -> Result<Reconciliation, InputError> {
        self.bulk(m3, RequestUnit::CubicMeters)
    }

    pub fn distribute_mass(&mut self, tons: f64) -> Result<Reconciliation, InputError> {
        self.bulk(tons, RequestUnit::Tons)
    }

    fn bulk(&mut self, total: f64, unit: RequestUnit) -> Result<Reconciliation, InputError> {
        let total = check_amount(total)?;
        if self.compartments().is_none() {
            return Err(InputError::NoTanker);
        }

        // An empty request only drops the previous one
        if total == 0.0 {
            self.state.last_load_request = None;
            return Ok(self.reconcile());
        }

        let mode = self.cargo_mode();
        let compartments = self.compartments().ok_or(InputError::NoTanker)?;
        let allocation = distribute(total, unit, compartments, &mode)?;
        let request = match unit {
            RequestUnit::Liters => LoadRequest {
                source: RequestSource::VolumeLiters,
                liters: Some(total),
                ..Default::default()
            },
            RequestUnit::CubicMeters => LoadRequest {
                source: RequestSource::VolumeM3,
                m3: Some(total),
                ..Default::default()
            },
            RequestUnit::Tons => LoadRequest {
                source: RequestSource::MassTons,
                tons: Some(total),
                ..Default::default()
            },
        };
        Ok(self.commit(allocation, request, &mode))
    }

    /// Fill every compartment to capacity
    pub fn fill_max(&mut self) -> Result<Reconciliation, InputError> {
        let mode = self.cargo_mode();
        let compartments = self.compartments().ok_or(InputError::NoTanker)?;
        let allocation = fill_to_capacity(compartments, &mode)?;
        let request = LoadRequest {
            source: RequestSource::FillMax,
            liters: Some(allocation.allocated_liters),
            kg: Some(allocation.allocated_kg),
            ..Default::default()
        };
        Ok(self.commit(allocation, request, &mode))
    }

    fn commit(&mut self, allocation: Allocation, request: LoadRequest, mode: &CargoMode) -> Reconciliation {
        let decimals = self.settings.decimals;
        if let Some(rows) = self.compartments_mut() {
            allocation.apply(rows, mode, decimals);
        }
        if !allocation.skipped.is_empty() {
            debug!(skipped = ?allocation.skipped, "compartments without density left out");
        }
        self.state.last_load_request = Some(
            LoadRequest {
                density: allocation.average_density,
                ..request
            }
            .cross_derived(),
        );
        self.last_edit = LastEdit::None;
        self.overflow_pending = true;
        self.reconcile()
    }

    /// Zero every compartment and drop the pending request
    pub fn clear(&mut self) -> Reconciliation {
        if let Some(trailer) = self.state.trailer_state.as_mut() {
            trailer.clear();
        }
        self.state.last_load_request = None;
        self.last_edit = LastEdit::None;
        self.reconcile()
    }

    // ─── Reconciliation and output ───────────────────────────────────

    /// Reconcile the current trailer; no trailer means no totals
    pub fn reconcile(&mut self) -> Reconciliation {
        let mode = self.cargo_mode();
        let Some(trailer) = self.state.trailer_state.as_mut() else {
            return Reconciliation::default();
        };
        let ctx = ReconcileContext {
            mode: &mode,
            edit: self.last_edit,
            request: self.state.last_load_request.as_ref(),
            catalog: &self.cargo,
            decimals: self.settings.decimals,
        };
        reconcile(trailer, &ctx)
    }

    /// Notice for the first reconciliation after a bulk distribution
    pub fn take_overflow_notice(&mut self, rec: &Reconciliation) -> Option<String> {
        if !std::mem::take(&mut self.overflow_pending) {
            return None;
        }
        self.state.last_overflow_liters = rec.leftover.liters.max(0.0);
        overflow_notice(rec)
    }

    pub fn report(&self, rec: &Reconciliation) -> Report {
        let single = self.state.single_cargo;
        let header = BriefHeader {
            trailer_name: self.selected_preset().map(|p| p.name.as_str()),
            tractor_plate: self.state.tractor_plate.as_deref(),
            cargo_label: single
                .then(|| self.cargo.label_of(&self.state.single_cargo_type_key))
                .flatten(),
            density: single.then_some(self.state.single_cargo_density),
        };
        render(rec, &header)
    }

    /// Gauge fraction per compartment
    pub fn fill_fractions(&self) -> Vec<f64> {
        let Some(trailer) = &self.state.trailer_state else {
            return Vec::new();
        };
        trailer
            .compartments()
            .iter()
            .enumerate()
            .map(|(i, c)| fill_fraction(self.calibration(), i, c.liters, c.capacity_liters))
            .collect()
    }

    /// Dip levels per compartment when calibration is present
    pub fn levels(&self) -> Option<Vec<f64>> {
        let trailer = self.state.trailer_state.as_ref()?;
        let liters: Vec<f64> = trailer.compartments().iter().map(|c| c.liters).collect();
        levels_for(self.calibration()?, &liters)
    }

    /// Trips for the delivery target at the current load
    pub fn trips_needed(&self, rec: &Reconciliation) -> Option<u64> {
        self.state.delivery.trips_for_target(rec.totals.tons)
    }
}
