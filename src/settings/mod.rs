//! Simulation settings and their JSON persistence.
//!
//! Settings are plain serde structs with documented defaults. Derived values
//! (grid statistics, the weight normalisation sum) are not persisted; they are
//! recomputed by the simulation whenever the inputs they depend on change.

pub mod projection;

pub use projection::InitialProjection;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::grid::{Cell, GridStats};
use crate::mechanics::{PotentialKind, Weight};

/// Format tag of persisted settings files.
pub const FILE_FORMAT: &str = "Discretized Optimized Map Projection file";
/// Supported format version of persisted settings files.
pub const FILE_FORMAT_VERSION: &str = "1.0";

/// Errors raised while reading or writing settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported file format '{format}' version '{version}'")]
    UnsupportedFormat { format: String, version: String },
    #[error("Unknown potential kind '{0}'")]
    UnknownPotential(String),
    #[error("Unknown initial projection '{0}'")]
    UnknownProjection(String),
}

/// What became stale after a settings update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsChange {
    /// Nothing changed.
    Unchanged,
    /// Only how results are reported or when the run stops.
    Reporting,
    /// Energies, forces and the weight normalisation must be recomputed.
    Forces,
    /// Cell positions must be reset from the initial projection, then
    /// calibrated and recomputed.
    Projection,
    /// The grid must be rebuilt.
    Grid,
}

/// Summary of the last run, optionally persisted with the settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transient {
    pub step: u64,
    pub energy: f64,
    pub stop_threshold_reached: bool,
}

/// Values derived from the grid, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Derived {
    grid_stats: Option<GridStats>,
    sum_of_weights: f64,
}

impl Default for Derived {
    fn default() -> Self {
        Self {
            grid_stats: None,
            sum_of_weights: 1.0,
        }
    }
}

/// Settings of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Grid resolution (refinement level).
    pub resolution: u32,
    /// Fraction of each force that is not applied per step.
    pub damping_factor: f64,
    /// Stop once the largest pending displacement, relative to the typical
    /// distance and the applied force fraction, falls below this value.
    pub stop_threshold_max_force_strength: f64,
    /// Stop once at least this many deficiencies exist.
    pub stop_threshold_count_deficiencies: u32,
    /// Stop after this many steps.
    pub stop_threshold_max_steps: u64,
    /// Only cells with `|lat|` up to this many degrees count towards energies.
    pub limit_lat_for_energy: Option<f64>,
    /// Divide all weights by their mean sum over inner cells.
    pub normalize_weights: bool,
    pub initial_projection: InitialProjection,
    /// Minimum triangle altitude, as a fraction of the typical distance.
    pub almost_deficiency_ratio: f64,
    /// Potentials whose geodesic reference is calibrated at start-up.
    pub calibrated_potentials: BTreeSet<PotentialKind>,
    pub weights: BTreeMap<PotentialKind, Weight>,
    #[serde(skip)]
    pub transient: Option<Transient>,
    #[serde(skip)]
    derived: Derived,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolution: 3,
            damping_factor: 0.99,
            stop_threshold_max_force_strength: 0.001,
            stop_threshold_count_deficiencies: u32::MAX,
            stop_threshold_max_steps: 100_000,
            limit_lat_for_energy: Some(90.0),
            normalize_weights: true,
            initial_projection: InitialProjection::Unprojected,
            almost_deficiency_ratio: 0.05,
            calibrated_potentials: BTreeSet::new(),
            weights: default_weights(),
            transient: None,
            derived: Derived::default(),
        }
    }
}

/// Default weight of every potential.
pub fn default_weights() -> BTreeMap<PotentialKind, Weight> {
    BTreeMap::from([
        (PotentialKind::Area, Weight::land(true, 1.0).with_ocean(0.3)),
        (PotentialKind::Distance, Weight::land(true, 1.0).with_ocean(0.3)),
        (PotentialKind::DistanceHomogeneity, Weight::land(false, 0.2).with_ocean(0.05)),
        (PotentialKind::Shape, Weight::land(true, 0.5).with_ocean(0.1)),
        (PotentialKind::Orientation, Weight::land(true, 0.1)),
        (PotentialKind::TriangleAltitude, Weight::land(true, 1.0)),
    ])
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    file_format: String,
    file_format_version: String,
    #[serde(flatten)]
    settings: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transient: Option<Transient>,
}

impl Settings {
    /// Settings with only `kinds` active; all other weights are switched off.
    pub fn with_only(mut self, kinds: &[PotentialKind]) -> Self {
        for (kind, weight) in self.weights.iter_mut() {
            weight.active = kinds.contains(kind);
        }
        self
    }

    /// Serialises the settings, optionally with the summary of the last run.
    pub fn to_json(&self, include_transient: bool) -> Value {
        let file = SettingsFile {
            file_format: FILE_FORMAT.to_string(),
            file_format_version: FILE_FORMAT_VERSION.to_string(),
            settings: self.clone(),
            transient: if include_transient { self.transient } else { None },
        };
        // plain data with string keys, always representable
        serde_json::to_value(file).unwrap_or(Value::Null)
    }

    /// Parses settings written by [`Settings::to_json`].
    pub fn from_json(mut value: Value) -> Result<Self, SettingsError> {
        let format = value.get("fileFormat").and_then(Value::as_str).unwrap_or_default();
        let version = value
            .get("fileFormatVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if format != FILE_FORMAT || version != FILE_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedFormat {
                format: format.to_string(),
                version: version.to_string(),
            });
        }
        if let Some(name) = value.get("initialProjection").and_then(Value::as_str) {
            let projection = parse_initial_projection(name)?;
            value["initialProjection"] = Value::from(projection.name());
        }
        let file: SettingsFile = serde_json::from_value(value)?;
        let mut settings = file.settings;
        settings.transient = file.transient;
        // weights missing from the file keep their defaults
        for (kind, weight) in default_weights() {
            settings.weights.entry(kind).or_insert(weight);
        }
        Ok(settings)
    }

    pub fn save(&self, path: &Path, include_transient: bool) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(&self.to_json(include_transient))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(serde_json::from_str(&text)?)
    }

    /// Stable hex digest of the persisted settings, used to name outputs.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json(false).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn update_resolution(&mut self, resolution: u32) -> SettingsChange {
        if self.resolution == resolution {
            return SettingsChange::Unchanged;
        }
        self.resolution = resolution;
        self.derived = Derived::default();
        SettingsChange::Grid
    }

    pub fn update_damping_factor(&mut self, damping_factor: f64) -> SettingsChange {
        if self.damping_factor == damping_factor {
            return SettingsChange::Unchanged;
        }
        self.damping_factor = damping_factor;
        SettingsChange::Forces
    }

    /// Replaces the weights of the given potentials; others are kept.
    pub fn update_weights(&mut self, weights: BTreeMap<PotentialKind, Weight>) -> SettingsChange {
        let mut changed = false;
        for (kind, weight) in weights {
            if self.weights.insert(kind, weight) != Some(weight) {
                changed = true;
            }
        }
        if changed {
            SettingsChange::Forces
        } else {
            SettingsChange::Unchanged
        }
    }

    pub fn update_limit_lat_for_energy(&mut self, limit: Option<f64>) -> SettingsChange {
        if self.limit_lat_for_energy == limit {
            return SettingsChange::Unchanged;
        }
        self.limit_lat_for_energy = limit;
        SettingsChange::Reporting
    }

    pub fn update_initial_projection(&mut self, projection: InitialProjection) -> SettingsChange {
        if self.initial_projection == projection {
            return SettingsChange::Unchanged;
        }
        self.initial_projection = projection;
        SettingsChange::Projection
    }

    pub fn update_stop_thresholds(
        &mut self,
        max_force_strength: f64,
        count_deficiencies: u32,
        max_steps: u64,
    ) -> SettingsChange {
        self.stop_threshold_max_force_strength = max_force_strength;
        self.stop_threshold_count_deficiencies = count_deficiencies;
        self.stop_threshold_max_steps = max_steps;
        SettingsChange::Reporting
    }

    /// Records the statistics of the grid in use.
    pub fn update_grid_stats(&mut self, stats: GridStats) {
        self.derived.grid_stats = Some(stats);
    }

    pub fn grid_stats(&self) -> Option<GridStats> {
        self.derived.grid_stats
    }

    pub fn typical_distance(&self) -> Option<f64> {
        self.derived.grid_stats.map(|s| s.typical_distance)
    }

    pub fn typical_area(&self) -> Option<f64> {
        self.derived.grid_stats.map(|s| s.typical_area)
    }

    /// Active weights in evaluation order.
    pub fn weighted_potentials(&self) -> Vec<(PotentialKind, Weight)> {
        PotentialKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let weight = *self.weights.get(&kind)?;
                weight.active.then_some((kind, weight))
            })
            .collect()
    }

    pub fn weight(&self, kind: PotentialKind) -> Option<Weight> {
        self.weights.get(&kind).copied()
    }

    /// Recomputes the weight normalisation over the inner cells of `cells`.
    ///
    /// The sum is the mean, over cells whose whole neighbourhood is active, of
    /// the summed raw weights of all potentials that take part in the
    /// normalisation. Disabled normalisation, or no inner cells, yields 1.
    pub fn update_sum_of_weights(&mut self, cells: &[Cell]) -> f64 {
        let sum = if self.normalize_weights {
            let weights: Vec<Weight> = self
                .weighted_potentials()
                .into_iter()
                .filter(|(kind, _)| kind.consider_for_sum_of_weights())
                .map(|(_, w)| w)
                .collect();
            let (total, count) = cells
                .iter()
                .filter(|c| c.self_and_all_neighbours_active)
                .fold((0.0, 0usize), |(total, count), cell| {
                    let s: f64 = weights.iter().map(|w| w.weight_for(cell.distance_to_land)).sum();
                    (total + s, count + 1)
                });
            if count == 0 || total <= 0.0 {
                1.0
            } else {
                total / count as f64
            }
        } else {
            1.0
        };
        log::debug!("sum of weights: {sum}");
        self.derived.sum_of_weights = sum;
        sum
    }

    pub fn sum_of_weights(&self) -> f64 {
        self.derived.sum_of_weights
    }

    /// Effective weight of `kind` at a cell, after normalisation.
    ///
    /// Potentials outside the normalisation keep their raw weight.
    pub fn effective_weight(&self, kind: PotentialKind, distance_to_land: Option<f64>) -> f64 {
        let Some(weight) = self.weights.get(&kind) else {
            return 0.0;
        };
        let raw = weight.weight_for(distance_to_land);
        if kind.consider_for_sum_of_weights() {
            raw / self.derived.sum_of_weights
        } else {
            raw
        }
    }
}

/// Parses a comma-separated list of potential names.
pub fn parse_potential_kinds(list: &str) -> Result<Vec<PotentialKind>, SettingsError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            PotentialKind::from_name(&name.to_ascii_uppercase())
                .ok_or_else(|| SettingsError::UnknownPotential(name.to_string()))
        })
        .collect()
}

/// Looks up an initial projection by name, ignoring case.
pub fn parse_initial_projection(name: &str) -> Result<InitialProjection, SettingsError> {
    InitialProjection::from_name(name.trim()).ok_or_else(|| SettingsError::UnknownProjection(name.to_string()))
}
