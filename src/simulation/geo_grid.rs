//! The relaxation engine.
//!
//! A [`GeoGrid`] owns the cell layout and advances it in discrete steps.
//! Forces computed at the end of step `n` are applied at the start of step
//! `n + 1`, so the forces about to be applied can always be inspected.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use super::calibration;
use super::deficiency::{self, Deficiencies, Triangle};
use super::snapshot::{CellSnapshot, ViewOptions};
use super::{AtStage, SimulationError, SimulationErrorKind, SimulationStage};
use crate::geometry::{Landmass, Point};
use crate::grid::{Cell, EnergyQuery, GridSource, Topology, TopologyCache};
use crate::mechanics::{create_potential, Potential, PotentialContext, PotentialKind, ReferenceCache};
use crate::projection::{tin, Projection, ProjectionCell, ProjectionError, SpatialIndex};
use crate::settings::{Settings, SettingsChange, Transient};
use crate::util::Timed;

/// The collaborators a grid is built from.
///
/// They live as long as the composition root keeps them; the grid only
/// holds shared handles so it can rebuild itself when the resolution
/// changes.
#[derive(Clone)]
pub struct GridInputs {
    pub source: Arc<dyn GridSource>,
    pub landmass: Option<Arc<Landmass>>,
    pub cache: Option<TopologyCache>,
}

impl GridInputs {
    pub fn new(source: Arc<dyn GridSource>) -> Self {
        Self {
            source,
            landmass: None,
            cache: None,
        }
    }

    pub fn with_landmass(mut self, landmass: Arc<Landmass>) -> Self {
        self.landmass = Some(landmass);
        self
    }

    pub fn with_cache(mut self, cache: TopologyCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Energy of one potential, inner and outer, raw and weighted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialEnergy {
    pub kind: PotentialKind,
    pub inner: f64,
    pub outer: f64,
    pub inner_weighted: f64,
    pub outer_weighted: f64,
}

pub struct GeoGrid {
    settings: Settings,
    inputs: GridInputs,
    topology: Topology,
    reference: ReferenceCache,
    index: Arc<SpatialIndex>,
    /// One potential per kind, in evaluation order.
    potentials: Vec<Box<dyn Potential>>,
    step: u64,
    /// Whether the energies stored on the cells match the current positions.
    energies_fresh: bool,
    projection: Option<Arc<Projection>>,
}

impl GeoGrid {
    /// Loads the grid, places cells by the initial projection, calibrates and
    /// computes the first forces.
    pub fn new(settings: Settings, inputs: GridInputs) -> Result<Self, SimulationError> {
        Self::new_with_status(settings, inputs, |_| {})
    }

    /// Like [`GeoGrid::new`], reporting each stage as it begins.
    pub fn new_with_status<F>(
        mut settings: Settings,
        inputs: GridInputs,
        mut on_stage: F,
    ) -> Result<Self, SimulationError>
    where
        F: FnMut(SimulationStage),
    {
        let topology = load_topology(&settings, &inputs, &mut on_stage)?;
        let (reference, index) = prepare(&topology)?;
        settings.update_grid_stats(topology.stats);
        let potentials = create_potentials(&settings);

        let mut grid = Self {
            settings,
            inputs,
            topology,
            reference,
            index,
            potentials,
            step: 0,
            energies_fresh: false,
            projection: None,
        };
        grid.reset_positions();
        grid.settings.update_sum_of_weights(&grid.topology.cells);
        on_stage(SimulationStage::Calibrating);
        grid.calibrate();
        grid.compute_energies_and_forces();
        Ok(grid)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn cells(&self) -> &[Cell] {
        &self.topology.cells
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn typical_distance(&self) -> f64 {
        self.topology.stats.typical_distance
    }

    pub fn calibration_factor(&self, kind: PotentialKind) -> f64 {
        self.potentials[kind.index()].calibration_factor()
    }

    /// Advances the simulation by one step.
    ///
    /// Applies the forces of the previous pass, then computes energies and
    /// forces at the new positions.
    pub fn perform_step(&mut self) -> Result<(), SimulationError> {
        self.projection = None;
        self.step += 1;
        {
            let _timer = Timed::debug(format!("apply forces (step {})", self.step));
            self.topology.cells.par_iter_mut().for_each(|cell| {
                cell.apply_pending_forces();
            });
        }
        self.energies_fresh = false;
        self.compute_energies_and_forces();

        let max = self.max_force_strength();
        if !max.is_finite() {
            return Err(SimulationError::new(
                SimulationStage::Stepping,
                SimulationErrorKind::Diverged { step: self.step },
            ));
        }
        log::debug!("step {}: max force strength {:.3}", self.step, max);
        Ok(())
    }

    /// Recomputes energies and pending forces at the current positions
    /// without moving any cell.
    ///
    /// Potentials run one after another in evaluation order; within a
    /// potential all cells are evaluated in parallel. Each force is scaled by
    /// the weight of the cell whose potential produced it and, unless exempt,
    /// by the applied fraction `1 - damping_factor`.
    pub fn compute_energies_and_forces(&mut self) {
        let _timer = Timed::debug(format!("energies and forces (step {})", self.step));
        for cell in self.topology.cells.iter_mut() {
            cell.reset_pending_forces();
            cell.clear_energies();
        }
        let applied = 1.0 - self.settings.damping_factor;

        for (kind, _) in self.settings.weighted_potentials() {
            let results = {
                let potential = &self.potentials[kind.index()];
                let ctx = context(&self.topology, &self.reference, &self.settings);
                self.topology
                    .cells
                    .par_iter()
                    .filter(|c| c.is_active)
                    .map(|c| {
                        let (energy, forces) = potential.energy_and_forces(c, &ctx);
                        (c.index, energy, forces)
                    })
                    .collect::<Vec<_>>()
            };

            let cells = &mut self.topology.cells;
            for (i, energy, forces) in results {
                let weight = self.settings.effective_weight(kind, cells[i].distance_to_land);
                cells[i].set_energy(kind, energy);
                cells[i].set_energy_weight(kind, weight);
                for force in forces {
                    let scale = if force.without_damping {
                        weight
                    } else {
                        weight * applied
                    };
                    let target = force.cell;
                    cells[target].add_force(force.scaled(scale));
                }
            }
        }
        self.energies_fresh = true;
    }

    /// Inner and outer energy of the potentials selected by `query`.
    ///
    /// Inner energy counts cells whose whole neighbourhood is active, outer
    /// energy all active cells; both only within the latitude band.
    pub fn energy(&self, query: EnergyQuery, weighted: bool) -> (f64, f64) {
        if !self.energies_fresh {
            return self.energy_from_scratch(query, weighted);
        }
        let limit = self.settings.limit_lat_for_energy;
        self.topology
            .cells
            .par_iter()
            .filter(|c| c.is_active && c.within_latitude_band(limit))
            .map(|c| {
                let e = c.energy(query, weighted).unwrap_or(0.0);
                let inner = if c.self_and_all_neighbours_active { e } else { 0.0 };
                (inner, e)
            })
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Energies of all active potentials.
    pub fn energy_per_potential(&self) -> Vec<PotentialEnergy> {
        self.settings
            .weighted_potentials()
            .into_iter()
            .map(|(kind, _)| {
                let (inner, outer) = self.energy(EnergyQuery::Of(kind), false);
                let (inner_weighted, outer_weighted) = self.energy(EnergyQuery::Of(kind), true);
                PotentialEnergy {
                    kind,
                    inner,
                    outer,
                    inner_weighted,
                    outer_weighted,
                }
            })
            .collect()
    }

    fn energy_from_scratch(&self, query: EnergyQuery, weighted: bool) -> (f64, f64) {
        let ctx = context(&self.topology, &self.reference, &self.settings);
        let limit = self.settings.limit_lat_for_energy;
        let kinds: Vec<PotentialKind> = self
            .settings
            .weighted_potentials()
            .into_iter()
            .map(|(kind, _)| kind)
            .filter(|&kind| query == EnergyQuery::All || query == EnergyQuery::Of(kind))
            .collect();
        self.topology
            .cells
            .par_iter()
            .filter(|c| c.is_active && c.within_latitude_band(limit))
            .map(|c| {
                let e: f64 = kinds
                    .iter()
                    .map(|&kind| {
                        let e = self.potentials[kind.index()].energy(c, &ctx);
                        if weighted {
                            e * self.settings.effective_weight(kind, c.distance_to_land)
                        } else {
                            e
                        }
                    })
                    .sum();
                let inner = if c.self_and_all_neighbours_active { e } else { 0.0 };
                (inner, e)
            })
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Largest pending displacement over all active cells.
    pub fn max_force_strength(&self) -> f64 {
        self.topology
            .cells
            .par_iter()
            .filter(|c| c.is_active)
            .map(|c| c.pending_displacement().length())
            .reduce(|| 0.0, f64::max)
    }

    /// Minimum apex altitude before a triangle counts as almost deficient.
    pub fn min_altitude(&self) -> f64 {
        self.settings.almost_deficiency_ratio * self.typical_distance()
    }

    /// Finds folded-over triangles at the current positions.
    pub fn find_deficiencies(&self, compute_almost: bool) -> Deficiencies {
        deficiency::find_deficiencies(&self.topology.cells, self.min_altitude(), compute_almost)
    }

    /// Moves the apex of each given triangle back to the minimum altitude and
    /// recomputes energies and forces. Returns the number of moved cells.
    pub fn correct_deficiencies(&mut self, triangles: &[Triangle]) -> usize {
        let min_altitude = self.min_altitude();
        let moved = deficiency::correct_deficiencies(&mut self.topology.cells, triangles, min_altitude);
        if moved > 0 {
            log::info!("corrected {moved} deficiencies");
            self.projection = None;
            self.compute_energies_and_forces();
        }
        moved
    }

    /// The projection of the current layout, built on first use after each
    /// position change.
    pub fn projection(&mut self) -> Arc<Projection> {
        if let Some(projection) = &self.projection {
            return projection.clone();
        }
        let _timer = Timed::debug("build projection");
        let projection = Arc::new(Projection::new(self.index.clone(), self.serialized_data_for_projection()));
        self.projection = Some(projection.clone());
        projection
    }

    /// Projects `(lon, lat)` degrees through the current layout.
    pub fn project(&mut self, p: Point) -> Result<Point, ProjectionError> {
        self.projection().project(p)
    }

    /// Per-cell renderer data.
    pub fn serialized_data(&self, options: &ViewOptions) -> Vec<CellSnapshot> {
        let cells = &self.topology.cells;
        cells
            .par_iter()
            .map(|c| CellSnapshot::new(c, cells, options))
            .collect()
    }

    /// Per-cell data needed by projection queries.
    pub fn serialized_data_for_projection(&self) -> Vec<ProjectionCell> {
        self.topology
            .cells
            .par_iter()
            .map(ProjectionCell::from_cell)
            .collect()
    }

    /// The current layout as a triangulation file.
    pub fn tin(&self) -> serde_json::Value {
        tin::compute_tin(&self.topology.cells, &self.settings)
    }

    /// Stores the summary of the last run with the settings.
    pub fn record_transient(&mut self, transient: Transient) {
        self.settings.transient = Some(transient);
    }

    /// Applies a settings update and brings all derived state up to date.
    ///
    /// ```ignore
    /// grid.update_settings(|s| s.update_damping_factor(0.95))?;
    /// ```
    pub fn update_settings<F>(&mut self, update: F) -> Result<SettingsChange, SimulationError>
    where
        F: FnOnce(&mut Settings) -> SettingsChange,
    {
        let change = update(&mut self.settings);
        match change {
            SettingsChange::Unchanged | SettingsChange::Reporting => {}
            SettingsChange::Forces => {
                self.settings.update_sum_of_weights(&self.topology.cells);
                self.compute_energies_and_forces();
            }
            SettingsChange::Projection => self.reload_positions(),
            SettingsChange::Grid => self.reload_grid()?,
        }
        Ok(change)
    }

    fn reload_grid(&mut self) -> Result<(), SimulationError> {
        let topology = load_topology(&self.settings, &self.inputs, &mut |_: SimulationStage| {})?;
        let (reference, index) = prepare(&topology)?;
        self.settings.update_grid_stats(topology.stats);
        self.topology = topology;
        self.reference = reference;
        self.index = index;
        self.reload_positions();
        Ok(())
    }

    fn reload_positions(&mut self) {
        self.potentials = create_potentials(&self.settings);
        self.reset_positions();
        self.settings.update_sum_of_weights(&self.topology.cells);
        self.calibrate();
        self.compute_energies_and_forces();
    }

    /// Places every cell by the initial projection and starts over at step 0.
    fn reset_positions(&mut self) {
        let projection = self.settings.initial_projection;
        let positions = projection.project_all(self.topology.cells.iter().map(|c| c.reference));
        for (cell, p) in self.topology.cells.iter_mut().zip(positions) {
            cell.set_position(p);
            cell.reset_pending_forces();
            cell.clear_energies();
        }
        self.step = 0;
        self.energies_fresh = false;
        self.projection = None;
    }

    /// Calibrates every potential that allows it, each in isolation against
    /// its own unweighted outer energy.
    fn calibrate(&mut self) {
        let projection = self.settings.initial_projection;
        if !projection.can_be_optimized() {
            log::info!("initial projection {projection} cannot be optimized; skipping calibration");
            return;
        }
        let _timer = Timed::info("calibrate");
        let ctx = context(&self.topology, &self.reference, &self.settings);
        let limit = self.settings.limit_lat_for_energy;
        let cells = &self.topology.cells;
        for potential in self.potentials.iter_mut() {
            if !potential.calibration_possible() {
                continue;
            }
            calibration::calibrate(potential.as_mut(), |p| {
                cells
                    .par_iter()
                    .filter(|c| c.is_active && c.within_latitude_band(limit))
                    .map(|c| p.energy(c, &ctx))
                    .sum()
            });
        }
        self.energies_fresh = false;
    }
}

fn context<'a>(topology: &'a Topology, reference: &'a ReferenceCache, settings: &Settings) -> PotentialContext<'a> {
    PotentialContext {
        cells: &topology.cells,
        reference,
        typical_distance: topology.stats.typical_distance,
        typical_area: topology.stats.typical_area,
        almost_deficiency_ratio: settings.almost_deficiency_ratio,
    }
}

fn create_potentials(settings: &Settings) -> Vec<Box<dyn Potential>> {
    PotentialKind::ALL
        .into_iter()
        .map(|kind| create_potential(kind, settings.calibrated_potentials.contains(&kind)))
        .collect()
}

/// Reads the topology from the cache, or builds and caches it.
fn load_topology(
    settings: &Settings,
    inputs: &GridInputs,
    on_stage: &mut dyn FnMut(SimulationStage),
) -> Result<Topology, SimulationError> {
    on_stage(SimulationStage::LoadingCells);
    let source = inputs.source.name();
    let resolution = settings.resolution;
    let with_landmass = inputs.landmass.is_some();
    if let Some(topology) = inputs
        .cache
        .as_ref()
        .and_then(|cache| cache.load(source, resolution, with_landmass))
    {
        return Ok(topology);
    }

    log::info!("loading cells: {source} grid at resolution {resolution}");
    let raw = inputs.source.load(resolution).at_stage(SimulationStage::LoadingCells)?;
    on_stage(SimulationStage::BuildingCells);
    log::info!("building cells");
    let topology =
        Topology::build(&raw, source, inputs.landmass.as_deref()).at_stage(SimulationStage::BuildingCells)?;
    if let Some(cache) = &inputs.cache {
        if let Err(e) = cache.store(&topology, with_landmass) {
            log::warn!("could not cache topology: {e}");
        }
    }
    Ok(topology)
}

fn prepare(topology: &Topology) -> Result<(ReferenceCache, Arc<SpatialIndex>), SimulationError> {
    let reference = ReferenceCache::build(&topology.cells);
    let index = SpatialIndex::from_topology(topology).at_stage(SimulationStage::BuildingCells)?;
    Ok((reference, Arc::new(index)))
}
