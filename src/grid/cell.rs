//! A single grid cell instance and its per-step mechanical state.

use serde::{Deserialize, Serialize};

use crate::geometry::{angle::normalize_positive, Point};
use crate::mechanics::{Force, PotentialKind};

/// Which pole a cell sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pole {
    North,
    South,
}

/// The wedge between two consecutive neighbours, as seen from the cell
/// centre. Bearings are geodesic, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    /// Position of the first neighbour in the neighbour list; the second is
    /// the next one, cyclically.
    pub first: usize,
    pub bearing_start: f64,
    pub bearing_end: f64,
}

impl Sector {
    /// Returns true if `bearing` lies in the wedge running counter-clockwise
    /// (decreasing bearing) from `bearing_start` to `bearing_end`.
    pub fn contains(&self, bearing: f64) -> bool {
        let width = normalize_positive(self.bearing_start - self.bearing_end);
        normalize_positive(self.bearing_start - bearing) <= width
    }
}

/// Selects energies to read back from a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyQuery {
    /// Sum over all potentials.
    All,
    /// A single potential.
    Of(PotentialKind),
}

/// One instance of a grid cell in the planar layout.
///
/// Every raw cell appears up to three times, shifted by −360°, 0° and +360°
/// in longitude. All instances of a raw cell share `id`; `index` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Raw cell id.
    pub id: u64,
    /// Dense instance index.
    pub index: usize,
    /// Longitude shift of this instance, in multiples of 360°.
    pub shift: i32,
    /// Reference centre `(lon, lat)` in degrees, shift included.
    pub reference: Point,
    /// Reference boundary `(lon, lat)` in degrees, shift included.
    pub polygon: Vec<Point>,
    pub is_hexagon: bool,
    pub is_active: bool,
    pub self_and_all_neighbours_active: bool,
    /// Great-circle distance to the nearest land (m), if land data was given.
    pub distance_to_land: Option<f64>,
    neighbours: Option<Vec<usize>>,
    pole: Option<Pole>,
    sectors: Vec<Sector>,
    position: Point,
    #[serde(skip)]
    pending: Vec<Force>,
    #[serde(skip)]
    pending_sum: Point,
    #[serde(skip)]
    energies: [Option<f64>; PotentialKind::COUNT],
    #[serde(skip)]
    energy_weights: [Option<f64>; PotentialKind::COUNT],
}

impl Cell {
    /// Creates an instance without neighbours at planar position zero.
    pub fn new(id: u64, index: usize, shift: i32, reference: Point, polygon: Vec<Point>) -> Self {
        let is_hexagon = polygon.len() == 6;
        Self {
            id,
            index,
            shift,
            reference,
            polygon,
            is_hexagon,
            is_active: false,
            self_and_all_neighbours_active: false,
            distance_to_land: None,
            neighbours: None,
            pole: None,
            sectors: Vec::new(),
            position: Point::ZERO,
            pending: Vec::new(),
            pending_sum: Point::ZERO,
            energies: [None; PotentialKind::COUNT],
            energy_weights: [None; PotentialKind::COUNT],
        }
    }

    /// Current planar position (m).
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Position after applying all forces accumulated so far, without
    /// committing them.
    pub fn predicted_position(&self) -> Point {
        self.position + self.pending_sum
    }

    /// Resolved neighbours in counter-clockwise order, or `None` if some
    /// neighbour could not be resolved.
    pub fn neighbours(&self) -> Option<&[usize]> {
        self.neighbours.as_deref()
    }

    pub fn set_neighbours(&mut self, neighbours: Option<Vec<usize>>) {
        self.neighbours = neighbours;
    }

    pub fn pole(&self) -> Option<Pole> {
        self.pole
    }

    pub fn is_pole(&self) -> bool {
        self.pole.is_some()
    }

    pub(crate) fn set_pole(&mut self, pole: Option<Pole>) {
        self.pole = pole;
    }

    /// Sectors between consecutive neighbours, ordered like the neighbours.
    /// Empty for pole cells and unresolved cells.
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub(crate) fn set_sectors(&mut self, sectors: Vec<Sector>) {
        self.sectors = sectors;
    }

    /// Consecutive neighbour pairs `(a, b)` such that `(self, a, b)` is a
    /// counter-clockwise triangle of the neighbourhood fan.
    ///
    /// Pole cells skip the pair that would wrap around the pole.
    pub fn neighbour_triangles(&self) -> Vec<(usize, usize)> {
        let Some(neighbours) = self.neighbours.as_deref() else {
            return Vec::new();
        };
        let k = neighbours.len();
        if k < 2 {
            return Vec::new();
        }
        let pairs = if self.is_pole() { k - 1 } else { k };
        (0..pairs)
            .map(|i| (neighbours[i], neighbours[(i + 1) % k]))
            .collect()
    }

    /// Returns true if the cell counts towards energies restricted to
    /// `|lat| <= limit`. Without a limit every cell counts.
    pub fn within_latitude_band(&self, limit: Option<f64>) -> bool {
        limit.map_or(true, |l| self.reference.y.abs() <= l)
    }

    /// Queues a force for the next position update.
    pub fn add_force(&mut self, force: Force) {
        self.pending_sum += force.delta;
        self.pending.push(force);
    }

    /// Forces queued since the last reset.
    pub fn pending_forces(&self) -> &[Force] {
        &self.pending
    }

    /// Sum of all queued displacements.
    pub fn pending_displacement(&self) -> Point {
        self.pending_sum
    }

    pub fn reset_pending_forces(&mut self) {
        self.pending.clear();
        self.pending_sum = Point::ZERO;
    }

    /// Commits all queued forces to the position and clears the queue.
    /// Returns the new position.
    pub fn apply_pending_forces(&mut self) -> Point {
        self.position += self.pending_sum;
        self.reset_pending_forces();
        self.position
    }

    pub fn set_energy(&mut self, kind: PotentialKind, energy: f64) {
        self.energies[kind.index()] = Some(energy);
    }

    pub fn set_energy_weight(&mut self, kind: PotentialKind, weight: f64) {
        self.energy_weights[kind.index()] = Some(weight);
    }

    /// Forgets all stored energies and weights.
    pub fn clear_energies(&mut self) {
        self.energies = [None; PotentialKind::COUNT];
        self.energy_weights = [None; PotentialKind::COUNT];
    }

    /// Stored energy, optionally multiplied by the stored weight.
    ///
    /// `None` if nothing matching the query has been computed.
    pub fn energy(&self, query: EnergyQuery, weighted: bool) -> Option<f64> {
        let single = |kind: PotentialKind| {
            let energy = self.energies[kind.index()]?;
            if weighted {
                Some(energy * self.energy_weights[kind.index()].unwrap_or(1.0))
            } else {
                Some(energy)
            }
        };
        match query {
            EnergyQuery::Of(kind) => single(kind),
            EnergyQuery::All => PotentialKind::ALL
                .into_iter()
                .filter_map(single)
                .fold(None, |acc, e| Some(acc.unwrap_or(0.0) + e)),
        }
    }
}
