//! Forward projection of arbitrary `(lon, lat)` points through the relaxed
//! grid.
//!
//! A point is located in a corner triangle formed by its nearest cell and
//! two consecutive neighbours of that cell. Its spherical barycentric
//! coordinates within the reference triangle are then applied to the
//! triangle's planar positions.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ProjectionError, SpatialIndex};
use crate::geometry::{cartesian, geo, Point};
use crate::grid::{Cell, Sector};

/// Number of nearest raw cells tried before giving up.
const CANDIDATES: usize = 3;

/// The per-cell data a projection needs, detached from the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionCell {
    pub id: u64,
    /// Longitude shift of this instance, in multiples of 360°.
    pub shift: i32,
    pub is_active: bool,
    /// Reference centre `(lon, lat)`, shift included.
    pub reference: Point,
    /// Planar position (m).
    pub position: Point,
    pub neighbours: Vec<usize>,
    pub sectors: Vec<Sector>,
}

impl ProjectionCell {
    pub fn from_cell(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            shift: cell.shift,
            is_active: cell.is_active,
            reference: cell.reference,
            position: cell.position(),
            neighbours: cell.neighbours().map(<[usize]>::to_vec).unwrap_or_default(),
            sectors: cell.sectors().to_vec(),
        }
    }

    /// The two neighbours enclosing `bearing`, in counter-clockwise order.
    fn enclosing_neighbours(&self, bearing: f64) -> Option<(usize, usize)> {
        let k = self.neighbours.len();
        let sector = self.sectors.iter().find(|s| s.contains(bearing))?;
        Some((self.neighbours[sector.first], self.neighbours[(sector.first + 1) % k]))
    }
}

/// Immutable snapshot of the grid answering projection queries.
///
/// It must be rebuilt after positions change. Queries only read, so one
/// projection can serve any number of threads.
pub struct Projection {
    index: Arc<SpatialIndex>,
    cells: Vec<ProjectionCell>,
    groups: BTreeMap<u64, Vec<usize>>,
}

impl Projection {
    /// # Arguments
    /// * `index` - Nearest-cell index over raw cell ids
    /// * `cells` - Projection data, indexed by cell index
    pub fn new(index: Arc<SpatialIndex>, cells: Vec<ProjectionCell>) -> Self {
        let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (i, cell) in cells.iter().enumerate() {
            groups.entry(cell.id).or_default().push(i);
        }
        Self {
            index,
            cells,
            groups,
        }
    }

    pub fn cells(&self) -> &[ProjectionCell] {
        &self.cells
    }

    /// Projects `(lon, lat)` degrees to planar metres.
    pub fn project(&self, p: Point) -> Result<Point, ProjectionError> {
        let mut located = None;
        'candidates: for id in self.index.nearest(p, CANDIDATES) {
            for i in self.instances_by_preference(id, p) {
                let cell = &self.cells[i];
                // the query in the longitude frame of this instance
                let shifted = p + Point::new(360.0 * cell.shift as f64, 0.0);
                if cell.reference == shifted {
                    return Ok(cell.position);
                }
                if let Some((a, b)) = cell.enclosing_neighbours(geo::bearing(cell.reference, shifted)) {
                    located = Some(([i, a, b], shifted));
                    break 'candidates;
                }
            }
        }
        let (corners, q) = located.ok_or(ProjectionError::NoEnclosingTriangle { lon: p.x, lat: p.y })?;

        let reference = corners.map(|i| self.cells[i].reference);
        let weights = barycentric_spherical(reference, q);
        let total: f64 = weights.iter().sum();
        if total == 0.0 || !total.is_finite() {
            return Ok(self.cells[corners[0]].position);
        }
        Ok(corners
            .iter()
            .zip(weights)
            .fold(Point::ZERO, |acc, (&i, w)| acc + self.cells[i].position * (w / total)))
    }

    /// The kept instances of raw cell `id`: the active one first, then the
    /// others by distance to `p` in the reference plane.
    ///
    /// Only the active instance is guaranteed to have a complete
    /// neighbourhood; copies outside the active region may have lost theirs.
    fn instances_by_preference(&self, id: u64, p: Point) -> Vec<usize> {
        let mut instances = self.groups.get(&id).cloned().unwrap_or_default();
        instances.sort_by(|&a, &b| {
            let (ca, cb) = (&self.cells[a], &self.cells[b]);
            cb.is_active.cmp(&ca.is_active).then_with(|| {
                let da = cartesian::distance(ca.reference, p);
                let db = cartesian::distance(cb.reference, p);
                da.total_cmp(&db)
            })
        });
        instances
    }
}

/// Unnormalised spherical barycentric weights of `p` in `triangle`: the
/// areas of the sub-triangles opposite each corner.
fn barycentric_spherical(triangle: [Point; 3], p: Point) -> [f64; 3] {
    std::array::from_fn(|n| {
        let mut sub = triangle;
        sub[n] = p;
        geo::area_of_triangle(sub)
    })
}
