//! Planar topology builder.
//!
//! Lays the raw grid out in the `(lon, lat)` plane. Every raw cell is
//! instantiated three times, shifted by −360°, 0° and +360°, so that a cell
//! near the antimeridian can be connected to the copy of its neighbour that
//! is actually adjacent in the plane. The canonical (active) region is
//! `[-180, 180) × [-90, 90]`; copies outside it are kept only where an active
//! cell needs them as a neighbour.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::cell::{Cell, Pole, Sector};
use super::source::{GridStats, RawGrid};
use super::GridError;
use crate::geometry::{cartesian, geo, Landmass, Point};
use crate::util::Timed;

/// Longitude shifts of the three instances of a raw cell, in multiples of 360°.
const SHIFTS: [i32; 3] = [-1, 0, 1];

/// Positions within [`SHIFTS`], the unshifted instance first.
const UNSHIFTED_FIRST: [usize; 3] = [1, 0, 2];

/// Tolerance of the active-region bounds (degrees).
const EPSILON: f64 = 1e-9;

/// A resolved neighbour further away than this (degrees of longitude) means
/// the neighbourhood wraps around and cannot be laid out.
const MAX_NEIGHBOUR_LONGITUDE_GAP: f64 = 270.0;

/// The planar layout of a grid at one resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Name of the grid source that produced the raw grid.
    pub source: String,
    pub resolution: u32,
    pub stats: GridStats,
    /// Cell instances, indexed by [`Cell::index`].
    pub cells: Vec<Cell>,
    /// Instance indices per raw id.
    groups: BTreeMap<u64, Vec<usize>>,
}

impl Topology {
    /// Builds the topology of `raw`.
    ///
    /// `landmass`, if given, is used to precompute each cell's distance to
    /// land.
    ///
    /// # Arguments
    /// * `raw` - Raw grid records and statistics
    /// * `source` - Name of the grid source, kept for cache keys
    /// * `landmass` - Optional land polygons
    pub fn build(raw: &RawGrid, source: &str, landmass: Option<&Landmass>) -> Result<Self, GridError> {
        let _timer = Timed::info(format!("build topology ({} cells)", raw.cells.len()));

        let raw_index: HashMap<u64, usize> =
            raw.cells.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let raw_neighbours = raw
            .cells
            .iter()
            .map(|c| {
                c.neighbours
                    .iter()
                    .map(|n| {
                        raw_index.get(n).copied().ok_or(GridError::UnknownNeighbour {
                            cell: c.id,
                            neighbour: *n,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut cells = instantiate(raw);
        resolve_neighbours(&mut cells, &raw_neighbours);
        mark_active(&mut cells);

        let active = cells.iter().filter(|c| c.is_active).count();
        if active == 0 {
            return Err(GridError::NoActiveCells);
        }
        let mut cells = collect_garbage(cells);
        log::info!(
            "topology: {} raw cells, {} instances kept, {} active",
            raw.cells.len(),
            cells.len(),
            active
        );

        if let Some(landmass) = landmass {
            assign_distance_to_land(&mut cells, landmass);
        }

        let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for cell in &cells {
            groups.entry(cell.id).or_default().push(cell.index);
        }
        Ok(Self {
            source: source.to_string(),
            resolution: raw.resolution,
            stats: raw.stats,
            cells,
            groups,
        })
    }

    /// Indices of all active cells.
    pub fn active_indices(&self) -> Vec<usize> {
        self.cells
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.index)
            .collect()
    }

    /// Indices of all kept instances of raw cell `id`.
    pub fn instances(&self, id: u64) -> &[usize] {
        self.groups.get(&id).map_or(&[], Vec::as_slice)
    }

    /// All instance groups, keyed by raw id.
    pub fn groups(&self) -> &BTreeMap<u64, Vec<usize>> {
        &self.groups
    }

    /// One instance per raw id: the active one if there is one, else the first
    /// kept instance.
    pub fn representative(&self, id: u64) -> Option<usize> {
        let instances = self.groups.get(&id)?;
        instances
            .iter()
            .copied()
            .find(|&i| self.cells[i].is_active)
            .or_else(|| instances.first().copied())
    }

    /// Representatives of every raw id, in id order.
    pub fn representatives(&self) -> Vec<usize> {
        self.groups
            .keys()
            .filter_map(|&id| self.representative(id))
            .collect()
    }
}

fn instantiate(raw: &RawGrid) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(raw.cells.len() * SHIFTS.len());
    for (ri, record) in raw.cells.iter().enumerate() {
        for (si, &shift) in SHIFTS.iter().enumerate() {
            let offset = Point::new(360.0 * shift as f64, 0.0);
            let polygon = record.polygon.iter().map(|p| *p + offset).collect();
            let index = ri * SHIFTS.len() + si;
            let mut cell = Cell::new(record.id, index, shift, record.centre + offset, polygon);
            cell.set_pole(pole_of(record.centre));
            cells.push(cell);
        }
    }
    cells
}

fn pole_of(centre: Point) -> Option<Pole> {
    if centre.y >= 90.0 - EPSILON {
        Some(Pole::North)
    } else if centre.y <= -90.0 + EPSILON {
        Some(Pole::South)
    } else {
        None
    }
}

/// Resolves neighbours to the nearest instances, orders them
/// counter-clockwise and derives the bearing sectors.
fn resolve_neighbours(cells: &mut [Cell], raw_neighbours: &[Vec<usize>]) {
    let view: &[Cell] = cells;
    let resolved: Vec<Option<Vec<usize>>> = view
        .par_iter()
        .map(|cell| {
            let candidates = &raw_neighbours[cell.index / SHIFTS.len()];
            let mut neighbours = Vec::with_capacity(candidates.len());
            for &rn in candidates {
                let first = rn * SHIFTS.len();
                // unshifted instance first: equidistant copies (pole fans) resolve to it
                let nearest = UNSHIFTED_FIRST
                    .iter()
                    .map(|&s| first + s)
                    .min_by(|&a, &b| {
                        let da = cartesian::distance(cell.reference, view[a].reference);
                        let db = cartesian::distance(cell.reference, view[b].reference);
                        da.total_cmp(&db)
                    })?;
                let gap = (view[nearest].reference.x - cell.reference.x).abs();
                if gap > MAX_NEIGHBOUR_LONGITUDE_GAP {
                    return None;
                }
                neighbours.push(nearest);
            }
            order_neighbours(cell, &mut neighbours, view);
            Some(neighbours)
        })
        .collect();

    for (cell, neighbours) in cells.iter_mut().zip(resolved) {
        cell.set_neighbours(neighbours);
    }
    let view: &[Cell] = cells;
    let sectors: Vec<Vec<Sector>> = view.par_iter().map(|c| sectors_of(c, view)).collect();
    for (cell, sectors) in cells.iter_mut().zip(sectors) {
        cell.set_sectors(sectors);
    }
}

/// Sorts neighbours counter-clockwise around the cell.
///
/// Regular cells use descending geodesic bearing. Bearings are undefined at a
/// pole, so a pole cell orders its fan by longitude instead, which puts the
/// gap that wraps around the pole between the last and the first neighbour.
fn order_neighbours(cell: &Cell, neighbours: &mut [usize], cells: &[Cell]) {
    let lon = |i: &usize| cells[*i].reference.x;
    match cell.pole() {
        Some(Pole::North) => neighbours.sort_by(|a, b| lon(a).total_cmp(&lon(b))),
        Some(Pole::South) => neighbours.sort_by(|a, b| lon(b).total_cmp(&lon(a))),
        None => {
            let bearing = |i: &usize| geo::bearing(cell.reference, cells[*i].reference);
            neighbours.sort_by(|a, b| bearing(b).total_cmp(&bearing(a)));
        }
    }
}

fn sectors_of(cell: &Cell, cells: &[Cell]) -> Vec<Sector> {
    let Some(neighbours) = cell.neighbours() else {
        return Vec::new();
    };
    if cell.is_pole() || neighbours.len() < 2 {
        return Vec::new();
    }
    let bearings: Vec<f64> = neighbours
        .iter()
        .map(|&n| geo::bearing(cell.reference, cells[n].reference))
        .collect();
    let k = bearings.len();
    (0..k)
        .map(|i| Sector {
            first: i,
            bearing_start: bearings[i],
            bearing_end: bearings[(i + 1) % k],
        })
        .collect()
}

/// Half-open in longitude so that exactly one instance of every raw cell
/// falls inside.
fn within_active_region(p: Point) -> bool {
    p.x >= -180.0 - EPSILON && p.x < 180.0 - EPSILON && p.y.abs() <= 90.0 + EPSILON
}

fn mark_active(cells: &mut [Cell]) {
    for cell in cells.iter_mut() {
        cell.is_active = cell.neighbours().is_some() && within_active_region(cell.reference);
    }
    let view: &[Cell] = cells;
    let inner: Vec<bool> = view
        .iter()
        .map(|c| {
            c.is_active
                && c.neighbours()
                    .is_some_and(|ns| ns.iter().all(|&n| view[n].is_active))
        })
        .collect();
    for (cell, inner) in cells.iter_mut().zip(inner) {
        cell.self_and_all_neighbours_active = inner;
    }
}

/// Drops every instance that is neither active nor a neighbour of an active
/// cell and re-indexes the rest densely.
fn collect_garbage(cells: Vec<Cell>) -> Vec<Cell> {
    let mut keep = vec![false; cells.len()];
    for cell in cells.iter().filter(|c| c.is_active) {
        keep[cell.index] = true;
        for &n in cell.neighbours().unwrap_or(&[]) {
            keep[n] = true;
        }
    }
    let mut remap = vec![None; cells.len()];
    let mut next = 0;
    for (old, kept) in keep.iter().enumerate() {
        if *kept {
            remap[old] = Some(next);
            next += 1;
        }
    }

    cells
        .into_iter()
        .filter(|c| keep[c.index])
        .map(|mut cell| {
            let neighbours = cell
                .neighbours()
                .and_then(|ns| ns.iter().map(|&n| remap[n]).collect::<Option<Vec<_>>>());
            if neighbours.is_none() {
                cell.set_sectors(Vec::new());
            }
            cell.set_neighbours(neighbours);
            cell.index = remap[cell.index].unwrap_or(cell.index);
            cell
        })
        .collect()
}

fn assign_distance_to_land(cells: &mut [Cell], landmass: &Landmass) {
    let _timer = Timed::info("distance to land");
    let mut canonical: Vec<(u64, Point)> = cells
        .iter()
        .map(|c| (c.id, c.reference - Point::new(360.0 * c.shift as f64, 0.0)))
        .collect();
    canonical.sort_by_key(|(id, _)| *id);
    canonical.dedup_by_key(|(id, _)| *id);
    let distances: HashMap<u64, f64> = canonical
        .par_iter()
        // no land at all is infinitely far, which JSON cannot carry
        .map(|&(id, p)| (id, landmass.distance_to_land(p).min(f64::MAX)))
        .collect();
    for cell in cells.iter_mut() {
        cell.distance_to_land = distances.get(&cell.id).copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LandPolygon;
    use crate::grid::source::{GridSource, RawCell};
    use crate::grid::IcosahedralGrid;

    fn build(resolution: u32) -> Topology {
        let raw = IcosahedralGrid::default().load(resolution).unwrap();
        Topology::build(&raw, "icosahedral", None).unwrap()
    }

    fn square(id: u64, centre: Point, neighbours: Vec<u64>) -> RawCell {
        let polygon = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)]
            .iter()
            .map(|&(x, y)| centre + Point::new(x, y))
            .collect();
        RawCell {
            id,
            centre,
            polygon,
            neighbours,
        }
    }

    fn raw_grid(cells: Vec<RawCell>) -> RawGrid {
        RawGrid {
            resolution: 0,
            stats: GridStats {
                number_of_cells: cells.len(),
                typical_distance: 1.0,
                typical_area: 1.0,
            },
            cells,
        }
    }

    #[test]
    fn test_every_raw_cell_has_exactly_one_active_instance() {
        let topology = build(2);
        assert_eq!(topology.groups().len(), 92);
        for (id, instances) in topology.groups() {
            let active = instances.iter().filter(|&&i| topology.cells[i].is_active).count();
            assert_eq!(active, 1, "cell {id}");
        }
        assert_eq!(topology.active_indices().len(), 92);
    }

    #[test]
    fn test_active_cells_are_fully_resolved() {
        let topology = build(2);
        let mut pentagons = 0;
        for &i in &topology.active_indices() {
            let cell = &topology.cells[i];
            let neighbours = cell.neighbours().unwrap();
            assert_eq!(neighbours.len(), if cell.is_hexagon { 6 } else { 5 });
            if !cell.is_hexagon {
                pentagons += 1;
            }
            assert!(neighbours.iter().all(|&n| n < topology.cells.len()));
        }
        assert_eq!(pentagons, 12);
    }

    #[test]
    fn test_active_neighbour_links_are_reciprocal() {
        for resolution in [2, 3] {
            let topology = build(resolution);
            for &i in &topology.active_indices() {
                for &n in topology.cells[i].neighbours().unwrap() {
                    let neighbour = &topology.cells[n];
                    if !neighbour.is_active {
                        continue;
                    }
                    assert!(
                        neighbour.neighbours().unwrap().contains(&i),
                        "resolution {resolution}: {:?} -> {:?} is one-way",
                        topology.cells[i].reference,
                        neighbour.reference
                    );
                }
            }
        }
    }

    #[test]
    fn test_pole_links_prefer_unshifted_instances() {
        let topology = build(3);
        for &i in &topology.active_indices() {
            let cell = &topology.cells[i];
            for &n in cell.neighbours().unwrap() {
                if topology.cells[n].is_pole() {
                    assert_eq!(topology.cells[n].shift, 0, "{:?}", cell.reference);
                }
            }
        }
    }

    #[test]
    fn test_indices_are_dense_after_collection() {
        let topology = build(2);
        assert!(topology.cells.len() < 3 * 92);
        for (i, cell) in topology.cells.iter().enumerate() {
            assert_eq!(cell.index, i);
        }
    }

    #[test]
    fn test_fans_are_counter_clockwise_away_from_poles() {
        let topology = build(3);
        for &i in &topology.active_indices() {
            let cell = &topology.cells[i];
            if cell.reference.y.abs() > 60.0 && !cell.is_pole() {
                continue;
            }
            for (a, b) in cell.neighbour_triangles() {
                let area = cartesian::oriented_area(
                    cell.reference,
                    topology.cells[a].reference,
                    topology.cells[b].reference,
                );
                assert!(area > 0.0, "cell {} at {:?}", cell.id, cell.reference);
            }
        }
    }

    #[test]
    fn test_pole_fans_skip_the_wrap() {
        let topology = build(2);
        let poles: Vec<&Cell> = topology
            .cells
            .iter()
            .filter(|c| c.is_active && c.is_pole())
            .collect();
        assert_eq!(poles.len(), 2);
        for pole in poles {
            assert!(pole.sectors().is_empty());
            let k = pole.neighbours().unwrap().len();
            assert_eq!(pole.neighbour_triangles().len(), k - 1);
        }
    }

    #[test]
    fn test_sectors_cover_all_bearings() {
        let topology = build(2);
        let cell = topology
            .cells
            .iter()
            .find(|c| c.is_active && !c.is_pole())
            .unwrap();
        for i in 0..72 {
            let bearing = (i as f64 * 5.0 + 0.5).to_radians();
            assert!(cell.sectors().iter().any(|s| s.contains(bearing)));
        }
        let starts: Vec<f64> = cell.sectors().iter().map(|s| s.bearing_start).collect();
        assert!(starts.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_neighbours_across_the_antimeridian() {
        let raw = raw_grid(vec![
            square(1, Point::new(179.5, 0.0), vec![2]),
            square(2, Point::new(-179.5, 0.0), vec![1]),
        ]);
        let topology = Topology::build(&raw, "test", None).unwrap();
        let active: Vec<&Cell> = topology.cells.iter().filter(|c| c.is_active).collect();
        assert_eq!(active.len(), 2);
        let east = active.iter().find(|c| c.id == 1).unwrap();
        let n = east.neighbours().unwrap()[0];
        assert_eq!(topology.cells[n].id, 2);
        assert!((topology.cells[n].reference.x - 180.5).abs() < 1e-12);
        assert!(!topology.cells[n].is_active);
    }

    #[test]
    fn test_unknown_neighbour_is_an_error() {
        let raw = raw_grid(vec![square(1, Point::ZERO, vec![7])]);
        let err = Topology::build(&raw, "test", None).unwrap_err();
        assert!(matches!(err, GridError::UnknownNeighbour { cell: 1, neighbour: 7 }));
    }

    #[test]
    fn test_no_active_cells_is_an_error() {
        let raw = raw_grid(vec![
            square(1, Point::new(0.0, 95.0), vec![2]),
            square(2, Point::new(1.0, 95.0), vec![1]),
        ]);
        let err = Topology::build(&raw, "test", None).unwrap_err();
        assert!(matches!(err, GridError::NoActiveCells));
    }

    #[test]
    fn test_distance_to_land_is_shared_by_copies() {
        let raw = IcosahedralGrid::default().load(1).unwrap();
        let land = LandPolygon::new(vec![
            Point::new(-30.0, -30.0),
            Point::new(30.0, -30.0),
            Point::new(30.0, 30.0),
            Point::new(-30.0, 30.0),
        ]);
        let landmass = Landmass::from_polygons(vec![land]).unwrap();
        let topology = Topology::build(&raw, "icosahedral", Some(&landmass)).unwrap();
        for instances in topology.groups().values() {
            let d: Vec<Option<f64>> = instances
                .iter()
                .map(|&i| topology.cells[i].distance_to_land)
                .collect();
            assert!(d.iter().all(|x| x.is_some() && *x == d[0]));
        }
        assert!(topology.cells.iter().any(|c| c.distance_to_land == Some(0.0)));
    }

    #[test]
    fn test_representatives_prefer_active_instances() {
        let topology = build(1);
        let reps = topology.representatives();
        assert_eq!(reps.len(), 32);
        assert!(reps.iter().all(|&i| topology.cells[i].is_active));
        assert_eq!(topology.representative(12345), None);
    }
}
