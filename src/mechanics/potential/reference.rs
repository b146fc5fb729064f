//! Geodesic reference values of each cell towards its neighbours.

use rayon::prelude::*;

use crate::geometry::geo;
use crate::grid::Cell;

/// Bearings (rad) and distances (m) from a cell to each of its neighbours,
/// in neighbour order.
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    pub bearings: Vec<f64>,
    pub distances: Vec<f64>,
}

/// Reference values for every cell with resolved neighbours.
///
/// These depend only on the grid topology, so they are computed once per grid
/// and shared by all potentials for the lifetime of that grid.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    entries: Vec<Option<CellReference>>,
}

impl ReferenceCache {
    pub fn build(cells: &[Cell]) -> Self {
        let entries = cells
            .par_iter()
            .map(|cell| {
                let neighbours = cell.neighbours()?;
                let (bearings, distances) = neighbours
                    .iter()
                    .map(|&n| {
                        let target = cells[n].reference;
                        (
                            geo::bearing(cell.reference, target),
                            geo::distance(cell.reference, target),
                        )
                    })
                    .unzip();
                Some(CellReference {
                    bearings,
                    distances,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, index: usize) -> Option<&CellReference> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
