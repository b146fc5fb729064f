//! Nearest-cell lookup on the sphere.
//!
//! Cell centres are stored as unit vectors in a k-d tree. Chord length is
//! monotonic in great-circle distance, so Euclidean nearest neighbours in 3D
//! are geodesic nearest neighbours.

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use super::ProjectionError;
use crate::geometry::{geo, Point};
use crate::grid::Topology;
use crate::util::Timed;

/// Read-only index over one representative centre per raw cell id.
pub struct SpatialIndex {
    tree: ImmutableKdTree<f64, 3>,
    ids: Vec<u64>,
}

impl SpatialIndex {
    /// Indexes `(raw id, (lon, lat))` pairs.
    pub fn new(points: &[(u64, Point)]) -> Result<Self, ProjectionError> {
        if points.is_empty() {
            return Err(ProjectionError::EmptyIndex);
        }
        let _timer = Timed::debug(format!("spatial index ({} cells)", points.len()));
        let entries: Vec<[f64; 3]> = points
            .iter()
            .map(|(_, p)| geo::to_unit_vector(*p).to_array())
            .collect();
        let tree = ImmutableKdTree::new_from_slice(&entries);
        let ids = points.iter().map(|(id, _)| *id).collect();
        Ok(Self { tree, ids })
    }

    /// Indexes the representative instance of every raw cell of `topology`.
    pub fn from_topology(topology: &Topology) -> Result<Self, ProjectionError> {
        let points: Vec<(u64, Point)> = topology
            .representatives()
            .into_iter()
            .map(|i| {
                let cell = &topology.cells[i];
                (cell.id, cell.reference)
            })
            .collect();
        Self::new(&points)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Raw ids of the `k` cells nearest to `(lon, lat)`, nearest first.
    pub fn nearest(&self, p: Point, k: usize) -> Vec<u64> {
        let query = geo::to_unit_vector(p).to_array();
        self.tree
            .nearest_n::<SquaredEuclidean>(&query, k)
            .into_iter()
            .filter_map(|n| self.ids.get(n.item as usize).copied())
            .collect()
    }
}
