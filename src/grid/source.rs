//! Raw discrete-global-grid data as delivered by a grid source.

use serde::{Deserialize, Serialize};

use super::GridError;
use crate::geometry::Point;

/// One raw grid record: a cell as produced by the grid generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    /// Stable id of the cell within its resolution.
    pub id: u64,
    /// Cell centre `(lon, lat)` in degrees.
    pub centre: Point,
    /// Cell boundary `(lon, lat)` in degrees, not closed.
    pub polygon: Vec<Point>,
    /// Ids of the adjacent cells, in no particular order.
    pub neighbours: Vec<u64>,
}

impl RawCell {
    /// Returns true if the cell boundary has six corners.
    pub fn is_hexagon(&self) -> bool {
        self.polygon.len() == 6
    }
}

/// Aggregate statistics of a grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    /// Number of cells.
    pub number_of_cells: usize,
    /// Typical distance between neighbouring cell centres (m).
    pub typical_distance: f64,
    /// Typical cell area (m²).
    pub typical_area: f64,
}

/// All records of a resolution plus their statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawGrid {
    pub resolution: u32,
    pub cells: Vec<RawCell>,
    pub stats: GridStats,
}

/// A producer of raw grid data, such as a discrete global grid generator.
pub trait GridSource: Send + Sync {
    /// Short name identifying the source, used to key cached topologies.
    fn name(&self) -> &str;

    /// Produces the raw grid for `resolution`.
    fn load(&self, resolution: u32) -> Result<RawGrid, GridError>;
}
