//! Discrete global grid: raw sources, cells and the planar topology.
//!
//! A [`GridSource`] delivers raw hexagonal cells for a resolution. The
//! [`Topology`] builder lays them out in the `(lon, lat)` plane with copies
//! shifted by ±360° so that neighbourhoods across the antimeridian stay
//! contiguous, resolves neighbours, marks the active region and drops
//! everything the simulation will never touch.

pub mod cache;
pub mod cell;
pub mod dggrid;
pub mod icosahedral;
pub mod source;
pub mod topology;

pub use cache::TopologyCache;
pub use cell::{Cell, EnergyQuery, Pole, Sector};
pub use dggrid::DggridFiles;
pub use icosahedral::IcosahedralGrid;
pub use source::{GridSource, GridStats, RawCell, RawGrid};
pub use topology::Topology;

use thiserror::Error;

/// Errors raised while loading or building a grid.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed grid file {file}, line {line}: {message}")]
    Malformed {
        file: String,
        line: usize,
        message: String,
    },
    #[error("Cell {cell} references unknown neighbour {neighbour}")]
    UnknownNeighbour { cell: u64, neighbour: u64 },
    #[error("Cell {0} has no centre record")]
    MissingCell(u64),
    #[error("Resolution {resolution} is not supported by grid source '{source_name}'")]
    UnsupportedResolution { resolution: u32, source_name: String },
    #[error("Grid has no active cells")]
    NoActiveCells,
}
