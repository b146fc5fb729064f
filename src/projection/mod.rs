//! Projection of arbitrary points through the relaxed grid, and export of the
//! grid as a triangulated transform.

mod query;
mod spatial_index;
pub mod tin;

pub use query::{Projection, ProjectionCell};
pub use spatial_index::SpatialIndex;

use thiserror::Error;

/// Errors raised by projection queries and exports.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("No enclosing triangle found for ({lon}, {lat})")]
    NoEnclosingTriangle { lon: f64, lat: f64 },
    #[error("Spatial index has no cells")]
    EmptyIndex,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
