//! Discretized optimized map projections.
//!
//! A discrete global grid of hexagonal cells is laid out in the plane and
//! relaxed by a force model: potentials compare each cell's planar
//! neighbourhood against its geodesic counterpart and push cells towards a
//! layout that balances distance, area, shape and orientation distortion.
//! The relaxed grid defines a map projection for arbitrary points.

pub mod geometry;
pub mod grid;
pub mod mechanics;
pub mod projection;
pub mod settings;
pub mod simulation;
pub mod util;

pub use geometry::{Landmass, Point};
pub use grid::{GridSource, IcosahedralGrid, Topology};
pub use mechanics::{PotentialKind, Weight};
pub use projection::Projection;
pub use settings::{InitialProjection, Settings};
pub use simulation::{GeoGrid, GridInputs, SimulationError};
