//! Planar and geodesic geometry primitives.
//!
//! Points are plain `(x, y)` pairs. Whether they hold longitude/latitude in
//! degrees or planar coordinates in metres depends on the caller; the two are
//! never mixed within one computation.

pub mod angle;
pub mod cartesian;
pub mod geo;
pub mod landmass;

pub use glam::DVec2 as Point;
pub use landmass::{GeometryError, LandPolygon, Landmass};
