//! Force-field model: forces, weights and potentials.
//!
//! A potential compares the current planar layout of a cell and its
//! neighbours against the geodesic reference and produces an energy together
//! with the forces that reduce it. Weights scale each potential per cell,
//! blending a land and an ocean regime by distance to the nearest coast.

pub mod force;
pub mod potential;
pub mod weight;

pub use force::Force;
pub use potential::{
    create_potential, Potential, PotentialContext, PotentialKind, ReferenceCache,
};
pub use weight::Weight;
