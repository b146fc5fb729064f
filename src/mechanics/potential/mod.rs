//! Potentials: energy terms over a cell and its neighbours.
//!
//! Each potential turns a dimensionless deviation `r` between the planar
//! layout and the geodesic reference into an energy and a set of forces via
//! the same spring law. Forces are returned unscaled; the simulation applies
//! weights and damping.

mod area;
mod distance;
mod distance_homogeneity;
mod reference;
mod shape;
mod triangle_altitude;

pub use area::AreaPotential;
pub use distance::DistancePotential;
pub use distance_homogeneity::DistanceHomogeneityPotential;
pub use reference::{CellReference, ReferenceCache};
pub use shape::ShapePotential;
pub use triangle_altitude::TriangleAltitudePotential;

use serde::{Deserialize, Serialize};

use super::Force;
use crate::grid::Cell;

/// Exponent of the spring law. With `1` the force grows linearly with the
/// deviation and the energy quadratically.
pub const SPRING_EXPONENT: i32 = 1;

/// Identifies a potential.
///
/// The declaration order is the order in which potentials are evaluated.
/// [`PotentialKind::TriangleAltitude`] must stay last because it reads the
/// forces accumulated by all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PotentialKind {
    Area,
    Distance,
    DistanceHomogeneity,
    Shape,
    Orientation,
    TriangleAltitude,
}

impl PotentialKind {
    pub const COUNT: usize = 6;

    /// All kinds in evaluation order.
    pub const ALL: [PotentialKind; Self::COUNT] = [
        PotentialKind::Area,
        PotentialKind::Distance,
        PotentialKind::DistanceHomogeneity,
        PotentialKind::Shape,
        PotentialKind::Orientation,
        PotentialKind::TriangleAltitude,
    ];

    /// Dense index for per-kind arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name, as used in settings files.
    pub fn name(self) -> &'static str {
        match self {
            PotentialKind::Area => "AREA",
            PotentialKind::Distance => "DISTANCE",
            PotentialKind::DistanceHomogeneity => "DISTANCE_HOMOGENEITY",
            PotentialKind::Shape => "SHAPE",
            PotentialKind::Orientation => "ORIENTATION",
            PotentialKind::TriangleAltitude => "TRIANGLE_ALTITUDE",
        }
    }

    /// Whether the weight of this potential enters the normalisation sum.
    pub fn consider_for_sum_of_weights(self) -> bool {
        !matches!(self, PotentialKind::TriangleAltitude)
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for PotentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of the grid handed to potentials.
#[derive(Clone, Copy)]
pub struct PotentialContext<'a> {
    /// All cells, indexed by cell index.
    pub cells: &'a [Cell],
    /// Geodesic reference values.
    pub reference: &'a ReferenceCache,
    /// Typical distance between neighbouring cells (m).
    pub typical_distance: f64,
    /// Typical cell area (m²).
    pub typical_area: f64,
    /// Minimum triangle altitude, as a fraction of the typical distance.
    pub almost_deficiency_ratio: f64,
}

/// Calibration state shared by all potentials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Multiplier applied to the geodesic reference value.
    pub factor: f64,
    /// Whether the calibration step may optimise `factor`.
    pub possible: bool,
}

impl Calibration {
    pub fn new(possible: bool) -> Self {
        Self {
            factor: 1.0,
            possible,
        }
    }
}

/// An energy term over one cell and its neighbours.
///
/// Implementations only provide [`Potential::energy_and_forces`]; the split
/// accessors are derived from it so they always agree.
pub trait Potential: Send + Sync {
    fn kind(&self) -> PotentialKind;

    fn calibration(&self) -> &Calibration;

    fn calibration_mut(&mut self) -> &mut Calibration;

    /// Energy of `cell` and the forces reducing it.
    ///
    /// Cells without resolved neighbours yield zero energy and no forces.
    fn energy_and_forces(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> (f64, Vec<Force>);

    fn energy(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> f64 {
        self.energy_and_forces(cell, ctx).0
    }

    fn forces(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> Vec<Force> {
        self.energy_and_forces(cell, ctx).1
    }

    fn calibration_factor(&self) -> f64 {
        self.calibration().factor
    }

    fn set_calibration_factor(&mut self, factor: f64) {
        self.calibration_mut().factor = factor;
    }

    fn calibration_possible(&self) -> bool {
        self.calibration().possible
    }
}

/// Builds the potential for `kind`.
pub fn create_potential(kind: PotentialKind, calibration_possible: bool) -> Box<dyn Potential> {
    let calibration = Calibration::new(calibration_possible);
    match kind {
        PotentialKind::Area => Box::new(AreaPotential::new(calibration)),
        PotentialKind::Distance => Box::new(DistancePotential::new(calibration)),
        PotentialKind::DistanceHomogeneity => {
            Box::new(DistanceHomogeneityPotential::new(calibration))
        }
        PotentialKind::Shape => Box::new(ShapePotential::shape(calibration)),
        PotentialKind::Orientation => Box::new(ShapePotential::orientation(calibration)),
        PotentialKind::TriangleAltitude => Box::new(TriangleAltitudePotential::new(calibration)),
    }
}

/// Spring energy for deviation `r`.
pub fn spring_energy(r: f64, spring_constant: f64) -> f64 {
    let n = SPRING_EXPONENT + 1;
    spring_constant / n as f64 * r.abs().powi(n)
}

/// Spring force for deviation `r`, signed like `r`.
pub fn spring_force(r: f64, spring_constant: f64) -> f64 {
    if r == 0.0 {
        return 0.0;
    }
    spring_constant * r.abs().powi(SPRING_EXPONENT) * r.signum()
}

/// Neighbour indices of `cell` together with its reference values.
///
/// `None` for inactive cells, which carry no energy and emit no forces.
pub(crate) fn resolved<'a>(
    cell: &'a Cell,
    ctx: &PotentialContext<'a>,
) -> Option<(&'a [usize], &'a CellReference)> {
    if !cell.is_active {
        return None;
    }
    let neighbours = cell.neighbours()?;
    let reference = ctx.reference.get(cell.index)?;
    Some((neighbours, reference))
}
