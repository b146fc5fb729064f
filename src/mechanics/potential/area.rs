//! Area potential: keeps the planar area around a cell proportional to its
//! area on the sphere.

use super::{resolved, spring_energy, spring_force, Calibration, Potential, PotentialContext, PotentialKind};
use crate::geometry::cartesian;
use crate::grid::Cell;
use crate::mechanics::Force;

/// The polygon spanned by the neighbours of a hexagonal cell covers three
/// cells' worth of area; that of a pentagonal cell covers two and a half.
const HEXAGON_AREA_FACTOR: f64 = 3.0;
const PENTAGON_AREA_FACTOR: f64 = 2.5;

#[derive(Debug, Clone)]
pub struct AreaPotential {
    calibration: Calibration,
}

impl AreaPotential {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// Dimensionless area deviation of the neighbour fan around `cell`.
    ///
    /// Folded fans (non-positive planar area) report no deviation; those are
    /// left to the triangle altitude potential.
    fn deviation(&self, cell: &Cell, neighbours: &[usize], ctx: &PotentialContext<'_>) -> f64 {
        let triangles = cell.neighbour_triangles();
        if triangles.is_empty() {
            return 0.0;
        }
        let centre = cell.position();
        let planar: f64 = triangles
            .iter()
            .map(|&(a, b)| {
                cartesian::oriented_area(centre, ctx.cells[a].position(), ctx.cells[b].position())
            })
            .sum();
        if planar <= 0.0 {
            return 0.0;
        }
        let factor = if cell.is_hexagon {
            HEXAGON_AREA_FACTOR
        } else {
            PENTAGON_AREA_FACTOR
        };
        // pole fans drop the wrap-around triangle
        let coverage = triangles.len() as f64 / neighbours.len() as f64;
        let k = self.calibration.factor;
        let expected = factor * coverage * ctx.typical_area * k * k;
        planar / expected - 1.0
    }
}

impl Potential for AreaPotential {
    fn kind(&self) -> PotentialKind {
        PotentialKind::Area
    }

    fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    fn energy_and_forces(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> (f64, Vec<Force>) {
        let Some((neighbours, _)) = resolved(cell, ctx) else {
            return (0.0, Vec::new());
        };
        let r = self.deviation(cell, neighbours, ctx);
        let d = ctx.typical_distance;
        let energy = spring_energy(r, d) * neighbours.len() as f64;
        let strength = spring_force(r, d);
        let forces = neighbours
            .iter()
            .map(|&n| Force::to_cell(PotentialKind::Area, &ctx.cells[n], cell, strength))
            .collect();
        (energy, forces)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{context, hex_patch};
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_reference_patch_is_relaxed() {
        let (cells, reference, td, ta) = hex_patch(Point::ONE);
        let ctx = context(&cells, &reference, td, ta);
        let p = AreaPotential::new(Calibration::new(false));
        let (e, forces) = p.energy_and_forces(&cells[0], &ctx);
        assert!(e < 1e-6);
        assert!(forces.iter().all(|f| f.strength() < 1e-6 * td));
    }

    #[test]
    fn test_inflated_patch_pulls_neighbours_inward() {
        let (cells, reference, td, ta) = hex_patch(Point::splat(1.5));
        let ctx = context(&cells, &reference, td, ta);
        let p = AreaPotential::new(Calibration::new(false));
        let (e, forces) = p.energy_and_forces(&cells[0], &ctx);
        assert!(e > 0.0);
        assert_eq!(forces.len(), 6);
        for f in &forces {
            let to_centre = cells[0].position() - cells[f.cell].position();
            assert!(f.delta.dot(to_centre) > 0.0);
        }
    }

    #[test]
    fn test_deflated_patch_pushes_neighbours_outward() {
        let (cells, reference, td, ta) = hex_patch(Point::splat(0.5));
        let ctx = context(&cells, &reference, td, ta);
        let p = AreaPotential::new(Calibration::new(false));
        for f in p.forces(&cells[0], &ctx) {
            let to_centre = cells[0].position() - cells[f.cell].position();
            assert!(f.delta.dot(to_centre) < 0.0);
        }
    }

    #[test]
    fn test_calibration_factor_rescales_reference() {
        let (cells, reference, td, ta) = hex_patch(Point::splat(2.0));
        let ctx = context(&cells, &reference, td, ta);
        let mut p = AreaPotential::new(Calibration::new(true));
        assert!(p.energy(&cells[0], &ctx) > 0.0);
        p.set_calibration_factor(2.0);
        assert!(p.energy(&cells[0], &ctx) < 1e-6);
    }
}
