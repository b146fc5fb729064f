//! Shape and orientation potentials.
//!
//! Both compare the planar bearings from a cell to its neighbours against the
//! geodesic bearings. The shape potential first removes the mean rotation of
//! the neighbourhood, so it only penalises distortion of the angles between
//! neighbours. The orientation potential keeps the rotation and so penalises
//! the neighbourhood turning away from north-up.

use super::{resolved, spring_energy, spring_force, Calibration, Potential, PotentialContext, PotentialKind};
use crate::geometry::{angle::normalize_signed, cartesian, Point};
use crate::grid::Cell;
use crate::mechanics::Force;

#[derive(Debug, Clone)]
pub struct ShapePotential {
    kind: PotentialKind,
    calibration: Calibration,
}

impl ShapePotential {
    pub fn shape(calibration: Calibration) -> Self {
        Self {
            kind: PotentialKind::Shape,
            calibration,
        }
    }

    pub fn orientation(calibration: Calibration) -> Self {
        Self {
            kind: PotentialKind::Orientation,
            calibration,
        }
    }

    fn removes_rotation(&self) -> bool {
        self.kind == PotentialKind::Shape
    }
}

impl Potential for ShapePotential {
    fn kind(&self) -> PotentialKind {
        self.kind
    }

    fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    fn energy_and_forces(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> (f64, Vec<Force>) {
        let Some((neighbours, reference)) = resolved(cell, ctx) else {
            return (0.0, Vec::new());
        };
        // bearings are undefined at a pole
        if cell.is_pole() || neighbours.is_empty() {
            return (0.0, Vec::new());
        }
        let centre = cell.position();
        let planar: Vec<f64> = neighbours
            .iter()
            .map(|&n| cartesian::bearing(centre, ctx.cells[n].position()))
            .collect();
        let rotation = if self.removes_rotation() {
            planar
                .iter()
                .zip(&reference.bearings)
                .map(|(p, g)| normalize_signed(p - g))
                .sum::<f64>()
                / neighbours.len() as f64
        } else {
            0.0
        };

        let d = ctx.typical_distance;
        let mut energy = 0.0;
        let mut forces = Vec::with_capacity(neighbours.len());
        for ((&n, p), g) in neighbours.iter().zip(&planar).zip(&reference.bearings) {
            let r = normalize_signed(p - (g + rotation));
            energy += spring_energy(r, d);
            let neighbour = &ctx.cells[n];
            let radius = neighbour.position() - centre;
            // a positive deviation turned the neighbour clockwise; push it back
            let counter_clockwise = Point::new(-radius.y, radius.x);
            forces.push(Force::by_delta(
                self.kind,
                neighbour,
                counter_clockwise,
                spring_force(r, d),
            ));
        }
        (energy, forces)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{context, hex_patch};
    use super::*;
    use crate::geometry::Point;

    fn rotate_neighbours(cells: &mut [Cell], angle: f64) {
        let (s, c) = angle.sin_cos();
        for cell in cells.iter_mut().skip(1) {
            let p = cell.position();
            cell.set_position(Point::new(c * p.x - s * p.y, s * p.x + c * p.y));
        }
    }

    #[test]
    fn test_shape_ignores_uniform_rotation() {
        let (mut cells, reference, td, ta) = hex_patch(Point::ONE);
        rotate_neighbours(&mut cells, 0.3);
        let ctx = context(&cells, &reference, td, ta);
        let e = ShapePotential::shape(Calibration::new(false)).energy(&cells[0], &ctx);
        assert!(e < 1e-6);
    }

    #[test]
    fn test_orientation_resists_rotation() {
        let (mut cells, reference, td, ta) = hex_patch(Point::ONE);
        // counter-clockwise rotation lowers every compass bearing
        rotate_neighbours(&mut cells, 0.3);
        let ctx = context(&cells, &reference, td, ta);
        let p = ShapePotential::orientation(Calibration::new(false));
        let (e, forces) = p.energy_and_forces(&cells[0], &ctx);
        assert!((e - 6.0 * td / 2.0 * 0.09).abs() / e < 1e-3);
        for f in forces {
            let radius = cells[f.cell].position() - cells[0].position();
            // pushed back clockwise
            assert!(radius.perp_dot(f.delta) < 0.0);
        }
    }

    #[test]
    fn test_shape_penalises_sheared_patch() {
        let (cells, reference, td, ta) = hex_patch(Point::new(1.8, 0.6));
        let ctx = context(&cells, &reference, td, ta);
        let e = ShapePotential::shape(Calibration::new(false)).energy(&cells[0], &ctx);
        assert!(e > 1e-3 * td);
    }
}
