//! Distance potential: keeps planar neighbour distances equal to their
//! geodesic counterparts.

use super::{resolved, spring_energy, spring_force, Calibration, Potential, PotentialContext, PotentialKind};
use crate::geometry::cartesian;
use crate::grid::Cell;
use crate::mechanics::Force;

#[derive(Debug, Clone)]
pub struct DistancePotential {
    calibration: Calibration,
}

impl DistancePotential {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }
}

impl Potential for DistancePotential {
    fn kind(&self) -> PotentialKind {
        PotentialKind::Distance
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
        let d = ctx.typical_distance;
        let k = self.calibration.factor;
        let mut energy = 0.0;
        let mut forces = Vec::with_capacity(neighbours.len());
        for (&n, &geodesic) in neighbours.iter().zip(&reference.distances) {
            let neighbour = &ctx.cells[n];
            let expected = geodesic * k;
            if expected <= 0.0 {
                continue;
            }
            let planar = cartesian::distance(cell.position(), neighbour.position());
            let r = planar / expected - 1.0;
            energy += spring_energy(r, d);
            forces.push(Force::to_cell(
                PotentialKind::Distance,
                neighbour,
                cell,
                spring_force(r, d),
            ));
        }
        (energy, forces)
    }
}
