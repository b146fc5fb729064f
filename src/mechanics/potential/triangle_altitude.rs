//! Triangle altitude potential: a safeguard that keeps every triangle of
//! neighbouring cells from collapsing or folding over.
//!
//! Unlike the other potentials it looks at where the cells are about to move
//! (current position plus all forces accumulated so far in this pass) and
//! emits undamped corrective forces that restore a minimum altitude within the
//! same step. It carries no energy.

use super::{resolved, Calibration, Potential, PotentialContext, PotentialKind};
use crate::geometry::cartesian;
use crate::grid::Cell;
use crate::mechanics::Force;

/// Upper bound on a single correction, as a fraction of the typical distance.
const MAX_CORRECTION_RATIO: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct TriangleAltitudePotential {
    calibration: Calibration,
}

impl TriangleAltitudePotential {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }
}

impl Potential for TriangleAltitudePotential {
    fn kind(&self) -> PotentialKind {
        PotentialKind::TriangleAltitude
    }

    fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    fn energy_and_forces(&self, cell: &Cell, ctx: &PotentialContext<'_>) -> (f64, Vec<Force>) {
        if resolved(cell, ctx).is_none() {
            return (0.0, Vec::new());
        }
        let td = ctx.typical_distance;
        let min_distance = ctx.almost_deficiency_ratio * td;
        let max_correction = MAX_CORRECTION_RATIO * td;
        let k = self.calibration.factor;

        let apex = cell.predicted_position();
        let mut forces = Vec::new();
        for (a, b) in cell.neighbour_triangles() {
            let (cell_a, cell_b) = (&ctx.cells[a], &ctx.cells[b]);
            let p1 = cell_a.predicted_position();
            let p2 = cell_b.predicted_position();
            let altitude = cartesian::oriented_altitude(apex, p1, p2) * k;
            let strength = (min_distance - altitude).clamp(0.0, max_correction);
            if strength <= 0.0 {
                continue;
            }
            let foot = cartesian::project_to_line(apex, p1, p2);
            let target = cartesian::point_with_distance_to_line(foot, p1, p2, min_distance);
            let kind = PotentialKind::TriangleAltitude;
            forces.push(Force::to_destination(kind, cell, apex, target, strength).without_damping());
            let away = foot - target;
            for edge in [cell_a, cell_b] {
                forces.push(Force::by_delta(kind, edge, away, strength / 2.0).without_damping());
            }
        }
        (0.0, forces)
    }
}
