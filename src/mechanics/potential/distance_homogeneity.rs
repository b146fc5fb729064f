//! Distance homogeneity potential: penalises anisotropic scaling, where the
//! east-west scale of a neighbourhood differs from its north-south scale.

use super::{resolved, spring_energy, spring_force, Calibration, Potential, PotentialContext, PotentialKind};
use crate::geometry::{cartesian, Point};
use crate::grid::Cell;
use crate::mechanics::Force;

/// Neighbours whose direction is almost perpendicular to an axis carry no
/// information about the scale along it.
const AXIS_ALIGNMENT_THRESHOLD: f64 = 0.1;

/// Planar distances below this fraction of the typical distance are treated
/// as collapsed.
const DISTANCE_FLOOR_RATIO: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct DistanceHomogeneityPotential {
    calibration: Calibration,
}

/// Log-space accumulator for a weighted geometric mean.
#[derive(Default)]
struct GeometricMean {
    log_sum: f64,
    weights: f64,
}

impl GeometricMean {
    fn add(&mut self, ratio: f64, weight: f64) {
        self.log_sum += weight * ratio.ln();
        self.weights += weight;
    }

    fn value(&self) -> Option<f64> {
        if self.weights <= 0.0 {
            return None;
        }
        let mean = (self.log_sum / self.weights).exp();
        if mean.is_finite() {
            Some(mean)
        } else {
            log::warn!("distance homogeneity scale overflowed; clamping");
            Some(f64::MAX.sqrt())
        }
    }
}

impl DistanceHomogeneityPotential {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// East-west and north-south scale of the neighbourhood of `cell`.
    fn scales(
        &self,
        cell: &Cell,
        neighbours: &[usize],
        geodesic_bearings: &[f64],
        geodesic_distances: &[f64],
        ctx: &PotentialContext<'_>,
    ) -> Option<(f64, f64)> {
        let floor = DISTANCE_FLOOR_RATIO * ctx.typical_distance;
        let k = self.calibration.factor;
        let centre = cell.position();
        let mut x = GeometricMean::default();
        let mut y = GeometricMean::default();
        for ((&n, &g_bearing), &g_distance) in neighbours
            .iter()
            .zip(geodesic_bearings)
            .zip(geodesic_distances)
        {
            let delta = ctx.cells[n].position() - centre;
            let planar = cartesian::length(delta.x, delta.y);
            let reference = g_distance * k;
            if planar < floor || reference < floor {
                return None;
            }
            let bearing = cartesian::bearing(centre, ctx.cells[n].position());
            let (sin, cos) = bearing.sin_cos();
            let (g_sin, g_cos) = g_bearing.sin_cos();
            let sin_weight = sin.abs().min(g_sin.abs());
            if sin_weight > AXIS_ALIGNMENT_THRESHOLD && sin.signum() == g_sin.signum() {
                x.add((planar * sin) / (reference * g_sin), sin_weight);
            }
            let cos_weight = cos.abs().min(g_cos.abs());
            if cos_weight > AXIS_ALIGNMENT_THRESHOLD && cos.signum() == g_cos.signum() {
                y.add((planar * cos) / (reference * g_cos), cos_weight);
            }
        }
        Some((x.value()?, y.value()?))
    }
}

impl Potential for DistanceHomogeneityPotential {
    fn kind(&self) -> PotentialKind {
        PotentialKind::DistanceHomogeneity
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
        if cell.is_pole() {
            return (0.0, Vec::new());
        }
        let Some((scale_x, scale_y)) = self.scales(
            cell,
            neighbours,
            &reference.bearings,
            &reference.distances,
            ctx,
        ) else {
            return (0.0, Vec::new());
        };

        let value = ((scale_x / scale_y).max(scale_y / scale_x) - 1.0).min(1.0);
        let d = ctx.typical_distance;
        let energy = spring_energy(value, d);
        let strength = spring_force(value, d);
        let scale = (scale_x * scale_y).sqrt();
        let centre = cell.position();
        let forces = neighbours
            .iter()
            .map(|&n| {
                let neighbour = &ctx.cells[n];
                let delta = neighbour.position() - centre;
                let direction = Point::new((scale - scale_x) * delta.x, (scale - scale_y) * delta.y);
                Force::by_delta(PotentialKind::DistanceHomogeneity, neighbour, direction, strength)
            })
            .collect();
        (energy, forces)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{context, hex_patch};
    use super::*;

    #[test]
    fn test_uniform_scaling_is_homogeneous() {
        let (cells, reference, td, ta) = hex_patch(Point::splat(1.7));
        let ctx = context(&cells, &reference, td, ta);
        let p = DistanceHomogeneityPotential::new(Calibration::new(false));
        assert!(p.energy(&cells[0], &ctx) < 1e-6);
    }

    #[test]
    fn test_horizontal_stretch_is_corrected() {
        let (cells, reference, td, ta) = hex_patch(Point::new(1.5, 1.0));
        let ctx = context(&cells, &reference, td, ta);
        let p = DistanceHomogeneityPotential::new(Calibration::new(false));
        let (e, forces) = p.energy_and_forces(&cells[0], &ctx);
        // value = 1.5 - 1
        assert!((e - td / 2.0 * 0.25).abs() / e < 1e-3);
        for f in forces {
            let delta = cells[f.cell].position() - cells[0].position();
            if delta.x.abs() > 1e-9 * td {
                assert!(f.delta.x * delta.x < 0.0, "x should contract");
            }
            if delta.y.abs() > 1e-9 * td {
                assert!(f.delta.y * delta.y > 0.0, "y should expand");
            }
        }
    }

    #[test]
    fn test_deviation_saturates() {
        let (cells, reference, td, ta) = hex_patch(Point::new(5.0, 1.0));
        let ctx = context(&cells, &reference, td, ta);
        let p = DistanceHomogeneityPotential::new(Calibration::new(false));
        assert!((p.energy(&cells[0], &ctx) - td / 2.0).abs() / td < 1e-9);
    }

    #[test]
    fn test_infinite_scale_is_clamped() {
        let mut mean = GeometricMean::default();
        mean.add(f64::INFINITY, 0.5);
        mean.add(2.0, 0.5);
        assert_eq!(mean.value(), Some(f64::MAX.sqrt()));
        assert_eq!(GeometricMean::default().value(), None);
    }

    #[test]
    fn test_far_flung_neighbour_keeps_energy_bounded() {
        let (mut cells, reference, td, ta) = hex_patch(Point::ONE);
        cells[2].set_position(Point::new(f64::MAX, f64::MAX));
        let ctx = context(&cells, &reference, td, ta);
        let (e, forces) = DistanceHomogeneityPotential::new(Calibration::new(false))
            .energy_and_forces(&cells[0], &ctx);
        assert!(e.is_finite());
        assert!(e <= td / 2.0 * (1.0 + 1e-9));
        assert!(forces.iter().all(|f| !f.delta.is_nan()));
    }

    #[test]
    fn test_collapsed_neighbour_disables_potential() {
        let (mut cells, reference, td, ta) = hex_patch(Point::ONE);
        let centre = cells[0].position();
        cells[3].set_position(centre);
        let ctx = context(&cells, &reference, td, ta);
        let (e, f) = DistanceHomogeneityPotential::new(Calibration::new(false))
            .energy_and_forces(&cells[0], &ctx);
        assert_eq!(e, 0.0);
        assert!(f.is_empty());
    }
}
