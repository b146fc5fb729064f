//! Calibration of a potential's geodesic reference scale.
//!
//! The calibration factor multiplies the reference value a potential
//! compares the planar layout against. Choosing it to minimise the initial
//! energy makes a uniformly scaled layout count as undistorted.

use crate::mechanics::Potential;

/// Search interval of the calibration factor.
pub const CALIBRATION_BOUNDS: (f64, f64) = (0.5, 1.5);

/// Absolute tolerance on the calibration factor.
pub const CALIBRATION_TOLERANCE: f64 = 1e-5;

const MAX_ITERATIONS: usize = 500;

/// Result of a scalar minimisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub evaluations: usize,
}

/// Minimises `f` over `[lo, hi]` with Brent's method (golden section search
/// accelerated by successive parabolic interpolation).
///
/// Non-finite function values are treated as `+∞`.
///
/// # Arguments
/// * `f` - Function to minimise
/// * `lo`, `hi` - Bounds of the search interval
/// * `tolerance` - Absolute tolerance on the abscissa
pub fn minimize_bounded(mut f: impl FnMut(f64) -> f64, lo: f64, hi: f64, tolerance: f64) -> Minimum {
    let golden = 0.5 * (3.0 - 5.0_f64.sqrt());
    let sqrt_eps = f64::EPSILON.sqrt();
    let mut eval = |x: f64| {
        let y = f(x);
        if y.is_finite() {
            y
        } else {
            f64::INFINITY
        }
    };

    let (mut a, mut b) = (lo.min(hi), lo.max(hi));
    let mut x = a + golden * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = eval(x);
    let (mut fw, mut fv) = (fx, fx);
    let mut evaluations = 1;
    let (mut d, mut e) = (0.0_f64, 0.0_f64);

    for _ in 0..MAX_ITERATIONS {
        let m = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + tolerance / 3.0;
        let tol2 = 2.0 * tol1;
        if (x - m).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut parabolic = false;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            let previous = e;
            e = d;
            if p.abs() < (0.5 * q * previous).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(m - x);
                }
                parabolic = true;
            }
        }
        if !parabolic {
            e = if x >= m { a - x } else { b - x };
            d = golden * e;
        }

        let u = if d.abs() >= tol1 { x + d } else { x + tol1.copysign(d) };
        let fu = eval(u);
        evaluations += 1;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            (v, fv) = (w, fw);
            (w, fw) = (x, fx);
            (x, fx) = (u, fu);
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                (v, fv) = (w, fw);
                (w, fw) = (u, fu);
            } else if fu <= fv || v == x || v == w {
                (v, fv) = (u, fu);
            }
        }
    }

    Minimum {
        x,
        value: fx,
        evaluations,
    }
}

/// Chooses the calibration factor of `potential` that minimises `energy`
/// and stores it on the potential.
///
/// `energy` is evaluated with the candidate factor already set.
pub fn calibrate(potential: &mut dyn Potential, mut energy: impl FnMut(&dyn Potential) -> f64) -> Minimum {
    let (lo, hi) = CALIBRATION_BOUNDS;
    let result = minimize_bounded(
        |k| {
            potential.set_calibration_factor(k);
            energy(&*potential)
        },
        lo,
        hi,
        CALIBRATION_TOLERANCE,
    );
    potential.set_calibration_factor(result.x);
    log::info!(
        "calibrated {}: k = {:.6}, energy = {:.6e} ({} evaluations)",
        potential.kind(),
        result.x,
        result.value,
        result.evaluations
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::mechanics::potential::tests::{context, hex_patch};
    use crate::mechanics::{create_potential, PotentialKind};

    #[test]
    fn test_minimizes_parabola() {
        let m = minimize_bounded(|x| (x - 0.83).powi(2) + 2.0, 0.5, 1.5, 1e-8);
        assert!((m.x - 0.83).abs() < 1e-6);
        assert!((m.value - 2.0).abs() < 1e-10);
        assert!(m.evaluations < 50);
    }

    #[test]
    fn test_minimum_outside_bounds_goes_to_edge() {
        let m = minimize_bounded(|x| x, 0.5, 1.5, 1e-6);
        assert!((m.x - 0.5).abs() < 1e-4);
        let m = minimize_bounded(|x| -x, 0.5, 1.5, 1e-6);
        assert!((m.x - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_non_finite_values_are_avoided() {
        let m = minimize_bounded(|x| if x > 1.2 { f64::NAN } else { (x - 1.0).abs() }, 0.5, 1.5, 1e-8);
        assert!((m.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_calibrated_distance_matches_uniform_stretch() {
        let (cells, reference, td, ta) = hex_patch(Point::splat(1.2));
        let ctx = context(&cells, &reference, td, ta);
        let mut potential = create_potential(PotentialKind::Distance, true);
        let result = calibrate(potential.as_mut(), |p| p.energy(&cells[0], &ctx));
        assert!((potential.calibration_factor() - 1.2).abs() < 1e-3);
        assert!(result.value < 1e-6 * td);
    }
}
