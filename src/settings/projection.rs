//! Initial projections: where cells start before relaxation.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};

use serde::{Deserialize, Serialize};

use crate::geometry::{geo::EARTH_RADIUS, Point};

/// Mercator is cut off at this latitude (degrees).
const MERCATOR_LATITUDE_LIMIT: f64 = 85.0;

/// Distance of the scale reference corners from the map edge (degrees).
const SCALE_CORNER_EPSILON: f64 = 5.0;

/// A forward transform from `(lon, lat)` degrees to planar metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitialProjection {
    /// Plate carrée in metres along the equator.
    #[default]
    #[serde(rename = "unprojected")]
    Unprojected,
    Sinusoidal,
    Mercator,
    Mollweide,
}

impl InitialProjection {
    pub const ALL: [InitialProjection; 4] = [
        InitialProjection::Unprojected,
        InitialProjection::Sinusoidal,
        InitialProjection::Mercator,
        InitialProjection::Mollweide,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InitialProjection::Unprojected => "unprojected",
            InitialProjection::Sinusoidal => "Sinusoidal",
            InitialProjection::Mercator => "Mercator",
            InitialProjection::Mollweide => "Mollweide",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Whether the relaxation model can meaningfully start from this
    /// projection. Only closed-form projections consistent with the force
    /// model qualify; the others are neither calibrated nor meant to be
    /// optimised further.
    pub fn can_be_optimized(self) -> bool {
        matches!(self, InitialProjection::Unprojected | InitialProjection::Sinusoidal)
    }

    /// Scale applied on top of the raw transform so that the whole map spans
    /// about the same extent as the plate carrée.
    ///
    /// The scale is the mean of the horizontal and vertical ratios between the
    /// plate carrée half extents and the projected extents of the eight
    /// compass corners, each taken slightly inside the map edge.
    pub fn scale(self) -> f64 {
        if self == InitialProjection::Unprojected {
            return 1.0;
        }
        let e = SCALE_CORNER_EPSILON;
        let corners = [
            (0.0, 90.0 - e),
            (180.0 - e, 0.0),
            (0.0, -90.0 + e),
            (-180.0 + e, 0.0),
            (180.0 - e, 90.0 - e),
            (-180.0 + e, 90.0 - e),
            (180.0 - e, -90.0 + e),
            (-180.0 + e, -90.0 + e),
        ];
        let (mut max_x, mut max_y) = (0.0_f64, 0.0_f64);
        for (lon, lat) in corners {
            let p = self.raw(Point::new(lon, lat));
            max_x = max_x.max(p.x.abs());
            max_y = max_y.max(p.y.abs());
        }
        let ratio = |half_extent: f64, max: f64| {
            EARTH_RADIUS * half_extent.to_radians() / (half_extent / (half_extent - e) * max)
        };
        (ratio(180.0, max_x) + ratio(90.0, max_y)) / 2.0
    }

    /// Projects `(lon, lat)` degrees to scaled planar metres.
    ///
    /// Longitudes outside `[-180, 180]` are accepted and extend the map
    /// linearly, which keeps shifted cell copies next to the canonical map.
    pub fn project(self, p: Point) -> Point {
        self.raw(p) * self.scale()
    }

    /// Projects many points, computing the scale once.
    pub fn project_all(self, points: impl IntoIterator<Item = Point>) -> Vec<Point> {
        let scale = self.scale();
        points.into_iter().map(|p| self.raw(p) * scale).collect()
    }

    fn raw(self, p: Point) -> Point {
        let (lon, lat) = (p.x.to_radians(), p.y.to_radians());
        match self {
            InitialProjection::Unprojected => Point::new(lon, lat) * EARTH_RADIUS,
            InitialProjection::Sinusoidal => Point::new(lon * lat.cos(), lat) * EARTH_RADIUS,
            InitialProjection::Mercator => {
                let limit = MERCATOR_LATITUDE_LIMIT.to_radians();
                let lat = lat.clamp(-limit, limit);
                Point::new(lon, (FRAC_PI_4 + lat / 2.0).tan().ln()) * EARTH_RADIUS
            }
            InitialProjection::Mollweide => {
                let theta = mollweide_auxiliary_angle(lat);
                Point::new(
                    2.0 * SQRT_2 / PI * lon * theta.cos(),
                    SQRT_2 * theta.sin(),
                ) * EARTH_RADIUS
            }
        }
    }
}

impl std::fmt::Display for InitialProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Solves `2θ + sin 2θ = π sin φ` by Newton iteration, falling back to
/// bisection where the derivative vanishes near the poles.
fn mollweide_auxiliary_angle(lat: f64) -> f64 {
    if (FRAC_PI_2 - lat.abs()).abs() < 1e-12 {
        return lat;
    }
    let target = PI * lat.sin();
    let (mut lo, mut hi) = (-FRAC_PI_2, FRAC_PI_2);
    let mut theta = lat;
    for _ in 0..100 {
        let f = 2.0 * theta + (2.0 * theta).sin() - target;
        if f == 0.0 {
            break;
        }
        if f > 0.0 {
            hi = theta;
        } else {
            lo = theta;
        }
        let df = 2.0 + 2.0 * (2.0 * theta).cos();
        let mut next = theta - f / df;
        if !(next > lo && next < hi) {
            next = (lo + hi) / 2.0;
        }
        if (next - theta).abs() < 1e-15 {
            return next;
        }
        theta = next;
    }
    theta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprojected_is_plate_carree_in_metres() {
        let p = InitialProjection::Unprojected.project(Point::new(90.0, -45.0));
        assert!((p.x - EARTH_RADIUS * FRAC_PI_2).abs() < 1e-6);
        assert!((p.y + EARTH_RADIUS * FRAC_PI_4).abs() < 1e-6);
        // shifted copies extend linearly
        let shifted = InitialProjection::Unprojected.project(Point::new(450.0, -45.0));
        assert!((shifted.x - p.x - 2.0 * PI * EARTH_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn test_sinusoidal_keeps_plate_carree_extent() {
        assert!((InitialProjection::Sinusoidal.scale() - 1.0).abs() < 1e-12);
        let p = InitialProjection::Sinusoidal.project(Point::new(100.0, 60.0));
        assert!((p.x - EARTH_RADIUS * 100f64.to_radians() * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mercator_is_clamped() {
        let a = InitialProjection::Mercator.project(Point::new(0.0, 89.0));
        let b = InitialProjection::Mercator.project(Point::new(0.0, 85.0));
        assert_eq!(a, b);
        assert!(a.y.is_finite());
    }

    #[test]
    fn test_mollweide_auxiliary_angle() {
        for lat in [-80.0_f64, -30.0, 0.0, 10.0, 60.0, 89.9] {
            let phi = lat.to_radians();
            let theta = mollweide_auxiliary_angle(phi);
            let residual = 2.0 * theta + (2.0 * theta).sin() - PI * phi.sin();
            assert!(residual.abs() < 1e-10, "lat {lat}");
        }
        assert_eq!(mollweide_auxiliary_angle(FRAC_PI_2), FRAC_PI_2);
    }

    #[test]
    fn test_library_projections_are_not_optimised() {
        assert!(InitialProjection::Unprojected.can_be_optimized());
        assert!(InitialProjection::Sinusoidal.can_be_optimized());
        assert!(!InitialProjection::Mercator.can_be_optimized());
        assert!(!InitialProjection::Mollweide.can_be_optimized());
    }

    #[test]
    fn test_names_and_json() {
        for p in InitialProjection::ALL {
            assert_eq!(InitialProjection::from_name(p.name()), Some(p));
            assert_eq!(serde_json::to_value(p).unwrap(), p.name());
        }
        assert_eq!(InitialProjection::from_name("mollweide"), Some(InitialProjection::Mollweide));
    }

    #[test]
    fn test_scaled_extents_are_comparable() {
        let half_width = EARTH_RADIUS * PI;
        for p in [InitialProjection::Mercator, InitialProjection::Mollweide] {
            let east = p.project(Point::new(180.0, 0.0));
            assert!(east.x > 0.5 * half_width && east.x < 1.5 * half_width, "{p}");
        }
    }
}
