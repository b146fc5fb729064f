//! Geodesic primitives on a spherical Earth.
//!
//! Inputs are `(longitude, latitude)` in degrees. Distances and areas are in
//! metres and square metres.

use glam::DVec3;
use std::f64::consts::{PI, TAU};

use super::angle::{normalize_positive, normalize_signed};
use super::Point;

/// Authalic Earth radius in metres (WGS84 authalic sphere, as used by the
/// discrete global grid statistics).
pub const EARTH_RADIUS: f64 = 6_371_007.1809;

/// Great-circle distance via the haversine formula.
pub fn distance(start: Point, end: Point) -> f64 {
    EARTH_RADIUS * central_angle(start, end)
}

/// Central angle in radians between two points (haversine).
pub fn central_angle(start: Point, end: Point) -> f64 {
    let (lon1, lat1) = (start.x.to_radians(), start.y.to_radians());
    let (lon2, lat2) = (end.x.to_radians(), end.y.to_radians());
    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing along the great circle from `start` to `end`, radians in
/// `[0, 2π)`, `0` = north, clockwise.
pub fn bearing(start: Point, end: Point) -> f64 {
    let (lon1, lat1) = (start.x.to_radians(), start.y.to_radians());
    let (lon2, lat2) = (end.x.to_radians(), end.y.to_radians());
    let y = (lon2 - lon1).sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * (lon2 - lon1).cos();
    normalize_positive(y.atan2(x))
}

/// Signed area of a spherical triangle (Girard's theorem).
///
/// The sum of the three bearing differences at the corners exceeds `π` by the
/// spherical excess for counter-clockwise triangles (as seen from outside the
/// sphere with north up). Clockwise triangles yield the negated area.
pub fn area_of_triangle(triangle: [Point; 3]) -> f64 {
    let mut sum = 0.0;
    for (i, j, k) in [(0, 1, 2), (1, 2, 0), (2, 0, 1)] {
        sum += normalize_signed(bearing(triangle[i], triangle[j]) - bearing(triangle[i], triangle[k]));
    }
    let excess = if sum >= 0.0 { sum - PI } else { sum + PI };
    excess * EARTH_RADIUS * EARTH_RADIUS
}

/// Signed area of a closed spherical polygon (generalised Girard's theorem).
///
/// Sums the signed turning angles along the boundary; by Gauss–Bonnet a
/// counter-clockwise polygon turns by `2π - A/R²`.
pub fn area_of_polygon(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut turning = 0.0;
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        let incoming = bearing(points[i], prev) + PI;
        let outgoing = bearing(points[i], next);
        // left turns count positive
        turning += normalize_signed(incoming - outgoing);
    }
    let excess = if turning >= 0.0 { TAU - turning } else { -(TAU + turning) };
    excess * EARTH_RADIUS * EARTH_RADIUS
}

/// Converts `(lon, lat)` in degrees to a unit vector.
pub fn to_unit_vector(p: Point) -> DVec3 {
    let (lon, lat) = (p.x.to_radians(), p.y.to_radians());
    DVec3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Converts a (not necessarily normalised) vector to `(lon, lat)` in degrees.
pub fn from_unit_vector(v: DVec3) -> Point {
    let v = v.normalize();
    Point::new(v.y.atan2(v.x).to_degrees(), v.z.clamp(-1.0, 1.0).asin().to_degrees())
}

/// Angle in radians between two unit vectors (numerically stable).
pub fn angle_between(a: DVec3, b: DVec3) -> f64 {
    a.cross(b).length().atan2(a.dot(b))
}

/// Angular distance in radians from `p` to the great-circle arc `a`–`b`
/// (all unit vectors).
pub fn angle_to_arc(p: DVec3, a: DVec3, b: DVec3) -> f64 {
    let normal = a.cross(b);
    let len = normal.length();
    if len < 1e-15 {
        return angle_between(p, a).min(angle_between(p, b));
    }
    let normal = normal / len;
    let along = p - normal * normal.dot(p);
    if along.length_squared() > 1e-30 {
        let c = along.normalize();
        // the foot lies on the arc iff it is between a and b
        if a.cross(c).dot(normal) >= 0.0 && c.cross(b).dot(normal) >= 0.0 {
            return normal.dot(p).abs().clamp(0.0, 1.0).asin();
        }
    }
    angle_between(p, a).min(angle_between(p, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn random_points(n: usize, seed: u64) -> Vec<Point> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| p(rng.random_range(-180.0..180.0), rng.random_range(-89.0..89.0)))
            .collect()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for a in random_points(50, 1) {
            assert_eq!(distance(a, a), 0.0);
        }
    }

    #[test]
    fn test_distance_quarter_circle() {
        let d = distance(p(0.0, 0.0), p(90.0, 0.0));
        assert!((d - EARTH_RADIUS * PI / 2.0).abs() < 1e-6);
        let d = distance(p(0.0, 0.0), p(0.0, 90.0));
        assert!((d - EARTH_RADIUS * PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_range_and_cardinal_directions() {
        let pts = random_points(40, 2);
        for a in &pts {
            for b in &pts {
                let br = bearing(*a, *b);
                assert!((0.0..TAU).contains(&br));
            }
        }
        assert!(bearing(p(0.0, 0.0), p(0.0, 10.0)).abs() < 1e-12);
        assert!((bearing(p(0.0, 0.0), p(10.0, 0.0)) - PI / 2.0).abs() < 1e-12);
        assert!((bearing(p(0.0, 0.0), p(0.0, -10.0)) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_area_octant() {
        // one eighth of the sphere, counter-clockwise seen from outside
        let a = area_of_triangle([p(0.0, 0.0), p(90.0, 0.0), p(0.0, 90.0)]);
        let expected = 4.0 * PI * EARTH_RADIUS * EARTH_RADIUS / 8.0;
        assert!((a - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_triangle_area_permutations() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let c = p(rng.random_range(-170.0..170.0), rng.random_range(-60.0..60.0));
            let t = [
                c + p(rng.random_range(-5.0..5.0), rng.random_range(-5.0..5.0)),
                c + p(rng.random_range(-5.0..5.0), rng.random_range(-5.0..5.0)),
                c + p(rng.random_range(-5.0..5.0), rng.random_range(-5.0..5.0)),
            ];
            let a = area_of_triangle(t);
            let cyclic = area_of_triangle([t[1], t[2], t[0]]);
            let swapped = area_of_triangle([t[1], t[0], t[2]]);
            let tol = 1e-6 * a.abs().max(1.0);
            assert!((a - cyclic).abs() < tol, "{} vs {}", a, cyclic);
            assert!((a + swapped).abs() < tol, "{} vs {}", a, swapped);
        }
    }

    #[test]
    fn test_polygon_area_matches_triangle() {
        let t = [p(10.0, 10.0), p(14.0, 11.0), p(11.0, 15.0)];
        let a = area_of_triangle(t);
        let b = area_of_polygon(&t);
        assert!((a - b).abs() < 1e-6 * a.abs());
        let rev = [t[2], t[1], t[0]];
        assert!((area_of_polygon(&rev) + a).abs() < 1e-6 * a.abs());
    }

    #[test]
    fn test_polygon_area_non_convex() {
        // L-shaped polygon made of three unit squares near the equator
        let l = [
            p(0.0, 0.0),
            p(2.0, 0.0),
            p(2.0, 1.0),
            p(1.0, 1.0),
            p(1.0, 2.0),
            p(0.0, 2.0),
        ];
        let square = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        let ratio = area_of_polygon(&l) / area_of_polygon(&square);
        assert!((ratio - 3.0).abs() < 0.01, "ratio {}", ratio);
    }

    #[test]
    fn test_unit_vector_roundtrip() {
        for a in random_points(20, 4) {
            let b = from_unit_vector(to_unit_vector(a));
            assert!((a - b).length() < 1e-9);
        }
    }

    #[test]
    fn test_angle_to_arc() {
        let a = to_unit_vector(p(0.0, 0.0));
        let b = to_unit_vector(p(20.0, 0.0));
        let above = to_unit_vector(p(10.0, 5.0));
        assert!((angle_to_arc(above, a, b) - 5f64.to_radians()).abs() < 1e-9);
        let beyond = to_unit_vector(p(30.0, 0.0));
        assert!((angle_to_arc(beyond, a, b) - 10f64.to_radians()).abs() < 1e-9);
    }
}
