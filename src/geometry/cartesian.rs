//! Planar (Cartesian) primitives.
//!
//! The planar frame has `+x` pointing east and `+y` pointing north. Bearings
//! are measured from `+y` and increase clockwise, matching [`super::geo::bearing`],
//! and oriented areas are positive for counter-clockwise vertex order.

use super::angle::normalize_positive;
use super::Point;

/// Euclidean length of the vector `(dx, dy)`.
pub fn length(dx: f64, dy: f64) -> f64 {
    dx.hypot(dy)
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    length(b.x - a.x, b.y - a.y)
}

/// Signed area of a closed polygon (shoelace identity).
///
/// Positive for counter-clockwise vertex order. Fewer than three vertices
/// enclose no area.
pub fn oriented_polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        sum += points[i].x * (next.y - prev.y);
    }
    sum / 2.0
}

/// Signed area of the triangle `(a, b, c)`.
pub fn oriented_area(a: Point, b: Point, c: Point) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)) / 2.0
}

/// Orientation of the triangle `(a, b, c)`: `Some(true)` if counter-clockwise,
/// `Some(false)` if clockwise, `None` if degenerate.
pub fn orientation(a: Point, b: Point, c: Point) -> Option<bool> {
    let area = oriented_area(a, b, c);
    if area == 0.0 {
        None
    } else {
        Some(area > 0.0)
    }
}

/// Signed perpendicular distance from `a` to the line through `b` and `c`.
///
/// Positive if `(a, b, c)` is counter-clockwise. Zero when `b == c`.
pub fn oriented_altitude(a: Point, b: Point, c: Point) -> f64 {
    let base = distance(b, c);
    if base == 0.0 {
        return 0.0;
    }
    2.0 * oriented_area(a, b, c) / base
}

/// Compass bearing from `start` to `end` in radians, `0` = `+y`, clockwise.
pub fn bearing(start: Point, end: Point) -> f64 {
    normalize_positive((end.x - start.x).atan2(end.y - start.y))
}

/// Foot of the perpendicular from `x` onto the line through `a` and `b`.
///
/// Returns `a` if the line is degenerate.
pub fn project_to_line(x: Point, a: Point, b: Point) -> Point {
    let d = b - a;
    let len2 = d.length_squared();
    if len2 == 0.0 {
        return a;
    }
    a + d * ((x - a).dot(d) / len2)
}

/// Moves `p` (a point on the line through `a` and `b`) perpendicular to the
/// line so that it ends up at `distance` from it, on the side where
/// `(result, a, b)` is counter-clockwise.
pub fn point_with_distance_to_line(p: Point, a: Point, b: Point, distance: f64) -> Point {
    let d = b - a;
    let len = d.length();
    if len == 0.0 {
        return p;
    }
    // left normal of a -> b
    let normal = Point::new(-d.y, d.x) / len;
    p + normal * distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_distance_and_length() {
        assert_eq!(length(3.0, 4.0), 5.0);
        assert_eq!(distance(p(1.0, 1.0), p(4.0, 5.0)), 5.0);
    }

    #[test]
    fn test_oriented_area_sign_and_scale() {
        let (a, b, c) = (p(0.0, 0.0), p(2.0, 0.0), p(0.0, 1.0));
        assert_eq!(oriented_area(a, b, c), 1.0);
        assert_eq!(oriented_area(a, c, b), -1.0);
        let k = 3.5;
        assert!((oriented_area(a * k, b * k, c * k) - k * k * oriented_area(a, b, c)).abs() < 1e-12);
        assert_eq!(orientation(a, b, c), Some(true));
        assert_eq!(orientation(a, b, p(4.0, 0.0)), None);
    }

    #[test]
    fn test_polygon_area_matches_triangles() {
        let square = [p(0.0, 0.0), p(2.0, 0.0), p(2.0, 2.0), p(0.0, 2.0)];
        assert_eq!(oriented_polygon_area(&square), 4.0);
        let mut reversed = square;
        reversed.reverse();
        assert_eq!(oriented_polygon_area(&reversed), -4.0);
        assert_eq!(oriented_polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_oriented_altitude() {
        let alt = oriented_altitude(p(0.5, 2.0), p(0.0, 0.0), p(1.0, 0.0));
        assert!((alt - 2.0).abs() < 1e-12);
        let alt = oriented_altitude(p(0.5, -2.0), p(0.0, 0.0), p(1.0, 0.0));
        assert!((alt + 2.0).abs() < 1e-12);
        assert_eq!(oriented_altitude(p(0.5, 2.0), p(1.0, 1.0), p(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_bearing_is_clockwise_from_north() {
        let o = p(0.0, 0.0);
        assert!(bearing(o, p(0.0, 1.0)).abs() < 1e-12);
        assert!((bearing(o, p(1.0, 0.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((bearing(o, p(0.0, -1.0)) - PI).abs() < 1e-12);
        assert!((bearing(o, p(-1.0, 0.0)) - 3.0 * FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_point_with_distance_to_line_keeps_orientation_positive() {
        let (a, b) = (p(0.0, 0.0), p(4.0, 0.0));
        let x = p(1.0, -3.0);
        let foot = project_to_line(x, a, b);
        assert!((foot - p(1.0, 0.0)).length() < 1e-12);
        let q = point_with_distance_to_line(foot, a, b, 0.5);
        assert!((oriented_altitude(q, a, b) - 0.5).abs() < 1e-12);
    }
}
