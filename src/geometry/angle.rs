//! Angle helpers (radians).

use std::f64::consts::{PI, TAU};

/// Reduces `angle` into `[interval_start, interval_start + 2π)`.
pub fn normalize_angle(angle: f64, interval_start: f64) -> f64 {
    let reduced = (angle - interval_start).rem_euclid(TAU) + interval_start;
    // rem_euclid may round up to exactly TAU for tiny negative inputs
    if reduced >= interval_start + TAU {
        interval_start
    } else {
        reduced
    }
}

/// Reduces `angle` into `[0, 2π)`.
pub fn normalize_positive(angle: f64) -> f64 {
    normalize_angle(angle, 0.0)
}

/// Reduces `angle` into `[-π, π)`, i.e. the smaller signed difference.
pub fn normalize_signed(angle: f64) -> f64 {
    normalize_angle(angle, -PI)
}
