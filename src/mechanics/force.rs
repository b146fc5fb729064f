//! Directed force contributions.

use crate::geometry::{cartesian, Point};
use crate::grid::Cell;

use super::PotentialKind;

/// A displacement contribution for one cell, produced by one potential.
///
/// `delta` already carries direction and magnitude; applying the force means
/// adding `delta` to the position of `cell`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Force {
    /// The potential that produced the force.
    pub kind: PotentialKind,
    /// Index of the cell the force acts on.
    pub cell: usize,
    /// Index of the cell the force points towards, if any.
    pub towards: Option<usize>,
    /// Displacement to add to the cell position.
    pub delta: Point,
    /// Forces that bypass the global damping factor.
    pub without_damping: bool,
}

impl Force {
    /// Force on `cell` pointing towards `target`.
    pub fn to_cell(kind: PotentialKind, cell: &Cell, target: &Cell, strength: f64) -> Self {
        let mut force = Self::by_delta(kind, cell, target.position() - cell.position(), strength);
        force.towards = Some(target.index);
        force
    }

    /// Force on `cell` pointing from `from` towards `destination`.
    pub fn to_destination(
        kind: PotentialKind,
        cell: &Cell,
        from: Point,
        destination: Point,
        strength: f64,
    ) -> Self {
        Self::by_delta(kind, cell, destination - from, strength)
    }

    /// Force on `cell` along `direction`, scaled to length `strength`.
    ///
    /// A zero-length direction yields a zero force.
    pub fn by_delta(kind: PotentialKind, cell: &Cell, direction: Point, strength: f64) -> Self {
        let len = cartesian::length(direction.x, direction.y);
        let delta = if len == 0.0 || !len.is_finite() {
            Point::ZERO
        } else {
            direction * (strength / len)
        };
        Self {
            kind,
            cell: cell.index,
            towards: None,
            delta,
            without_damping: false,
        }
    }

    /// Marks the force as exempt from damping.
    pub fn without_damping(mut self) -> Self {
        self.without_damping = true;
        self
    }

    /// Returns the force with its displacement multiplied by `factor`.
    pub fn scaled(mut self, factor: f64) -> Self {
        self.delta *= factor;
        self
    }

    /// Length of the displacement.
    pub fn strength(&self) -> f64 {
        self.delta.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::cell::tests::cell_at;

    #[test]
    fn test_to_cell_has_requested_strength() {
        let a = cell_at(0, Point::new(0.0, 0.0));
        let b = cell_at(1, Point::new(3.0, 4.0));
        let f = Force::to_cell(PotentialKind::Distance, &a, &b, 2.0);
        assert!((f.strength() - 2.0).abs() < 1e-12);
        assert!((f.delta - Point::new(1.2, 1.6)).length() < 1e-12);
        assert_eq!(f.towards, Some(1));
        assert_eq!(f.cell, 0);
    }

    #[test]
    fn test_negative_strength_points_away() {
        let a = cell_at(0, Point::new(0.0, 0.0));
        let b = cell_at(1, Point::new(0.0, 2.0));
        let f = Force::to_cell(PotentialKind::Area, &a, &b, -1.0);
        assert!((f.delta - Point::new(0.0, -1.0)).length() < 1e-12);
    }

    #[test]
    fn test_zero_direction_gives_zero_force() {
        let a = cell_at(0, Point::new(1.0, 1.0));
        let b = cell_at(1, Point::new(1.0, 1.0));
        let f = Force::to_cell(PotentialKind::Distance, &a, &b, 5.0);
        assert_eq!(f.delta, Point::ZERO);
    }

    #[test]
    fn test_destination_and_damping_flag() {
        let a = cell_at(0, Point::new(0.0, 0.0));
        let f = Force::to_destination(
            PotentialKind::TriangleAltitude,
            &a,
            Point::new(1.0, 0.0),
            Point::new(1.0, 3.0),
            0.5,
        )
        .without_damping();
        assert!((f.delta - Point::new(0.0, 0.5)).length() < 1e-12);
        assert!(f.without_damping);
        assert!((f.scaled(2.0).strength() - 1.0).abs() < 1e-12);
    }
}
