//! Detection and direct correction of folded-over neighbour triangles.

use rayon::prelude::*;

use crate::geometry::cartesian;
use crate::grid::Cell;

/// A triangle of a cell's neighbourhood fan: the cell (apex) and two
/// consecutive neighbours, counter-clockwise in the reference layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub apex: usize,
    pub a: usize,
    pub b: usize,
}

/// Triangles whose planar layout is invalid or about to become invalid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deficiencies {
    /// Inverted or degenerate triangles (non-positive oriented area).
    pub hard: Vec<Triangle>,
    /// Correctly oriented triangles whose apex altitude is below the minimum.
    pub almost: Vec<Triangle>,
}

impl Deficiencies {
    pub fn count(&self) -> usize {
        self.hard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hard.is_empty() && self.almost.is_empty()
    }
}

/// Scans the neighbourhood fans of all active cells at their current
/// positions.
///
/// # Arguments
/// * `cells` - All cell instances
/// * `min_altitude` - Apex altitude below which a triangle is almost deficient
/// * `compute_almost` - Whether to collect almost deficiencies at all
pub fn find_deficiencies(cells: &[Cell], min_altitude: f64, compute_almost: bool) -> Deficiencies {
    let per_cell: Vec<(Vec<Triangle>, Vec<Triangle>)> = cells
        .par_iter()
        .filter(|c| c.is_active)
        .map(|cell| {
            let mut hard = Vec::new();
            let mut almost = Vec::new();
            let apex = cell.position();
            for (a, b) in cell.neighbour_triangles() {
                let (p1, p2) = (cells[a].position(), cells[b].position());
                let triangle = Triangle {
                    apex: cell.index,
                    a,
                    b,
                };
                if cartesian::oriented_area(apex, p1, p2) <= 0.0 {
                    hard.push(triangle);
                } else if compute_almost && cartesian::oriented_altitude(apex, p1, p2) < min_altitude {
                    almost.push(triangle);
                }
            }
            (hard, almost)
        })
        .collect();

    let mut deficiencies = Deficiencies::default();
    for (hard, almost) in per_cell {
        deficiencies.hard.extend(hard);
        deficiencies.almost.extend(almost);
    }
    if !deficiencies.hard.is_empty() {
        log::debug!(
            "{} deficiencies, {} almost deficiencies",
            deficiencies.hard.len(),
            deficiencies.almost.len()
        );
    }
    deficiencies
}

/// Moves the apex of every listed triangle to `min_altitude` from its
/// opposite edge, on the side that makes the triangle counter-clockwise.
///
/// Returns the number of moved apexes.
pub fn correct_deficiencies(cells: &mut [Cell], triangles: &[Triangle], min_altitude: f64) -> usize {
    let mut moved = 0;
    for t in triangles {
        let apex = cells[t.apex].position();
        let (p1, p2) = (cells[t.a].position(), cells[t.b].position());
        if cartesian::distance(p1, p2) == 0.0 {
            continue;
        }
        let foot = cartesian::project_to_line(apex, p1, p2);
        let target = cartesian::point_with_distance_to_line(foot, p1, p2, min_altitude);
        cells[t.apex].set_position(target);
        moved += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::grid::cell::tests::cell_at;

    /// Centre cell 0 with three neighbours; only the fan triangle (0, 1, 2)
    /// reacts to the apex positions used below.
    fn fan(apex: Point) -> Vec<Cell> {
        let mut cells = vec![
            cell_at(0, apex),
            cell_at(1, Point::new(1.0, -1.0)),
            cell_at(2, Point::new(1.0, 1.0)),
            cell_at(3, Point::new(-1.5, 0.0)),
        ];
        cells[0].is_active = true;
        cells[0].set_neighbours(Some(vec![1, 2, 3]));
        cells
    }

    #[test]
    fn test_classifies_triangles() {
        let ok = find_deficiencies(&fan(Point::new(0.0, 0.0)), 0.1, true);
        assert!(ok.is_empty());

        let thin = find_deficiencies(&fan(Point::new(0.95, 0.0)), 0.1, true);
        assert_eq!(thin.count(), 0);
        assert_eq!(thin.almost.len(), 1);
        assert!(find_deficiencies(&fan(Point::new(0.95, 0.0)), 0.1, false).almost.is_empty());

        let folded = find_deficiencies(&fan(Point::new(2.0, 0.0)), 0.1, true);
        assert_eq!(folded.hard, vec![Triangle { apex: 0, a: 1, b: 2 }]);
        assert!(folded.almost.is_empty());

        let flat = find_deficiencies(&fan(Point::new(1.0, 0.0)), 0.1, true);
        assert_eq!(flat.count(), 1);
    }

    #[test]
    fn test_inactive_cells_are_skipped() {
        let mut cells = fan(Point::new(2.0, 0.0));
        cells[0].is_active = false;
        assert!(find_deficiencies(&cells, 0.1, true).is_empty());
    }

    #[test]
    fn test_correction_restores_orientation() {
        let mut cells = fan(Point::new(2.0, 0.5));
        let found = find_deficiencies(&cells, 0.1, true);
        assert_eq!(correct_deficiencies(&mut cells, &found.hard, 0.1), 1);
        let p = cells[0].position();
        assert!((p - Point::new(0.9, 0.5)).length() < 1e-12);
        let after = find_deficiencies(&cells, 0.1, true);
        assert_eq!(after.count(), 0);
    }
}
