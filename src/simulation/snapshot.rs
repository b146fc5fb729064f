//! Read-only per-cell views of the simulation state for renderers.

use serde::Serialize;

use crate::geometry::Point;
use crate::grid::{Cell, EnergyQuery};
use crate::mechanics::PotentialKind;

/// Which force vectors a snapshot carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForceView {
    #[default]
    Hidden,
    /// The sum of all pending forces.
    Sum,
    /// One summed vector per potential.
    PerPotential,
}

/// Selects the optional fields of a snapshot.
///
/// Defaults to the bare minimum: position and activity only. Options are
/// immutable; every `with_*` method returns a modified copy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewOptions {
    neighbours: bool,
    forces: ForceView,
    energy: Option<EnergyQuery>,
    energy_weighted: bool,
    initial_polygon: bool,
    distance_to_land: bool,
}

impl ViewOptions {
    pub fn with_neighbours(self, neighbours: bool) -> Self {
        Self { neighbours, ..self }
    }

    pub fn with_forces(self, forces: ForceView) -> Self {
        Self { forces, ..self }
    }

    /// Includes the stored energy selected by `query`, or none.
    pub fn with_energy(self, query: Option<EnergyQuery>, weighted: bool) -> Self {
        Self {
            energy: query,
            energy_weighted: weighted,
            ..self
        }
    }

    pub fn with_initial_polygon(self, initial_polygon: bool) -> Self {
        Self {
            initial_polygon,
            ..self
        }
    }

    pub fn with_distance_to_land(self, distance_to_land: bool) -> Self {
        Self {
            distance_to_land,
            ..self
        }
    }

    pub fn neighbours(&self) -> bool {
        self.neighbours
    }

    pub fn forces(&self) -> ForceView {
        self.forces
    }

    pub fn energy(&self) -> Option<EnergyQuery> {
        self.energy
    }
}

/// A summed force vector, optionally attributed to one potential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForceVector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<PotentialKind>,
    pub vector: Point,
}

/// What a renderer sees of one cell instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    pub id: u64,
    pub index: usize,
    pub planar_position: Point,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbour_planar_positions: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forces: Option<Vec<ForceVector>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_polygon: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_land: Option<f64>,
}

impl CellSnapshot {
    pub fn new(cell: &Cell, cells: &[Cell], options: &ViewOptions) -> Self {
        let neighbour_planar_positions = options
            .neighbours
            .then(|| cell.neighbours().map(|n| n.iter().map(|&i| cells[i].position()).collect()))
            .flatten();
        let forces = match options.forces {
            ForceView::Hidden => None,
            ForceView::Sum => Some(vec![ForceVector {
                kind: None,
                vector: cell.pending_displacement(),
            }]),
            ForceView::PerPotential => Some(forces_per_potential(cell)),
        };
        Self {
            id: cell.id,
            index: cell.index,
            planar_position: cell.position(),
            is_active: cell.is_active,
            neighbour_planar_positions,
            forces,
            energy: options
                .energy
                .and_then(|query| cell.energy(query, options.energy_weighted)),
            initial_polygon: options.initial_polygon.then(|| cell.polygon.clone()),
            distance_to_land: if options.distance_to_land {
                cell.distance_to_land
            } else {
                None
            },
        }
    }
}

fn forces_per_potential(cell: &Cell) -> Vec<ForceVector> {
    let mut sums = [Point::ZERO; PotentialKind::COUNT];
    let mut seen = [false; PotentialKind::COUNT];
    for force in cell.pending_forces() {
        sums[force.kind.index()] += force.delta;
        seen[force.kind.index()] = true;
    }
    PotentialKind::ALL
        .into_iter()
        .filter(|k| seen[k.index()])
        .map(|k| ForceVector {
            kind: Some(k),
            vector: sums[k.index()],
        })
        .collect()
}
