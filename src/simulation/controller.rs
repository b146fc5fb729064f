//! Run control: per-step diagnostics and stop thresholds.

use serde::Serialize;

use super::geo_grid::{GeoGrid, PotentialEnergy};
use super::SimulationError;
use crate::grid::EnergyQuery;
use crate::settings::Transient;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Forces became small relative to the typical distance.
    MaxForceStrength,
    /// Too many deficiencies appeared.
    CountDeficiencies,
    /// The step budget is used up.
    MaxSteps,
}

/// Diagnostics collected after each step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub step: u64,
    pub energies: Vec<PotentialEnergy>,
    /// Total weighted outer energy.
    pub energy: f64,
    pub max_force_strength: f64,
    /// `max_force_strength` relative to the typical distance and the applied
    /// force fraction; compared against the stop threshold.
    pub relative_max_force_strength: f64,
    pub deficiencies: usize,
    pub almost_deficiencies: usize,
    pub stop_reason: Option<StopReason>,
}

impl StepData {
    pub fn collect(grid: &GeoGrid) -> Self {
        let energies = grid.energy_per_potential();
        let (_, energy) = grid.energy(EnergyQuery::All, true);
        let max_force_strength = grid.max_force_strength();
        let relative_max_force_strength = relative_force_strength(grid, max_force_strength);
        let deficiencies = grid.find_deficiencies(true);
        let mut data = Self {
            step: grid.step(),
            energies,
            energy,
            max_force_strength,
            relative_max_force_strength,
            deficiencies: deficiencies.hard.len(),
            almost_deficiencies: deficiencies.almost.len(),
            stop_reason: None,
        };
        data.stop_reason = stop_threshold_reached(grid, &data);
        data
    }

    pub fn stop_threshold_reached(&self) -> bool {
        self.stop_reason.is_some()
    }
}

fn relative_force_strength(grid: &GeoGrid, max_force_strength: f64) -> f64 {
    let applied = 100.0 * (1.0 - grid.settings().damping_factor);
    max_force_strength / grid.typical_distance() / applied
}

/// Evaluates the stop thresholds against freshly collected step data.
pub fn stop_threshold_reached(grid: &GeoGrid, data: &StepData) -> Option<StopReason> {
    let settings = grid.settings();
    if data.relative_max_force_strength < settings.stop_threshold_max_force_strength {
        Some(StopReason::MaxForceStrength)
    } else if data.deficiencies as u64 >= u64::from(settings.stop_threshold_count_deficiencies) {
        Some(StopReason::CountDeficiencies)
    } else if data.step >= settings.stop_threshold_max_steps {
        Some(StopReason::MaxSteps)
    } else {
        None
    }
}

/// Steps `grid` until a stop threshold is reached.
///
/// `on_step` sees the diagnostics of the initial state and of every step.
/// The final summary is recorded with the grid's settings.
pub fn run<F>(grid: &mut GeoGrid, mut on_step: F) -> Result<StepData, SimulationError>
where
    F: FnMut(&StepData),
{
    loop {
        let data = StepData::collect(grid);
        on_step(&data);
        if let Some(reason) = data.stop_reason {
            log::info!(
                "stopped at step {} ({reason:?}): energy {:.6e}, max force {:.3}, {} deficiencies",
                data.step,
                data.energy,
                data.max_force_strength,
                data.deficiencies
            );
            grid.record_transient(Transient {
                step: data.step,
                energy: data.energy,
                stop_threshold_reached: true,
            });
            return Ok(data);
        }
        grid.perform_step()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::grid::IcosahedralGrid;
    use crate::settings::Settings;
    use crate::simulation::GridInputs;

    fn grid(settings: Settings) -> GeoGrid {
        GeoGrid::new(settings, GridInputs::new(Arc::new(IcosahedralGrid::default()))).unwrap()
    }

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.resolution = 1;
        s
    }

    #[test]
    fn test_step_budget_stops_run() {
        let mut s = settings();
        s.stop_threshold_max_force_strength = 0.0;
        s.stop_threshold_max_steps = 3;
        let mut g = grid(s);
        let mut seen = Vec::new();
        let last = run(&mut g, |d| seen.push(d.step)).unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(last.stop_reason, Some(StopReason::MaxSteps));
        assert_eq!(g.step(), 3);
        let transient = g.settings().transient.unwrap();
        assert_eq!(transient.step, 3);
        assert!(transient.stop_threshold_reached);
    }

    #[test]
    fn test_loose_force_threshold_stops_immediately() {
        let mut s = settings();
        s.stop_threshold_max_force_strength = f64::INFINITY;
        let mut g = grid(s);
        let last = run(&mut g, |_| {}).unwrap();
        assert_eq!(last.step, 0);
        assert_eq!(last.stop_reason, Some(StopReason::MaxForceStrength));
    }

    #[test]
    fn test_deficiency_threshold() {
        let mut s = settings();
        s.stop_threshold_max_force_strength = 0.0;
        s.stop_threshold_count_deficiencies = 0;
        let g = grid(s);
        let data = StepData::collect(&g);
        assert_eq!(data.stop_reason, Some(StopReason::CountDeficiencies));
    }

    #[test]
    fn test_relative_force_strength() {
        let g = grid(settings());
        let data = StepData::collect(&g);
        let expected = data.max_force_strength / g.typical_distance() / (100.0 * (1.0 - 0.99));
        assert!((data.relative_max_force_strength - expected).abs() <= 1e-12 * expected);
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("maxForceStrength").is_some());
    }
}
