//! Per-potential weights blending a land and an ocean regime.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Weight of one potential.
///
/// Cells on land (distance to land zero) use `weight_land`. Cells far out at
/// sea use `weight_ocean` if `weight_ocean_active`, else `weight_land`. The
/// transition between the two regimes follows an ease-in-out sine curve over
/// `[distance_transition_start, distance_transition_end]` (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weight {
    pub active: bool,
    pub weight_land: f64,
    pub weight_ocean_active: bool,
    pub weight_ocean: f64,
    pub distance_transition_start: f64,
    pub distance_transition_end: f64,
}

impl Default for Weight {
    fn default() -> Self {
        Self {
            active: true,
            weight_land: 1.0,
            weight_ocean_active: false,
            weight_ocean: 1.0,
            distance_transition_start: 100_000.0,
            distance_transition_end: 800_000.0,
        }
    }
}

impl Weight {
    /// A land-only weight.
    pub fn land(active: bool, weight_land: f64) -> Self {
        Self {
            active,
            weight_land,
            ..Self::default()
        }
    }

    /// Enables the ocean regime with `weight_ocean`.
    pub fn with_ocean(mut self, weight_ocean: f64) -> Self {
        self.weight_ocean_active = true;
        self.weight_ocean = weight_ocean;
        self
    }

    /// Sets the transition band in metres.
    pub fn with_transition(mut self, start: f64, end: f64) -> Self {
        self.distance_transition_start = start;
        self.distance_transition_end = end;
        self
    }

    /// Raw weight for a cell at `distance_to_land` metres from the coast.
    ///
    /// An inactive weight contributes nothing. A missing distance counts as
    /// land.
    pub fn weight_for(&self, distance_to_land: Option<f64>) -> f64 {
        if !self.active {
            return 0.0;
        }
        if !self.weight_ocean_active {
            return self.weight_land;
        }
        let d = distance_to_land.unwrap_or(0.0);
        if d <= self.distance_transition_start {
            return self.weight_land;
        }
        if d >= self.distance_transition_end {
            return self.weight_ocean;
        }
        let span = self.distance_transition_end - self.distance_transition_start;
        let t = (d - self.distance_transition_start) / span;
        self.weight_land + (self.weight_ocean - self.weight_land) * ease_in_out_sine(t)
    }
}

/// Smooth monotone blend from 0 to 1 on `[0, 1]`.
fn ease_in_out_sine(t: f64) -> f64 {
    -((PI * t).cos() - 1.0) / 2.0
}
