//! The relaxation engine and its controller.
//!
//! [`GeoGrid`] owns the cells and advances them step by step. The
//! [`controller`] decides when to stop; [`snapshot`] produces the read-only
//! views handed to renderers and exporters.

pub mod calibration;
pub mod controller;
pub mod deficiency;
mod geo_grid;
pub mod snapshot;

pub use controller::{run, StepData, StopReason};
pub use deficiency::{Deficiencies, Triangle};
pub use geo_grid::{GeoGrid, GridInputs, PotentialEnergy};
pub use snapshot::{CellSnapshot, ForceVector, ForceView, ViewOptions};

use thiserror::Error;

use crate::grid::GridError;
use crate::projection::ProjectionError;
use crate::settings::SettingsError;

/// The phase of the engine an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationStage {
    /// Producing the raw grid or reading the topology cache.
    LoadingCells,
    /// Laying out cells and preparing reference data.
    BuildingCells,
    Calibrating,
    Stepping,
}

impl SimulationStage {
    /// Human-readable name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            SimulationStage::LoadingCells => "loading cells",
            SimulationStage::BuildingCells => "building cells",
            SimulationStage::Calibrating => "calibrating",
            SimulationStage::Stepping => "stepping",
        }
    }
}

impl std::fmt::Display for SimulationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What went wrong.
#[derive(Error, Debug)]
pub enum SimulationErrorKind {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("positions diverged at step {step}")]
    Diverged { step: u64 },
}

/// An engine failure, tagged with the stage it happened in.
#[derive(Error, Debug)]
#[error("failed while {stage}: {kind}")]
pub struct SimulationError {
    pub stage: SimulationStage,
    #[source]
    pub kind: SimulationErrorKind,
}

impl SimulationError {
    pub fn new(stage: SimulationStage, kind: impl Into<SimulationErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }
}

/// Attaches a stage to fallible results.
pub(crate) trait AtStage<T> {
    fn at_stage(self, stage: SimulationStage) -> Result<T, SimulationError>;
}

impl<T, E: Into<SimulationErrorKind>> AtStage<T> for Result<T, E> {
    fn at_stage(self, stage: SimulationStage) -> Result<T, SimulationError> {
        self.map_err(|e| SimulationError::new(stage, e))
    }
}
