//! Volumetric fusion
//!
//! A [`FusionController`] drives one [`FusionEngine`] (depth-only or colored)
//! through the Idle/Tracking/Failed cycle. [`Fusion`] erases which engine the
//! session picked so the loop can hold either.

mod controller;
mod engine;
mod engines;
mod integrator;
mod maps;
mod tracking;
mod volume;

pub use controller::{FusionController, FusionCounters, FusionOutcome, FusionState, ResetPolicy};
pub use engine::{Alignment, FusionEngine, FusionError};
pub use engines::{ColoredFusion, DepthFusion};
pub use maps::FrameMaps;
pub use tracking::{MIN_INLIER_RATIO, TrackingFailure, align};
pub use volume::{ModelMaps, VoxelVolume};

use crate::geometry::{CameraGeometry, GeometryError, ReconstructionParams};
use crate::ingest::{ColorImage, DepthImage};
use depthfuse_data::SurfaceCloud;
use glam::Affine3A;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Which engine, if any, a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
    #[default]
    Off,
    Depth,
    Colored,
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FusionMode::Off => "off",
            FusionMode::Depth => "depth",
            FusionMode::Colored => "colored",
        };
        f.write_str(name)
    }
}

impl FromStr for FusionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(FusionMode::Off),
            "depth" => Ok(FusionMode::Depth),
            "colored" | "color" => Ok(FusionMode::Colored),
            other => Err(format!("unknown fusion mode '{}'", other)),
        }
    }
}

/// The engine chosen for a session.
#[derive(Debug, Clone)]
pub enum Fusion {
    Depth(FusionController<DepthFusion>),
    Colored(FusionController<ColoredFusion>),
}

impl Fusion {
    /// Build the engine for `mode`, or `None` when fusion is off.
    ///
    /// Colored mode needs a valid color intrinsic in `geometry`.
    pub fn from_mode(
        mode: FusionMode,
        geometry: &CameraGeometry,
        policy: ResetPolicy,
    ) -> Result<Option<Self>, GeometryError> {
        let fusion = match mode {
            FusionMode::Off => return Ok(None),
            FusionMode::Depth => {
                let engine = DepthFusion::new(geometry.depth_params().clone());
                Fusion::Depth(FusionController::new(engine, policy))
            }
            FusionMode::Colored => {
                let engine = ColoredFusion::new(geometry.colored_params()?.clone());
                Fusion::Colored(FusionController::new(engine, policy))
            }
        };
        info!("fusion engine: {} ({:?})", mode, policy);
        Ok(Some(fusion))
    }

    pub fn mode(&self) -> FusionMode {
        match self {
            Fusion::Depth(_) => FusionMode::Depth,
            Fusion::Colored(_) => FusionMode::Colored,
        }
    }

    pub fn params(&self) -> &ReconstructionParams {
        match self {
            Fusion::Depth(c) => c.engine().params(),
            Fusion::Colored(c) => c.engine().params(),
        }
    }

    pub fn update(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
    ) -> Result<FusionOutcome, FusionError> {
        match self {
            Fusion::Depth(c) => c.update(depth, color),
            Fusion::Colored(c) => c.update(depth, color),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Fusion::Depth(c) => c.reset(),
            Fusion::Colored(c) => c.reset(),
        }
    }

    pub fn render(&self) -> Option<ColorImage> {
        match self {
            Fusion::Depth(c) => c.render(),
            Fusion::Colored(c) => c.render(),
        }
    }

    pub fn cloud(&self) -> SurfaceCloud {
        match self {
            Fusion::Depth(c) => c.cloud(),
            Fusion::Colored(c) => c.cloud(),
        }
    }

    pub fn pose(&self) -> Affine3A {
        match self {
            Fusion::Depth(c) => c.pose(),
            Fusion::Colored(c) => c.pose(),
        }
    }

    pub fn state(&self) -> FusionState {
        match self {
            Fusion::Depth(c) => c.state(),
            Fusion::Colored(c) => c.state(),
        }
    }

    pub fn counters(&self) -> FusionCounters {
        match self {
            Fusion::Depth(c) => c.counters(),
            Fusion::Colored(c) => c.counters(),
        }
    }
}
