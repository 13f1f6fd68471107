//! The two engine variants: depth-only and colored

use crate::fusion::engine::{Alignment, FusionEngine, FusionError};
use crate::fusion::integrator::Integrator;
use crate::geometry::ReconstructionParams;
use crate::ingest::{ColorImage, DepthImage};
use depthfuse_data::SurfaceCloud;
use glam::Affine3A;

/// Fuses depth only; any color frame passed in is ignored.
#[derive(Debug, Clone)]
pub struct DepthFusion {
    inner: Integrator,
}

impl DepthFusion {
    pub fn new(mut params: ReconstructionParams) -> Self {
        params.color_intrinsic = None;
        params.color_frame_size = None;
        Self {
            inner: Integrator::new(params),
        }
    }
}

impl FusionEngine for DepthFusion {
    fn params(&self) -> &ReconstructionParams {
        self.inner.params()
    }

    fn update(
        &mut self,
        depth: &DepthImage,
        _color: Option<&ColorImage>,
    ) -> Result<Alignment, FusionError> {
        self.inner.update(depth, None)
    }

    fn render(&self) -> Option<ColorImage> {
        self.inner.render()
    }

    fn cloud(&self) -> SurfaceCloud {
        self.inner.cloud()
    }

    fn pose(&self) -> Affine3A {
        self.inner.pose()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Fuses depth and carries per-voxel color from the color sensor.
#[derive(Debug, Clone)]
pub struct ColoredFusion {
    inner: Integrator,
}

impl ColoredFusion {
    /// `params` must carry a color intrinsic (see `ReconstructionParams::with_color`).
    pub fn new(params: ReconstructionParams) -> Self {
        Self {
            inner: Integrator::new(params),
        }
    }
}

impl FusionEngine for ColoredFusion {
    fn params(&self) -> &ReconstructionParams {
        self.inner.params()
    }

    fn update(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
    ) -> Result<Alignment, FusionError> {
        let color = color.ok_or(FusionError::MissingColor)?;
        self.inner.update(depth, Some(color))
    }

    fn render(&self) -> Option<ColorImage> {
        self.inner.render()
    }

    fn cloud(&self) -> SurfaceCloud {
        self.inner.cloud()
    }

    fn pose(&self) -> Affine3A {
        self.inner.pose()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
