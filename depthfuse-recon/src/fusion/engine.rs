//! Fusion engine capability trait

use crate::geometry::ReconstructionParams;
use crate::ingest::{ColorImage, DepthImage};
use depthfuse_data::SurfaceCloud;
use glam::Affine3A;
use thiserror::Error;

/// Result of aligning a frame against the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Tracking converged; the frame was integrated.
    Converged,
    /// Tracking did not converge; volume and pose are untouched.
    Diverged,
}

impl Alignment {
    pub fn converged(self) -> bool {
        matches!(self, Alignment::Converged)
    }
}

/// Misuse of a fusion engine (as opposed to a tracking failure).
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("colored fusion requires a color frame")]
    MissingColor,

    #[error("depth frame is {actual:?}, engine expects {expected:?}")]
    DepthSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// A volumetric fusion engine.
///
/// Implementations own their volume exclusively; every method is called from
/// the same thread, and `render`/`cloud` never overlap an `update`.
pub trait FusionEngine {
    /// Parameters the engine was built with.
    fn params(&self) -> &ReconstructionParams;

    /// Align `depth` against the model and integrate it on success.
    ///
    /// A diverged update leaves the volume exactly as it was.
    fn update(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
    ) -> Result<Alignment, FusionError>;

    /// Shaded view of the surface from the current pose, `None` while empty.
    fn render(&self) -> Option<ColorImage>;

    /// Surface points and normals; empty while nothing has been integrated.
    fn cloud(&self) -> SurfaceCloud;

    /// Current camera pose (camera to world).
    fn pose(&self) -> Affine3A;

    /// Empty the volume and return the pose to identity.
    fn reset(&mut self);

    /// True when nothing has been integrated since construction or reset.
    fn is_empty(&self) -> bool;
}
