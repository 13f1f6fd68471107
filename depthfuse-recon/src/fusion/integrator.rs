//! Shared update/render machinery behind both fusion engines

use crate::fusion::engine::{Alignment, FusionError};
use crate::fusion::maps::FrameMaps;
use crate::fusion::tracking::align;
use crate::fusion::volume::VoxelVolume;
use crate::geometry::ReconstructionParams;
use crate::ingest::{ColorImage, DepthImage};
use depthfuse_data::SurfaceCloud;
use glam::{Affine3A, Vec3};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub(crate) struct Integrator {
    params: ReconstructionParams,
    volume: VoxelVolume,
    pose: Affine3A,
    /// Pose of the last integrated frame.
    integrated_pose: Option<Affine3A>,
    frames: u64,
}

impl Integrator {
    pub fn new(params: ReconstructionParams) -> Self {
        let volume = VoxelVolume::new(&params);
        Self {
            params,
            volume,
            pose: Affine3A::IDENTITY,
            integrated_pose: None,
            frames: 0,
        }
    }

    pub fn params(&self) -> &ReconstructionParams {
        &self.params
    }

    pub fn pose(&self) -> Affine3A {
        self.pose
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    pub fn reset(&mut self) {
        self.volume.clear();
        self.pose = Affine3A::IDENTITY;
        self.integrated_pose = None;
        self.frames = 0;
    }

    /// Colors are sampled only when `color` is given and the params carry a
    /// color intrinsic.
    pub fn update(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
    ) -> Result<Alignment, FusionError> {
        if depth.dimensions() != self.params.frame_size {
            return Err(FusionError::DepthSize {
                expected: self.params.frame_size,
                actual: depth.dimensions(),
            });
        }

        let frame = FrameMaps::from_depth(depth, &self.params);
        let colors = color
            .map(|c| sample_colors(&frame, c, &self.params))
            .unwrap_or_default();
        if self.volume.is_empty() {
            if frame.valid_count() == 0 {
                debug!("first frame has no valid depth");
                return Ok(Alignment::Diverged);
            }
            self.integrate(&frame, &colors);
            if self.volume.is_empty() {
                debug!("first frame lies entirely outside the volume");
                self.reset();
                return Ok(Alignment::Diverged);
            }
            return Ok(Alignment::Converged);
        }

        let (width, height) = self.params.frame_size;
        let model = self
            .volume
            .predict(&self.pose, &self.params.intrinsic, width, height);
        match align(&frame, &model, self.pose, &self.params) {
            Ok(pose) => {
                self.pose = pose;
                let moved = self
                    .integrated_pose
                    .map(|last| camera_movement(&last, &pose))
                    .unwrap_or(f32::INFINITY);
                if moved >= self.params.min_camera_movement {
                    self.integrate(&frame, &colors);
                } else {
                    trace!("camera moved {:.4} m, skipping integration", moved);
                }
                Ok(Alignment::Converged)
            }
            Err(failure) => {
                debug!("tracking failed: {}", failure);
                Ok(Alignment::Diverged)
            }
        }
    }

    fn integrate(&mut self, frame: &FrameMaps, colors: &[Vec3]) {
        self.volume.integrate(frame, &self.pose, colors);
        self.integrated_pose = Some(self.pose);
        self.frames += 1;
        trace!(
            "integrated frame {} ({} voxels)",
            self.frames,
            self.volume.voxel_count()
        );
    }

    pub fn render(&self) -> Option<ColorImage> {
        if self.volume.is_empty() {
            return None;
        }
        let (width, height) = self.params.frame_size;
        let maps = self
            .volume
            .predict(&self.pose, &self.params.intrinsic, width, height);
        Some(VoxelVolume::shade(
            &maps,
            self.params.light_pose,
            self.params.is_colored(),
        ))
    }

    pub fn cloud(&self) -> SurfaceCloud {
        self.volume.cloud()
    }
}

/// Average of translation distance and rotation angle between two poses.
fn camera_movement(a: &Affine3A, b: &Affine3A) -> f32 {
    let delta = a.inverse() * *b;
    let translation = delta.translation.length();
    let (_, rotation, _) = delta.to_scale_rotation_translation();
    let angle = rotation.to_axis_angle().1.abs();
    (translation + angle) / 2.0
}

/// Sample a color frame at each depth pixel's projection into the color camera.
///
/// Returns linear RGB in `[0, 1]`; pixels without depth or outside the color
/// frame are black.
fn sample_colors(
    depth_frame: &FrameMaps,
    color: &ColorImage,
    params: &ReconstructionParams,
) -> Vec<Vec3> {
    let Some(color_intrinsic) = params.color_intrinsic else {
        return Vec::new();
    };
    let (cw, ch) = color.dimensions();
    depth_frame
        .points
        .iter()
        .map(|p| {
            let Some(p) = p else { return Vec3::ZERO };
            let Some(px) = color_intrinsic.project(*p) else {
                return Vec3::ZERO;
            };
            let (x, y) = (px.x.round(), px.y.round());
            if x < 0.0 || y < 0.0 || x >= cw as f32 || y >= ch as f32 {
                return Vec3::ZERO;
            }
            let [r, g, b] = color.get_pixel(x as u32, y as u32).0;
            Vec3::new(r as f32, g as f32, b as f32) / 255.0
        })
        .collect()
}
