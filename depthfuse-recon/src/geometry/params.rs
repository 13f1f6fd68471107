//! Fusion engine parameters

use crate::ingest::CameraIntrinsic;
use glam::{Affine3A, UVec3, Vec3};
use std::fmt;

/// Edge length of the reconstruction cube in metres.
pub const VOLUME_SIZE_M: f32 = 3.0;

/// Depth units per metre for millimetre depth maps.
pub const DEPTH_FACTOR_MM: f32 = 1000.0;

/// Accuracy/speed trade-off for the fusion volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Fine voxels, more tracking iterations.
    #[default]
    Precise,
    /// Coarse voxels, fewer iterations; for slow machines.
    Coarse,
}

/// Edge-preserving smoothing applied to depth before tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Range sigma in metres.
    pub sigma_depth: f32,
    /// Spatial sigma in pixels.
    pub sigma_spatial: f32,
    pub kernel_size: u32,
}

/// Configuration of one fusion engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionParams {
    /// Depth frame size (width, height).
    pub frame_size: (u32, u32),
    pub intrinsic: CameraIntrinsic,
    /// Color frame size, set for colored fusion.
    pub color_frame_size: Option<(u32, u32)>,
    pub color_intrinsic: Option<CameraIntrinsic>,

    pub volume_dims: UVec3,
    /// Voxel edge in metres.
    pub voxel_size: f32,
    /// World pose of the volume's minimum corner.
    pub volume_pose: Affine3A,
    /// Distance from the surface beyond which measurements are ignored (metres).
    pub truncation_distance: f32,
    pub max_weight: f32,
    /// Minimum camera motion (metres) before a new frame is integrated.
    pub min_camera_movement: f32,
    pub raycast_step_factor: f32,
    pub light_pose: Vec3,

    /// Maximum correspondence distance in metres.
    pub icp_dist_threshold: f32,
    /// Maximum angle between corresponding normals in radians.
    pub icp_angle_threshold: f32,
    /// Iterations per pyramid level, finest level first.
    pub icp_iterations: Vec<u32>,

    pub bilateral: BilateralParams,
    /// Raw depth units per metre.
    pub depth_factor: f32,
    /// Depth beyond this many metres is dropped; 0 disables.
    pub truncate_threshold: f32,
}

impl ReconstructionParams {
    /// Defaults tuned for accuracy.
    pub fn precise(intrinsic: CameraIntrinsic) -> Self {
        let dims = 512;
        let voxel_size = VOLUME_SIZE_M / dims as f32;
        Self {
            frame_size: (intrinsic.width, intrinsic.height),
            intrinsic,
            color_frame_size: None,
            color_intrinsic: None,
            volume_dims: UVec3::splat(dims),
            voxel_size,
            volume_pose: default_volume_pose(),
            truncation_distance: 7.0 * voxel_size,
            max_weight: 64.0,
            min_camera_movement: 0.0,
            raycast_step_factor: 0.25,
            light_pose: Vec3::ZERO,
            icp_dist_threshold: 0.1,
            icp_angle_threshold: 30f32.to_radians(),
            icp_iterations: vec![10, 5, 4],
            bilateral: BilateralParams {
                sigma_depth: 0.04,
                sigma_spatial: 4.5,
                kernel_size: 7,
            },
            depth_factor: DEPTH_FACTOR_MM,
            truncate_threshold: 0.0,
        }
    }

    /// Defaults tuned for speed.
    pub fn coarse(intrinsic: CameraIntrinsic) -> Self {
        let dims = 128;
        let voxel_size = VOLUME_SIZE_M / dims as f32;
        Self {
            volume_dims: UVec3::splat(dims),
            voxel_size,
            truncation_distance: 2.0 * voxel_size,
            raycast_step_factor: 0.75,
            icp_iterations: vec![5, 3, 2],
            ..Self::precise(intrinsic)
        }
    }

    pub fn for_quality(quality: Quality, intrinsic: CameraIntrinsic) -> Self {
        match quality {
            Quality::Precise => Self::precise(intrinsic),
            Quality::Coarse => Self::coarse(intrinsic),
        }
    }

    /// Attach the color sensor, turning these into colored-fusion params.
    pub fn with_color(mut self, color_intrinsic: CameraIntrinsic) -> Self {
        self.color_frame_size = Some((color_intrinsic.width, color_intrinsic.height));
        self.color_intrinsic = Some(color_intrinsic);
        self
    }

    pub fn with_depth_factor(mut self, depth_factor: f32) -> Self {
        self.depth_factor = depth_factor;
        self
    }

    pub fn is_colored(&self) -> bool {
        self.color_intrinsic.is_some()
    }

    pub fn pyramid_levels(&self) -> usize {
        self.icp_iterations.len()
    }

    /// Edge lengths of the volume in metres.
    pub fn volume_extent(&self) -> Vec3 {
        self.volume_dims.as_vec3() * self.voxel_size
    }
}

fn default_volume_pose() -> Affine3A {
    Affine3A::from_translation(Vec3::new(-VOLUME_SIZE_M / 2.0, -VOLUME_SIZE_M / 2.0, 0.5))
}

impl fmt::Display for ReconstructionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frameSize=({},{}), colored={}, depthFactor={}",
            self.frame_size.0,
            self.frame_size.1,
            self.is_colored(),
            self.depth_factor
        )?;
        writeln!(
            f,
            "bilateral_sigma_depth={}, bilateral_sigma_spatial={}, bilateral_kernel_size={}",
            self.bilateral.sigma_depth, self.bilateral.sigma_spatial, self.bilateral.kernel_size
        )?;
        writeln!(
            f,
            "pyramidLevels={}, volumeDims=({},{},{}), voxelSize={}",
            self.pyramid_levels(),
            self.volume_dims.x,
            self.volume_dims.y,
            self.volume_dims.z,
            self.voxel_size
        )?;
        writeln!(
            f,
            "tsdf_min_camera_movement={}, tsdf_trunc_dist={}, tsdf_max_weight={}, raycast_step_factor={}",
            self.min_camera_movement,
            self.truncation_distance,
            self.max_weight,
            self.raycast_step_factor
        )?;
        writeln!(
            f,
            "lightPose=({},{},{})",
            self.light_pose.x, self.light_pose.y, self.light_pose.z
        )?;
        writeln!(
            f,
            "icpDistThresh={}, icpAngleThresh={}, truncateThreshold={}",
            self.icp_dist_threshold, self.icp_angle_threshold, self.truncate_threshold
        )?;
        write!(f, "icpIterations={:?}", self.icp_iterations)
    }
}
