//! Frame-to-model alignment
//!
//! Projective data association against the surface predicted from the last
//! pose, followed by point-to-point translation updates over a strided image
//! pyramid (coarsest level first). Rotation is carried over from the previous
//! pose; the engines using this tracker assume a camera that mostly
//! translates between consecutive frames.

use crate::fusion::maps::FrameMaps;
use crate::fusion::volume::ModelMaps;
use crate::geometry::ReconstructionParams;
use glam::{Affine3A, Vec3, Vec3A};
use thiserror::Error;

/// Share of valid depth pixels that must find a model correspondence.
pub const MIN_INLIER_RATIO: f32 = 0.25;

/// Step length (metres) below which an iteration counts as converged.
const CONVERGED_STEP: f32 = 1e-5;

/// Why alignment failed.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TrackingFailure {
    /// The frame holds no usable depth.
    #[error("no valid depth")]
    NoValidDepth,
    /// Too few pixels matched the model within the distance/angle gates.
    #[error("{inliers} of {valid} pixels matched the model")]
    TooFewInliers { inliers: usize, valid: usize },
}

struct Correspondences {
    sum: Vec3,
    count: usize,
}

fn correspond(
    frame: &FrameMaps,
    model: &ModelMaps,
    pose: &Affine3A,
    stride: u32,
    params: &ReconstructionParams,
) -> Correspondences {
    let cos_gate = params.icp_angle_threshold.cos();
    let mut sum = Vec3::ZERO;
    let mut count = 0;

    for y in (0..frame.height).step_by(stride as usize) {
        for x in (0..frame.width).step_by(stride as usize) {
            let i = frame.index(x, y);
            let (Some(p), Some(q)) = (frame.points[i], model.points[i]) else {
                continue;
            };
            let p_world = pose.transform_point3(p);
            let d = q - p_world;
            if d.length() > params.icp_dist_threshold {
                continue;
            }
            if let (Some(n), Some(m)) = (frame.normals[i], model.normals[i]) {
                let n_world = pose.transform_vector3(n);
                if n_world.dot(m) < cos_gate {
                    continue;
                }
            }
            sum += d;
            count += 1;
        }
    }
    Correspondences { sum, count }
}

/// Align `frame` against `model`, starting from `pose`.
///
/// Returns the refined camera pose, or why the frame could not be aligned.
pub fn align(
    frame: &FrameMaps,
    model: &ModelMaps,
    pose: Affine3A,
    params: &ReconstructionParams,
) -> Result<Affine3A, TrackingFailure> {
    let valid = frame.valid_count();
    if valid == 0 {
        return Err(TrackingFailure::NoValidDepth);
    }

    let mut pose = pose;
    for (level, iterations) in params.icp_iterations.iter().enumerate().rev() {
        let stride = 1u32 << level;
        for _ in 0..*iterations {
            let c = correspond(frame, model, &pose, stride, params);
            if c.count == 0 {
                break;
            }
            let step = c.sum / c.count as f32;
            pose.translation += Vec3A::from(step);
            if step.length() < CONVERGED_STEP {
                break;
            }
        }
    }

    let inliers = correspond(frame, model, &pose, 1, params).count;
    if (inliers as f32) < MIN_INLIER_RATIO * valid as f32 {
        return Err(TrackingFailure::TooFewInliers { inliers, valid });
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::volume::VoxelVolume;
    use crate::ingest::{CameraIntrinsic, uniform_depth};

    fn params() -> ReconstructionParams {
        ReconstructionParams::precise(CameraIntrinsic::new(50.0, 50.0, 31.5, 23.5, 64, 48))
    }

    fn model_from(depth_mm: u16, params: &ReconstructionParams) -> ModelMaps {
        let frame = FrameMaps::from_depth(&uniform_depth(64, 48, depth_mm), params);
        let mut volume = VoxelVolume::new(params);
        volume.integrate(&frame, &Affine3A::IDENTITY, &[]);
        volume.predict(&Affine3A::IDENTITY, &params.intrinsic, 64, 48)
    }

    #[test]
    fn test_identical_frame_converges_in_place() {
        let params = params();
        let model = model_from(600, &params);
        let frame = FrameMaps::from_depth(&uniform_depth(64, 48, 600), &params);
        let pose = align(&frame, &model, Affine3A::IDENTITY, &params).unwrap();
        assert!(Vec3::from(pose.translation).length() < 1e-3);
    }

    #[test]
    fn test_small_shift_is_recovered() {
        let params = params();
        let model = model_from(600, &params);
        // Camera moved 2 cm closer to the plane
        let frame = FrameMaps::from_depth(&uniform_depth(64, 48, 580), &params);
        let pose = align(&frame, &model, Affine3A::IDENTITY, &params).unwrap();
        assert!((pose.translation.z - 0.02).abs() < 5e-3, "z = {}", pose.translation.z);
    }

    #[test]
    fn test_far_jump_fails() {
        let params = params();
        let model = model_from(600, &params);
        let frame = FrameMaps::from_depth(&uniform_depth(64, 48, 2000), &params);
        let err = align(&frame, &model, Affine3A::IDENTITY, &params).unwrap_err();
        assert!(matches!(err, TrackingFailure::TooFewInliers { inliers: 0, .. }));
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(TrackingFailure::NoValidDepth.to_string(), "no valid depth");
        let failure = TrackingFailure::TooFewInliers { inliers: 3, valid: 40 };
        assert_eq!(failure.to_string(), "3 of 40 pixels matched the model");
        let _: &dyn std::error::Error = &failure;
    }

    #[test]
    fn test_empty_frame_fails() {
        let params = params();
        let model = model_from(600, &params);
        let frame = FrameMaps::from_depth(&uniform_depth(64, 48, 0), &params);
        assert_eq!(
            align(&frame, &model, Affine3A::IDENTITY, &params),
            Err(TrackingFailure::NoValidDepth)
        );
    }
}
