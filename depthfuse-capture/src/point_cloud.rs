//! Per-frame point clouds computed from raw frames.

use crate::decode::{decode_color, decode_depth};
use crate::frame::{FrameSet, StreamKind};
use crate::source::CaptureError;
use depthfuse_data::{PointFormat, PointFrame};
use depthfuse_recon::ingest::{CameraCalibration, ColorImage};
use glam::Vec3;

/// Back-project a frame set into a point cloud.
///
/// Every depth pixel yields one point, in row-major order; pixels without
/// depth become `(0, 0, 0)`. Positions are depth units times
/// `position_scale`. For [`PointFormat::XyzRgb`] the color frame is sampled
/// at the same pixel when `aligned`, otherwise through the depth-to-color
/// extrinsic, which assumes millimetre positions.
pub fn depth_to_points(
    frames: &FrameSet,
    calibration: &CameraCalibration,
    aligned: bool,
    format: PointFormat,
    position_scale: f32,
) -> Result<PointFrame, CaptureError> {
    let depth = frames
        .depth
        .clone()
        .ok_or(CaptureError::MissingFrame(StreamKind::Depth))?;
    let depth = decode_depth(depth)?;
    let color = if format.has_color() {
        let color = frames
            .color
            .clone()
            .ok_or(CaptureError::MissingFrame(StreamKind::Color))?;
        Some(decode_color(color)?)
    } else {
        None
    };

    let intrinsic = &calibration.depth_intrinsic;
    let same_grid = aligned
        && color
            .as_ref()
            .is_some_and(|c| c.dimensions() == depth.dimensions());
    let count = depth.width() as usize * depth.height() as usize;
    let mut positions = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(if color.is_some() { count } else { 0 });

    for (u, v, px) in depth.enumerate_pixels() {
        let d = px.0[0];
        if d == 0 {
            positions.push(Vec3::ZERO);
            if color.is_some() {
                colors.push([0, 0, 0]);
            }
            continue;
        }
        let p = intrinsic.unproject(u as f32, v as f32, d as f32 * position_scale);
        positions.push(p);
        if let Some(color) = &color {
            let rgb = if same_grid {
                color.get_pixel(u, v).0
            } else {
                sample_through_extrinsic(color, calibration, p)
            };
            colors.push(rgb);
        }
    }

    Ok(match format {
        PointFormat::Xyz => PointFrame::xyz(positions),
        PointFormat::XyzRgb => PointFrame::xyz_rgb(positions, colors),
    })
}

fn sample_through_extrinsic(color: &ColorImage, calibration: &CameraCalibration, p: Vec3) -> [u8; 3] {
    let q = calibration.depth_to_color.transform_point(p);
    let Some(px) = calibration.color_intrinsic.project(q) else {
        return [0, 0, 0];
    };
    let (x, y) = (px.x.round(), px.y.round());
    if x < 0.0 || y < 0.0 || x >= color.width() as f32 || y >= color.height() as f32 {
        return [0, 0, 0];
    }
    color.get_pixel(x as u32, y as u32).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FramePayload, PixelFormat, RawFrame};
    use depthfuse_recon::ingest::{CameraIntrinsic, Extrinsic};

    fn frame_set(depth: Vec<u16>, color: Option<Vec<u8>>) -> FrameSet {
        FrameSet {
            index: 0,
            depth: Some(RawFrame {
                format: PixelFormat::Y16,
                width: 2,
                height: 2,
                payload: FramePayload::Words(depth),
                timestamp_us: 0,
                value_scale: 1.0,
            }),
            color: color.map(|bytes| RawFrame {
                format: PixelFormat::Rgb,
                width: 2,
                height: 2,
                payload: FramePayload::Bytes(bytes),
                timestamp_us: 0,
                value_scale: 1.0,
            }),
        }
    }

    fn calibration() -> CameraCalibration {
        let intr = CameraIntrinsic::new(1.0, 1.0, 0.0, 0.0, 2, 2);
        CameraCalibration::pinhole(intr, intr)
    }

    #[test]
    fn test_back_projection_and_zero_depth() {
        let set = frame_set(vec![0, 100, 200, 300], None);
        let cloud = depth_to_points(&set, &calibration(), false, PointFormat::Xyz, 1.0).unwrap();
        assert_eq!(cloud.len(), 4);
        assert_eq!(cloud.positions[0], Vec3::ZERO);
        assert_eq!(cloud.positions[1], Vec3::new(100.0, 0.0, 100.0));
        assert_eq!(cloud.positions[2], Vec3::new(0.0, 200.0, 200.0));
        assert_eq!(cloud.positions[3], Vec3::new(300.0, 300.0, 300.0));
        assert!(cloud.colors.is_empty());
    }

    #[test]
    fn test_position_scale() {
        let set = frame_set(vec![0, 0, 0, 400], None);
        let cloud = depth_to_points(&set, &calibration(), false, PointFormat::Xyz, 0.25).unwrap();
        assert_eq!(cloud.positions[3].z, 100.0);
    }

    #[test]
    fn test_aligned_color_uses_same_pixel() {
        let color: Vec<u8> = (0..12).collect();
        let set = frame_set(vec![10, 10, 10, 0], Some(color));
        let cloud = depth_to_points(&set, &calibration(), true, PointFormat::XyzRgb, 1.0).unwrap();
        assert_eq!(cloud.colors, vec![[0, 1, 2], [3, 4, 5], [6, 7, 8], [0, 0, 0]]);
    }

    #[test]
    fn test_extrinsic_moves_color_lookup() {
        let mut calibration = calibration();
        // Shift by one pixel's worth at 10 mm depth
        calibration.depth_to_color = Extrinsic {
            translation: Vec3::new(10.0, 0.0, 0.0),
            ..Extrinsic::identity()
        };
        let color: Vec<u8> = (0..12).collect();
        let set = frame_set(vec![10, 10, 10, 10], Some(color));
        let cloud = depth_to_points(&set, &calibration, false, PointFormat::XyzRgb, 1.0).unwrap();
        assert_eq!(cloud.colors[0], [3, 4, 5]);
        // Pushed off the right edge
        assert_eq!(cloud.colors[1], [0, 0, 0]);
    }

    #[test]
    fn test_color_required_for_xyzrgb() {
        let set = frame_set(vec![1, 1, 1, 1], None);
        let err = depth_to_points(&set, &calibration(), true, PointFormat::XyzRgb, 1.0).unwrap_err();
        assert!(matches!(err, CaptureError::MissingFrame(StreamKind::Color)));
    }
}
