//! Point-cloud export of the current frame.

use depthfuse_capture::{CaptureError, DepthCamera, FrameSet};
use depthfuse_data::{PlyError, PointFormat, save_points};
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("point cloud computation failed: {0}")]
    Compute(#[from] CaptureError),

    #[error(transparent)]
    Write(#[from] PlyError),
}

/// Compute the raw cloud of `frames` on the camera and write it to `path`.
///
/// Positions are scaled by `value_scale`, giving millimetres. Returns the
/// number of vertices written.
#[instrument(skip(camera, frames, path), fields(index = frames.index, path = %path.display()))]
pub fn export_points(
    camera: &dyn DepthCamera,
    frames: &FrameSet,
    format: PointFormat,
    value_scale: f32,
    path: &Path,
) -> Result<usize, ExportError> {
    let points = camera.compute_point_cloud(frames, format, value_scale)?;
    save_points(path, &points)?;
    Ok(points.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthfuse_capture::SyntheticCamera;
    use std::time::Duration;

    #[test]
    fn test_export_is_deterministic() {
        let mut camera = SyntheticCamera::new(6, 4);
        let frames = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        let dir = std::env::temp_dir().join(format!("depthfuse_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.ply");
        let b = dir.join("b.ply");

        assert_eq!(export_points(&camera, &frames, PointFormat::Xyz, 1.0, &a).unwrap(), 24);
        assert_eq!(export_points(&camera, &frames, PointFormat::Xyz, 1.0, &b).unwrap(), 24);
        let first = std::fs::read(&a).unwrap();
        assert_eq!(first, std::fs::read(&b).unwrap());

        let text = String::from_utf8(first).unwrap();
        let body = text.split("end_header\n").nth(1).unwrap();
        assert_eq!(body.lines().count(), 24);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unwritable_path_is_write_error() {
        let mut camera = SyntheticCamera::new(2, 2);
        let frames = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        let path = Path::new("/nonexistent/depthfuse/depth.ply");
        let err = export_points(&camera, &frames, PointFormat::Xyz, 1.0, path).unwrap_err();
        assert!(matches!(err, ExportError::Write(PlyError::Io(_))));
    }

    #[test]
    fn test_colored_export_needs_color() {
        let mut camera = SyntheticCamera::new(2, 2).without_color();
        let frames = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        let path = std::env::temp_dir().join("depthfuse_never_written.ply");
        let err = export_points(&camera, &frames, PointFormat::XyzRgb, 1.0, &path).unwrap_err();
        assert!(matches!(err, ExportError::Compute(_)));
    }
}
