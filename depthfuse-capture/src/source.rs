//! Depth camera trait and capture errors.

use crate::decode::DecodeError;
use crate::frame::{FrameSet, StreamKind};
use crate::profile::{ProfileError, StreamConfig, StreamProfile};
use depthfuse_data::{PointFormat, PointFrame};
use depthfuse_recon::ingest::CameraCalibration;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Stream not started")]
    NotStarted,

    #[error("Frame set has no {0} frame")]
    MissingFrame(StreamKind),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid calibration: {0}")]
    Calibration(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid session manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// One frame could not be read; later frames may still be fine.
    #[error("Unreadable frame {path}: {reason}")]
    UnreadableFrame { path: PathBuf, reason: String },
}

impl CaptureError {
    /// Whether the device can no longer deliver frames.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CaptureError::UnreadableFrame { .. } | CaptureError::Decode(_)
        )
    }
}

/// Device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: String,
    pub firmware: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {}, firmware {})", self.name, self.serial, self.firmware)
    }
}

/// A depth camera with an optional color sensor.
///
/// Calls block for at most the timeout given; the camera may buffer frames on
/// its own threads.
pub trait DepthCamera {
    fn device_info(&self) -> DeviceInfo;

    /// Profiles the sensor offers, default first.
    fn stream_profiles(&self, kind: StreamKind) -> Vec<StreamProfile>;

    fn start(&mut self, config: &StreamConfig) -> Result<(), CaptureError>;

    /// Calibration for the started streams.
    ///
    /// With alignment enabled the depth intrinsic describes the color grid.
    fn calibration(&self) -> Result<CameraCalibration, CaptureError>;

    /// Next frame set, or `Ok(None)` when nothing arrived within `timeout`.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<FrameSet>, CaptureError>;

    /// Per-frame point cloud computed from the raw frame set.
    ///
    /// Positions are in depth units times `position_scale` (millimetres when
    /// given the frame's value scale).
    fn compute_point_cloud(
        &self,
        frames: &FrameSet,
        format: PointFormat,
        position_scale: f32,
    ) -> Result<PointFrame, CaptureError>;

    fn stop(&mut self);
}
