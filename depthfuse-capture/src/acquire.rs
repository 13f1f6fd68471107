//! Frame acquisition: wait for a frame set and decode it into images.

use crate::decode::{DecodeError, decode_color, decode_depth};
use crate::frame::{FramePayload, FrameSet, PixelFormat, RawFrame, StreamKind};
use crate::source::{CaptureError, DepthCamera};
use depthfuse_recon::ingest::{ColorImage, DepthImage};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// A required stream was absent from the frame set.
    #[error("frame set has no {0} frame")]
    MissingStream(StreamKind),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Device(#[from] CaptureError),
}

impl AcquireError {
    /// Device faults end the session; everything else skips one cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            AcquireError::Device(e) => e.is_fatal(),
            AcquireError::MissingStream(_) | AcquireError::Decode(_) => false,
        }
    }
}

/// Streams a cycle cannot do without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRequirement {
    /// Color is decoded when present but not required.
    DepthOnly,
    DepthAndColor,
}

/// One decoded capture.
#[derive(Debug, Clone)]
pub struct AcquiredFrames {
    pub index: u64,
    pub depth: DepthImage,
    pub color: Option<ColorImage>,
    /// Millimetres per depth unit.
    pub value_scale: f32,
    pub timestamp_us: u64,
}

impl AcquiredFrames {
    /// Rebuild a raw frame set from the decoded images.
    ///
    /// Used for export requests; the payloads are copies.
    pub fn frame_set(&self) -> FrameSet {
        let (width, height) = self.depth.dimensions();
        let depth = RawFrame {
            format: PixelFormat::Y16,
            width,
            height,
            payload: FramePayload::Words(self.depth.as_raw().clone()),
            timestamp_us: self.timestamp_us,
            value_scale: self.value_scale,
        };
        let color = self.color.as_ref().map(|c| RawFrame {
            format: PixelFormat::Rgb,
            width: c.width(),
            height: c.height(),
            payload: FramePayload::Bytes(c.as_raw().clone()),
            timestamp_us: self.timestamp_us,
            value_scale: 1.0,
        });
        FrameSet {
            index: self.index,
            depth: Some(depth),
            color,
        }
    }
}

/// Pulls frame sets from a camera and decodes them.
pub struct FrameAcquirer {
    camera: Box<dyn DepthCamera>,
    requirement: StreamRequirement,
}

impl FrameAcquirer {
    pub fn new(camera: Box<dyn DepthCamera>, requirement: StreamRequirement) -> Self {
        Self {
            camera,
            requirement,
        }
    }

    pub fn camera(&self) -> &dyn DepthCamera {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> &mut dyn DepthCamera {
        self.camera.as_mut()
    }

    pub fn requirement(&self) -> StreamRequirement {
        self.requirement
    }

    /// Wait up to `timeout` for the next frame set.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub fn acquire(&mut self, timeout: Duration) -> Result<Option<AcquiredFrames>, AcquireError> {
        let Some(frames) = self.camera.wait_for_frames(timeout)? else {
            return Ok(None);
        };
        let FrameSet {
            index,
            depth,
            color,
        } = frames;

        let depth = depth.ok_or(AcquireError::MissingStream(StreamKind::Depth))?;
        if color.is_none() && self.requirement == StreamRequirement::DepthAndColor {
            return Err(AcquireError::MissingStream(StreamKind::Color));
        }

        let value_scale = depth.value_scale;
        let timestamp_us = depth.timestamp_us;
        let depth = decode_depth(depth)?;
        let color = color.map(decode_color).transpose()?;
        trace!("acquired frame set {}", index);

        Ok(Some(AcquiredFrames {
            index,
            depth,
            color,
            value_scale,
            timestamp_us,
        }))
    }

    pub fn stop(&mut self) {
        self.camera.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticCamera;

    fn acquirer(camera: SyntheticCamera, requirement: StreamRequirement) -> FrameAcquirer {
        FrameAcquirer::new(Box::new(camera), requirement)
    }

    #[test]
    fn test_acquires_depth_and_color() {
        let mut acq = acquirer(SyntheticCamera::new(32, 24), StreamRequirement::DepthAndColor);
        let frames = acq.acquire(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frames.depth.dimensions(), (32, 24));
        assert_eq!(frames.depth.get_pixel(0, 0).0, [600]);
        assert!(frames.color.is_some());
        assert_eq!(frames.value_scale, 1.0);
    }

    #[test]
    fn test_timeout_is_none() {
        let camera = SyntheticCamera::new(8, 8).with_timeouts([0]);
        let mut acq = acquirer(camera, StreamRequirement::DepthOnly);
        assert!(acq.acquire(Duration::from_millis(10)).unwrap().is_none());
        assert!(acq.acquire(Duration::from_millis(10)).unwrap().is_some());
    }

    #[test]
    fn test_missing_color_when_required() {
        let camera = SyntheticCamera::new(8, 8).without_color();
        let mut acq = acquirer(camera, StreamRequirement::DepthAndColor);
        let err = acq.acquire(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, AcquireError::MissingStream(StreamKind::Color)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_color_is_fine_depth_only() {
        let camera = SyntheticCamera::new(8, 8).without_color();
        let mut acq = acquirer(camera, StreamRequirement::DepthOnly);
        let frames = acq.acquire(Duration::from_millis(10)).unwrap().unwrap();
        assert!(frames.color.is_none());
    }

    #[test]
    fn test_missing_depth_is_always_rejected() {
        let camera = SyntheticCamera::new(8, 8).with_depth_drops([0]);
        let mut acq = acquirer(camera, StreamRequirement::DepthOnly);
        let err = acq.acquire(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, AcquireError::MissingStream(StreamKind::Depth)));
    }

    #[test]
    fn test_device_errors_are_classified() {
        let unreadable = AcquireError::from(CaptureError::UnreadableFrame {
            path: "depth/000001.png".into(),
            reason: "truncated".to_string(),
        });
        assert!(!unreadable.is_fatal());
        assert!(AcquireError::from(CaptureError::Disconnected("usb".to_string())).is_fatal());
    }

    #[test]
    fn test_frame_limit_waits_out_timeout() {
        let camera = SyntheticCamera::new(4, 4).with_frame_limit(1);
        let mut acq = acquirer(camera, StreamRequirement::DepthOnly);
        assert!(acq.acquire(Duration::ZERO).unwrap().is_some());
        let timeout = Duration::from_millis(20);
        let start = std::time::Instant::now();
        assert!(acq.acquire(timeout).unwrap().is_none());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_frame_set_round_trip_keeps_scale() {
        let camera = SyntheticCamera::new(4, 4).with_value_scale(0.25);
        let mut acq = acquirer(camera, StreamRequirement::DepthAndColor);
        let frames = acq.acquire(Duration::from_millis(10)).unwrap().unwrap();
        let set = frames.frame_set();
        let depth = set.depth.unwrap();
        assert_eq!(depth.value_scale, 0.25);
        assert_eq!(depth.expected_len(), Some(depth.payload.byte_len()));
        assert_eq!(set.color.unwrap().format, PixelFormat::Rgb);
    }
}
