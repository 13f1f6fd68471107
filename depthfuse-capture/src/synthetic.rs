//! Generated flat-plane camera for tests and `--synthetic` runs.

use crate::frame::{FramePayload, FrameSet, PixelFormat, RawFrame, StreamKind};
use crate::point_cloud::depth_to_points;
use crate::profile::{AlignMode, StreamConfig, StreamProfile};
use crate::source::{CaptureError, DepthCamera, DeviceInfo};
use depthfuse_data::{PointFormat, PointFrame};
use depthfuse_recon::ingest::{CameraCalibration, CameraIntrinsic};
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

const FPS: u32 = 30;

/// Camera looking straight at a flat wall.
///
/// Timeouts and dropped streams are keyed by the index of the
/// `wait_for_frames` call (starting at 0).
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    distance: u16,
    value_scale: f32,
    color: Option<[u8; 3]>,
    timeouts: HashSet<u64>,
    depth_drops: HashSet<u64>,
    color_drops: HashSet<u64>,
    align: AlignMode,
    calls: u64,
    delivered: u64,
    frame_limit: Option<u64>,
}

impl SyntheticCamera {
    /// A `width`x`height` camera 600 units from the wall, 1 mm per unit.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            distance: 600,
            value_scale: 1.0,
            color: Some([180, 160, 120]),
            timeouts: HashSet::new(),
            depth_drops: HashSet::new(),
            color_drops: HashSet::new(),
            align: AlignMode::Disabled,
            calls: 0,
            delivered: 0,
            frame_limit: None,
        }
    }

    pub fn with_distance(mut self, distance: u16) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_value_scale(mut self, value_scale: f32) -> Self {
        self.value_scale = value_scale;
        self
    }

    pub fn with_color(mut self, rgb: [u8; 3]) -> Self {
        self.color = Some(rgb);
        self
    }

    pub fn without_color(mut self) -> Self {
        self.color = None;
        self
    }

    pub fn with_timeouts(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.timeouts.extend(calls);
        self
    }

    pub fn with_depth_drops(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.depth_drops.extend(calls);
        self
    }

    pub fn with_color_drops(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.color_drops.extend(calls);
        self
    }

    /// Stop delivering after `frames` frame sets; later calls time out.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Focal length chosen so a 64 pixel wide frame has fx = 50.
    pub fn intrinsic(&self) -> CameraIntrinsic {
        let f = self.width as f32 * 0.78125;
        CameraIntrinsic::new(
            f,
            f,
            (self.width as f32 - 1.0) / 2.0,
            (self.height as f32 - 1.0) / 2.0,
            self.width,
            self.height,
        )
    }

    fn depth_frame(&self) -> RawFrame {
        let samples = vec![self.distance; self.width as usize * self.height as usize];
        RawFrame {
            format: PixelFormat::Y16,
            width: self.width,
            height: self.height,
            payload: FramePayload::Words(samples),
            timestamp_us: self.delivered * 1_000_000 / FPS as u64,
            value_scale: self.value_scale,
        }
    }

    fn color_frame(&self, rgb: [u8; 3]) -> RawFrame {
        let pixels = self.width as usize * self.height as usize;
        RawFrame {
            format: PixelFormat::Rgb,
            width: self.width,
            height: self.height,
            payload: FramePayload::Bytes(rgb.repeat(pixels)),
            timestamp_us: self.delivered * 1_000_000 / FPS as u64,
            value_scale: 1.0,
        }
    }
}

impl DepthCamera for SyntheticCamera {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Synthetic plane".to_string(),
            serial: "0000".to_string(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn stream_profiles(&self, kind: StreamKind) -> Vec<StreamProfile> {
        let format = match kind {
            StreamKind::Depth => PixelFormat::Y16,
            StreamKind::Color if self.color.is_some() => PixelFormat::Rgb,
            StreamKind::Color => return Vec::new(),
        };
        vec![StreamProfile {
            width: self.width,
            height: self.height,
            format,
            fps: FPS,
        }]
    }

    fn start(&mut self, config: &StreamConfig) -> Result<(), CaptureError> {
        if (config.depth.width, config.depth.height) != (self.width, self.height) {
            return Err(CaptureError::UnsupportedFormat(format!(
                "synthetic depth is {}x{}",
                self.width, self.height
            )));
        }
        self.align = config.align;
        info!("synthetic camera started ({}x{})", self.width, self.height);
        Ok(())
    }

    fn calibration(&self) -> Result<CameraCalibration, CaptureError> {
        let intrinsic = self.intrinsic();
        Ok(CameraCalibration::pinhole(intrinsic, intrinsic))
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<FrameSet>, CaptureError> {
        let call = self.calls;
        self.calls += 1;
        if self.frame_limit.is_some_and(|n| self.delivered >= n) {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        if self.timeouts.contains(&call) {
            return Ok(None);
        }

        let depth = (!self.depth_drops.contains(&call)).then(|| self.depth_frame());
        let color = self
            .color
            .filter(|_| !self.color_drops.contains(&call))
            .map(|rgb| self.color_frame(rgb));
        let set = FrameSet {
            index: self.delivered,
            depth,
            color,
        };
        self.delivered += 1;
        Ok(Some(set))
    }

    fn compute_point_cloud(
        &self,
        frames: &FrameSet,
        format: PointFormat,
        position_scale: f32,
    ) -> Result<PointFrame, CaptureError> {
        let calibration = self.calibration()?;
        depth_to_points(frames, &calibration, true, format, position_scale)
    }

    fn stop(&mut self) {
        info!("synthetic camera stopped after {} frame sets", self.delivered);
    }
}
