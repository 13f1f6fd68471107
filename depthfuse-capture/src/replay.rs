//! Replay of a recorded session directory.
//!
//! Layout:
//! - `session.json`: calibration, depth value scale and frame rate
//! - `depth/*.png`: 16-bit depth frames, played in file-name order
//! - `color/*.jpg` or `color/*.png` (optional): color frames matched to depth by file stem
//!
//! JPEG color is delivered still compressed (MJPG); PNG color as raw RGB.

use crate::frame::{FramePayload, FrameSet, PixelFormat, RawFrame, StreamKind};
use crate::point_cloud::depth_to_points;
use crate::profile::{AlignMode, StreamConfig, StreamProfile};
use crate::source::{CaptureError, DepthCamera, DeviceInfo};
use depthfuse_data::{PointFormat, PointFrame};
use depthfuse_recon::ingest::{CameraCalibration, ColorImage, DepthImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

pub const MANIFEST_FILE: &str = "session.json";

/// Contents of `session.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub calibration: CameraCalibration,
    /// Millimetres per depth unit.
    #[serde(default = "default_value_scale")]
    pub value_scale: f32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_value_scale() -> f32 {
    1.0
}

fn default_fps() -> u32 {
    15
}

#[derive(Debug, Clone)]
struct RecordedFrame {
    depth: PathBuf,
    color: Option<PathBuf>,
}

/// Camera that plays back a recorded session.
#[derive(Debug)]
pub struct ReplayCamera {
    root: PathBuf,
    manifest: SessionManifest,
    frames: Vec<RecordedFrame>,
    depth_size: (u32, u32),
    color_profile: Option<StreamProfile>,
    cursor: usize,
    delivered: u64,
    looping: bool,
    paced: bool,
    next_due: Option<Instant>,
    align: AlignMode,
}

fn is_color_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("jpg" | "jpeg" | "png")
    )
}

fn is_jpeg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("jpg" | "jpeg")
    )
}

fn sorted_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, CaptureError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && keep(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl ReplayCamera {
    /// Open a session directory.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CaptureError::DeviceNotFound(root.display().to_string()));
        }
        let manifest: SessionManifest =
            serde_json::from_str(&fs::read_to_string(root.join(MANIFEST_FILE))?)?;

        let depth_files = sorted_files(&root.join("depth"), |p| {
            p.extension().is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })?;
        let color_dir = root.join("color");
        let color_files = if color_dir.is_dir() {
            sorted_files(&color_dir, is_color_file)?
        } else {
            Vec::new()
        };

        let frames: Vec<RecordedFrame> = depth_files
            .into_iter()
            .map(|depth| {
                let stem = depth.file_stem().map(|s| s.to_os_string());
                let color = color_files
                    .iter()
                    .find(|c| c.file_stem().map(|s| s.to_os_string()) == stem)
                    .cloned();
                RecordedFrame { depth, color }
            })
            .collect();

        let first = frames
            .first()
            .ok_or_else(|| CaptureError::OpenFailed(format!("{} has no depth frames", root.display())))?;
        let depth_size = image::image_dimensions(&first.depth)?;
        let color_profile = match &first.color {
            Some(path) => {
                let (width, height) = image::image_dimensions(path)?;
                let format = if is_jpeg(path) {
                    PixelFormat::Mjpg
                } else {
                    PixelFormat::Rgb
                };
                Some(StreamProfile {
                    width,
                    height,
                    format,
                    fps: manifest.fps,
                })
            }
            None => None,
        };

        info!(
            "replaying {} frames ({}x{} depth, color: {})",
            frames.len(),
            depth_size.0,
            depth_size.1,
            color_profile.map_or("none".to_string(), |p| p.to_string())
        );

        Ok(Self {
            root,
            manifest,
            frames,
            depth_size,
            color_profile,
            cursor: 0,
            delivered: 0,
            looping: false,
            paced: true,
            next_due: None,
            align: AlignMode::Disabled,
        })
    }

    /// Start over at the first frame after the last one.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Serve frames at the recorded frame rate (default) or as fast as asked.
    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.manifest.fps.max(1) as f64)
    }

    fn load(&self, recorded: &RecordedFrame) -> Result<FrameSet, CaptureError> {
        let timestamp_us = (self.delivered as f64 * self.frame_interval().as_secs_f64() * 1e6) as u64;
        let depth = image::open(&recorded.depth)?.into_luma16();
        let (width, height) = depth.dimensions();
        let depth = RawFrame {
            format: PixelFormat::Y16,
            width,
            height,
            payload: FramePayload::Words(depth.into_raw()),
            timestamp_us,
            value_scale: self.manifest.value_scale,
        };

        let color = match &recorded.color {
            Some(path) if is_jpeg(path) => {
                let (width, height) = image::image_dimensions(path)?;
                Some(RawFrame {
                    format: PixelFormat::Mjpg,
                    width,
                    height,
                    payload: FramePayload::Bytes(fs::read(path)?),
                    timestamp_us,
                    value_scale: 1.0,
                })
            }
            Some(path) => {
                let rgb = image::open(path)?.into_rgb8();
                Some(RawFrame {
                    format: PixelFormat::Rgb,
                    width: rgb.width(),
                    height: rgb.height(),
                    payload: FramePayload::Bytes(rgb.into_raw()),
                    timestamp_us,
                    value_scale: 1.0,
                })
            }
            None => None,
        };

        Ok(FrameSet {
            index: self.delivered,
            depth: Some(depth),
            color,
        })
    }
}

impl DepthCamera for ReplayCamera {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Replay".to_string(),
            serial: self.root.display().to_string(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn stream_profiles(&self, kind: StreamKind) -> Vec<StreamProfile> {
        match kind {
            StreamKind::Depth => vec![StreamProfile {
                width: self.depth_size.0,
                height: self.depth_size.1,
                format: PixelFormat::Y16,
                fps: self.manifest.fps,
            }],
            StreamKind::Color => self.color_profile.into_iter().collect(),
        }
    }

    fn start(&mut self, config: &StreamConfig) -> Result<(), CaptureError> {
        self.align = config.align;
        self.cursor = 0;
        self.next_due = None;
        debug!("replay started with {:?}", config);
        Ok(())
    }

    fn calibration(&self) -> Result<CameraCalibration, CaptureError> {
        Ok(self.manifest.calibration)
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<Option<FrameSet>, CaptureError> {
        if self.cursor >= self.frames.len() {
            if !self.looping {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            self.cursor = 0;
        }

        if self.paced {
            let now = Instant::now();
            if let Some(due) = self.next_due {
                if due > now + timeout {
                    std::thread::sleep(timeout);
                    return Ok(None);
                }
                if due > now {
                    std::thread::sleep(due - now);
                }
            }
            self.next_due = Some(Instant::now() + self.frame_interval());
        }

        let recorded = self.frames[self.cursor].clone();
        self.cursor += 1;
        let set = self
            .load(&recorded)
            .map_err(|e| CaptureError::UnreadableFrame {
                path: recorded.depth,
                reason: e.to_string(),
            })?;
        self.delivered += 1;
        Ok(Some(set))
    }

    fn compute_point_cloud(
        &self,
        frames: &FrameSet,
        format: PointFormat,
        position_scale: f32,
    ) -> Result<PointFrame, CaptureError> {
        depth_to_points(
            frames,
            &self.manifest.calibration,
            self.align.is_aligned() || self.manifest.calibration.is_registered(),
            format,
            position_scale,
        )
    }

    fn stop(&mut self) {
        info!("replay stopped after {} frame sets", self.delivered);
    }
}

/// Write a session directory that [`ReplayCamera`] can play back.
///
/// Frames are named by index; color is stored as PNG.
pub fn write_session(
    dir: impl AsRef<Path>,
    manifest: &SessionManifest,
    frames: &[(DepthImage, Option<ColorImage>)],
) -> Result<(), CaptureError> {
    let root = dir.as_ref();
    fs::create_dir_all(root.join("depth"))?;
    fs::write(root.join(MANIFEST_FILE), serde_json::to_string_pretty(manifest)?)?;
    for (i, (depth, color)) in frames.iter().enumerate() {
        let name = format!("{:06}.png", i);
        depth.save(root.join("depth").join(&name))?;
        if let Some(color) = color {
            fs::create_dir_all(root.join("color"))?;
            color.save(root.join("color").join(&name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthfuse_recon::ingest::{CameraIntrinsic, uniform_depth};

    fn manifest() -> SessionManifest {
        let intr = CameraIntrinsic::new(5.0, 5.0, 2.0, 1.5, 4, 3);
        SessionManifest {
            calibration: CameraCalibration::pinhole(intr, intr),
            value_scale: 0.5,
            fps: 30,
        }
    }

    fn session_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("depthfuse_replay_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_replays_in_order_then_ends() {
        let dir = session_dir("order");
        let frames = vec![
            (uniform_depth(4, 3, 100), Some(ColorImage::from_pixel(4, 3, image::Rgb([1, 2, 3])))),
            (uniform_depth(4, 3, 200), None),
        ];
        write_session(&dir, &manifest(), &frames).unwrap();

        let mut camera = ReplayCamera::open(&dir).unwrap().with_pacing(false);
        assert_eq!(camera.len(), 2);
        assert_eq!(camera.calibration().unwrap(), manifest().calibration);
        assert_eq!(camera.stream_profiles(StreamKind::Color)[0].format, PixelFormat::Rgb);

        let first = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        let depth = first.depth.unwrap();
        assert_eq!(depth.value_scale, 0.5);
        assert_eq!(depth.payload, FramePayload::Words(vec![100; 12]));
        assert!(first.color.is_some());

        let second = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(second.color.is_none());

        assert!(camera.wait_for_frames(Duration::ZERO).unwrap().is_none());
        assert!(camera.wait_for_frames(Duration::ZERO).unwrap().is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_looping() {
        let dir = session_dir("loop");
        write_session(&dir, &manifest(), &[(uniform_depth(4, 3, 100), None)]).unwrap();
        let mut camera = ReplayCamera::open(&dir)
            .unwrap()
            .with_pacing(false)
            .with_looping(true);
        for _ in 0..3 {
            assert!(camera.wait_for_frames(Duration::ZERO).unwrap().is_some());
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_exhausted_replay_waits_out_timeout() {
        let dir = session_dir("exhausted");
        write_session(&dir, &manifest(), &[(uniform_depth(4, 3, 100), None)]).unwrap();
        let mut camera = ReplayCamera::open(&dir).unwrap().with_pacing(false);
        assert!(camera.wait_for_frames(Duration::ZERO).unwrap().is_some());

        let timeout = Duration::from_millis(30);
        let start = Instant::now();
        assert!(camera.wait_for_frames(timeout).unwrap().is_none());
        assert!(start.elapsed() >= timeout);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unreadable_frame_is_skippable() {
        let dir = session_dir("corrupt");
        let frames = vec![
            (uniform_depth(4, 3, 100), None),
            (uniform_depth(4, 3, 200), None),
            (uniform_depth(4, 3, 300), None),
        ];
        write_session(&dir, &manifest(), &frames).unwrap();
        fs::write(dir.join("depth").join("000001.png"), b"not a png").unwrap();

        let mut camera = ReplayCamera::open(&dir).unwrap().with_pacing(false);
        assert!(camera.wait_for_frames(Duration::ZERO).unwrap().is_some());
        let err = camera.wait_for_frames(Duration::ZERO).unwrap_err();
        assert!(matches!(err, CaptureError::UnreadableFrame { .. }));
        assert!(!err.is_fatal());

        let next = camera.wait_for_frames(Duration::ZERO).unwrap().unwrap();
        assert_eq!(next.depth.unwrap().payload, FramePayload::Words(vec![300; 12]));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let err = ReplayCamera::open("/nonexistent/depthfuse/session").unwrap_err();
        assert!(matches!(err, CaptureError::DeviceNotFound(_)));
    }

    #[test]
    fn test_manifest_defaults() {
        let json = serde_json::json!({ "calibration": manifest().calibration });
        let parsed: SessionManifest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.value_scale, 1.0);
        assert_eq!(parsed.fps, 15);
    }
}
