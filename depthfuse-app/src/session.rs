//! The capture/fuse/display loop.

use crate::config::ShowMode;
use crate::display::depth_overlay;
use crate::errors::SessionError;
use crate::export::export_points;
use crate::input::{Command, CommandSource};
use crate::viewer::{Viewer, VolumeBox};
use depthfuse_capture::{AcquiredFrames, FrameAcquirer};
use depthfuse_data::PointFormat;
use depthfuse_recon::conditioning::{DepthRange, TruncateDefaults, truncate_depth, valid_fraction};
use depthfuse_recon::{CameraGeometry, Fusion, FusionMode, FusionOutcome};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Per-cycle settings fixed at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub depth_range: DepthRange,
    pub truncate_defaults: TruncateDefaults,
    pub show: ShowMode,
    pub show_scale: f32,
    pub timeout: Duration,
    pub output_dir: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            depth_range: DepthRange::default(),
            truncate_defaults: TruncateDefaults::default(),
            show: ShowMode::Render,
            show_scale: 0.5,
            timeout: Duration::from_millis(100),
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Processed,
    /// No frame set arrived in time.
    Timeout,
    /// A frame set arrived but could not be used.
    Skipped,
    Quit,
}

/// Wall-clock duration of each stage of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleTimings {
    pub capture: Duration,
    pub preprocess: Duration,
    /// Fusion update plus render.
    pub fusion: Duration,
    pub fusion_update: Duration,
    pub render: Duration,
    pub display: Duration,
    pub total: Duration,
}

/// Counters kept over the whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u64,
    pub processed: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub tracking_failures: u64,
    pub exports: u64,
    pub failed_exports: u64,
}

/// One running session. Owns the camera, the fusion engine, the viewer and
/// the command source; every call happens on the caller's thread.
pub struct Session<V: Viewer, I: CommandSource> {
    acquirer: FrameAcquirer,
    geometry: CameraGeometry,
    fusion: Option<Fusion>,
    viewer: V,
    input: I,
    settings: SessionSettings,
    volume: Option<VolumeBox>,
    frozen: bool,
    last_frames: Option<AcquiredFrames>,
    stats: SessionStats,
    timings: CycleTimings,
}

impl<V: Viewer, I: CommandSource> Session<V, I> {
    pub fn new(
        acquirer: FrameAcquirer,
        geometry: CameraGeometry,
        fusion: Option<Fusion>,
        viewer: V,
        input: I,
        settings: SessionSettings,
    ) -> Self {
        let volume = fusion.as_ref().map(|f| VolumeBox::from_params(f.params()));
        Self {
            acquirer,
            geometry,
            fusion,
            viewer,
            input,
            settings,
            volume,
            frozen: false,
            last_frames: None,
            stats: SessionStats::default(),
            timings: CycleTimings::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Timings of the last processed cycle.
    pub fn timings(&self) -> CycleTimings {
        self.timings
    }

    pub fn fusion(&self) -> Option<&Fusion> {
        self.fusion.as_ref()
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Format used for point exports: plain for depth-only fusion, colored
    /// whenever color frames are flowing.
    fn export_format(&self) -> PointFormat {
        let has_color = self
            .last_frames
            .as_ref()
            .is_some_and(|f| f.color.is_some());
        match self.fusion.as_ref().map(Fusion::mode) {
            Some(FusionMode::Depth) => PointFormat::Xyz,
            _ if has_color => PointFormat::XyzRgb,
            _ => PointFormat::Xyz,
        }
    }

    /// Run one cycle. Only fatal errors are returned; everything else is
    /// logged, counted and costs at most this cycle.
    pub fn step(&mut self) -> Result<CycleOutcome, SessionError> {
        let start = Instant::now();
        self.stats.cycles += 1;

        let mut outcome = match self.acquirer.acquire(self.settings.timeout) {
            Ok(Some(frames)) => {
                let capture = start.elapsed();
                self.process(frames, start, capture);
                CycleOutcome::Processed
            }
            Ok(None) => {
                self.stats.timeouts += 1;
                CycleOutcome::Timeout
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("skipping cycle: {}", e);
                self.stats.skipped += 1;
                CycleOutcome::Skipped
            }
        };

        if let Err(e) = self.viewer.spin_once() {
            warn!("{}", e);
        }

        if let Some(command) = self.input.poll()
            && self.dispatch(command)
        {
            outcome = CycleOutcome::Quit;
        }
        Ok(outcome)
    }

    fn process(&mut self, frames: AcquiredFrames, start: Instant, capture: Duration) {
        let AcquiredFrames {
            index,
            mut depth,
            color,
            value_scale,
            timestamp_us,
        } = frames;
        let preprocess_start = Instant::now();

        if self.stats.processed == 0 {
            info!(
                "capture color={}, depth={}x{}, depth value scale={}",
                color
                    .as_ref()
                    .map_or("none".to_string(), |c| format!("{}x{}", c.width(), c.height())),
                depth.width(),
                depth.height(),
                value_scale
            );
            if self.fusion.is_some() && value_scale != 1.0 {
                warn!("fusion assumes 1 mm depth units, camera reports {}", value_scale);
            }
        }
        self.stats.processed += 1;

        truncate_depth(
            &mut depth,
            &self.settings.depth_range,
            value_scale,
            self.settings.truncate_defaults,
        );
        let depth = self.geometry.undistort_depth(depth);
        let color = color.map(|c| self.geometry.undistort_color(c));
        let preprocess = preprocess_start.elapsed();

        let fusion_start = Instant::now();
        let mut fusion_update = Duration::ZERO;
        let mut render_time = Duration::ZERO;
        if let Some(fusion) = &mut self.fusion {
            match fusion.update(&depth, color.as_ref()) {
                Ok(FusionOutcome::Tracked) => {
                    fusion_update = fusion_start.elapsed();
                    let render_start = Instant::now();
                    if let Some(render) = fusion.render() {
                        render_time = render_start.elapsed();
                        let name = format!("{} fusion render", fusion.mode());
                        self.viewer.show_image(&name, &render, self.settings.show_scale);
                    }
                    if self.settings.show.shows_cloud()
                        && !self.frozen
                        && let Some(volume) = &self.volume
                    {
                        self.viewer.show_cloud(
                            &fusion.cloud(),
                            fusion.pose(),
                            volume,
                            self.settings.show == ShowMode::Normals,
                        );
                    }
                }
                Ok(FusionOutcome::Lost { reset }) => {
                    fusion_update = fusion_start.elapsed();
                    self.stats.tracking_failures += 1;
                    debug!("frame {} lost tracking (reset: {})", index, reset);
                }
                Err(e) => {
                    fusion_update = fusion_start.elapsed();
                    warn!("frame {} not fused: {}", index, e);
                }
            }
        }
        let fusion_time = fusion_start.elapsed();

        let display_start = Instant::now();
        let scale = self.settings.show_scale;
        self.viewer.show_depth("Depth", &depth, scale);
        if let Some(color) = &color {
            self.viewer.show_image("Color", color, scale);
            self.viewer
                .show_image("Fuse", &depth_overlay(color, &depth), scale);
        }
        let display_time = display_start.elapsed();

        self.timings = CycleTimings {
            capture,
            preprocess,
            fusion: fusion_time,
            fusion_update,
            render: render_time,
            display: display_time,
            total: start.elapsed(),
        };
        debug!(
            "[msec] total:{}, cap:{}, pre:{}, fusion:{} (update:{}, render:{}), show:{}, valid depth {:.0}%",
            self.timings.total.as_millis(),
            capture.as_millis(),
            preprocess.as_millis(),
            fusion_time.as_millis(),
            fusion_update.as_millis(),
            render_time.as_millis(),
            display_time.as_millis(),
            valid_fraction(&depth) * 100.0
        );

        self.last_frames = Some(AcquiredFrames {
            index,
            depth,
            color,
            value_scale,
            timestamp_us,
        });
    }

    /// Apply a command; returns true when the session should end.
    fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => {
                info!("quit requested");
                return true;
            }
            Command::ResetFusion => match &mut self.fusion {
                Some(fusion) => fusion.reset(),
                None => info!("fusion is off, nothing to reset"),
            },
            Command::ToggleFreeze => {
                self.frozen = !self.frozen;
                info!("3-D view {}", if self.frozen { "frozen" } else { "live" });
            }
            Command::ExportPoints => self.export(),
        }
        false
    }

    fn export(&mut self) {
        let Some(frames) = &self.last_frames else {
            warn!("no frame captured yet, nothing to export");
            return;
        };
        let format = self.export_format();
        let path = self.settings.output_dir.join(format.default_file_name());
        let frame_set = frames.frame_set();
        match export_points(
            self.acquirer.camera(),
            &frame_set,
            format,
            frames.value_scale,
            &path,
        ) {
            Ok(count) => {
                self.stats.exports += 1;
                info!("{} is saved ({} points)", path.display(), count);
            }
            Err(e) => {
                self.stats.failed_exports += 1;
                error!("{}", SessionError::from(e));
            }
        }
    }

    /// Loop until quit, a fatal error, or `max_cycles`.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<SessionStats, SessionError> {
        info!("session started");
        loop {
            if max_cycles.is_some_and(|max| self.stats.cycles >= max) {
                info!("reached {} cycles", self.stats.cycles);
                break;
            }
            match self.step() {
                Ok(CycleOutcome::Quit) => break,
                Ok(_) => {}
                Err(e) => {
                    self.acquirer.stop();
                    return Err(e);
                }
            }
        }
        self.acquirer.stop();
        self.log_summary();
        Ok(self.stats)
    }

    fn log_summary(&self) {
        let s = &self.stats;
        info!(
            "session done: {} cycles, {} processed, {} timeouts, {} skipped, {} tracking failures, {} exports ({} failed)",
            s.cycles, s.processed, s.timeouts, s.skipped, s.tracking_failures, s.exports, s.failed_exports
        );
        if let Some(fusion) = &self.fusion {
            let c = fusion.counters();
            info!(
                "fusion ({}): {} tracked, {} lost, {} resets, {} surface points",
                fusion.mode(),
                c.successes,
                c.failures,
                c.resets,
                fusion.cloud().len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{NoInput, ScriptedCommands};
    use crate::viewer::{NullViewer, ViewerError};
    use depthfuse_capture::{DepthCamera, StreamRequirement, SyntheticCamera};
    use depthfuse_data::SurfaceCloud;
    use depthfuse_recon::geometry::Quality;
    use depthfuse_recon::ingest::{ColorImage, DepthImage};
    use depthfuse_recon::{FusionState, ResetPolicy};
    use glam::Affine3A;

    #[derive(Default)]
    struct RecordingViewer {
        images: Vec<String>,
        clouds: Vec<usize>,
        spins: u64,
    }

    impl Viewer for RecordingViewer {
        fn show_image(&mut self, name: &str, _image: &ColorImage, _scale: f32) {
            self.images.push(name.to_string());
        }

        fn show_depth(&mut self, name: &str, _depth: &DepthImage, _scale: f32) {
            self.images.push(name.to_string());
        }

        fn show_cloud(&mut self, cloud: &SurfaceCloud, _: Affine3A, _: &VolumeBox, _: bool) {
            self.clouds.push(cloud.len());
        }

        fn spin_once(&mut self) -> Result<(), ViewerError> {
            self.spins += 1;
            Ok(())
        }
    }

    fn session<V: Viewer, I: CommandSource>(
        camera: SyntheticCamera,
        mode: FusionMode,
        viewer: V,
        input: I,
        settings: SessionSettings,
    ) -> Session<V, I> {
        let geometry =
            CameraGeometry::new(camera.calibration().unwrap(), Quality::Precise, false).unwrap();
        let fusion = Fusion::from_mode(mode, &geometry, ResetPolicy::KeepVolume).unwrap();
        let requirement = if mode == FusionMode::Depth {
            StreamRequirement::DepthOnly
        } else {
            StreamRequirement::DepthAndColor
        };
        let acquirer = FrameAcquirer::new(Box::new(camera), requirement);
        Session::new(acquirer, geometry, fusion, viewer, input, settings)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("depthfuse_session_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_timeouts_skip_fusion() {
        let camera = SyntheticCamera::new(64, 48).with_timeouts([0, 1, 2]);
        let mut s = session(
            camera,
            FusionMode::Depth,
            NullViewer,
            NoInput,
            SessionSettings::default(),
        );
        for _ in 0..3 {
            assert_eq!(s.step().unwrap(), CycleOutcome::Timeout);
        }
        let fusion = s.fusion().unwrap();
        assert_eq!(fusion.counters().successes + fusion.counters().failures, 0);
        assert_eq!(fusion.state(), FusionState::Idle);
        assert_eq!(s.stats().timeouts, 3);

        assert_eq!(s.step().unwrap(), CycleOutcome::Processed);
        assert_eq!(s.fusion().unwrap().counters().successes, 1);
    }

    #[test]
    fn test_processed_cycle_records_timings() {
        let camera = SyntheticCamera::new(64, 48);
        let mut s = session(
            camera,
            FusionMode::Colored,
            NullViewer,
            NoInput,
            SessionSettings::default(),
        );
        assert_eq!(s.step().unwrap(), CycleOutcome::Processed);
        let t = s.timings();
        assert!(t.total >= t.display);
        assert!(t.total >= t.fusion);
        assert!(t.fusion >= t.fusion_update);
        assert!(t.total > Duration::ZERO);
    }

    #[test]
    fn test_flat_plane_fuses_every_frame() {
        let camera = SyntheticCamera::new(64, 48);
        let settings = SessionSettings {
            show: ShowMode::Cloud,
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Depth, RecordingViewer::default(), NoInput, settings);
        let stats = s.run(Some(10)).unwrap();
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.tracking_failures, 0);
        assert_eq!(s.fusion().unwrap().counters().successes, 10);
        assert!(s.viewer().images.iter().any(|n| n == "depth fusion render"));
        assert_eq!(s.viewer().clouds.len(), 10);
        assert!(s.timings().total >= s.timings().capture);
    }

    #[test]
    fn test_missing_color_skips_cycle() {
        let camera = SyntheticCamera::new(16, 12).with_color_drops([0]);
        let mut s = session(camera, FusionMode::Off, NullViewer, NoInput, SessionSettings::default());
        assert_eq!(s.step().unwrap(), CycleOutcome::Skipped);
        assert_eq!(s.step().unwrap(), CycleOutcome::Processed);
        assert_eq!(s.stats().skipped, 1);
    }

    #[test]
    fn test_quit_ends_run_at_cycle_boundary() {
        let camera = SyntheticCamera::new(16, 12);
        let script = ScriptedCommands::new([(2, Command::Quit)]);
        let mut s = session(camera, FusionMode::Off, NullViewer, script, SessionSettings::default());
        let stats = s.run(Some(100)).unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.processed, 3);
    }

    #[test]
    fn test_freeze_keeps_cloud_view_while_fusing() {
        let camera = SyntheticCamera::new(64, 48);
        let script = ScriptedCommands::new([(1, Command::ToggleFreeze), (4, Command::ToggleFreeze)]);
        let settings = SessionSettings {
            show: ShowMode::Normals,
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Depth, RecordingViewer::default(), script, settings);
        s.run(Some(6)).unwrap();

        // Cycles 0 and 1 feed the view; 2..=4 are frozen; 5 is live again
        assert_eq!(s.viewer().clouds.len(), 3);
        assert_eq!(s.viewer().spins, 6);
        assert_eq!(s.fusion().unwrap().counters().successes, 6);
        assert!(!s.is_frozen());
    }

    #[test]
    fn test_reset_command_returns_to_idle() {
        let camera = SyntheticCamera::new(64, 48);
        let script = ScriptedCommands::new([(1, Command::ResetFusion)]);
        let mut s = session(camera, FusionMode::Depth, NullViewer, script, SessionSettings::default());
        s.step().unwrap();
        s.step().unwrap();
        let fusion = s.fusion().unwrap();
        assert_eq!(fusion.state(), FusionState::Idle);
        assert!(fusion.cloud().is_empty());
        assert!(fusion.render().is_none());
    }

    #[test]
    fn test_export_command_writes_ply() {
        let dir = temp_dir("export");
        let camera = SyntheticCamera::new(8, 6);
        let script = ScriptedCommands::new([(0, Command::ExportPoints)]);
        let settings = SessionSettings {
            output_dir: dir.clone(),
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Off, NullViewer, script, settings);
        s.step().unwrap();
        assert_eq!(s.stats().exports, 1);

        let text = std::fs::read_to_string(dir.join("color.ply")).unwrap();
        assert!(text.contains("element vertex 48\n"));
        assert!(text.contains("property uchar red\n"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_depth_mode_exports_xyz() {
        let dir = temp_dir("export_depth");
        let camera = SyntheticCamera::new(64, 48);
        let script = ScriptedCommands::new([(0, Command::ExportPoints)]);
        let settings = SessionSettings {
            output_dir: dir.clone(),
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Depth, NullViewer, script, settings);
        s.step().unwrap();
        let text = std::fs::read_to_string(dir.join("depth.ply")).unwrap();
        assert!(text.contains("element vertex 3072\n"));
        assert!(!text.contains("red"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_export_does_not_stop_session() {
        let camera = SyntheticCamera::new(8, 6);
        let script = ScriptedCommands::new([(0, Command::ExportPoints)]);
        let settings = SessionSettings {
            output_dir: PathBuf::from("/nonexistent/depthfuse/out"),
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Off, NullViewer, script, settings);
        assert_eq!(s.step().unwrap(), CycleOutcome::Processed);
        assert_eq!(s.stats().failed_exports, 1);
        assert_eq!(s.step().unwrap(), CycleOutcome::Processed);
    }

    #[test]
    fn test_depth_is_conditioned_before_fusion() {
        // Wall beyond the working range: every sample is dropped
        let camera = SyntheticCamera::new(64, 48).with_distance(4000);
        let settings = SessionSettings {
            depth_range: DepthRange::new(0.0, 1000.0),
            ..SessionSettings::default()
        };
        let mut s = session(camera, FusionMode::Depth, NullViewer, NoInput, settings);
        s.step().unwrap();
        let fusion = s.fusion().unwrap();
        assert_eq!(fusion.counters().failures, 1);
        assert!(fusion.cloud().is_empty());
        assert_eq!(s.stats().tracking_failures, 1);
    }
}
