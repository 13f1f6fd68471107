//! Session configuration.

use depthfuse_capture::AlignMode;
use depthfuse_recon::conditioning::DepthRange;
use depthfuse_recon::{FusionMode, Quality, ResetPolicy};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the 3-D window shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowMode {
    /// Only the shaded fusion render.
    #[default]
    Render,
    /// The render plus the fused cloud.
    Cloud,
    /// The cloud with normals.
    Normals,
}

impl ShowMode {
    pub fn shows_cloud(self) -> bool {
        !matches!(self, ShowMode::Render)
    }
}

impl FromStr for ShowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "render" => Ok(ShowMode::Render),
            "cloud" => Ok(ShowMode::Cloud),
            "normals" => Ok(ShowMode::Normals),
            other => Err(format!("unknown show mode '{}'", other)),
        }
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Replay { dir: PathBuf, looping: bool },
    Synthetic { width: u32, height: u32 },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic {
            width: 640,
            height: 480,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_tracy: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_tracy: false,
        }
    }
}

/// Everything a session is started with.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub align: AlignMode,
    pub fusion: FusionMode,
    pub quality: Quality,
    pub reset_policy: ResetPolicy,
    pub show: ShowMode,
    pub depth_range: DepthRange,
    pub show_scale: f32,
    pub timeout: Duration,
    pub color_width: u32,
    pub depth_width: u32,
    pub fps: u32,
    pub undistort: bool,
    pub output_dir: PathBuf,
    /// Write viewer snapshots every this many cycles; `None` disables the viewer.
    pub snapshot_every: Option<u64>,
    pub max_cycles: Option<u64>,
    /// Scripted commands (`cycle:command,...`) instead of terminal keys.
    pub script: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            align: AlignMode::Disabled,
            fusion: FusionMode::Off,
            quality: Quality::Precise,
            reset_policy: ResetPolicy::KeepVolume,
            show: ShowMode::Render,
            depth_range: DepthRange::default(),
            show_scale: 0.5,
            timeout: Duration::from_millis(100),
            color_width: 1920,
            depth_width: 640,
            fps: 15,
            undistort: false,
            output_dir: PathBuf::from("."),
            snapshot_every: None,
            max_cycles: None,
            script: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    pub fn with_align(mut self, align: AlignMode) -> Self {
        self.align = align;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionMode) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn with_show(mut self, show: ShowMode) -> Self {
        self.show = show;
        self
    }

    pub fn with_depth_range(mut self, range: DepthRange) -> Self {
        self.depth_range = range;
        self
    }

    pub fn with_show_scale(mut self, scale: f32) -> Self {
        self.show_scale = scale;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stream_widths(mut self, depth_width: u32, color_width: u32) -> Self {
        self.depth_width = depth_width;
        self.color_width = color_width;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_undistort(mut self, undistort: bool) -> Self {
        self.undistort = undistort;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_snapshots(mut self, every: u64) -> Self {
        self.snapshot_every = Some(every);
        self
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Color frames are needed by every mode except depth-only fusion.
    pub fn needs_color(&self) -> bool {
        self.fusion != FusionMode::Depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.depth_range.max_mm, 5000.0);
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert_eq!(config.reset_policy, ResetPolicy::KeepVolume);
        assert!(config.needs_color());
    }

    #[test]
    fn test_builders() {
        let config = AppConfig::new()
            .with_fusion(FusionMode::Depth)
            .with_show("normals".parse().unwrap())
            .with_max_cycles(3);
        assert!(!config.needs_color());
        assert!(config.show.shows_cloud());
        assert_eq!(config.max_cycles, Some(3));
    }
}
