//! Depthfuse Application
//!
//! Live depth-camera reconstruction:
//! - Depth/color capture from a recorded session or a synthetic scene
//! - Depth range conditioning and optional lens undistortion
//! - Depth-only or colored volumetric fusion
//! - Per-frame point-cloud export on demand

mod app;
mod config;
mod display;
mod errors;
mod export;
mod input;
mod session;
mod viewer;

use clap::{ArgGroup, Parser};
use config::{AppConfig, LoggingConfig, ShowMode, SourceConfig};
use depthfuse_capture::AlignMode;
use depthfuse_recon::conditioning::DepthRange;
use depthfuse_recon::{FusionMode, Quality, ResetPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Depthfuse - depth camera capture and volumetric fusion
#[derive(Parser, Debug)]
#[command(name = "depthfuse")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["replay", "synthetic"])))]
struct Args {
    /// Depth-to-color alignment (disabled, hardware, software)
    #[arg(long, default_value = "disabled")]
    align: AlignMode,

    /// Fusion engine (off, depth, colored)
    #[arg(long, default_value = "off")]
    fusion: FusionMode,

    /// Use the fast, coarse fusion parameters
    #[arg(long)]
    coarse: bool,

    /// Reset the volume whenever tracking is lost
    #[arg(long)]
    reset_on_failure: bool,

    /// What the 3-D view shows (render, cloud, normals)
    #[arg(long, default_value = "render")]
    show: ShowMode,

    /// Depth below this many millimetres is dropped
    #[arg(long, default_value_t = 0.0)]
    min_depth_mm: f32,

    /// Depth beyond this many millimetres is dropped
    #[arg(long, default_value_t = 5000.0)]
    max_depth_mm: f32,

    /// Scale of the image windows
    #[arg(long, default_value_t = 0.5)]
    show_scale: f32,

    /// Frame wait timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,

    /// Requested color stream width
    #[arg(long, default_value_t = 1920)]
    color_width: u32,

    /// Requested depth stream width
    #[arg(long, default_value_t = 640)]
    depth_width: u32,

    /// Requested frame rate
    #[arg(long, default_value_t = 15)]
    fps: u32,

    /// Undistort depth and color with the device calibration
    #[arg(long)]
    undistort: bool,

    /// Replay a recorded session directory
    #[arg(long, conflicts_with = "synthetic")]
    replay: Option<PathBuf>,

    /// Restart the replay after its last frame
    #[arg(long, requires = "replay")]
    loop_replay: bool,

    /// Use a generated flat-wall scene, `--depth-width` pixels wide at 4:3
    #[arg(long)]
    synthetic: bool,

    /// Directory for exported point clouds and snapshots
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Write viewer snapshots every N cycles
    #[arg(long)]
    snapshot_every: Option<u64>,

    /// Stop after N cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Scripted commands instead of keys, e.g. "30:save,60:quit"
    #[arg(long)]
    script: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Send spans to Tracy (needs the `tracy` feature)
    #[arg(long)]
    tracy: bool,

    /// Print the device and its stream profiles, then exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn into_config(self) -> AppConfig {
        let source = match self.replay {
            Some(dir) if !self.synthetic => SourceConfig::Replay {
                dir,
                looping: self.loop_replay,
            },
            _ => SourceConfig::Synthetic {
                width: self.depth_width,
                height: self.depth_width * 3 / 4,
            },
        };
        let mut config = AppConfig::new()
            .with_source(source)
            .with_align(self.align)
            .with_fusion(self.fusion)
            .with_quality(if self.coarse {
                Quality::Coarse
            } else {
                Quality::Precise
            })
            .with_reset_policy(if self.reset_on_failure {
                ResetPolicy::ResetOnFailure
            } else {
                ResetPolicy::KeepVolume
            })
            .with_show(self.show)
            .with_depth_range(DepthRange::new(self.min_depth_mm, self.max_depth_mm))
            .with_show_scale(self.show_scale)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_stream_widths(self.depth_width, self.color_width)
            .with_fps(self.fps)
            .with_undistort(self.undistort)
            .with_output_dir(self.output_dir)
            .with_logging(LoggingConfig {
                level: self.log_level,
                enable_tracy: self.tracy,
            });
        if let Some(every) = self.snapshot_every {
            config = config.with_snapshots(every);
        }
        if let Some(cycles) = self.max_cycles {
            config = config.with_max_cycles(cycles);
        }
        if let Some(script) = self.script {
            config = config.with_script(script);
        }
        config
    }
}

fn main() {
    let args = Args::parse();
    let list_devices = args.list_devices;
    let config = args.into_config();

    let result = if list_devices {
        app::list_devices(&config)
    } else {
        app::run(config).map(|_| ())
    };
    if let Err(e) = result {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
