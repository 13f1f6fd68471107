//! Session setup from an [`AppConfig`] and the top-level run.

use crate::config::{AppConfig, LoggingConfig, SourceConfig};
use crate::errors::SessionError;
use crate::input::{CommandSource, RawModeWriter, ScriptedCommands, TerminalKeys};
use crate::session::{Session, SessionSettings, SessionStats};
use crate::viewer::{NullViewer, SnapshotViewer, Viewer};
use depthfuse_capture::{
    DepthCamera, FrameAcquirer, PixelFormat, ReplayCamera, StreamConfig, StreamKind,
    StreamRequirement, SyntheticCamera, select_profile,
};
use depthfuse_recon::{CameraGeometry, Fusion};
use std::error::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing::info;

/// Open the configured camera, start its streams and return it with the
/// calibration it reports.
pub fn open_camera(config: &AppConfig) -> Result<Box<dyn DepthCamera>, SessionError> {
    let mut camera: Box<dyn DepthCamera> = match &config.source {
        SourceConfig::Replay { dir, looping } => {
            Box::new(ReplayCamera::open(dir)?.with_looping(*looping))
        }
        SourceConfig::Synthetic { width, height } => Box::new(SyntheticCamera::new(*width, *height)),
    };
    info!("device: {}", camera.device_info());

    let depth = select_profile(
        StreamKind::Depth,
        &camera.stream_profiles(StreamKind::Depth),
        config.depth_width,
        PixelFormat::Y16,
        config.fps,
    )?;
    let color = if config.needs_color() {
        let profiles = camera.stream_profiles(StreamKind::Color);
        // Prefer compressed color, the way devices stream it over USB
        let preferred = if profiles.iter().any(|p| p.format == PixelFormat::Mjpg) {
            PixelFormat::Mjpg
        } else {
            PixelFormat::Rgb
        };
        Some(select_profile(
            StreamKind::Color,
            &profiles,
            config.color_width,
            preferred,
            config.fps,
        )?)
    } else {
        None
    };

    camera.start(&StreamConfig {
        depth,
        color,
        align: config.align,
    })?;
    Ok(camera)
}

/// Build every session component from `config`.
pub fn build_session(
    config: &AppConfig,
) -> Result<Session<Box<dyn Viewer>, Box<dyn CommandSource>>, SessionError> {
    let camera = open_camera(config)?;
    let geometry = CameraGeometry::new(camera.calibration()?, config.quality, config.undistort)?;
    let fusion = Fusion::from_mode(config.fusion, &geometry, config.reset_policy)?;

    let requirement = if config.needs_color() {
        StreamRequirement::DepthAndColor
    } else {
        StreamRequirement::DepthOnly
    };
    let acquirer = FrameAcquirer::new(camera, requirement);

    let viewer: Box<dyn Viewer> = match config.snapshot_every {
        Some(every) => Box::new(SnapshotViewer::new(config.output_dir.join("snapshots"), every)),
        None => Box::new(NullViewer),
    };
    let input: Box<dyn CommandSource> = match &config.script {
        Some(script) => Box::new(
            ScriptedCommands::parse(script)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?,
        ),
        None => Box::new(TerminalKeys::new()?),
    };

    let settings = SessionSettings {
        depth_range: config.depth_range,
        show: config.show,
        show_scale: config.show_scale,
        timeout: config.timeout,
        output_dir: config.output_dir.clone(),
        ..SessionSettings::default()
    };
    Ok(Session::new(acquirer, geometry, fusion, viewer, input, settings))
}

/// Run a session to completion.
pub fn run(config: AppConfig) -> Result<SessionStats, Box<dyn Error>> {
    // Terminal keys put the tty in raw mode
    init_logging(&config.logging, config.script.is_none());
    info!(
        "depthfuse {}: fusion={}, quality={:?}, align={:?}",
        env!("CARGO_PKG_VERSION"),
        config.fusion,
        config.quality,
        config.align
    );
    let mut session = build_session(&config)?;
    Ok(session.run(config.max_cycles)?)
}

/// Print the camera's identity and stream profiles.
pub fn list_devices(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    init_logging(&config.logging, false);
    let camera: Box<dyn DepthCamera> = match &config.source {
        SourceConfig::Replay { dir, .. } => Box::new(ReplayCamera::open(dir)?),
        SourceConfig::Synthetic { width, height } => Box::new(SyntheticCamera::new(*width, *height)),
    };
    println!("{}", camera.device_info());
    for kind in [StreamKind::Depth, StreamKind::Color] {
        for profile in camera.stream_profiles(kind) {
            println!("  {}: {}", kind, profile);
        }
    }
    Ok(())
}

/// Logs go to stderr, keeping stdout for listings.
fn log_writer(raw_terminal: bool) -> BoxMakeWriter {
    if raw_terminal {
        BoxMakeWriter::new(|| RawModeWriter(std::io::stderr()))
    } else {
        BoxMakeWriter::new(std::io::stderr)
    }
}

fn init_logging(logging: &LoggingConfig, raw_terminal: bool) {
    #[cfg(feature = "tracy")]
    {
        if logging.enable_tracy {
            use tracing_subscriber::Layer;
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;
            tracing_subscriber::registry()
                .with(tracing_tracy::TracyLayer::default())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(log_writer(raw_terminal))
                        .with_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env()
                                .unwrap_or_else(|_| logging.level.clone().into()),
                        ),
                )
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .with_target(false)
        .with_writer(log_writer(raw_terminal))
        .init();
}
