//! Replayed reconstruction example
//!
//! Records a short synthetic session to disk, plays it back through colored
//! fusion and exports the fused surface as a PLY file.
//!
//! Usage:
//!   cargo run --example replay_reconstruction -- [output_dir]

use depthfuse::capture::{
    DepthCamera, FrameAcquirer, ReplayCamera, SessionManifest, StreamRequirement, write_session,
};
use depthfuse::data::{PointFrame, load_points_from_ply, save_points};
use depthfuse::recon::conditioning::{DepthRange, TruncateDefaults, truncate_depth};
use depthfuse::recon::{
    CameraCalibration, CameraGeometry, ColorImage, DepthImage, Fusion, FusionMode, Quality,
    ResetPolicy, ingest::CameraIntrinsic,
};
use image::Rgb;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FRAMES: usize = 12;

/// A wall at 900 mm with a box standing 200 mm proud of it.
fn scene() -> (DepthImage, ColorImage) {
    let in_box = |x: u32, y: u32| (50..110).contains(&x) && (35..85).contains(&y);
    let depth = DepthImage::from_fn(WIDTH, HEIGHT, |x, y| {
        image::Luma([if in_box(x, y) { 700 } else { 900 }])
    });
    let color = ColorImage::from_fn(WIDTH, HEIGHT, |x, y| {
        if in_box(x, y) {
            Rgb([200, 60, 40])
        } else {
            Rgb([(x * 255 / WIDTH) as u8, 120, (y * 255 / HEIGHT) as u8])
        }
    });
    (depth, color)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("depthfuse_demo"));
    let session_dir = output_dir.join("session");

    // Record
    let f = WIDTH as f32 * 0.78125;
    let intrinsic = CameraIntrinsic::new(
        f,
        f,
        (WIDTH as f32 - 1.0) / 2.0,
        (HEIGHT as f32 - 1.0) / 2.0,
        WIDTH,
        HEIGHT,
    );
    let manifest = SessionManifest {
        calibration: CameraCalibration::pinhole(intrinsic, intrinsic),
        value_scale: 1.0,
        fps: 30,
    };
    let frames: Vec<_> = (0..FRAMES)
        .map(|_| {
            let (depth, color) = scene();
            (depth, Some(color))
        })
        .collect();
    write_session(&session_dir, &manifest, &frames)?;
    info!("Recorded {} frames to {:?}", FRAMES, session_dir);

    // Replay
    let camera = ReplayCamera::open(&session_dir)?.with_pacing(false);
    let geometry = CameraGeometry::new(camera.calibration()?, Quality::Precise, false)?;
    let mut fusion = Fusion::from_mode(FusionMode::Colored, &geometry, ResetPolicy::KeepVolume)?
        .ok_or("fusion disabled")?;
    let mut acquirer = FrameAcquirer::new(Box::new(camera), StreamRequirement::DepthAndColor);

    let range = DepthRange::new(300.0, 1500.0);
    while let Some(mut frames) = acquirer.acquire(Duration::from_millis(100))? {
        truncate_depth(
            &mut frames.depth,
            &range,
            frames.value_scale,
            TruncateDefaults::default(),
        );
        let outcome = fusion.update(&frames.depth, frames.color.as_ref())?;
        if !outcome.is_tracked() {
            warn!("Frame {}: tracking lost", frames.index);
        }
    }
    acquirer.stop();

    let counters = fusion.counters();
    info!(
        "Fused {} frames ({} failures)",
        counters.successes, counters.failures
    );

    // Export
    let cloud = fusion.cloud();
    let ply_path = output_dir.join("fused.ply");
    save_points(&ply_path, &PointFrame::xyz(cloud.points.clone()))?;
    if let Some((min, max)) = cloud.bounds() {
        info!("Surface bounds: {:?} .. {:?}", min, max);
    }

    let reloaded = load_points_from_ply(&ply_path)?;
    info!("Wrote {} points to {:?}", reloaded.len(), ply_path);
    Ok(())
}
