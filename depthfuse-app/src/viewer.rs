//! Visualisation sinks for the session.

use crate::display::{depth_preview, scaled};
use depthfuse_data::{PlyError, PointFrame, SurfaceCloud, save_points};
use depthfuse_recon::ReconstructionParams;
use depthfuse_recon::ingest::{ColorImage, DepthImage, GrayImage};
use glam::{Affine3A, Vec3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to write snapshot image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to write snapshot cloud: {0}")]
    Cloud(#[from] PlyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned bounds of the fusion volume in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl VolumeBox {
    pub fn from_params(params: &ReconstructionParams) -> Self {
        let min = Vec3::from(params.volume_pose.translation);
        Self {
            min,
            max: min + params.volume_extent(),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// Image windows plus a 3-D cloud view.
///
/// `spin_once` is bounded and never waits for the user.
pub trait Viewer {
    fn show_image(&mut self, name: &str, image: &ColorImage, scale: f32);

    fn show_depth(&mut self, name: &str, depth: &DepthImage, scale: f32);

    fn show_cloud(
        &mut self,
        cloud: &SurfaceCloud,
        pose: Affine3A,
        volume: &VolumeBox,
        show_normals: bool,
    );

    fn spin_once(&mut self) -> Result<(), ViewerError>;
}

impl<V: Viewer + ?Sized> Viewer for Box<V> {
    fn show_image(&mut self, name: &str, image: &ColorImage, scale: f32) {
        (**self).show_image(name, image, scale);
    }

    fn show_depth(&mut self, name: &str, depth: &DepthImage, scale: f32) {
        (**self).show_depth(name, depth, scale);
    }

    fn show_cloud(
        &mut self,
        cloud: &SurfaceCloud,
        pose: Affine3A,
        volume: &VolumeBox,
        show_normals: bool,
    ) {
        (**self).show_cloud(cloud, pose, volume, show_normals);
    }

    fn spin_once(&mut self) -> Result<(), ViewerError> {
        (**self).spin_once()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullViewer;

impl Viewer for NullViewer {
    fn show_image(&mut self, _name: &str, _image: &ColorImage, _scale: f32) {}

    fn show_depth(&mut self, _name: &str, _depth: &DepthImage, _scale: f32) {}

    fn show_cloud(&mut self, _: &SurfaceCloud, _: Affine3A, _: &VolumeBox, _: bool) {}

    fn spin_once(&mut self) -> Result<(), ViewerError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Window {
    Color(ColorImage),
    Grey(GrayImage),
}

/// Writes the latest content of every window to `dir` every `every` spins.
///
/// Images go to `<name>.png`; the 3-D view to `cloud.ply` (points, plus the
/// volume box corners) and `cloud_normals.ply` when normals are shown.
#[derive(Debug)]
pub struct SnapshotViewer {
    dir: PathBuf,
    every: u64,
    spins: u64,
    windows: BTreeMap<String, Window>,
    cloud: Option<(PointFrame, Option<PointFrame>)>,
    cloud_updates: u64,
}

fn file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

impl SnapshotViewer {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            dir: dir.into(),
            every: every.max(1),
            spins: 0,
            windows: BTreeMap::new(),
            cloud: None,
            cloud_updates: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of `show_cloud` calls so far.
    pub fn cloud_updates(&self) -> u64 {
        self.cloud_updates
    }

    pub fn window_names(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    fn write(&self) -> Result<(), ViewerError> {
        std::fs::create_dir_all(&self.dir)?;
        for (name, window) in &self.windows {
            let path = self.dir.join(format!("{}.png", file_name(name)));
            match window {
                Window::Color(image) => image.save(&path)?,
                Window::Grey(image) => image.save(&path)?,
            }
        }
        if let Some((points, normals)) = &self.cloud {
            save_points(self.dir.join("cloud.ply"), points)?;
            if let Some(normals) = normals {
                save_points(self.dir.join("cloud_normals.ply"), normals)?;
            }
        }
        debug!("snapshot written to {}", self.dir.display());
        Ok(())
    }
}

impl Viewer for SnapshotViewer {
    fn show_image(&mut self, name: &str, image: &ColorImage, scale: f32) {
        self.windows
            .insert(name.to_string(), Window::Color(scaled(image, scale)));
    }

    fn show_depth(&mut self, name: &str, depth: &DepthImage, scale: f32) {
        self.windows
            .insert(name.to_string(), Window::Grey(scaled(&depth_preview(depth), scale)));
    }

    fn show_cloud(
        &mut self,
        cloud: &SurfaceCloud,
        pose: Affine3A,
        volume: &VolumeBox,
        show_normals: bool,
    ) {
        self.cloud_updates += 1;
        let mut positions = cloud.points.clone();
        positions.extend(volume.corners());
        // Camera position as the last vertex
        positions.push(Vec3::from(pose.translation));
        let normals = show_normals.then(|| {
            PointFrame::xyz(
                cloud
                    .points
                    .iter()
                    .zip(&cloud.normals)
                    .map(|(p, n)| *p + *n * 0.01)
                    .collect(),
            )
        });
        self.cloud = Some((PointFrame::xyz(positions), normals));
    }

    fn spin_once(&mut self) -> Result<(), ViewerError> {
        self.spins += 1;
        if self.spins % self.every == 0 {
            self.write()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthfuse_recon::ingest::{CameraIntrinsic, uniform_depth};

    #[test]
    fn test_volume_box_from_params() {
        let params = ReconstructionParams::precise(CameraIntrinsic::new(1.0, 1.0, 0.0, 0.0, 4, 4));
        let bounds = VolumeBox::from_params(&params);
        assert!((bounds.min - Vec3::new(-1.5, -1.5, 0.5)).length() < 1e-5);
        assert!((bounds.max - Vec3::new(1.5, 1.5, 3.5)).length() < 1e-5);
    }

    #[test]
    fn test_snapshot_writes_every_n_spins() {
        let dir = std::env::temp_dir().join(format!("depthfuse_snapshot_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut viewer = SnapshotViewer::new(&dir, 2);
        viewer.show_depth("Depth", &uniform_depth(8, 6, 800), 0.5);
        viewer.show_cloud(
            &SurfaceCloud::new(vec![Vec3::ONE], vec![Vec3::Z]),
            Affine3A::IDENTITY,
            &VolumeBox { min: Vec3::ZERO, max: Vec3::ONE },
            false,
        );

        viewer.spin_once().unwrap();
        assert!(!dir.join("depth.png").exists());
        viewer.spin_once().unwrap();

        let depth = image::open(dir.join("depth.png")).unwrap();
        assert_eq!((depth.width(), depth.height()), (4, 3));
        let cloud = std::fs::read_to_string(dir.join("cloud.ply")).unwrap();
        assert!(cloud.contains("element vertex 10\n"));
        assert!(!dir.join("cloud_normals.ply").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_window_names_are_sanitised() {
        assert_eq!(file_name("Color/Depth overlay"), "color_depth_overlay");
    }
}
