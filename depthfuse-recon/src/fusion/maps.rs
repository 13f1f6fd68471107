//! Per-frame vertex and normal maps

use crate::geometry::{BilateralParams, ReconstructionParams};
use crate::ingest::{CameraIntrinsic, DepthImage};
use glam::Vec3;

/// Camera-space points and normals for every pixel of a depth frame.
///
/// `None` marks pixels without a usable measurement.
#[derive(Debug, Clone)]
pub struct FrameMaps {
    pub width: u32,
    pub height: u32,
    pub points: Vec<Option<Vec3>>,
    pub normals: Vec<Option<Vec3>>,
}

impl FrameMaps {
    /// Build maps from a raw depth frame.
    pub fn from_depth(depth: &DepthImage, params: &ReconstructionParams) -> Self {
        let (width, height) = depth.dimensions();
        let metres = depth_in_metres(depth, params.depth_factor, params.truncate_threshold);
        let filtered = bilateral_filter(&metres, width, height, &params.bilateral);
        let points = vertex_map(&filtered, width, height, &params.intrinsic);
        let normals = normal_map(&points, width, height);
        Self {
            width,
            height,
            points,
            normals,
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

fn depth_in_metres(depth: &DepthImage, depth_factor: f32, truncate_threshold: f32) -> Vec<f32> {
    let inv = 1.0 / depth_factor;
    depth
        .as_raw()
        .iter()
        .map(|&raw| {
            let z = raw as f32 * inv;
            if truncate_threshold > 0.0 && z > truncate_threshold {
                0.0
            } else {
                z
            }
        })
        .collect()
}

/// Edge-preserving smoothing; invalid (zero) samples stay invalid and never
/// contribute to their neighbours.
fn bilateral_filter(depth: &[f32], width: u32, height: u32, params: &BilateralParams) -> Vec<f32> {
    let radius = (params.kernel_size / 2) as i64;
    if radius == 0 || params.sigma_depth <= 0.0 || params.sigma_spatial <= 0.0 {
        return depth.to_vec();
    }
    let spatial = -0.5 / (params.sigma_spatial * params.sigma_spatial);
    let range = -0.5 / (params.sigma_depth * params.sigma_depth);
    let (w, h) = (width as i64, height as i64);

    let mut out = vec![0.0; depth.len()];
    for y in 0..h {
        for x in 0..w {
            let center = depth[(y * w + x) as usize];
            if center <= 0.0 {
                continue;
            }
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for dy in -radius..=radius {
                let ny = y + dy;
                if ny < 0 || ny >= h {
                    continue;
                }
                for dx in -radius..=radius {
                    let nx = x + dx;
                    if nx < 0 || nx >= w {
                        continue;
                    }
                    let d = depth[(ny * w + nx) as usize];
                    if d <= 0.0 {
                        continue;
                    }
                    let dist2 = (dx * dx + dy * dy) as f32;
                    let diff = d - center;
                    let weight = (dist2 * spatial + diff * diff * range).exp();
                    sum += d * weight;
                    weight_sum += weight;
                }
            }
            out[(y * w + x) as usize] = sum / weight_sum;
        }
    }
    out
}

fn vertex_map(depth: &[f32], width: u32, height: u32, intrinsic: &CameraIntrinsic) -> Vec<Option<Vec3>> {
    let mut points = Vec::with_capacity(depth.len());
    for v in 0..height {
        for u in 0..width {
            let z = depth[(v * width + u) as usize];
            points.push((z > 0.0).then(|| intrinsic.unproject(u as f32, v as f32, z)));
        }
    }
    points
}

/// Normals from forward differences, oriented towards the camera.
fn normal_map(points: &[Option<Vec3>], width: u32, height: u32) -> Vec<Option<Vec3>> {
    let at = |x: u32, y: u32| points[(y * width + x) as usize];
    let mut normals = vec![None; points.len()];
    for y in 0..height.saturating_sub(1) {
        for x in 0..width.saturating_sub(1) {
            let (Some(p), Some(px), Some(py)) = (at(x, y), at(x + 1, y), at(x, y + 1)) else {
                continue;
            };
            let n = (px - p).cross(py - p).normalize_or_zero();
            if n == Vec3::ZERO {
                continue;
            }
            normals[(y * width + x) as usize] = Some(if n.dot(p) > 0.0 { -n } else { n });
        }
    }
    normals
}
