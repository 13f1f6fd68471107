//! Sparse voxel volume
//!
//! Each occupied voxel keeps a weighted running mean of the surface samples
//! that fell into it. Measurements that disagree with a voxel by more than the
//! truncation distance wear its weight down instead of being averaged in, so
//! stale surfaces fade when the scene changes.

use crate::fusion::maps::FrameMaps;
use crate::geometry::ReconstructionParams;
use crate::ingest::{CameraIntrinsic, ColorImage};
use depthfuse_data::SurfaceCloud;
use glam::{Affine3A, UVec3, Vec3};
use image::Rgb;
use std::collections::HashMap;

/// Ambient term of the surface shading.
const AMBIENT: f32 = 0.2;
/// Largest splat half-size in pixels when projecting voxels.
const MAX_SPLAT_RADIUS: i32 = 6;

#[derive(Debug, Clone, Copy)]
struct Voxel {
    position: Vec3,
    normal: Vec3,
    color: Vec3,
    weight: f32,
}

/// Surface prediction for one camera pose: world-space points and normals per pixel.
#[derive(Debug, Clone)]
pub struct ModelMaps {
    pub width: u32,
    pub height: u32,
    pub points: Vec<Option<Vec3>>,
    pub normals: Vec<Option<Vec3>>,
    pub colors: Vec<Vec3>,
}

impl ModelMaps {
    pub fn coverage(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}

/// Sparse weighted voxel grid.
#[derive(Debug, Clone)]
pub struct VoxelVolume {
    dims: UVec3,
    voxel_size: f32,
    world_to_volume: Affine3A,
    truncation_distance: f32,
    max_weight: f32,
    voxels: HashMap<u64, Voxel>,
}

impl VoxelVolume {
    pub fn new(params: &ReconstructionParams) -> Self {
        Self {
            dims: params.volume_dims,
            voxel_size: params.voxel_size,
            world_to_volume: params.volume_pose.inverse(),
            truncation_distance: params.truncation_distance,
            max_weight: params.max_weight.max(1.0),
            voxels: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn clear(&mut self) {
        self.voxels.clear();
    }

    fn key(&self, world: Vec3) -> Option<u64> {
        let v = self.world_to_volume.transform_point3(world) / self.voxel_size;
        if v.x < 0.0 || v.y < 0.0 || v.z < 0.0 {
            return None;
        }
        let idx = v.floor().as_uvec3();
        if idx.x >= self.dims.x || idx.y >= self.dims.y || idx.z >= self.dims.z {
            return None;
        }
        let (dx, dy) = (self.dims.x as u64, self.dims.y as u64);
        Some(idx.x as u64 + dx * (idx.y as u64 + dy * idx.z as u64))
    }

    /// Integrate a frame observed from `camera_pose`.
    ///
    /// `colors` holds one linear RGB sample per pixel, or is empty for
    /// depth-only fusion.
    pub fn integrate(&mut self, frame: &FrameMaps, camera_pose: &Affine3A, colors: &[Vec3]) {
        for (i, point) in frame.points.iter().enumerate() {
            let Some(point) = point else { continue };
            let world = camera_pose.transform_point3(*point);
            let Some(key) = self.key(world) else { continue };
            let normal = frame.normals[i]
                .map(|n| camera_pose.transform_vector3(n))
                .unwrap_or(Vec3::ZERO);
            let color = colors.get(i).copied().unwrap_or(Vec3::ZERO);

            let max_weight = self.max_weight;
            let truncation = self.truncation_distance;
            self.voxels
                .entry(key)
                .and_modify(|voxel| {
                    if voxel.weight > 1.0 && (voxel.position - world).length() > truncation {
                        voxel.weight -= 1.0;
                        return;
                    }
                    let w = voxel.weight;
                    voxel.position = (voxel.position * w + world) / (w + 1.0);
                    voxel.normal = (voxel.normal * w + normal) / (w + 1.0);
                    voxel.color = (voxel.color * w + color) / (w + 1.0);
                    voxel.weight = (w + 1.0).min(max_weight);
                })
                .or_insert(Voxel {
                    position: world,
                    normal,
                    color,
                    weight: 1.0,
                });
        }
    }

    /// Extract the surface as points and unit normals, in a stable order.
    pub fn cloud(&self) -> SurfaceCloud {
        let mut keys: Vec<u64> = self.voxels.keys().copied().collect();
        keys.sort_unstable();
        let mut points = Vec::with_capacity(keys.len());
        let mut normals = Vec::with_capacity(keys.len());
        for key in keys {
            let voxel = &self.voxels[&key];
            points.push(voxel.position);
            normals.push(voxel.normal.normalize_or_zero());
        }
        SurfaceCloud::new(points, normals)
    }

    /// Predict the surface seen from `camera_pose` by splatting voxels into
    /// the image with a depth test.
    pub fn predict(
        &self,
        camera_pose: &Affine3A,
        intrinsic: &CameraIntrinsic,
        width: u32,
        height: u32,
    ) -> ModelMaps {
        let len = (width as usize) * (height as usize);
        let mut zbuf = vec![f32::INFINITY; len];
        let mut points = vec![None; len];
        let mut normals = vec![None; len];
        let mut colors = vec![Vec3::ZERO; len];
        let world_to_camera = camera_pose.inverse();

        for voxel in self.voxels.values() {
            let cam = world_to_camera.transform_point3(voxel.position);
            let Some(pixel) = intrinsic.project(cam) else {
                continue;
            };
            let footprint = self.voxel_size * intrinsic.fx / cam.z;
            let radius = ((footprint * 0.5).ceil() as i32 - 1).clamp(0, MAX_SPLAT_RADIUS);
            let (cx, cy) = (pixel.x.round() as i32, pixel.y.round() as i32);
            let normal = voxel.normal.normalize_or_zero();

            for y in (cy - radius)..=(cy + radius) {
                if y < 0 || y >= height as i32 {
                    continue;
                }
                for x in (cx - radius)..=(cx + radius) {
                    if x < 0 || x >= width as i32 {
                        continue;
                    }
                    let i = (y as u32 * width + x as u32) as usize;
                    if cam.z < zbuf[i] {
                        zbuf[i] = cam.z;
                        points[i] = Some(voxel.position);
                        normals[i] = (normal != Vec3::ZERO).then_some(normal);
                        colors[i] = voxel.color;
                    }
                }
            }
        }

        ModelMaps {
            width,
            height,
            points,
            normals,
            colors,
        }
    }

    /// Shade a surface prediction.
    ///
    /// Depth-only volumes render grey, colored volumes modulate their color.
    pub fn shade(maps: &ModelMaps, light: Vec3, colored: bool) -> ColorImage {
        ColorImage::from_fn(maps.width, maps.height, |x, y| {
            let i = (y * maps.width + x) as usize;
            let Some(point) = maps.points[i] else {
                return Rgb([0, 0, 0]);
            };
            let diffuse = maps.normals[i]
                .map(|n| n.dot((light - point).normalize_or_zero()).abs())
                .unwrap_or(0.0);
            let intensity = AMBIENT + (1.0 - AMBIENT) * diffuse;
            let base = if colored { maps.colors[i] } else { Vec3::ONE };
            let c = (base * intensity * 255.0).clamp(Vec3::ZERO, Vec3::splat(255.0));
            Rgb([c.x as u8, c.y as u8, c.z as u8])
        })
    }
}
