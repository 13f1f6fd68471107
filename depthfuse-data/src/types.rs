//! Core data types for point clouds.
//!
//! `PointFrame` is a raw per-frame cloud as produced by a camera (one vertex per
//! depth pixel, optionally colored). `SurfaceCloud` is a cloud sampled from a
//! fused surface model, carrying normals instead of colors.

use glam::Vec3;
use std::fmt;

/// Vertex layout of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointFormat {
    /// Positions only.
    Xyz,
    /// Positions plus 8-bit RGB color.
    XyzRgb,
}

impl PointFormat {
    /// Whether vertices of this format carry a color.
    pub fn has_color(self) -> bool {
        matches!(self, PointFormat::XyzRgb)
    }

    /// Conventional export file name for this format.
    pub fn default_file_name(self) -> &'static str {
        match self {
            PointFormat::Xyz => "depth.ply",
            PointFormat::XyzRgb => "color.ply",
        }
    }
}

impl fmt::Display for PointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointFormat::Xyz => write!(f, "XYZ"),
            PointFormat::XyzRgb => write!(f, "XYZRGB"),
        }
    }
}

/// A raw point cloud computed from a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFrame {
    pub format: PointFormat,
    pub positions: Vec<Vec3>,
    /// Per-vertex color, same length as `positions` for `XyzRgb`, empty for `Xyz`.
    pub colors: Vec<[u8; 3]>,
}

impl PointFrame {
    /// Create a position-only cloud.
    pub fn xyz(positions: Vec<Vec3>) -> Self {
        Self {
            format: PointFormat::Xyz,
            positions,
            colors: Vec::new(),
        }
    }

    /// Create a colored cloud.
    ///
    /// Colors are padded with black or truncated so every vertex has exactly one.
    pub fn xyz_rgb(positions: Vec<Vec3>, mut colors: Vec<[u8; 3]>) -> Self {
        colors.resize(positions.len(), [0, 0, 0]);
        Self {
            format: PointFormat::XyzRgb,
            positions,
            colors,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Color of vertex `index`, if this cloud is colored.
    pub fn color(&self, index: usize) -> Option<[u8; 3]> {
        if self.format.has_color() {
            self.colors.get(index).copied()
        } else {
            None
        }
    }
}

/// Points and normals sampled from a reconstructed surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceCloud {
    pub points: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl SurfaceCloud {
    pub fn new(points: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        Self { points, normals }
    }

    /// An empty cloud (no surface reconstructed yet).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds of the points, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.points.first()?;
        Some(
            self.points
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }
}
