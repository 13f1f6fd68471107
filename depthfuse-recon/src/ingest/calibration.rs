//! Camera calibration as read from a device

use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of one sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsic {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsic {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// True when the sensor reports a usable frame size.
    pub fn has_frame(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Back-project pixel `(u, v)` at depth `z` into camera space.
    #[inline]
    pub fn unproject(&self, u: f32, v: f32, z: f32) -> Vec3 {
        Vec3::new((u - self.cx) * z / self.fx, (v - self.cy) * z / self.fy, z)
    }

    /// Project a camera-space point onto the image plane.
    ///
    /// Returns `None` for points at or behind the camera.
    #[inline]
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Vec2::new(
            p.x * self.fx / p.z + self.cx,
            p.y * self.fy / p.z + self.cy,
        ))
    }

    /// The 3x3 camera matrix K.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.fx, 0.0, 0.0),
            Vec3::new(0.0, self.fy, 0.0),
            Vec3::new(self.cx, self.cy, 1.0),
        )
    }
}

/// Rational radial + tangential lens distortion (OpenCV 8-coefficient model).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraDistortion {
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    pub k4: f32,
    pub k5: f32,
    pub k6: f32,
    pub p1: f32,
    pub p2: f32,
}

impl CameraDistortion {
    /// Coefficients in OpenCV order `k1, k2, p1, p2, k3, k4, k5, k6`.
    pub fn coefficients(&self) -> [f32; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients().iter().all(|c| *c == 0.0)
    }

    /// Distort a normalized image coordinate.
    pub fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }
}

/// Rigid transform from the depth sensor frame to the color sensor frame.
///
/// Translation is in millimetres, matching the depth unit of the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Extrinsic {
    pub fn identity() -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            translation: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }
}

impl Default for Extrinsic {
    fn default() -> Self {
        Self::identity()
    }
}

/// Complete calibration of a depth + color camera.
///
/// When depth-to-color alignment is active the device reports the depth
/// intrinsic on the color pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub depth_intrinsic: CameraIntrinsic,
    pub color_intrinsic: CameraIntrinsic,
    #[serde(default)]
    pub depth_distortion: CameraDistortion,
    #[serde(default)]
    pub color_distortion: CameraDistortion,
    #[serde(default)]
    pub depth_to_color: Extrinsic,
}

impl CameraCalibration {
    /// Calibration with no distortion and coincident sensors.
    pub fn pinhole(depth_intrinsic: CameraIntrinsic, color_intrinsic: CameraIntrinsic) -> Self {
        Self {
            depth_intrinsic,
            color_intrinsic,
            depth_distortion: CameraDistortion::default(),
            color_distortion: CameraDistortion::default(),
            depth_to_color: Extrinsic::identity(),
        }
    }

    /// True when depth and color share one pixel grid.
    pub fn is_registered(&self) -> bool {
        self.depth_intrinsic == self.color_intrinsic && self.depth_to_color == Extrinsic::identity()
    }
}
