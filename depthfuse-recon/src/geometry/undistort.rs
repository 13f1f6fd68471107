//! Lens-distortion correction via precomputed remap tables

use crate::ingest::{CameraDistortion, CameraIntrinsic, ColorImage, DepthImage};
use image::{Luma, Rgb};

/// Per-pixel source coordinates for undistorting one sensor's images.
///
/// The rectification is identity and the undistorted image keeps the
/// original camera matrix, so downstream intrinsics stay valid.
#[derive(Debug, Clone)]
pub struct UndistortMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortMap {
    pub fn new(intrinsic: &CameraIntrinsic, distortion: &CameraDistortion) -> Self {
        let (width, height) = (intrinsic.width, intrinsic.height);
        let len = (width as usize) * (height as usize);
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);

        for v in 0..height {
            for u in 0..width {
                let x = (u as f32 - intrinsic.cx) / intrinsic.fx;
                let y = (v as f32 - intrinsic.cy) / intrinsic.fy;
                let (xd, yd) = distortion.distort(x, y);
                map_x.push(xd * intrinsic.fx + intrinsic.cx);
                map_y.push(yd * intrinsic.fy + intrinsic.cy);
            }
        }

        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Source coordinate for destination pixel `(u, v)`.
    pub fn source(&self, u: u32, v: u32) -> (f32, f32) {
        let i = (v * self.width + u) as usize;
        (self.map_x[i], self.map_y[i])
    }

    /// Undistort a depth image with nearest-neighbour sampling.
    ///
    /// Interpolating depth would invent samples across object boundaries.
    /// Pixels that map outside the source become 0.
    pub fn remap_depth(&self, src: &DepthImage) -> DepthImage {
        DepthImage::from_fn(self.width, self.height, |u, v| {
            let (sx, sy) = self.source(u, v);
            let (x, y) = (sx.round(), sy.round());
            if x < 0.0 || y < 0.0 || x >= src.width() as f32 || y >= src.height() as f32 {
                Luma([0])
            } else {
                *src.get_pixel(x as u32, y as u32)
            }
        })
    }

    /// Undistort a color image with bilinear sampling and a black border.
    pub fn remap_color(&self, src: &ColorImage) -> ColorImage {
        ColorImage::from_fn(self.width, self.height, |u, v| {
            let (sx, sy) = self.source(u, v);
            bilinear(src, sx, sy)
        })
    }
}

fn bilinear(src: &ColorImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |xi: i64, yi: i64| -> [f32; 3] {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            [0.0; 3]
        } else {
            let p = src.get_pixel(xi as u32, yi as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        }
    };

    let p00 = sample(x0, y0);
    let p10 = sample(x0 + 1, y0);
    let p01 = sample(x0, y0 + 1);
    let p11 = sample(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic::new(40.0, 40.0, 15.5, 11.5, 32, 24)
    }

    #[test]
    fn test_zero_distortion_is_identity() {
        let map = UndistortMap::new(&intrinsic(), &CameraDistortion::default());
        let depth = DepthImage::from_fn(32, 24, |x, y| Luma([(x * 100 + y) as u16]));
        assert_eq!(map.remap_depth(&depth), depth);

        let color = ColorImage::from_fn(32, 24, |x, y| Rgb([x as u8, y as u8, 7]));
        assert_eq!(map.remap_color(&color), color);
    }

    #[test]
    fn test_principal_point_is_fixed() {
        let distortion = CameraDistortion {
            k1: -0.3,
            k2: 0.1,
            p1: 0.001,
            ..Default::default()
        };
        let k = CameraIntrinsic::new(40.0, 40.0, 16.0, 12.0, 32, 24);
        let map = UndistortMap::new(&k, &distortion);
        let (sx, sy) = map.source(16, 12);
        assert!((sx - 16.0).abs() < 1e-4);
        assert!((sy - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_out_of_frame_depth_is_invalid() {
        let distortion = CameraDistortion {
            k1: 2.0,
            ..Default::default()
        };
        let map = UndistortMap::new(&intrinsic(), &distortion);
        let depth = DepthImage::from_pixel(32, 24, Luma([600]));
        let out = map.remap_depth(&depth);
        // Strong barrel distortion pulls corner pixels from outside the frame
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(16, 12).0[0], 600);
    }
}
