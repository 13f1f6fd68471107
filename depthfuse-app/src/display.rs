//! Conversions from session images to displayable ones.

use depthfuse_recon::ingest::{ColorImage, DepthImage, GrayImage};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel};

/// Depth to 8-bit grey at 1/8 of the raw value, saturating.
pub fn depth_preview(depth: &DepthImage) -> GrayImage {
    GrayImage::from_fn(depth.width(), depth.height(), |x, y| {
        let v = depth.get_pixel(x, y).0[0] / 8;
        Luma([v.min(u8::MAX as u16) as u8])
    })
}

/// Color with the depth footprint highlighted in green.
///
/// Depth is sampled nearest-neighbour when the grids differ in size.
pub fn depth_overlay(color: &ColorImage, depth: &DepthImage) -> ColorImage {
    let mut out = color.clone();
    let (cw, ch) = color.dimensions();
    let (dw, dh) = depth.dimensions();
    if dw == 0 || dh == 0 {
        return out;
    }
    for (x, y, px) in out.enumerate_pixels_mut() {
        let dx = (x as u64 * dw as u64 / cw as u64) as u32;
        let dy = (y as u64 * dh as u64 / ch as u64) as u32;
        if depth.get_pixel(dx, dy).0[0] > 0 {
            px.0[1] = px.0[1].saturating_add(80);
        }
    }
    out
}

/// Resize by `scale`; a scale of 1 (or a degenerate one) returns a copy.
pub fn scaled<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, scale: f32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (w, h) = image.dimensions();
    let sw = (w as f32 * scale).round() as u32;
    let sh = (h as f32 * scale).round() as u32;
    if scale <= 0.0 || (sw, sh) == (w, h) || sw == 0 || sh == 0 {
        return image.clone();
    }
    imageops::resize(image, sw, sh, FilterType::Triangle)
}
