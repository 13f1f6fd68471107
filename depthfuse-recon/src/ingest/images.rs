//! Image buffer types exchanged between capture and reconstruction

use image::{ImageBuffer, Luma};

/// Dense 16-bit depth samples. Scale to millimetres with the frame's value scale.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// 8-bit RGB color image.
pub type ColorImage = image::RgbImage;

/// 8-bit single channel image.
pub type GrayImage = image::GrayImage;

/// Create a depth image with every sample set to `value`.
pub fn uniform_depth(width: u32, height: u32, value: u16) -> DepthImage {
    ImageBuffer::from_pixel(width, height, Luma([value]))
}
