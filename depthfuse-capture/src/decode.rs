//! Raw payload to image buffer conversion.

use crate::frame::{FramePayload, PixelFormat, RawFrame, StreamKind};
use depthfuse_recon::ingest::{ColorImage, DepthImage};
use image::ImageFormat;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{kind} stream delivered unsupported format {format}")]
    Format { kind: StreamKind, format: PixelFormat },

    #[error("{kind} payload does not match format {format}")]
    Payload { kind: StreamKind, format: PixelFormat },

    #[error("failed to decode {kind} image: {source}")]
    Image {
        kind: StreamKind,
        #[source]
        source: image::ImageError,
    },
}

/// Truncate or zero-pad `samples` to the frame grid.
fn fit_to_grid<T: Copy + Default>(mut samples: Vec<T>, expected: usize, kind: StreamKind) -> Vec<T> {
    if samples.len() != expected {
        warn!(
            "{} payload holds {} samples, frame expects {}",
            kind,
            samples.len(),
            expected
        );
        samples.resize(expected, T::default());
    }
    samples
}

/// Decode a depth frame, taking ownership of its payload.
///
/// `Words` payloads become the image buffer as-is; `Bytes` payloads are
/// read as little-endian 16-bit samples.
pub fn decode_depth(frame: RawFrame) -> Result<DepthImage, DecodeError> {
    let kind = StreamKind::Depth;
    if frame.format != PixelFormat::Y16 {
        return Err(DecodeError::Format {
            kind,
            format: frame.format,
        });
    }
    let expected = frame.width as usize * frame.height as usize;
    let samples = match frame.payload {
        FramePayload::Words(words) => words,
        FramePayload::Bytes(bytes) => {
            if bytes.len() % 2 != 0 {
                warn!("depth payload has an odd byte count ({})", bytes.len());
            }
            let even = bytes.len() & !1;
            let mut words: Vec<u16> = bytemuck::pod_collect_to_vec(&bytes[..even]);
            words.iter_mut().for_each(|w| *w = u16::from_le(*w));
            words
        }
    };
    let samples = fit_to_grid(samples, expected, kind);
    DepthImage::from_raw(frame.width, frame.height, samples).ok_or(DecodeError::Payload {
        kind,
        format: frame.format,
    })
}

/// Decode a color frame into RGB, taking ownership of its payload.
pub fn decode_color(frame: RawFrame) -> Result<ColorImage, DecodeError> {
    let kind = StreamKind::Color;
    let format = frame.format;
    let FramePayload::Bytes(bytes) = frame.payload else {
        return Err(DecodeError::Payload { kind, format });
    };
    let pixels = frame.width as usize * frame.height as usize;

    let rgb = match format {
        PixelFormat::Mjpg => {
            let image = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
                .map_err(|source| DecodeError::Image { kind, source })?
                .into_rgb8();
            if image.dimensions() != (frame.width, frame.height) {
                warn!(
                    "decoded color is {:?}, frame reports {}x{}",
                    image.dimensions(),
                    frame.width,
                    frame.height
                );
            }
            return Ok(image);
        }
        PixelFormat::Rgb => fit_to_grid(bytes, pixels * 3, kind),
        PixelFormat::Bgr => {
            let mut bytes = fit_to_grid(bytes, pixels * 3, kind);
            bytes.chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
            bytes
        }
        PixelFormat::Y8 => fit_to_grid(bytes, pixels, kind)
            .into_iter()
            .flat_map(|g| [g, g, g])
            .collect(),
        PixelFormat::Y16 => return Err(DecodeError::Format { kind, format }),
    };
    ColorImage::from_raw(frame.width, frame.height, rgb).ok_or(DecodeError::Payload { kind, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(format: PixelFormat, width: u32, height: u32, payload: FramePayload) -> RawFrame {
        RawFrame {
            format,
            width,
            height,
            payload,
            timestamp_us: 0,
            value_scale: 1.0,
        }
    }

    #[test]
    fn test_depth_words_are_moved() {
        let words = vec![1u16, 2, 3, 4, 5, 6];
        let ptr = words.as_ptr();
        let depth = decode_depth(raw(PixelFormat::Y16, 3, 2, FramePayload::Words(words))).unwrap();
        assert_eq!(depth.as_raw().as_ptr(), ptr);
        assert_eq!(depth.get_pixel(2, 1).0, [6]);
    }

    #[test]
    fn test_depth_bytes_are_little_endian() {
        let bytes = vec![0x58, 0x02, 0x01, 0x00];
        let depth = decode_depth(raw(PixelFormat::Y16, 2, 1, FramePayload::Bytes(bytes))).unwrap();
        assert_eq!(depth.get_pixel(0, 0).0, [600]);
        assert_eq!(depth.get_pixel(1, 0).0, [1]);
    }

    #[test]
    fn test_short_depth_payload_is_padded() {
        let depth =
            decode_depth(raw(PixelFormat::Y16, 2, 2, FramePayload::Words(vec![7, 7, 7]))).unwrap();
        assert_eq!(depth.dimensions(), (2, 2));
        assert_eq!(depth.get_pixel(1, 1).0, [0]);
    }

    #[test]
    fn test_long_color_payload_is_truncated() {
        let bytes = vec![9u8; 4 * 3 + 5];
        let color = decode_color(raw(PixelFormat::Rgb, 2, 2, FramePayload::Bytes(bytes))).unwrap();
        assert_eq!(color.as_raw().len(), 12);
    }

    #[test]
    fn test_rgb_is_moved() {
        let bytes = vec![1u8, 2, 3, 4, 5, 6];
        let ptr = bytes.as_ptr();
        let color = decode_color(raw(PixelFormat::Rgb, 2, 1, FramePayload::Bytes(bytes))).unwrap();
        assert_eq!(color.as_raw().as_ptr(), ptr);
    }

    #[test]
    fn test_bgr_is_swizzled() {
        let bytes = vec![10u8, 20, 30];
        let color = decode_color(raw(PixelFormat::Bgr, 1, 1, FramePayload::Bytes(bytes))).unwrap();
        assert_eq!(color.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn test_grey_is_expanded() {
        let color =
            decode_color(raw(PixelFormat::Y8, 2, 1, FramePayload::Bytes(vec![5, 200]))).unwrap();
        assert_eq!(color.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_mjpg_is_decoded() {
        let source = ColorImage::from_pixel(8, 8, image::Rgb([250, 250, 250]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let color = decode_color(raw(PixelFormat::Mjpg, 8, 8, FramePayload::Bytes(jpeg))).unwrap();
        assert_eq!(color.dimensions(), (8, 8));
        assert!(color.get_pixel(4, 4).0[0] > 240);
    }

    #[test]
    fn test_garbage_mjpg_is_error() {
        let err = decode_color(raw(PixelFormat::Mjpg, 8, 8, FramePayload::Bytes(vec![1, 2, 3])))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Image { .. }));
    }

    #[test]
    fn test_depth_format_checked() {
        let err =
            decode_depth(raw(PixelFormat::Rgb, 1, 1, FramePayload::Bytes(vec![0; 3]))).unwrap_err();
        assert!(matches!(err, DecodeError::Format { .. }));
    }
}
