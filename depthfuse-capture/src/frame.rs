//! Raw frames as delivered by a depth camera.

use std::fmt;

/// Which sensor a stream comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Depth,
    Color,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Depth => f.write_str("depth"),
            StreamKind::Color => f.write_str("color"),
        }
    }
}

/// Pixel layout of a raw frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit depth, one sample per pixel.
    Y16,
    /// 8-bit grey.
    Y8,
    Rgb,
    Bgr,
    /// Motion JPEG; the payload is a compressed image.
    Mjpg,
}

impl PixelFormat {
    /// Bytes per pixel of an uncompressed payload, `None` for compressed formats.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Y16 => Some(2),
            PixelFormat::Y8 => Some(1),
            PixelFormat::Rgb | PixelFormat::Bgr => Some(3),
            PixelFormat::Mjpg => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Y16 => "Y16",
            PixelFormat::Y8 => "Y8",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Mjpg => "MJPG",
        };
        f.write_str(name)
    }
}

/// Frame payload as handed over by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Bytes(Vec<u8>),
    /// Depth already unpacked into native 16-bit samples.
    Words(Vec<u16>),
}

impl FramePayload {
    pub fn byte_len(&self) -> usize {
        match self {
            FramePayload::Bytes(b) => b.len(),
            FramePayload::Words(w) => w.len() * 2,
        }
    }
}

/// One stream's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub payload: FramePayload,
    /// Device timestamp in microseconds.
    pub timestamp_us: u64,
    /// Millimetres per depth unit; 1.0 for color frames.
    pub value_scale: f32,
}

impl RawFrame {
    /// Payload size implied by the frame geometry, `None` for compressed formats.
    pub fn expected_len(&self) -> Option<usize> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }
}

/// Frames captured together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub index: u64,
    pub depth: Option<RawFrame>,
    pub color: Option<RawFrame>,
}

impl FrameSet {
    pub fn frame(&self, kind: StreamKind) -> Option<&RawFrame> {
        match kind {
            StreamKind::Depth => self.depth.as_ref(),
            StreamKind::Color => self.color.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_len() {
        let frame = RawFrame {
            format: PixelFormat::Y16,
            width: 4,
            height: 3,
            payload: FramePayload::Words(vec![0; 12]),
            timestamp_us: 0,
            value_scale: 1.0,
        };
        assert_eq!(frame.expected_len(), Some(24));
        assert_eq!(frame.payload.byte_len(), 24);

        let jpeg = RawFrame {
            format: PixelFormat::Mjpg,
            payload: FramePayload::Bytes(vec![0xff, 0xd8]),
            ..frame
        };
        assert_eq!(jpeg.expected_len(), None);
    }

    #[test]
    fn test_frame_lookup() {
        let set = FrameSet::default();
        assert!(set.frame(StreamKind::Depth).is_none());
        assert_eq!(StreamKind::Color.to_string(), "color");
    }
}
