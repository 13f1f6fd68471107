//! Depth range truncation
//!
//! The fusion engines treat a zero sample as "no measurement". Clamping the
//! working range removes sensor noise and returns from outside the volume
//! before they reach the integrator.

use crate::ingest::DepthImage;

/// Working depth range in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min_mm: f32,
    pub max_mm: f32,
}

impl DepthRange {
    pub fn new(min_mm: f32, max_mm: f32) -> Self {
        Self { min_mm, max_mm }
    }

    /// Range thresholds in raw sample units for a frame with `value_scale`
    /// millimetres per unit.
    pub fn thresholds(&self, value_scale: f32) -> (u16, u16) {
        let scale = if value_scale > 0.0 { value_scale } else { 1.0 };
        // float -> int `as` saturates, which is the clamping we want
        ((self.min_mm / scale) as u16, (self.max_mm / scale) as u16)
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::new(0.0, 5000.0)
    }
}

/// Replacement values for samples outside the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TruncateDefaults {
    pub below: u16,
    pub above: u16,
}

/// Replace out-of-range samples in place.
///
/// Samples below `range.min_mm / value_scale` become `defaults.below`, samples
/// above `range.max_mm / value_scale` become `defaults.above`.
pub fn truncate_depth(
    depth: &mut DepthImage,
    range: &DepthRange,
    value_scale: f32,
    defaults: TruncateDefaults,
) {
    let (min_value, max_value) = range.thresholds(value_scale);
    for sample in depth.iter_mut() {
        let mut value = *sample;
        if value < min_value {
            value = defaults.below;
        }
        if value > max_value {
            value = defaults.above;
        }
        *sample = value;
    }
}

/// Fraction of non-zero samples.
pub fn valid_fraction(depth: &DepthImage) -> f32 {
    let total = depth.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let valid = depth.as_raw().iter().filter(|v| **v != 0).count();
    valid as f32 / total as f32
}
