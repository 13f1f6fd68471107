//! Stream profile negotiation.

use crate::frame::{PixelFormat, StreamKind};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{0} sensor lists no stream profiles")]
    NoProfiles(StreamKind),
}

/// A mode a sensor can stream in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProfile {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {} @ {} fps", self.width, self.height, self.format, self.fps)
    }
}

/// Pick the profile matching `width`, `format` and `fps` (any height).
///
/// Falls back to the first listed profile, which devices report as their
/// default.
pub fn select_profile(
    kind: StreamKind,
    profiles: &[StreamProfile],
    width: u32,
    format: PixelFormat,
    fps: u32,
) -> Result<StreamProfile, ProfileError> {
    let first = profiles.first().ok_or(ProfileError::NoProfiles(kind))?;
    let selected = match profiles
        .iter()
        .find(|p| p.width == width && p.format == format && p.fps == fps)
    {
        Some(profile) => *profile,
        None => {
            warn!(
                "no {} profile {}x? {} @ {} fps, using default {}",
                kind, width, format, fps, first
            );
            *first
        }
    };
    info!("{} profile: {}", kind, selected);
    Ok(selected)
}

/// How depth and color pixels relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignMode {
    #[default]
    Disabled,
    /// The device registers depth onto the color grid.
    HardwareAligned,
    /// The driver registers depth onto the color grid on the host.
    SoftwareAligned,
}

impl AlignMode {
    pub fn is_aligned(self) -> bool {
        !matches!(self, AlignMode::Disabled)
    }
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(AlignMode::Disabled),
            "hardware" | "hw" => Ok(AlignMode::HardwareAligned),
            "software" | "sw" => Ok(AlignMode::SoftwareAligned),
            other => Err(format!("unknown align mode '{}'", other)),
        }
    }
}

/// Streams to start.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub depth: StreamProfile,
    pub color: Option<StreamProfile>,
    pub align: AlignMode,
}
