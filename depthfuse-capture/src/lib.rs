//! Depthfuse Capture - depth camera access
//!
//! This crate provides the [`DepthCamera`] trait the session drives and the
//! cameras implementing it:
//!
//! - [`ReplayCamera`]: recorded session directories
//! - [`SyntheticCamera`]: generated flat-plane scenes
//!
//! [`FrameAcquirer`] turns a camera's raw frame sets into depth and color
//! images for the reconstruction side.
//!
//! ## Example
//!
//! ```ignore
//! use depthfuse_capture::{FrameAcquirer, ReplayCamera, StreamRequirement};
//! use std::time::Duration;
//!
//! let camera = ReplayCamera::open("recordings/desk")?;
//! let mut acquirer = FrameAcquirer::new(Box::new(camera), StreamRequirement::DepthOnly);
//! while let Some(frames) = acquirer.acquire(Duration::from_millis(100))? {
//!     // Process frames...
//! }
//! ```

mod acquire;
mod decode;
mod frame;
mod point_cloud;
mod profile;
mod replay;
mod source;
mod synthetic;

pub use acquire::{AcquireError, AcquiredFrames, FrameAcquirer, StreamRequirement};
pub use decode::{DecodeError, decode_color, decode_depth};
pub use frame::{FramePayload, FrameSet, PixelFormat, RawFrame, StreamKind};
pub use point_cloud::depth_to_points;
pub use profile::{AlignMode, ProfileError, StreamConfig, StreamProfile, select_profile};
pub use replay::{MANIFEST_FILE, ReplayCamera, SessionManifest, write_session};
pub use source::{CaptureError, DepthCamera, DeviceInfo};
pub use synthetic::SyntheticCamera;
