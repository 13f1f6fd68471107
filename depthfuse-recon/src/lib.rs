//! Depthfuse reconstruction crate
//!
//! Everything between a decoded frame pair and a fused surface:
//!
//! - [`ingest`]: calibration types and the depth/color image aliases
//! - [`geometry`]: reconstruction parameters and lens undistortion
//! - [`conditioning`]: depth range truncation
//! - [`fusion`]: volumetric fusion engines and the tracking controller

pub mod conditioning;
pub mod fusion;
pub mod geometry;
pub mod ingest;

pub use conditioning::{DepthRange, TruncateDefaults, truncate_depth};
pub use fusion::{Fusion, FusionMode, FusionOutcome, FusionState, ResetPolicy};
pub use geometry::{CameraGeometry, GeometryError, Quality, ReconstructionParams};
pub use ingest::{CameraCalibration, CameraIntrinsic, ColorImage, DepthImage};
