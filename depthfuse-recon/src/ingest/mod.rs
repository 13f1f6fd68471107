//! Data ingestion types
//!
//! Shapes of the data a depth camera hands to the reconstruction side:
//! - Per-sensor calibration (intrinsics, distortion, depth→color extrinsic)
//! - Depth and color image buffers

pub mod calibration;
pub mod images;

pub use calibration::{CameraCalibration, CameraDistortion, CameraIntrinsic, Extrinsic};
pub use images::{ColorImage, DepthImage, GrayImage, uniform_depth};
