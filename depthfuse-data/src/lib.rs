//! Depthfuse Data Crate
//!
//! Point cloud types and PLY serialization shared by the capture, reconstruction
//! and application crates. This crate has no camera or fusion knowledge; it only
//! describes clouds and moves them to and from disk.

pub mod ply;
pub mod types;

pub use ply::{PlyError, load_points_from_ply, save_points, write_points};
pub use types::{PointFormat, PointFrame, SurfaceCloud};
