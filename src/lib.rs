//! Depthfuse
//!
//! Depth camera capture and volumetric fusion. The work is split across the
//! workspace crates; this crate re-exports them for the demos.

pub use depthfuse_capture as capture;
pub use depthfuse_data as data;
pub use depthfuse_recon as recon;
