//! PLY serialization for point clouds

mod loader;
mod writer;

pub use loader::load_points_from_ply;
pub use writer::{save_points, write_points};

use thiserror::Error;

/// Errors raised while reading or writing PLY files.
#[derive(Debug, Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY parsing error: {0}")]
    Parse(String),

    #[error("Missing '{property}' at vertex {index}")]
    MissingProperty { property: &'static str, index: usize },
}
