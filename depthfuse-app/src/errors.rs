//! Session error taxonomy.

use crate::export::ExportError;
use crate::viewer::ViewerError;
use depthfuse_capture::{AcquireError, CaptureError, ProfileError};
use depthfuse_recon::GeometryError;
use depthfuse_recon::fusion::FusionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("configuration error: {0}")]
    Profile(#[from] ProfileError),

    #[error("device error: {0}")]
    Device(#[from] CaptureError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("fusion error: {0}")]
    Fusion(#[from] FusionError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("viewer error: {0}")]
    Viewer(#[from] ViewerError),

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session has to stop.
    ///
    /// Configuration and device faults are fatal; everything else costs at
    /// most one cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Geometry(_) | SessionError::Profile(_) | SessionError::Device(_) => true,
            SessionError::Acquire(e) => e.is_fatal(),
            SessionError::Terminal(_) => true,
            SessionError::Fusion(_) | SessionError::Export(_) | SessionError::Viewer(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthfuse_capture::StreamKind;

    #[test]
    fn test_fatality() {
        let missing: SessionError = AcquireError::MissingStream(StreamKind::Color).into();
        assert!(!missing.is_fatal());

        let device: SessionError =
            AcquireError::Device(CaptureError::Disconnected("usb".into())).into();
        assert!(device.is_fatal());

        let profile: SessionError = ProfileError::NoProfiles(StreamKind::Depth).into();
        assert!(profile.is_fatal());

        let fusion: SessionError = FusionError::MissingColor.into();
        assert!(!fusion.is_fatal());
    }
}
