//! Camera geometry
//!
//! Turns the device calibration into fusion-engine parameters and, when
//! requested, lens-distortion remap tables. Built once at startup and
//! read-only afterwards.

mod params;
mod undistort;

pub use params::{BilateralParams, DEPTH_FACTOR_MM, Quality, ReconstructionParams, VOLUME_SIZE_M};
pub use undistort::UndistortMap;

use crate::ingest::{CameraCalibration, CameraDistortion, CameraIntrinsic, ColorImage, DepthImage};
use thiserror::Error;
use tracing::{debug, info};

/// Calibration the reconstruction cannot work with.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("{sensor} intrinsic reports {width}x{height} (the camera may not support hardware D2C)")]
    InvalidIntrinsic {
        sensor: &'static str,
        width: u32,
        height: u32,
    },

    #[error("{sensor} intrinsic has non-positive focal length")]
    InvalidFocalLength { sensor: &'static str },
}

fn validate(sensor: &'static str, intrinsic: &CameraIntrinsic) -> Result<(), GeometryError> {
    if !intrinsic.has_frame() {
        return Err(GeometryError::InvalidIntrinsic {
            sensor,
            width: intrinsic.width,
            height: intrinsic.height,
        });
    }
    if intrinsic.fx <= 0.0 || intrinsic.fy <= 0.0 {
        return Err(GeometryError::InvalidFocalLength { sensor });
    }
    Ok(())
}

fn log_sensor(sensor: &str, intrinsic: &CameraIntrinsic, distortion: &CameraDistortion) {
    info!(
        "{} intr: {}x{}, fx={},fy={},cx={},cy={}",
        sensor,
        intrinsic.width,
        intrinsic.height,
        intrinsic.fx,
        intrinsic.fy,
        intrinsic.cx,
        intrinsic.cy
    );
    info!(
        "{} dist: k1={},k2={},k3={},k4={},k5={},k6={}, p1={},p2={}",
        sensor,
        distortion.k1,
        distortion.k2,
        distortion.k3,
        distortion.k4,
        distortion.k5,
        distortion.k6,
        distortion.p1,
        distortion.p2
    );
}

/// Session camera geometry.
#[derive(Debug, Clone)]
pub struct CameraGeometry {
    calibration: CameraCalibration,
    quality: Quality,
    depth_params: ReconstructionParams,
    colored_params: Option<ReconstructionParams>,
    depth_undistort: Option<UndistortMap>,
    color_undistort: Option<UndistortMap>,
}

impl CameraGeometry {
    /// Derive the session geometry from the device calibration.
    ///
    /// The depth sensor must report a frame size. Colored parameters are only
    /// derived when the color sensor reports one too.
    pub fn new(
        calibration: CameraCalibration,
        quality: Quality,
        undistort: bool,
    ) -> Result<Self, GeometryError> {
        validate("depth", &calibration.depth_intrinsic)?;
        log_sensor("depth", &calibration.depth_intrinsic, &calibration.depth_distortion);

        let color_ok = validate("color", &calibration.color_intrinsic).is_ok();
        if color_ok {
            log_sensor("color", &calibration.color_intrinsic, &calibration.color_distortion);
        } else {
            debug!("color intrinsic unavailable, colored fusion disabled");
        }

        let depth_params = ReconstructionParams::for_quality(quality, calibration.depth_intrinsic);
        let colored_params =
            color_ok.then(|| depth_params.clone().with_color(calibration.color_intrinsic));

        let (depth_undistort, color_undistort) = if undistort {
            (
                Some(UndistortMap::new(
                    &calibration.depth_intrinsic,
                    &calibration.depth_distortion,
                )),
                color_ok.then(|| {
                    UndistortMap::new(&calibration.color_intrinsic, &calibration.color_distortion)
                }),
            )
        } else {
            (None, None)
        };

        info!("<fusion params>\n{}", depth_params);
        if let Some(params) = &colored_params {
            debug!("<colored fusion params>\n{}", params);
        }

        Ok(Self {
            calibration,
            quality,
            depth_params,
            colored_params,
            depth_undistort,
            color_undistort,
        })
    }

    pub fn calibration(&self) -> &CameraCalibration {
        &self.calibration
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Parameters for depth-only fusion.
    pub fn depth_params(&self) -> &ReconstructionParams {
        &self.depth_params
    }

    /// Parameters for colored fusion.
    pub fn colored_params(&self) -> Result<&ReconstructionParams, GeometryError> {
        self.colored_params
            .as_ref()
            .ok_or(GeometryError::InvalidIntrinsic {
                sensor: "color",
                width: self.calibration.color_intrinsic.width,
                height: self.calibration.color_intrinsic.height,
            })
    }

    pub fn undistorts(&self) -> bool {
        self.depth_undistort.is_some()
    }

    /// Undistort depth; returns the input unchanged when undistortion is off.
    pub fn undistort_depth(&self, depth: DepthImage) -> DepthImage {
        match &self.depth_undistort {
            Some(map) if map.dimensions() == depth.dimensions() => map.remap_depth(&depth),
            _ => depth,
        }
    }

    /// Undistort color; returns the input unchanged when undistortion is off.
    pub fn undistort_color(&self, color: ColorImage) -> ColorImage {
        match &self.color_undistort {
            Some(map) if map.dimensions() == color.dimensions() => map.remap_color(&color),
            _ => color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration(depth_w: u32, color_w: u32) -> CameraCalibration {
        CameraCalibration::pinhole(
            CameraIntrinsic::new(500.0, 500.0, 320.0, 240.0, depth_w, 480),
            CameraIntrinsic::new(900.0, 900.0, 960.0, 540.0, color_w, 1080),
        )
    }

    #[test]
    fn test_zero_depth_width_is_configuration_error() {
        let err = CameraGeometry::new(calibration(0, 1920), Quality::Precise, false).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::InvalidIntrinsic { sensor: "depth", .. }
        ));
    }

    #[test]
    fn test_colored_params_require_color_sensor() {
        let geometry = CameraGeometry::new(calibration(640, 0), Quality::Coarse, false).unwrap();
        assert!(geometry.colored_params().is_err());
        assert_eq!(geometry.depth_params().frame_size, (640, 480));
        assert_eq!(geometry.quality(), Quality::Coarse);
    }

    #[test]
    fn test_colored_params_carry_both_sensors() {
        let geometry = CameraGeometry::new(calibration(640, 1920), Quality::Precise, false).unwrap();
        let params = geometry.colored_params().unwrap();
        assert_eq!(params.frame_size, (640, 480));
        assert_eq!(params.color_frame_size, Some((1920, 1080)));
    }

    #[test]
    fn test_undistort_passthrough_when_disabled() {
        let geometry = CameraGeometry::new(calibration(640, 1920), Quality::Precise, false).unwrap();
        assert!(!geometry.undistorts());
        let depth = crate::ingest::uniform_depth(4, 4, 9);
        assert_eq!(geometry.undistort_depth(depth.clone()), depth);
    }
}
