//! Camera geometry: intrinsics, image resolution, projection status codes and
//! the [`Camera`] type that composes a pinhole projection with a lens
//! [`DistortionModel`](crate::distortion::DistortionModel).

use crate::distortion::DistortionError;
use serde::{Deserialize, Serialize};

pub mod pinhole;

pub use pinhole::Camera;

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Input point is outside the image")]
    PointIsOutSideImage,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Distortion(#[from] DistortionError),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Outcome of projecting a 3D point into a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionResult {
    /// The keypoint lies inside the image box.
    KeypointVisible,
    /// The point is in front of the camera but projects outside the image box.
    KeypointOutsideImageBox,
    /// The point has a negative depth.
    PointBehindCamera,
    /// The projection is undefined, e.g. the point lies in the plane of the camera center.
    ProjectionInvalid,
}

impl ProjectionResult {
    pub fn is_keypoint_visible(&self) -> bool {
        matches!(self, ProjectionResult::KeypointVisible)
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0)
            || !intrinsics.fx.is_finite()
            || !intrinsics.fy.is_finite()
        {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }

    pub fn validate_resolution(resolution: &Resolution) -> Result<(), CameraModelError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(CameraModelError::InvalidParams(format!(
                "Resolution must be non-zero, got {}x{}",
                resolution.width, resolution.height
            )));
        }
        Ok(())
    }

}
