//! Camera Rig Tools Library
//!
//! Geometry building blocks for multi-camera visual systems:
//! - Lens distortion models (radial-tangential and equidistant) with analytic
//!   Jacobians and iterative undistortion
//! - A pinhole [`Camera`] composing intrinsics, resolution and distortion,
//!   loadable from Kalibr-style YAML files
//! - [`NCameras`] rigs of cameras with their body-to-camera transforms
//! - [`VisualFrame`] containers for keypoints, descriptors and images
//!
//! Cameras are shared between rigs and frames through `Arc`.

pub mod camera;
pub mod distortion;
pub mod frame;
pub mod geometry;
pub mod id;
pub mod rig;
pub mod util;

// Re-export commonly used types
pub use camera::{Camera, CameraModelError, Intrinsics, ProjectionResult, Resolution};
pub use distortion::{
    Distortion, DistortionError, DistortionModel, DistortionType, EquidistantDistortion,
    NullDistortion, RadTanDistortion,
};
pub use frame::{FrameError, VisualFrame};
pub use id::{CameraId, FrameId, NCamerasId};
pub use rig::{NCameras, RigError};
