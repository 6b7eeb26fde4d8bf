//! Multi-camera rigs.
//!
//! An [`NCameras`] rig holds an ordered set of cameras rigidly attached to a
//! common body frame together with the body-to-camera transform `T_C_B` of
//! each camera.

pub mod ncameras;

pub use ncameras::NCameras;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Camera index {index} is out of range for a rig with {len} cameras")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),
}
