//! Per-image frame data: keypoints, descriptors, the image itself and the
//! camera that captured it.

use crate::camera::CameraModelError;

pub mod channels;
pub mod visual_frame;

pub use channels::{channel_names, Channel, ChannelGroup, ChannelValue, DescriptorsT, FrameImage};
pub use visual_frame::VisualFrame;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Channel {0} is not present in the frame")]
    MissingChannel(String),
    #[error("Channel {channel} holds {found}, not {expected}")]
    ChannelTypeMismatch {
        channel: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Channel {0} already exists")]
    ChannelAlreadyExists(String),
    #[error("Index {index} is out of range for channel {channel} with {len} entries")]
    IndexOutOfRange {
        channel: String,
        index: usize,
        len: usize,
    },
    #[error("Channel {channel} has {found} entries but the frame has {expected} keypoints")]
    KeypointCountMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },
    #[error("The frame has no camera geometry")]
    MissingCamera,
    #[error(transparent)]
    Camera(#[from] CameraModelError),
}
