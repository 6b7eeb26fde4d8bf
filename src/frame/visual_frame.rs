//! The per-image container tying keypoint channels to the camera that took the image.

use crate::camera::Camera;
use crate::frame::channels::{channel_names, Channel, ChannelGroup, ChannelValue, DescriptorsT, FrameImage};
use crate::frame::FrameError;
use crate::id::FrameId;
use log::debug;
use nalgebra::{DVector, Matrix2xX, Vector2, Vector3};
use std::any::{type_name, Any};
use std::sync::Arc;

/// One image from one camera together with everything extracted from it.
///
/// Keypoint data lives in named channels. The per-keypoint channels
/// (measurements, uncertainties, orientations, scales and descriptors) must
/// agree on the number of keypoints; the setters refuse data that would break
/// that. The mutable getters hand out the stored matrix directly, so callers
/// resizing through them are responsible for keeping the channels in step.
///
/// Timestamps are integer nanoseconds. The camera geometry is shared with the
/// rig that owns the camera.
#[derive(Debug, Clone, Default)]
pub struct VisualFrame {
    id: FrameId,
    timestamp_ns: i64,
    hardware_timestamp_ns: i64,
    system_timestamp_ns: i64,
    channels: ChannelGroup,
    camera_geometry: Option<Arc<Camera>>,
}

impl VisualFrame {
    pub fn new(id: FrameId, camera_geometry: Arc<Camera>) -> Self {
        VisualFrame {
            id,
            camera_geometry: Some(camera_geometry),
            ..Default::default()
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn set_id(&mut self, id: FrameId) {
        self.id = id;
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp_ns
    }

    pub fn set_timestamp(&mut self, timestamp_ns: i64) {
        self.timestamp_ns = timestamp_ns;
    }

    /// Timestamp assigned by the sensor clock.
    pub fn hardware_timestamp(&self) -> i64 {
        self.hardware_timestamp_ns
    }

    pub fn set_hardware_timestamp(&mut self, timestamp_ns: i64) {
        self.hardware_timestamp_ns = timestamp_ns;
    }

    /// Timestamp assigned by the host when the image arrived.
    pub fn system_timestamp(&self) -> i64 {
        self.system_timestamp_ns
    }

    pub fn set_system_timestamp(&mut self, timestamp_ns: i64) {
        self.system_timestamp_ns = timestamp_ns;
    }

    pub fn has_camera_geometry(&self) -> bool {
        self.camera_geometry.is_some()
    }

    pub fn camera_geometry(&self) -> Result<&Arc<Camera>, FrameError> {
        self.camera_geometry.as_ref().ok_or(FrameError::MissingCamera)
    }

    pub fn set_camera_geometry(&mut self, camera: Arc<Camera>) {
        self.camera_geometry = Some(camera);
    }

    pub fn has_keypoint_measurements(&self) -> bool {
        self.channels.has_channel(channel_names::KEYPOINT_MEASUREMENTS)
    }

    pub fn has_keypoint_measurement_uncertainties(&self) -> bool {
        self.channels
            .has_channel(channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES)
    }

    pub fn has_keypoint_orientations(&self) -> bool {
        self.channels.has_channel(channel_names::KEYPOINT_ORIENTATIONS)
    }

    pub fn has_keypoint_scales(&self) -> bool {
        self.channels.has_channel(channel_names::KEYPOINT_SCALES)
    }

    pub fn has_descriptors(&self) -> bool {
        self.channels.has_channel(channel_names::DESCRIPTORS)
    }

    pub fn has_image(&self) -> bool {
        self.channels.has_channel(channel_names::RAW_IMAGE)
    }

    /// Keypoint pixel coordinates, one column per keypoint.
    pub fn get_keypoint_measurements(&self) -> Result<&Matrix2xX<f64>, FrameError> {
        self.channels
            .get_channel_data(channel_names::KEYPOINT_MEASUREMENTS)
    }

    pub fn get_keypoint_measurement_uncertainties(&self) -> Result<&DVector<f64>, FrameError> {
        self.channels
            .get_channel_data(channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES)
    }

    pub fn get_keypoint_orientations(&self) -> Result<&DVector<f64>, FrameError> {
        self.channels
            .get_channel_data(channel_names::KEYPOINT_ORIENTATIONS)
    }

    pub fn get_keypoint_scales(&self) -> Result<&DVector<f64>, FrameError> {
        self.channels.get_channel_data(channel_names::KEYPOINT_SCALES)
    }

    /// Keypoint descriptors, one column of bytes per keypoint.
    pub fn get_descriptors(&self) -> Result<&DescriptorsT, FrameError> {
        self.channels.get_channel_data(channel_names::DESCRIPTORS)
    }

    pub fn get_image(&self) -> Result<&FrameImage, FrameError> {
        self.channels.get_channel_data(channel_names::RAW_IMAGE)
    }

    pub fn get_keypoint_measurements_mut(&mut self) -> Result<&mut Matrix2xX<f64>, FrameError> {
        self.channels
            .get_channel_data_mut(channel_names::KEYPOINT_MEASUREMENTS)
    }

    pub fn get_keypoint_measurement_uncertainties_mut(
        &mut self,
    ) -> Result<&mut DVector<f64>, FrameError> {
        self.channels
            .get_channel_data_mut(channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES)
    }

    pub fn get_keypoint_orientations_mut(&mut self) -> Result<&mut DVector<f64>, FrameError> {
        self.channels
            .get_channel_data_mut(channel_names::KEYPOINT_ORIENTATIONS)
    }

    pub fn get_keypoint_scales_mut(&mut self) -> Result<&mut DVector<f64>, FrameError> {
        self.channels
            .get_channel_data_mut(channel_names::KEYPOINT_SCALES)
    }

    pub fn get_descriptors_mut(&mut self) -> Result<&mut DescriptorsT, FrameError> {
        self.channels.get_channel_data_mut(channel_names::DESCRIPTORS)
    }

    pub fn get_image_mut(&mut self) -> Result<&mut FrameImage, FrameError> {
        self.channels.get_channel_data_mut(channel_names::RAW_IMAGE)
    }

    /// Stores the keypoint measurements, creating the channel if needed.
    ///
    /// # Errors
    ///
    /// [`FrameError::KeypointCountMismatch`] if another per-keypoint channel
    /// holds a different number of entries.
    pub fn set_keypoint_measurements(
        &mut self,
        measurements: Matrix2xX<f64>,
    ) -> Result<(), FrameError> {
        self.set_keypoint_channel(channel_names::KEYPOINT_MEASUREMENTS, Channel::Keypoints(measurements))
    }

    pub fn set_keypoint_measurement_uncertainties(
        &mut self,
        uncertainties: DVector<f64>,
    ) -> Result<(), FrameError> {
        self.set_keypoint_channel(
            channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES,
            Channel::Vector(uncertainties),
        )
    }

    pub fn set_keypoint_orientations(&mut self, orientations: DVector<f64>) -> Result<(), FrameError> {
        self.set_keypoint_channel(channel_names::KEYPOINT_ORIENTATIONS, Channel::Vector(orientations))
    }

    pub fn set_keypoint_scales(&mut self, scales: DVector<f64>) -> Result<(), FrameError> {
        self.set_keypoint_channel(channel_names::KEYPOINT_SCALES, Channel::Vector(scales))
    }

    pub fn set_descriptors(&mut self, descriptors: DescriptorsT) -> Result<(), FrameError> {
        self.set_keypoint_channel(channel_names::DESCRIPTORS, Channel::Descriptors(descriptors))
    }

    /// Stores the image handle. Frames cloned afterwards share the same pixels.
    pub fn set_image(&mut self, image: FrameImage) {
        self.channels
            .insert_channel(channel_names::RAW_IMAGE, Channel::Image(image));
    }

    pub fn get_keypoint_measurement(&self, index: usize) -> Result<Vector2<f64>, FrameError> {
        let measurements = self.get_keypoint_measurements()?;
        check_index(channel_names::KEYPOINT_MEASUREMENTS, index, measurements.ncols())?;
        Ok(measurements.column(index).into_owned())
    }

    pub fn get_keypoint_measurement_uncertainty(&self, index: usize) -> Result<f64, FrameError> {
        vector_entry(
            self.get_keypoint_measurement_uncertainties()?,
            channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES,
            index,
        )
    }

    pub fn get_keypoint_orientation(&self, index: usize) -> Result<f64, FrameError> {
        vector_entry(
            self.get_keypoint_orientations()?,
            channel_names::KEYPOINT_ORIENTATIONS,
            index,
        )
    }

    pub fn get_keypoint_scale(&self, index: usize) -> Result<f64, FrameError> {
        vector_entry(self.get_keypoint_scales()?, channel_names::KEYPOINT_SCALES, index)
    }

    /// The bytes of descriptor `index`.
    pub fn get_descriptor(&self, index: usize) -> Result<&[u8], FrameError> {
        let descriptors = self.get_descriptors()?;
        check_index(channel_names::DESCRIPTORS, index, descriptors.ncols())?;
        let bytes = descriptors.nrows();
        Ok(&descriptors.as_slice()[index * bytes..(index + 1) * bytes])
    }

    /// Unit bearing vector of keypoint `index` through the frame's camera.
    pub fn get_keypoint_bearing(&self, index: usize) -> Result<Vector3<f64>, FrameError> {
        let pixel = self.get_keypoint_measurement(index)?;
        Ok(self.camera_geometry()?.unproject(&pixel)?)
    }

    /// Number of keypoints, taken from the first per-keypoint channel present.
    pub fn num_keypoints(&self) -> usize {
        channel_names::KEYPOINT_CHANNELS
            .iter()
            .find_map(|name| self.channels.channel(name).and_then(Channel::keypoint_count))
            .unwrap_or(0)
    }

    /// Drops every per-keypoint channel. The image and custom channels stay.
    pub fn clear_keypoint_channels(&mut self) {
        for name in channel_names::KEYPOINT_CHANNELS {
            self.channels.remove_channel(name);
        }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.has_channel(name)
    }

    /// Adds a channel holding `T::default()`.
    ///
    /// The fixed channel names only accept their own type, and an empty
    /// per-keypoint channel is refused while the frame holds keypoints.
    pub fn add_channel<T: ChannelValue + Default>(&mut self, name: &str) -> Result<&mut T, FrameError> {
        if fixed_channel_type(name).is_none() {
            return self.channels.add_channel(name);
        }
        if self.channels.has_channel(name) {
            return Err(FrameError::ChannelAlreadyExists(name.to_string()));
        }
        self.set_channel_data(name, T::default())?;
        self.channels.get_channel_data_mut(name)
    }

    pub fn get_channel_data<T: Any>(&self, name: &str) -> Result<&T, FrameError> {
        self.channels.get_channel_data(name)
    }

    pub fn get_channel_data_mut<T: Any>(&mut self, name: &str) -> Result<&mut T, FrameError> {
        self.channels.get_channel_data_mut(name)
    }

    /// Stores `data` under `name`.
    ///
    /// Writes to a fixed channel name must carry that channel's type, and the
    /// per-keypoint ones go through the same count check as the dedicated setters.
    pub fn set_channel_data<T: ChannelValue>(&mut self, name: &str, data: T) -> Result<(), FrameError> {
        let channel = Channel::from_value(data);
        if let Some(expected) = fixed_channel_type(name) {
            let found = channel.value_type_name();
            if found != expected {
                return Err(FrameError::ChannelTypeMismatch {
                    channel: name.to_string(),
                    expected,
                    found,
                });
            }
            if channel_names::KEYPOINT_CHANNELS.contains(&name) {
                return self.set_keypoint_channel(name, channel);
            }
        }
        self.channels.insert_channel(name, channel);
        Ok(())
    }

    pub fn remove_channel(&mut self, name: &str) -> bool {
        self.channels.remove_channel(name).is_some()
    }

    pub fn channels(&self) -> &ChannelGroup {
        &self.channels
    }

    fn set_keypoint_channel(&mut self, name: &str, channel: Channel) -> Result<(), FrameError> {
        if let Some(found) = channel.keypoint_count() {
            self.check_keypoint_count(name, found)?;
        }
        debug!("Frame {}: setting channel {}", self.id, name);
        self.channels.insert_channel(name, channel);
        Ok(())
    }

    fn check_keypoint_count(&self, name: &str, found: usize) -> Result<(), FrameError> {
        for other in channel_names::KEYPOINT_CHANNELS.iter().filter(|other| **other != name) {
            if let Some(expected) = self.channels.channel(other).and_then(Channel::keypoint_count) {
                if expected != found {
                    return Err(FrameError::KeypointCountMismatch {
                        channel: name.to_string(),
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for VisualFrame {
    fn eq(&self, other: &Self) -> bool {
        let same_camera = match (&self.camera_geometry, &other.camera_geometry) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            (None, None) => true,
            _ => false,
        };
        self.id == other.id
            && self.timestamp_ns == other.timestamp_ns
            && self.hardware_timestamp_ns == other.hardware_timestamp_ns
            && self.system_timestamp_ns == other.system_timestamp_ns
            && same_camera
            && self.channels == other.channels
    }
}

/// Type stored under one of the fixed channel names, `None` for custom names.
fn fixed_channel_type(name: &str) -> Option<&'static str> {
    match name {
        channel_names::KEYPOINT_MEASUREMENTS => Some(type_name::<Matrix2xX<f64>>()),
        channel_names::KEYPOINT_MEASUREMENT_UNCERTAINTIES
        | channel_names::KEYPOINT_ORIENTATIONS
        | channel_names::KEYPOINT_SCALES => Some(type_name::<DVector<f64>>()),
        channel_names::DESCRIPTORS => Some(type_name::<DescriptorsT>()),
        channel_names::RAW_IMAGE => Some(type_name::<FrameImage>()),
        _ => None,
    }
}

fn check_index(channel: &str, index: usize, len: usize) -> Result<(), FrameError> {
    if index >= len {
        return Err(FrameError::IndexOutOfRange {
            channel: channel.to_string(),
            index,
            len,
        });
    }
    Ok(())
}

fn vector_entry(vector: &DVector<f64>, channel: &str, index: usize) -> Result<f64, FrameError> {
    check_index(channel, index, vector.len())?;
    Ok(vector[index])
}
