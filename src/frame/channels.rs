//! Named, typed per-frame data.
//!
//! A [`ChannelGroup`] maps a channel name to one [`Channel`]. The fixed kinds a
//! visual frame stores (keypoint matrix, per-keypoint vectors, descriptors and
//! the image) have their own variants; anything else goes into the
//! [`Channel::Extension`] slot. Reading a channel that was never written is an
//! error, not an empty default.

use crate::frame::FrameError;
use image::DynamicImage;
use log::trace;
use nalgebra::{DMatrix, DVector, Matrix2xX};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Descriptor matrix: one column of bytes per keypoint.
pub type DescriptorsT = DMatrix<u8>;

/// Image handle stored in a frame. Cloning it is shallow.
pub type FrameImage = Arc<DynamicImage>;

/// Channel names used by [`VisualFrame`](crate::frame::VisualFrame).
pub mod channel_names {
    pub const KEYPOINT_MEASUREMENTS: &str = "VISUAL_KEYPOINT_MEASUREMENTS";
    pub const KEYPOINT_MEASUREMENT_UNCERTAINTIES: &str =
        "VISUAL_KEYPOINT_MEASUREMENT_UNCERTAINTIES";
    pub const KEYPOINT_ORIENTATIONS: &str = "VISUAL_KEYPOINT_ORIENTATIONS";
    pub const KEYPOINT_SCALES: &str = "VISUAL_KEYPOINT_SCALES";
    pub const DESCRIPTORS: &str = "DESCRIPTORS";
    pub const RAW_IMAGE: &str = "RAW_IMAGE";

    /// Channels holding one entry per keypoint.
    pub const KEYPOINT_CHANNELS: [&str; 5] = [
        KEYPOINT_MEASUREMENTS,
        KEYPOINT_MEASUREMENT_UNCERTAINTIES,
        KEYPOINT_ORIENTATIONS,
        KEYPOINT_SCALES,
        DESCRIPTORS,
    ];
}

/// Values that can be stored in a channel.
///
/// Implemented for every `'static` type that is `Debug + Clone + PartialEq + Send + Sync`.
pub trait ChannelValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_boxed(&self) -> Box<dyn ChannelValue>;
    fn eq_dyn(&self, other: &dyn ChannelValue) -> bool;
    fn value_type_name(&self) -> &'static str;
}

impl<T> ChannelValue for T
where
    T: Any + fmt::Debug + Clone + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ChannelValue> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn ChannelValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// The data held by one channel.
#[derive(Debug)]
pub enum Channel {
    Keypoints(Matrix2xX<f64>),
    Vector(DVector<f64>),
    Descriptors(DescriptorsT),
    Image(FrameImage),
    Extension(Box<dyn ChannelValue>),
}

impl Channel {
    /// Wraps `value` in the matching fixed variant, or in [`Channel::Extension`].
    pub fn from_value<T: ChannelValue>(value: T) -> Self {
        let mut slot = Some(value);
        let any: &mut dyn Any = &mut slot;

        if let Some(m) = any
            .downcast_mut::<Option<Matrix2xX<f64>>>()
            .and_then(Option::take)
        {
            return Channel::Keypoints(m);
        }
        if let Some(v) = any.downcast_mut::<Option<DVector<f64>>>().and_then(Option::take) {
            return Channel::Vector(v);
        }
        if let Some(d) = any.downcast_mut::<Option<DescriptorsT>>().and_then(Option::take) {
            return Channel::Descriptors(d);
        }
        if let Some(i) = any.downcast_mut::<Option<FrameImage>>().and_then(Option::take) {
            return Channel::Image(i);
        }

        match slot {
            Some(value) => Channel::Extension(Box::new(value)),
            None => unreachable!("channel value taken without producing a fixed variant"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        match self {
            Channel::Keypoints(m) => m,
            Channel::Vector(v) => v,
            Channel::Descriptors(d) => d,
            Channel::Image(i) => i,
            Channel::Extension(value) => (**value).as_any(),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            Channel::Keypoints(m) => m,
            Channel::Vector(v) => v,
            Channel::Descriptors(d) => d,
            Channel::Image(i) => i,
            Channel::Extension(value) => (**value).as_any_mut(),
        }
    }

    pub fn value_type_name(&self) -> &'static str {
        match self {
            Channel::Keypoints(_) => type_name::<Matrix2xX<f64>>(),
            Channel::Vector(_) => type_name::<DVector<f64>>(),
            Channel::Descriptors(_) => type_name::<DescriptorsT>(),
            Channel::Image(_) => type_name::<FrameImage>(),
            Channel::Extension(value) => (**value).value_type_name(),
        }
    }

    /// Number of keypoints described by this channel, for the per-keypoint kinds.
    pub fn keypoint_count(&self) -> Option<usize> {
        match self {
            Channel::Keypoints(m) => Some(m.ncols()),
            Channel::Vector(v) => Some(v.len()),
            Channel::Descriptors(d) => Some(d.ncols()),
            Channel::Image(_) | Channel::Extension(_) => None,
        }
    }
}

impl Clone for Channel {
    fn clone(&self) -> Self {
        match self {
            Channel::Keypoints(m) => Channel::Keypoints(m.clone()),
            Channel::Vector(v) => Channel::Vector(v.clone()),
            Channel::Descriptors(d) => Channel::Descriptors(d.clone()),
            Channel::Image(i) => Channel::Image(Arc::clone(i)),
            Channel::Extension(value) => Channel::Extension((**value).clone_boxed()),
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Channel::Keypoints(a), Channel::Keypoints(b)) => a == b,
            (Channel::Vector(a), Channel::Vector(b)) => a == b,
            (Channel::Descriptors(a), Channel::Descriptors(b)) => a == b,
            (Channel::Image(a), Channel::Image(b)) => Arc::ptr_eq(a, b) || a == b,
            (Channel::Extension(a), Channel::Extension(b)) => (**a).eq_dyn(&**b),
            _ => false,
        }
    }
}

/// A set of uniquely named channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelGroup {
    channels: HashMap<String, Channel>,
}

impl ChannelGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Adds a channel holding `T::default()` and returns it for filling in.
    ///
    /// # Errors
    ///
    /// [`FrameError::ChannelAlreadyExists`] if `name` is taken.
    pub fn add_channel<T: ChannelValue + Default>(&mut self, name: &str) -> Result<&mut T, FrameError> {
        if self.has_channel(name) {
            return Err(FrameError::ChannelAlreadyExists(name.to_string()));
        }
        trace!("Adding channel {} of type {}", name, type_name::<T>());
        self.channels
            .insert(name.to_string(), Channel::from_value(T::default()));
        self.get_channel_data_mut::<T>(name)
    }

    pub fn get_channel_data<T: Any>(&self, name: &str) -> Result<&T, FrameError> {
        let channel = self
            .channels
            .get(name)
            .ok_or_else(|| FrameError::MissingChannel(name.to_string()))?;
        channel
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| FrameError::ChannelTypeMismatch {
                channel: name.to_string(),
                expected: type_name::<T>(),
                found: channel.value_type_name(),
            })
    }

    pub fn get_channel_data_mut<T: Any>(&mut self, name: &str) -> Result<&mut T, FrameError> {
        let channel = self
            .channels
            .get_mut(name)
            .ok_or_else(|| FrameError::MissingChannel(name.to_string()))?;
        let found = channel.value_type_name();
        channel
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| FrameError::ChannelTypeMismatch {
                channel: name.to_string(),
                expected: type_name::<T>(),
                found,
            })
    }

    /// Stores `data` under `name`, replacing any previous channel of that name.
    pub fn set_channel_data<T: ChannelValue>(&mut self, name: &str, data: T) {
        self.insert_channel(name, Channel::from_value(data));
    }

    pub fn insert_channel(&mut self, name: &str, channel: Channel) -> Option<Channel> {
        self.channels.insert(name.to_string(), channel)
    }

    pub fn remove_channel(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TrackIds(Vec<u64>);

    #[test]
    fn test_fixed_kinds_use_fixed_variants() {
        assert!(matches!(
            Channel::from_value(Matrix2xX::<f64>::zeros(3)),
            Channel::Keypoints(_)
        ));
        assert!(matches!(
            Channel::from_value(DVector::<f64>::zeros(3)),
            Channel::Vector(_)
        ));
        assert!(matches!(
            Channel::from_value(DescriptorsT::zeros(48, 3)),
            Channel::Descriptors(_)
        ));
        assert!(matches!(
            Channel::from_value(Arc::new(DynamicImage::new_luma8(2, 2))),
            Channel::Image(_)
        ));
        assert!(matches!(
            Channel::from_value(TrackIds(vec![1])),
            Channel::Extension(_)
        ));
    }

    #[test]
    fn test_missing_and_mismatched_access() {
        let mut group = ChannelGroup::new();
        assert!(matches!(
            group.get_channel_data::<TrackIds>("tracks"),
            Err(FrameError::MissingChannel(_))
        ));

        group.set_channel_data("tracks", TrackIds(vec![4, 5]));
        assert_eq!(
            group.get_channel_data::<TrackIds>("tracks").unwrap(),
            &TrackIds(vec![4, 5])
        );
        assert!(matches!(
            group.get_channel_data::<DVector<f64>>("tracks"),
            Err(FrameError::ChannelTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_add_channel() {
        let mut group = ChannelGroup::new();
        group.add_channel::<TrackIds>("tracks").unwrap().0.push(7);
        assert_eq!(group.get_channel_data::<TrackIds>("tracks").unwrap().0, vec![7]);
        assert!(matches!(
            group.add_channel::<TrackIds>("tracks"),
            Err(FrameError::ChannelAlreadyExists(_))
        ));
        assert_eq!(group.len(), 1);
        assert!(group.remove_channel("tracks").is_some());
        assert!(group.is_empty());
    }

    #[test]
    fn test_group_equality_compares_contents() {
        let mut a = ChannelGroup::new();
        let mut b = ChannelGroup::new();
        a.set_channel_data("tracks", TrackIds(vec![1, 2]));
        b.set_channel_data("tracks", TrackIds(vec![1, 2]));
        assert_eq!(a, b);

        b.get_channel_data_mut::<TrackIds>("tracks").unwrap().0[1] = 3;
        assert_ne!(a, b);

        let cloned = a.clone();
        assert_eq!(a, cloned);
    }
}
