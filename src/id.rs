//! Globally unique identifiers for cameras, frames and camera rigs.
//!
//! Every identifier is an opaque 128-bit value. Identifiers are normally
//! generated once with [`CameraId::random()`] (or the equivalent constructor
//! of the other id types) and afterwards only stored, compared, hashed and
//! printed. The all-zero value is reserved as the invalid id, which is what
//! [`Default`] yields.
//!
//! # Examples
//!
//! ```rust
//! use camera_rig_tools::id::CameraId;
//!
//! let id = CameraId::random();
//! assert!(id.is_valid());
//!
//! let parsed: CameraId = id.to_string().parse().unwrap();
//! assert_eq!(id, parsed);
//! assert!(!CameraId::default().is_valid());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when an identifier cannot be parsed from a hex string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid id string '{0}': expected up to 32 hexadecimal digits")]
pub struct ParseIdError(pub String);

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u128);

        impl $name {
            /// Creates a new random, valid identifier.
            pub fn random() -> Self {
                loop {
                    let value: u128 = rand::random();
                    if value != 0 {
                        return Self(value);
                    }
                }
            }

            /// Wraps a raw 128-bit value.
            pub const fn from_u128(value: u128) -> Self {
                Self(value)
            }

            /// The raw 128-bit value.
            pub const fn as_u128(&self) -> u128 {
                self.0
            }

            /// `false` for the reserved all-zero id.
            pub const fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:032x})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() || s.len() > 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(ParseIdError(s.to_string()));
                }
                u128::from_str_radix(s, 16)
                    .map(Self)
                    .map_err(|_| ParseIdError(s.to_string()))
            }
        }
    };
}

define_id!(
    /// Identifies a single [`Camera`](crate::camera::Camera).
    CameraId
);
define_id!(
    /// Identifies a single [`VisualFrame`](crate::frame::VisualFrame).
    FrameId
);
define_id!(
    /// Identifies an [`NCameras`](crate::rig::NCameras) rig.
    NCamerasId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_ids_are_valid_and_distinct() {
        let ids: HashSet<FrameId> = (0..100).map(|_| FrameId::random()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.is_valid()));
    }

    #[test]
    fn test_hex_string_round_trip() {
        let id = NCamerasId::from_u128(0xdead_beef);
        assert_eq!(id.to_string(), "000000000000000000000000deadbeef");
        assert_eq!("deadbeef".parse::<NCamerasId>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<CameraId>().is_err());
        assert!("not-hex".parse::<CameraId>().is_err());
        assert!("0".repeat(33).parse::<CameraId>().is_err());
        assert!("+2a".parse::<CameraId>().is_err());
        assert!("-2a".parse::<CameraId>().is_err());
        assert!(" 2a".parse::<CameraId>().is_err());
    }
}
