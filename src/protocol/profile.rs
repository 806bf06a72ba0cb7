//! Per-device frame profiles.
//!
//! A [`FrameProfile`] tells the [`FrameDecoder`](super::FrameDecoder) how big a
//! frame is, how to validate one and pull the heart-rate byte out of it, and
//! where a new frame could start inside a buffer that failed validation. The
//! decoder itself carries no device knowledge.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{PolarProfile, ZephyrProfile};

/// Device-specific framing policy.
pub trait FrameProfile: Send + Sync {
    /// Provider name reported with scan results.
    fn name(&self) -> &'static str;

    /// Fixed frame size in bytes.
    fn frame_size(&self) -> usize;

    /// Validate a full frame and extract the heart-rate value.
    ///
    /// Returns `None` for an invalid frame.
    fn validate_and_extract(&self, frame: &[u8]) -> Option<u8>;

    /// First offset in `buffer` where a new frame could begin, if any.
    fn find_resync_offset(&self, buffer: &[u8]) -> Option<usize>;
}

impl<P: FrameProfile + ?Sized> FrameProfile for Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn frame_size(&self) -> usize {
        (**self).frame_size()
    }

    fn validate_and_extract(&self, frame: &[u8]) -> Option<u8> {
        (**self).validate_and_extract(frame)
    }

    fn find_resync_offset(&self, buffer: &[u8]) -> Option<usize> {
        (**self).find_resync_offset(buffer)
    }
}

impl<P: FrameProfile + ?Sized> FrameProfile for &P {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn frame_size(&self) -> usize {
        (**self).frame_size()
    }

    fn validate_and_extract(&self, frame: &[u8]) -> Option<u8> {
        (**self).validate_and_extract(frame)
    }

    fn find_resync_offset(&self, buffer: &[u8]) -> Option<usize> {
        (**self).find_resync_offset(buffer)
    }
}

/// Shipped profiles, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Zephyr HxM, 60-byte frames.
    #[default]
    Zephyr,
    /// Polar WearLink, 16-byte frames.
    Polar,
}

impl ProfileKind {
    /// Instantiate the profile.
    pub fn profile(self) -> Arc<dyn FrameProfile> {
        match self {
            ProfileKind::Zephyr => Arc::new(ZephyrProfile),
            ProfileKind::Polar => Arc::new(PolarProfile),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_instantiates_matching_profile() {
        let zephyr = ProfileKind::Zephyr.profile();
        assert_eq!(zephyr.name(), "Zephyr");
        assert_eq!(zephyr.frame_size(), 60);

        let polar = ProfileKind::Polar.profile();
        assert_eq!(polar.name(), "Polar");
        assert_eq!(polar.frame_size(), 16);
    }

    #[test]
    fn test_kind_serde_names() {
        let kind: ProfileKind = serde_json::from_str("\"polar\"").unwrap();
        assert_eq!(kind, ProfileKind::Polar);
        assert_eq!(serde_json::to_string(&ProfileKind::Zephyr).unwrap(), "\"zephyr\"");
        assert!(serde_json::from_str::<ProfileKind>("\"garmin\"").is_err());
    }

    #[test]
    fn test_display_uses_provider_name() {
        assert_eq!(ProfileKind::Polar.to_string(), "Polar");
    }
}
