// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The key-source abstraction muxers encrypt against.

use async_trait::async_trait;
use packkit_core::Result;

/// License-track classification used by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Unknown,
    Sd,
    Hd,
    Audio,
}

/// Number of track types a license response is expected to cover.
pub const NUM_VALID_TRACK_TYPES: usize = 3;

impl TrackType {
    pub fn from_str(track_type: &str) -> Self {
        match track_type {
            "SD" => Self::Sd,
            "HD" => Self::Hd,
            "AUDIO" => Self::Audio,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sd => "SD",
            Self::Hd => "HD",
            Self::Audio => "AUDIO",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// One content-encryption key with its DRM-system metadata.
///
/// The key source owns its pool of keys; consumers receive immutable
/// clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionKey {
    pub key_id: Vec<u8>,
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
    /// Complete `pssh` box, header and system id included.
    pub pssh: Vec<u8>,
}

/// Produces encryption keys on demand, keyed by track type and, when key
/// rotation is enabled, by crypto-period index.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Get the key for `track_type`. Used when key rotation is disabled.
    async fn get_key(&self, track_type: TrackType) -> Result<EncryptionKey>;

    /// Get the key of the given crypto period for `track_type`. Used when
    /// key rotation is enabled. May block until the period's keys have been
    /// fetched.
    async fn get_crypto_period_key(
        &self,
        crypto_period_index: u32,
        track_type: TrackType,
    ) -> Result<EncryptionKey>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_type_string_round_trip() {
        for track_type in [TrackType::Sd, TrackType::Hd, TrackType::Audio] {
            assert_eq!(TrackType::from_str(track_type.as_str()), track_type);
        }
        assert_eq!(TrackType::from_str("4K"), TrackType::Unknown);
    }
}
