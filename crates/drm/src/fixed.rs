// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A key source with a single user-supplied key.

use crate::key_source::{EncryptionKey, KeySource, TrackType};
use async_trait::async_trait;
use packkit_core::{PackKitError, Result};

/// Holds one key tuple parsed from hex strings and returns it for every
/// track type. Key rotation is not supported.
pub struct FixedKeySource {
    key: EncryptionKey,
}

impl FixedKeySource {
    /// Build the source from hex-encoded key material. The PSSH bytes are
    /// taken as provided (already boxed by the caller).
    pub fn from_hex(
        key_id_hex: &str,
        key_hex: &str,
        pssh_hex: &str,
        iv_hex: &str,
    ) -> Result<Self> {
        Ok(Self {
            key: EncryptionKey {
                key_id: decode_hex("key_id_hex", key_id_hex)?,
                key: decode_hex("key_hex", key_hex)?,
                pssh: decode_hex("pssh_hex", pssh_hex)?,
                iv: decode_hex("iv_hex", iv_hex)?,
            },
        })
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|_| PackKitError::InvalidArgument(format!("cannot parse input {field} '{value}'")))
}

#[async_trait]
impl KeySource for FixedKeySource {
    async fn get_key(&self, _track_type: TrackType) -> Result<EncryptionKey> {
        Ok(self.key.clone())
    }

    async fn get_crypto_period_key(
        &self,
        _crypto_period_index: u32,
        _track_type: TrackType,
    ) -> Result<EncryptionKey> {
        Err(PackKitError::InvalidArgument(
            "fixed key sources do not support key rotation".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_for_every_track_type() {
        let source = FixedKeySource::from_hex("00aa", "11bb", "22cc", "33dd").unwrap();
        let sd = source.get_key(TrackType::Sd).await.unwrap();
        let audio = source.get_key(TrackType::Audio).await.unwrap();
        assert_eq!(sd, audio);
        assert_eq!(sd.key_id, vec![0x00, 0xaa]);
        assert_eq!(sd.key, vec![0x11, 0xbb]);
        assert_eq!(sd.pssh, vec![0x22, 0xcc]);
        assert_eq!(sd.iv, vec![0x33, 0xdd]);
    }

    #[tokio::test]
    async fn test_rejects_bad_hex_and_rotation() {
        assert!(matches!(
            FixedKeySource::from_hex("not-hex", "11", "22", "33"),
            Err(PackKitError::InvalidArgument(_))
        ));

        let source = FixedKeySource::from_hex("00", "11", "22", "33").unwrap();
        assert!(matches!(
            source.get_crypto_period_key(0, TrackType::Sd).await,
            Err(PackKitError::InvalidArgument(_))
        ));
    }
}
