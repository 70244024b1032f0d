// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! License-request signing.
//!
//! Widevine-style services accept either an AES signature (AES-CBC over the
//! SHA-1 of the request) or an RSA-PSS signature over the request itself;
//! both are named so the server can look up the verification key.

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use packkit_core::{PackKitError, Result};
use rsa::pss::Pss;
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};

/// Signs license requests on behalf of a named signer.
pub trait RequestSigner: Send + Sync {
    /// The name the license service knows this signer by.
    fn signer_name(&self) -> &str;

    /// Generate the signature for `message`.
    fn generate_signature(&self, message: &[u8]) -> Result<Vec<u8>>;
}

enum AesKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

/// AES-CBC signing: the signature is `AES-CBC(key, iv, SHA1(message))` with
/// PKCS#7 padding.
pub struct AesRequestSigner {
    signer_name: String,
    key: AesKey,
    iv: [u8; 16],
}

impl AesRequestSigner {
    /// Create a signer from a hex key (16, 24, or 32 bytes) and a hex
    /// 16-byte IV.
    pub fn from_hex(signer_name: &str, aes_key_hex: &str, iv_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(aes_key_hex).map_err(|_| {
            PackKitError::InvalidArgument(format!("cannot parse aes key hex '{aes_key_hex}'"))
        })?;
        let iv_bytes = hex::decode(iv_hex)
            .map_err(|_| PackKitError::InvalidArgument(format!("cannot parse iv hex '{iv_hex}'")))?;

        let iv: [u8; 16] = iv_bytes.try_into().map_err(|_| {
            PackKitError::InvalidArgument("aes-cbc iv must be 16 bytes".to_string())
        })?;
        let key = match key_bytes.len() {
            16 => AesKey::Aes128(key_bytes.try_into().map_err(|_| unreachable_key_error())?),
            24 => AesKey::Aes192(key_bytes.try_into().map_err(|_| unreachable_key_error())?),
            32 => AesKey::Aes256(key_bytes.try_into().map_err(|_| unreachable_key_error())?),
            other => {
                return Err(PackKitError::InvalidArgument(format!(
                    "aes key must be 16, 24 or 32 bytes, got {other}"
                )));
            },
        };
        Ok(Self { signer_name: signer_name.to_string(), key, iv })
    }
}

fn unreachable_key_error() -> PackKitError {
    PackKitError::Internal("aes key length changed between checks".to_string())
}

impl RequestSigner for AesRequestSigner {
    fn signer_name(&self) -> &str {
        &self.signer_name
    }

    fn generate_signature(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha1::digest(message);
        let signature = match &self.key {
            AesKey::Aes128(key) => cbc::Encryptor::<aes::Aes128>::new(key.into(), (&self.iv).into())
                .encrypt_padded_vec_mut::<Pkcs7>(&digest),
            AesKey::Aes192(key) => cbc::Encryptor::<aes::Aes192>::new(key.into(), (&self.iv).into())
                .encrypt_padded_vec_mut::<Pkcs7>(&digest),
            AesKey::Aes256(key) => cbc::Encryptor::<aes::Aes256>::new(key.into(), (&self.iv).into())
                .encrypt_padded_vec_mut::<Pkcs7>(&digest),
        };
        Ok(signature)
    }
}

/// RSA-PSS signing with SHA-1 over a DER-encoded PKCS#1 private key.
pub struct RsaRequestSigner {
    signer_name: String,
    private_key: RsaPrivateKey,
}

impl RsaRequestSigner {
    pub fn new(signer_name: &str, pkcs1_der_key: &[u8]) -> Result<Self> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        let private_key = RsaPrivateKey::from_pkcs1_der(pkcs1_der_key).map_err(|e| {
            PackKitError::InvalidArgument(format!("cannot parse rsa private key: {e}"))
        })?;
        Ok(Self { signer_name: signer_name.to_string(), private_key })
    }
}

impl RequestSigner for RsaRequestSigner {
    fn signer_name(&self) -> &str {
        &self.signer_name
    }

    fn generate_signature(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha1::digest(message);
        let mut rng = rand::thread_rng();
        self.private_key
            .sign_with_rng(&mut rng, Pss::new::<Sha1>(), &digest)
            .map_err(|e| PackKitError::Internal(format!("signature generation failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_signature_is_deterministic_and_keyed() {
        let signer = AesRequestSigner::from_hex(
            "widevine_test",
            "1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9",
            "d58ce954203b7c9a9a9d467f59839249",
        )
        .unwrap();

        assert_eq!(signer.signer_name(), "widevine_test");
        let first = signer.generate_signature(b"license request").unwrap();
        let second = signer.generate_signature(b"license request").unwrap();
        assert_eq!(first, second);
        // SHA-1 digest (20 bytes) pads to two AES blocks.
        assert_eq!(first.len(), 32);

        let other = signer.generate_signature(b"different request").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_aes_signer_rejects_bad_material() {
        assert!(AesRequestSigner::from_hex("s", "zz", "00").is_err());
        // 8-byte key is not a valid AES length.
        assert!(AesRequestSigner::from_hex("s", "0011223344556677", "d58ce954203b7c9a9a9d467f59839249").is_err());
        // 8-byte IV is rejected.
        assert!(AesRequestSigner::from_hex(
            "s",
            "1ae8ccd0e7985cc0b6203a55855a1034afc252980e970ca90e5202689f947ab9",
            "0011223344556677"
        )
        .is_err());
    }
}
