// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for the `ContentEncodings` list of a track entry.
//!
//! Only the encryption encoding type is supported; compression encodings
//! fail the parse. The first content encoding's key id is adopted by the
//! owning track as its default key id.

use super::ids;
use super::parser::{ClientRef, WebmParserClient};

// Scope bit flags.
pub const SCOPE_ALL_FRAME_CONTENTS: u64 = 1;
pub const SCOPE_TRACK_PRIVATE_DATA: u64 = 2;
pub const SCOPE_NEXT_CONTENT_ENCODING_DATA: u64 = 4;
const SCOPE_MAX: u64 = 7;

// Encoding types.
pub const TYPE_COMPRESSION: u64 = 0;
pub const TYPE_ENCRYPTION: u64 = 1;

// Encryption algorithms.
pub const ENC_ALGO_NOT_ENCRYPTED: u64 = 0;
pub const ENC_ALGO_AES: u64 = 5;

// Cipher modes.
pub const CIPHER_MODE_CTR: u64 = 1;

/// One decoded `ContentEncoding` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentEncoding {
    pub order: u64,
    pub scope: u64,
    pub encoding_type: u64,
    pub encryption_algo: u64,
    pub cipher_mode: u64,
    pub encryption_key_id: Vec<u8>,
}

/// In-flight state for the encoding currently being parsed; fields stay
/// `None` until seen so duplicates can be rejected.
#[derive(Default)]
struct PendingEncoding {
    order: Option<u64>,
    scope: Option<u64>,
    encoding_type: Option<u64>,
    encryption_algo: Option<u64>,
    cipher_mode: Option<u64>,
    encryption_key_id: Option<Vec<u8>>,
    encryption_encountered: bool,
}

#[derive(Default)]
pub struct WebmContentEncodingsClient {
    current: Option<PendingEncoding>,
    content_encodings: Vec<ContentEncoding>,
}

impl WebmContentEncodingsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The decoded encodings, in document order.
    pub fn content_encodings(&self) -> &[ContentEncoding] {
        &self.content_encodings
    }
}

impl WebmParserClient for WebmContentEncodingsClient {
    fn on_list_start(&mut self, id: u64) -> Option<ClientRef> {
        match id {
            ids::CONTENT_ENCODINGS => {
                self.content_encodings.clear();
            },
            ids::CONTENT_ENCODING => {
                if self.current.is_some() {
                    return None;
                }
                self.current = Some(PendingEncoding::default());
            },
            ids::CONTENT_ENCRYPTION => {
                let current = self.current.as_mut()?;
                if current.encryption_encountered {
                    tracing::warn!("more than one ContentEncryption in a ContentEncoding");
                    return None;
                }
                current.encryption_encountered = true;
            },
            ids::CONTENT_ENC_AES_SETTINGS => {
                self.current.as_ref()?;
            },
            ids::CONTENT_COMPRESSION => {
                tracing::warn!("ContentCompression is not supported");
                return None;
            },
            _ => return None,
        }
        Some(ClientRef::This)
    }

    fn on_list_end(&mut self, id: u64) -> bool {
        match id {
            ids::CONTENT_ENCODING => {
                let Some(pending) = self.current.take() else { return false };
                if !pending.encryption_encountered {
                    tracing::warn!("ContentEncodingType is encryption but ContentEncryption is missing");
                    return false;
                }
                let Some(encoding_type) = pending.encoding_type else {
                    tracing::warn!("missing ContentEncodingType, default value compression is not supported");
                    return false;
                };
                if encoding_type != TYPE_ENCRYPTION {
                    tracing::warn!("unsupported ContentEncodingType {encoding_type}");
                    return false;
                }
                self.content_encodings.push(ContentEncoding {
                    order: pending.order.unwrap_or(0),
                    scope: pending.scope.unwrap_or(SCOPE_ALL_FRAME_CONTENTS),
                    encoding_type,
                    encryption_algo: pending.encryption_algo.unwrap_or(ENC_ALGO_NOT_ENCRYPTED),
                    cipher_mode: pending.cipher_mode.unwrap_or(CIPHER_MODE_CTR),
                    encryption_key_id: pending.encryption_key_id.unwrap_or_default(),
                });
                true
            },
            ids::CONTENT_ENCODINGS => {
                if self.content_encodings.is_empty() {
                    tracing::warn!("no ContentEncoding element in ContentEncodings");
                    return false;
                }
                true
            },
            _ => true,
        }
    }

    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let Some(current) = self.current.as_mut() else { return false };
        let (slot, valid) = match id {
            ids::CONTENT_ENCODING_ORDER => (&mut current.order, true),
            ids::CONTENT_ENCODING_SCOPE => {
                (&mut current.scope, value > 0 && value <= SCOPE_MAX)
            },
            ids::CONTENT_ENCODING_TYPE => {
                (&mut current.encoding_type, value <= TYPE_ENCRYPTION)
            },
            ids::CONTENT_ENC_ALGO => {
                (&mut current.encryption_algo, value <= ENC_ALGO_AES)
            },
            ids::AES_SETTINGS_CIPHER_MODE => {
                (&mut current.cipher_mode, value == CIPHER_MODE_CTR)
            },
            _ => return true,
        };
        if !valid {
            tracing::warn!("invalid value {value} for content encoding element {id:#x}");
            return false;
        }
        if slot.is_some() {
            tracing::warn!("duplicate content encoding element {id:#x}");
            return false;
        }
        *slot = Some(value);
        true
    }

    fn on_binary(&mut self, id: u64, data: &[u8]) -> bool {
        let Some(current) = self.current.as_mut() else { return false };
        if id == ids::CONTENT_ENC_KEY_ID {
            if current.encryption_key_id.is_some() {
                tracing::warn!("duplicate ContentEncKeyID");
                return false;
            }
            if data.is_empty() {
                tracing::warn!("empty ContentEncKeyID");
                return false;
            }
            current.encryption_key_id = Some(data.to_vec());
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::parser::WebmListParser;
    use super::*;

    fn parse(buf: &[u8]) -> Result<WebmContentEncodingsClient, ()> {
        let mut client = WebmContentEncodingsClient::new();
        let mut parser = WebmListParser::new(ids::CONTENT_ENCODINGS);
        match parser.parse(&mut client, buf) {
            Ok(consumed) if consumed == buf.len() && parser.is_parsing_complete() => Ok(client),
            _ => Err(()),
        }
    }

    #[test]
    fn test_empty_content_encodings_fails() {
        let buf = [0x6D, 0x80, 0x80]; // ContentEncodings, size 0
        assert!(parse(&buf).is_err());
    }

    #[test]
    fn test_empty_content_encoding_fails() {
        let buf = [
            0x6D, 0x80, 0x83, // ContentEncodings, size 3
            0x62, 0x40, 0x80, // ContentEncoding, size 0
        ];
        assert!(parse(&buf).is_err());
    }

    #[test]
    fn test_single_content_encoding() {
        let buf = [
            0x6D, 0x80, 0xA1, // ContentEncodings, size 33
            0x62, 0x40, 0x9E, // ContentEncoding, size 30
            0x50, 0x31, 0x81, 0x00, // ContentEncodingOrder = 0
            0x50, 0x32, 0x81, 0x01, // ContentEncodingScope = 1
            0x50, 0x33, 0x81, 0x01, // ContentEncodingType = 1
            0x50, 0x35, 0x8F, // ContentEncryption, size 15
            0x47, 0xE1, 0x81, 0x05, // ContentEncAlgo = 5 (AES)
            0x47, 0xE2, 0x88, // ContentEncKeyID, size 8
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        let client = parse(&buf).unwrap();
        let encodings = client.content_encodings();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].order, 0);
        assert_eq!(encodings[0].scope, SCOPE_ALL_FRAME_CONTENTS);
        assert_eq!(encodings[0].encoding_type, TYPE_ENCRYPTION);
        assert_eq!(encodings[0].encryption_algo, ENC_ALGO_AES);
        assert_eq!(encodings[0].encryption_key_id, vec![0xAA; 8]);
    }

    #[test]
    fn test_multiple_content_encodings() {
        let buf = [
            0x6D, 0x80, 0xC2, // ContentEncodings, size 66
            0x62, 0x40, 0x9E, // ContentEncoding, size 30
            0x50, 0x31, 0x81, 0x00, // Order = 0
            0x50, 0x32, 0x81, 0x03, // Scope = 3
            0x50, 0x33, 0x81, 0x01, // Type = 1
            0x50, 0x35, 0x8F, // ContentEncryption, size 15
            0x47, 0xE1, 0x81, 0x05, // Algo = AES
            0x47, 0xE2, 0x88, // KeyID, size 8
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
            0x62, 0x40, 0x9E, // ContentEncoding, size 30
            0x50, 0x31, 0x81, 0x01, // Order = 1
            0x50, 0x32, 0x81, 0x03, // Scope = 3
            0x50, 0x33, 0x81, 0x01, // Type = 1
            0x50, 0x35, 0x8F, // ContentEncryption, size 15
            0x47, 0xE1, 0x81, 0x01, // Algo = DES
            0x47, 0xE2, 0x88, // KeyID, size 8
            0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB,
        ];
        let client = parse(&buf).unwrap();
        let encodings = client.content_encodings();
        assert_eq!(encodings.len(), 2);
        for (i, encoding) in encodings.iter().enumerate() {
            assert_eq!(encoding.order, i as u64);
            assert_eq!(
                encoding.scope,
                SCOPE_ALL_FRAME_CONTENTS | SCOPE_TRACK_PRIVATE_DATA
            );
            assert_eq!(encoding.encryption_key_id.len(), 8);
        }
        assert_eq!(encodings[0].encryption_algo, ENC_ALGO_AES);
        assert_eq!(encodings[1].encryption_algo, 1);
    }

    #[test]
    fn test_default_values() {
        let buf = [
            0x6D, 0x80, 0x8A, // ContentEncodings, size 10
            0x62, 0x40, 0x87, // ContentEncoding, size 7 (no order/scope)
            0x50, 0x33, 0x81, 0x01, // ContentEncodingType = 1
            0x50, 0x35, 0x80, // ContentEncryption, size 0 (no algo)
        ];
        let client = parse(&buf).unwrap();
        let encodings = client.content_encodings();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].order, 0);
        assert_eq!(encodings[0].scope, SCOPE_ALL_FRAME_CONTENTS);
        assert_eq!(encodings[0].encryption_algo, ENC_ALGO_NOT_ENCRYPTED);
        assert!(encodings[0].encryption_key_id.is_empty());
    }

    #[test]
    fn test_missing_content_encryption_fails() {
        let buf = [
            0x6D, 0x80, 0x87, // ContentEncodings, size 7
            0x62, 0x40, 0x84, // ContentEncoding, size 4
            0x50, 0x33, 0x81, 0x01, // ContentEncodingType = 1, no ContentEncryption
        ];
        assert!(parse(&buf).is_err());
    }

    #[test]
    fn test_duplicate_fields_fail() {
        let buf = [
            0x6D, 0x80, 0x8E, // ContentEncodings, size 14
            0x62, 0x40, 0x8B, // ContentEncoding, size 11
            0x50, 0x33, 0x81, 0x01, // Type = 1
            0x50, 0x33, 0x81, 0x01, // Type again
            0x50, 0x35, 0x80, // ContentEncryption, size 0
        ];
        assert!(parse(&buf).is_err());
    }
}
