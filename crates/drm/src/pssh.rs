// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Protection-system-specific-header box construction.

/// The Widevine DRM system id.
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xED, 0xEF, 0x8B, 0xA9, 0x79, 0xD6, 0x4A, 0xCE, 0xA3, 0xC8, 0x27, 0xDC, 0xD5, 0x1D, 0x21,
    0xED,
];

/// Wrap raw PSSH payload bytes in a version-0 `pssh` box carrying the
/// Widevine system id. Layout: 32-bit box size, `pssh` fourcc, version and
/// flags, 16-byte system id, 32-bit data size, data.
pub fn pssh_box_from_data(pssh_data: &[u8]) -> Vec<u8> {
    let box_size = 4 + 4 + 4 + WIDEVINE_SYSTEM_ID.len() + 4 + pssh_data.len();
    let mut pssh_box = Vec::with_capacity(box_size);
    #[allow(clippy::cast_possible_truncation)]
    pssh_box.extend_from_slice(&(box_size as u32).to_be_bytes());
    pssh_box.extend_from_slice(b"pssh");
    pssh_box.extend_from_slice(&[0, 0, 0, 0]); // version 0, no flags
    pssh_box.extend_from_slice(&WIDEVINE_SYSTEM_ID);
    #[allow(clippy::cast_possible_truncation)]
    pssh_box.extend_from_slice(&(pssh_data.len() as u32).to_be_bytes());
    pssh_box.extend_from_slice(pssh_data);
    pssh_box
}

/// Byte offset of the payload inside a boxed PSSH.
pub const PSSH_DATA_OFFSET: usize = 32;
