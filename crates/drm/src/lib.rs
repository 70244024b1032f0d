// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PackKit DRM - Content-encryption key acquisition.
//!
//! Two [`KeySource`] implementations feed muxers with keys on demand:
//!
//! - [`FixedKeySource`]: a single user-supplied key for every track type.
//! - [`WidevineKeySource`]: talks to a Widevine-style license service from a
//!   background task, with request signing, transient-error retries, and
//!   crypto-period key rotation over a bounded key pool.

pub mod fetcher;
pub mod fixed;
pub mod key_source;
pub mod pssh;
pub mod signer;
pub mod widevine;

pub use fetcher::{HttpFetcher, UrlFetcher};
pub use fixed::FixedKeySource;
pub use key_source::{EncryptionKey, KeySource, TrackType};
pub use pssh::{pssh_box_from_data, WIDEVINE_SYSTEM_ID};
pub use signer::{AesRequestSigner, RequestSigner, RsaRequestSigner};
pub use widevine::{KeyRotation, WidevineKeySource};
