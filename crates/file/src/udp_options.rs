// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Option parsing for `udp://` URLs.

use packkit_core::{PackKitError, Result};
use url::Url;

/// Options recognized in a UDP URL of the form
/// `ip:port[?reuse=0|1&interface=ip&source=ip&timeout=microseconds]`.
/// `source` is an alias for `interface`; unknown keys are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpOptions {
    address: String,
    port: u16,
    reuse: bool,
    interface_address: String,
    timeout_us: u32,
}

impl UdpOptions {
    /// Parse the part of a UDP URL after the `udp://` prefix.
    pub fn parse(udp_url: &str) -> Result<Self> {
        let url = Url::parse(&format!("udp://{udp_url}"))
            .map_err(|e| PackKitError::InvalidArgument(format!("malformed udp url '{udp_url}': {e}")))?;

        let address = url
            .host_str()
            .ok_or_else(|| {
                PackKitError::InvalidArgument(format!("missing address in udp url '{udp_url}'"))
            })?
            .to_string();
        let port = url.port().ok_or_else(|| {
            PackKitError::InvalidArgument(format!("missing port in udp url '{udp_url}'"))
        })?;

        let mut options = Self {
            address,
            port,
            reuse: false,
            interface_address: String::new(),
            timeout_us: 0,
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "reuse" => {
                    let reuse: i32 = value.parse().map_err(|_| {
                        PackKitError::InvalidArgument(format!(
                            "invalid udp option for reuse field '{value}'"
                        ))
                    })?;
                    options.reuse = reuse > 0;
                },
                "interface" | "source" => {
                    options.interface_address = value.to_string();
                },
                "timeout" => {
                    options.timeout_us = value.parse().map_err(|_| {
                        PackKitError::InvalidArgument(format!(
                            "invalid udp option for timeout field '{value}'"
                        ))
                    })?;
                },
                unknown => {
                    return Err(PackKitError::InvalidArgument(format!(
                        "unknown field in udp options '{unknown}'"
                    )));
                },
            }
        }
        Ok(options)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub const fn reuse(&self) -> bool {
        self.reuse
    }

    pub fn interface_address(&self) -> &str {
        &self.interface_address
    }

    pub const fn timeout_us(&self) -> u32 {
        self.timeout_us
    }
}
