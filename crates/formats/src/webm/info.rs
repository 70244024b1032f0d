// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for the WebM `Info` element.

use super::ids;
use super::parser::{WebmListParser, WebmParserClient};
use packkit_core::Result;

/// Timecode scale applied when the Info element does not carry one, in
/// nanoseconds per tick.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

#[derive(Default)]
pub struct WebmInfoParser {
    timecode_scale: Option<u64>,
    duration: Option<f64>,
}

impl WebmInfoParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole `Info` element. All-or-nothing: returns the bytes
    /// consumed once the element is complete, 0 when more data is needed.
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize> {
        self.timecode_scale = None;
        self.duration = None;

        let mut parser = WebmListParser::new(ids::INFO);
        let result = parser.parse(self, buf)?;
        Ok(if parser.is_parsing_complete() { result } else { 0 })
    }

    /// Nanoseconds per timecode tick.
    pub fn timecode_scale(&self) -> u64 {
        self.timecode_scale.unwrap_or(DEFAULT_TIMECODE_SCALE)
    }

    /// Stream duration in timecode ticks, when the header declares one.
    pub const fn duration(&self) -> Option<f64> {
        self.duration
    }
}

impl WebmParserClient for WebmInfoParser {
    fn on_list_end(&mut self, id: u64) -> bool {
        if id == ids::INFO && self.timecode_scale.is_none() {
            self.timecode_scale = Some(DEFAULT_TIMECODE_SCALE);
        }
        true
    }

    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        if id != ids::TIMECODE_SCALE {
            return true;
        }
        if self.timecode_scale.is_some() {
            tracing::warn!("multiple TimecodeScale elements in Info");
            return false;
        }
        self.timecode_scale = Some(value);
        true
    }

    fn on_float(&mut self, id: u64, value: f64) -> bool {
        if id != ids::DURATION {
            tracing::debug!("unexpected float element {id:#x} in Info");
            return false;
        }
        if self.duration.is_some() {
            tracing::warn!("multiple Duration elements in Info");
            return false;
        }
        self.duration = Some(value);
        true
    }
}
