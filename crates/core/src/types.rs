// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Core data types that flow through PackKit pipelines.
//!
//! This module defines the fundamental data structures used throughout the
//! system:
//! - [`StreamInfo`]: Immutable description of one elementary stream
//! - [`MediaSample`]: Opaque demuxed payload with timing and crypto metadata
//! - [`TextSample`]: A presentation cue with millisecond timing
//! - [`SegmentInfo`]: Boundary marker grouping samples into segments
//! - [`StreamData`]: The tagged variant handlers exchange
//!
//! Samples are immutable once constructed and shared as `Arc`s so fan-out
//! cloning is an atomic refcount increment, never a payload copy.

use crate::crypto::DecryptConfig;
use bytes::Bytes;
use std::sync::Arc;

/// Codecs this engine recognizes when demultiplexing containers. Payload
/// bytes are always passed through opaquely; the tag only routes and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Vp8,
    Vp9,
    Vorbis,
    Opus,
    WebVtt,
}

impl Codec {
    /// Codec string as used in manifests.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::WebVtt => "wvtt",
        }
    }
}

/// A rectangle inside a coded frame, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibleRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-kind stream details carried by [`StreamInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDetails {
    Audio {
        channels: u8,
        sampling_frequency: u32,
        /// Bits per coded sample; 0 when the container does not say.
        bit_depth: u8,
    },
    Video {
        coded_width: u32,
        coded_height: u32,
        visible_rect: VisibleRect,
        /// Natural (display) size after aspect correction.
        display_width: u32,
        display_height: u32,
    },
    Text {
        width: u16,
        height: u16,
        /// Serialized style/region configuration (e.g. WebVTT STYLE and
        /// REGION blocks, blank-line separated).
        css_config: String,
    },
}

/// Immutable description of one stream, created by a parser and shared with
/// every downstream handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub track_id: u32,
    pub codec: Codec,
    /// Ticks per second for this stream's timestamps.
    pub time_scale: u32,
    /// Duration in time-scale ticks; `None` when unbounded or unknown.
    pub duration: Option<u64>,
    /// ISO language; empty for video.
    pub language: String,
    pub is_encrypted: bool,
    /// Codec initialization bytes (`CodecPrivate` for WebM streams).
    pub codec_config: Bytes,
    pub details: StreamDetails,
}

impl StreamInfo {
    pub const fn is_audio(&self) -> bool {
        matches!(self.details, StreamDetails::Audio { .. })
    }

    pub const fn is_video(&self) -> bool {
        matches!(self.details, StreamDetails::Video { .. })
    }

    pub const fn is_text(&self) -> bool {
        matches!(self.details, StreamDetails::Text { .. })
    }
}

/// An opaque demuxed media payload.
///
/// Timestamps and duration are in the owning stream's time scale. A sample
/// with an empty payload is the end-of-stream sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    data: Bytes,
    side_data: Bytes,
    dts: i64,
    pts: i64,
    duration: i64,
    is_key_frame: bool,
    decrypt_config: Option<DecryptConfig>,
}

impl MediaSample {
    /// Copy `data` into a new shared sample.
    pub fn copy_from(data: &[u8], is_key_frame: bool) -> Arc<Self> {
        Self::copy_from_with_side_data(data, &[], is_key_frame)
    }

    /// Copy `data` and decoder side data into a new shared sample.
    pub fn copy_from_with_side_data(
        data: &[u8],
        side_data: &[u8],
        is_key_frame: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            data: Bytes::copy_from_slice(data),
            side_data: Bytes::copy_from_slice(side_data),
            dts: 0,
            pts: 0,
            duration: 0,
            is_key_frame,
            decrypt_config: None,
        })
    }

    /// The end-of-stream sentinel: empty payload, no metadata.
    pub fn end_of_stream() -> Arc<Self> {
        Arc::new(Self {
            data: Bytes::new(),
            side_data: Bytes::new(),
            dts: 0,
            pts: 0,
            duration: 0,
            is_key_frame: false,
            decrypt_config: None,
        })
    }

    /// Builder-style timing/crypto setup used by parsers before the sample
    /// is shared. Consumes and returns `self` so construction stays a single
    /// expression.
    pub fn with_timing(mut self: Arc<Self>, dts: i64, pts: i64, duration: i64) -> Arc<Self> {
        let sample = Arc::make_mut(&mut self);
        sample.dts = dts;
        sample.pts = pts;
        sample.duration = duration;
        self
    }

    pub fn with_decrypt_config(mut self: Arc<Self>, config: DecryptConfig) -> Arc<Self> {
        Arc::make_mut(&mut self).decrypt_config = Some(config);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn side_data(&self) -> &[u8] {
        &self.side_data
    }

    pub const fn dts(&self) -> i64 {
        self.dts
    }

    pub const fn pts(&self) -> i64 {
        self.pts
    }

    pub const fn duration(&self) -> i64 {
        self.duration
    }

    pub const fn is_key_frame(&self) -> bool {
        self.is_key_frame
    }

    pub const fn decrypt_config(&self) -> Option<&DecryptConfig> {
        self.decrypt_config.as_ref()
    }

    pub const fn is_encrypted(&self) -> bool {
        self.decrypt_config.is_some()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.data.is_empty()
    }
}

/// A presentation cue.
///
/// Producers must guarantee `end_time > start_time`; cues that violate this
/// are dropped at the source with a warning rather than failing the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSample {
    id: String,
    start_time_ms: u64,
    end_time_ms: u64,
    settings: String,
    payload: String,
    /// Comment text (e.g. WebVTT NOTE blocks) associated with the cue.
    /// Never re-emitted by writers.
    comment: String,
}

impl TextSample {
    pub fn new(
        id: impl Into<String>,
        start_time_ms: u64,
        end_time_ms: u64,
        settings: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_time_ms,
            end_time_ms,
            settings: settings.into(),
            payload: payload.into(),
            comment: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn start_time(&self) -> u64 {
        self.start_time_ms
    }

    pub const fn end_time(&self) -> u64 {
        self.end_time_ms
    }

    pub const fn duration(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }

    pub fn settings(&self) -> &str {
        &self.settings
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_time(&mut self, start_time_ms: u64, end_time_ms: u64) {
        self.start_time_ms = start_time_ms;
        self.end_time_ms = end_time_ms;
    }

    /// Append one style token to the settings string, space separated.
    pub fn append_style(&mut self, style: &str) {
        if !self.settings.is_empty() {
            self.settings.push(' ');
        }
        self.settings.push_str(style);
    }

    /// Append one payload line, newline separated.
    pub fn append_payload(&mut self, line: &str) {
        if !self.payload.is_empty() {
            self.payload.push('\n');
        }
        self.payload.push_str(line);
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Append one comment line, newline separated.
    pub fn append_comment(&mut self, line: &str) {
        if !self.comment.is_empty() {
            self.comment.push('\n');
        }
        self.comment.push_str(line);
    }
}

/// Boundary marker emitted after the samples of a segment, in the stream's
/// time scale. Subsegments are ignored by text and packed-audio writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentInfo {
    pub start_timestamp: i64,
    pub duration: i64,
    pub is_subsegment: bool,
    pub is_encrypted: bool,
    pub segment_number: u64,
}

/// A mid-stream cue marker (e.g. an ad insertion point) with an opaque
/// payload forwarded to listeners untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueEvent {
    pub timestamp: i64,
    pub payload: Bytes,
}

/// The tagged variant flowing through the media-handler graph.
///
/// Cloning is cheap: payload-bearing variants hold `Arc`s.
#[derive(Debug, Clone)]
pub enum StreamData {
    StreamInfo(Arc<StreamInfo>),
    MediaSample(Arc<MediaSample>),
    TextSample(Arc<TextSample>),
    SegmentInfo(SegmentInfo),
    CueEvent(CueEvent),
}

impl StreamData {
    /// Short tag for log lines and error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StreamInfo(_) => "stream info",
            Self::MediaSample(_) => "media sample",
            Self::TextSample(_) => "text sample",
            Self::SegmentInfo(_) => "segment info",
            Self::CueEvent(_) => "cue event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_stream_sentinel() {
        let eos = MediaSample::end_of_stream();
        assert!(eos.is_end_of_stream());

        let sample = MediaSample::copy_from(b"frame", true);
        assert!(!sample.is_end_of_stream());
        assert!(sample.is_key_frame());
    }

    #[test]
    fn test_sample_timing_builder() {
        let sample = MediaSample::copy_from(b"frame", false).with_timing(10, 12, 3);
        assert_eq!(sample.dts(), 10);
        assert_eq!(sample.pts(), 12);
        assert_eq!(sample.duration(), 3);
    }

    #[test]
    fn test_text_sample_appends() {
        let mut sample = TextSample::new("id", 0, 100, "", "");
        sample.append_style("align:left");
        sample.append_style("line:0");
        sample.append_payload("first");
        sample.append_payload("second");
        assert_eq!(sample.settings(), "align:left line:0");
        assert_eq!(sample.payload(), "first\nsecond");
    }

    #[test]
    fn test_stream_data_clone_shares_payload() {
        let sample = MediaSample::copy_from(b"frame", false);
        let data = StreamData::MediaSample(Arc::clone(&sample));
        let clone = data.clone();
        match (&data, &clone) {
            (StreamData::MediaSample(a), StreamData::MediaSample(b)) => {
                assert!(Arc::ptr_eq(a, b));
            },
            _ => unreachable!(),
        }
    }
}
