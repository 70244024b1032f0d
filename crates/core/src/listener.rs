// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The muxer listener: the cross-cutting sink for per-stream and per-segment
//! metadata, consumed by manifest generators and test mocks.
//!
//! Listener calls never fail the producer and are never made concurrently
//! for one stream; a listener belongs to the pipeline that owns it.

use crate::crypto::{ProtectionScheme, ProtectionSystemSpecificInfo};
use crate::muxer::MuxerOptions;
use crate::types::StreamInfo;

/// Output container type reported with `on_media_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    Unknown,
    Mp4,
    Mpeg2Ts,
    WebM,
    PackedAudio,
    Text,
}

/// A byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

/// Optional byte ranges gathered over a whole stream, reported once at
/// `on_media_end`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRanges {
    /// Range of the initialization section, when the container has one.
    pub init_range: Option<Range>,
    /// Range of the index section, when the container has one.
    pub index_range: Option<Range>,
    /// Per-subsegment ranges for single-file output.
    pub subsegment_ranges: Vec<Range>,
}

/// Event sink for muxing metadata, in rough temporal order of invocation.
pub trait MuxerListener: Send {
    /// Key material is known. Emitted before `on_media_start` for static
    /// keys and after it once rotated keys arrive.
    fn on_encryption_info_ready(
        &mut self,
        is_initial_encryption_info: bool,
        protection_scheme: ProtectionScheme,
        key_id: &[u8],
        iv: &[u8],
        key_system_infos: &[ProtectionSystemSpecificInfo],
    );

    /// Encryption of samples begins.
    fn on_encryption_start(&mut self);

    /// Stream info has been committed for the output.
    fn on_media_start(
        &mut self,
        muxer_options: &MuxerOptions,
        stream_info: &StreamInfo,
        time_scale: u32,
        container_type: ContainerType,
    );

    /// The first sample duration is known, in time-scale ticks.
    fn on_sample_duration_ready(&mut self, sample_duration: i64);

    /// A segment has been completed and persisted.
    fn on_new_segment(
        &mut self,
        file_name: &str,
        start_time: i64,
        duration: i64,
        segment_file_size: u64,
        segment_number: u64,
    );

    /// A key frame landed at the given byte offset; used for byte-range
    /// indexes on video streams.
    fn on_key_frame(&mut self, timestamp: i64, start_byte_offset: u64, size: u64);

    /// A mid-stream cue marker passed through the pipeline.
    fn on_cue_event(&mut self, timestamp: i64, cue_data: &[u8]);

    /// Final call for the stream.
    fn on_media_end(&mut self, media_ranges: &MediaRanges, duration_seconds: f32);
}

/// Forwards every event to a group of child listeners, in insertion order.
#[derive(Default)]
pub struct CombinedMuxerListener {
    listeners: Vec<Box<dyn MuxerListener>>,
}

impl CombinedMuxerListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn MuxerListener>) {
        self.listeners.push(listener);
    }
}

impl MuxerListener for CombinedMuxerListener {
    fn on_encryption_info_ready(
        &mut self,
        is_initial_encryption_info: bool,
        protection_scheme: ProtectionScheme,
        key_id: &[u8],
        iv: &[u8],
        key_system_infos: &[ProtectionSystemSpecificInfo],
    ) {
        for listener in &mut self.listeners {
            listener.on_encryption_info_ready(
                is_initial_encryption_info,
                protection_scheme,
                key_id,
                iv,
                key_system_infos,
            );
        }
    }

    fn on_encryption_start(&mut self) {
        for listener in &mut self.listeners {
            listener.on_encryption_start();
        }
    }

    fn on_media_start(
        &mut self,
        muxer_options: &MuxerOptions,
        stream_info: &StreamInfo,
        time_scale: u32,
        container_type: ContainerType,
    ) {
        for listener in &mut self.listeners {
            listener.on_media_start(muxer_options, stream_info, time_scale, container_type);
        }
    }

    fn on_sample_duration_ready(&mut self, sample_duration: i64) {
        for listener in &mut self.listeners {
            listener.on_sample_duration_ready(sample_duration);
        }
    }

    fn on_new_segment(
        &mut self,
        file_name: &str,
        start_time: i64,
        duration: i64,
        segment_file_size: u64,
        segment_number: u64,
    ) {
        for listener in &mut self.listeners {
            listener.on_new_segment(
                file_name,
                start_time,
                duration,
                segment_file_size,
                segment_number,
            );
        }
    }

    fn on_key_frame(&mut self, timestamp: i64, start_byte_offset: u64, size: u64) {
        for listener in &mut self.listeners {
            listener.on_key_frame(timestamp, start_byte_offset, size);
        }
    }

    fn on_cue_event(&mut self, timestamp: i64, cue_data: &[u8]) {
        for listener in &mut self.listeners {
            listener.on_cue_event(timestamp, cue_data);
        }
    }

    fn on_media_end(&mut self, media_ranges: &MediaRanges, duration_seconds: f32) {
        for listener in &mut self.listeners {
            listener.on_media_end(media_ranges, duration_seconds);
        }
    }
}
