// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Decoder for WebM `Cluster` elements.
//!
//! Produces timestamped [`MediaSample`]s grouped per track in insertion
//! order. Block timecodes are relative to the cluster timecode and must be
//! non-negative and monotonically non-decreasing within a cluster; lacing
//! is not supported. On encrypted tracks every block payload starts with a
//! signal byte: bit 0 set means the frame is encrypted and an 8-byte IV
//! follows before the sample bytes.

use super::ids;
use super::parser::{ClientRef, WebmListParser, WebmParserClient};
use packkit_core::crypto::DecryptConfig;
use packkit_core::types::MediaSample;
use packkit_core::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Width of the per-frame initialization vector on encrypted WebM tracks.
const WEBM_IV_SIZE: usize = 8;

struct Track {
    track_num: Option<u64>,
    is_video: bool,
    samples: Vec<Arc<MediaSample>>,
}

impl Track {
    fn new(track_num: Option<u64>, is_video: bool) -> Self {
        Self { track_num, is_video, samples: Vec::new() }
    }

    fn is_keyframe(&self, data: &[u8]) -> bool {
        // Non-video blocks are all keyframes (valid for Vorbis, Opus and
        // WebVTT).
        if !self.is_video {
            return true;
        }
        // VP8 keyframe: inverse key flag in the first byte plus the sync
        // startcode 0x9D012A (RFC 6386, section 19.1).
        data.len() >= 7
            && data[0] & 0x01 == 0
            && data[3] == 0x9D
            && data[4] == 0x01
            && data[5] == 0x2A
    }
}

pub struct WebmClusterParser {
    /// Converts timecode ticks into microseconds.
    timecode_multiplier: f64,
    ignored_tracks: BTreeSet<u64>,
    audio_encryption_key_id: Vec<u8>,
    video_encryption_key_id: Vec<u8>,

    parser: WebmListParser,

    last_block_timecode: Option<i64>,
    block_data: Option<Vec<u8>>,
    block_duration: Option<u64>,
    block_add_id: Option<u64>,
    block_additional_data: Option<Vec<u8>>,

    cluster_timecode: Option<u64>,
    cluster_start_time_us: Option<i64>,
    cluster_ended: bool,

    audio: Track,
    video: Track,
    text_track_map: BTreeMap<u64, Track>,
}

impl WebmClusterParser {
    pub fn new(
        timecode_scale: u64,
        audio_track_num: Option<u64>,
        video_track_num: Option<u64>,
        text_track_nums: &BTreeSet<u64>,
        ignored_tracks: BTreeSet<u64>,
        audio_encryption_key_id: Vec<u8>,
        video_encryption_key_id: Vec<u8>,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let timecode_multiplier = timecode_scale as f64 / 1000.0;
        Self {
            timecode_multiplier,
            ignored_tracks,
            audio_encryption_key_id,
            video_encryption_key_id,
            parser: WebmListParser::new(ids::CLUSTER),
            last_block_timecode: None,
            block_data: None,
            block_duration: None,
            block_add_id: None,
            block_additional_data: None,
            cluster_timecode: None,
            cluster_start_time_us: None,
            cluster_ended: false,
            audio: Track::new(audio_track_num, false),
            video: Track::new(video_track_num, true),
            text_track_map: text_track_nums
                .iter()
                .map(|&num| (num, Track::new(Some(num), false)))
                .collect(),
        }
    }

    /// Reset all state so the parser can accept a new cluster.
    pub fn reset(&mut self) {
        self.last_block_timecode = None;
        self.cluster_timecode = None;
        self.cluster_start_time_us = None;
        self.cluster_ended = false;
        self.parser.reset();
        self.clear_sample_buffers();
    }

    /// Parse (part of) a cluster. Returns the bytes consumed; 0 means more
    /// data is needed. Samples decoded by this call are available through
    /// the accessors until the next call.
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize> {
        self.clear_sample_buffers();

        // The driver borrows `self` as its client, so take it out for the
        // duration of the call.
        let mut parser = std::mem::replace(&mut self.parser, WebmListParser::new(ids::CLUSTER));
        let result = parser.parse(self, buf);
        self.parser = parser;

        let bytes_parsed = match result {
            Ok(bytes) => bytes,
            Err(error) => {
                self.cluster_ended = false;
                return Err(error);
            },
        };

        self.cluster_ended = self.parser.is_parsing_complete();
        if self.cluster_ended {
            // A cluster without block content starts at its timecode.
            if self.cluster_start_time_us.is_none() {
                #[allow(clippy::cast_possible_wrap)]
                let start = self.cluster_timecode.map(|tc| self.ticks_to_us(tc as i64));
                self.cluster_start_time_us = start;
            }
            // Ready to accept the next cluster on the following call.
            self.parser.reset();
            self.last_block_timecode = None;
            self.cluster_timecode = None;
        }
        Ok(bytes_parsed)
    }

    pub fn audio_samples(&self) -> &[Arc<MediaSample>] {
        &self.audio.samples
    }

    pub fn video_samples(&self) -> &[Arc<MediaSample>] {
        &self.video.samples
    }

    pub const fn audio_track_num(&self) -> Option<u64> {
        self.audio.track_num
    }

    pub const fn video_track_num(&self) -> Option<u64> {
        self.video.track_num
    }

    /// Per text track sample queues, in track order.
    pub fn text_track_samples(&self) -> impl Iterator<Item = (u64, &[Arc<MediaSample>])> {
        self.text_track_map
            .iter()
            .map(|(&num, track)| (num, track.samples.as_slice()))
    }

    /// Start of the cluster in microseconds, set once the cluster timecode
    /// or its first block has been seen.
    pub const fn cluster_start_time_us(&self) -> Option<i64> {
        self.cluster_start_time_us
    }

    /// True when the last `parse` call stopped at the end of a cluster.
    pub const fn cluster_ended(&self) -> bool {
        self.cluster_ended
    }

    fn clear_sample_buffers(&mut self) {
        self.audio.samples.clear();
        self.video.samples.clear();
        for track in self.text_track_map.values_mut() {
            track.samples.clear();
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn ticks_to_us(&self, ticks: i64) -> i64 {
        (ticks as f64 * self.timecode_multiplier) as i64
    }

    fn parse_block(
        &mut self,
        is_simple_block: bool,
        buf: &[u8],
        additional: Option<&[u8]>,
        duration: Option<u64>,
    ) -> bool {
        if buf.len() < 4 {
            return false;
        }
        // Track numbers over 127 are not supported.
        if buf[0] & 0x80 == 0 {
            tracing::warn!("TrackNumber over 127 not supported");
            return false;
        }

        let track_num = u64::from(buf[0] & 0x7F);
        let timecode = i64::from(i16::from_be_bytes([buf[1], buf[2]]));
        let flags = buf[3];
        let lacing = (flags >> 1) & 0x3;
        if lacing != 0 {
            tracing::warn!("lacing {lacing} is not supported yet");
            return false;
        }

        self.on_block(is_simple_block, track_num, timecode, duration, flags, &buf[4..], additional)
    }

    #[allow(clippy::too_many_arguments)]
    fn on_block(
        &mut self,
        is_simple_block: bool,
        track_num: u64,
        timecode: i64,
        block_duration: Option<u64>,
        flags: u8,
        frame: &[u8],
        additional: Option<&[u8]>,
    ) -> bool {
        let Some(cluster_timecode) = self.cluster_timecode else {
            tracing::warn!("got a block before cluster timecode");
            return false;
        };
        if timecode < 0 {
            tracing::warn!("got a block with negative timecode offset {timecode}");
            return false;
        }
        if let Some(last) = self.last_block_timecode {
            if timecode < last {
                tracing::warn!("got a block with a timecode before the previous block");
                return false;
            }
        }

        enum Kind {
            Audio,
            Video,
            Text(u64),
        }
        let kind = if Some(track_num) == self.audio.track_num {
            Kind::Audio
        } else if Some(track_num) == self.video.track_num {
            Kind::Video
        } else if self.ignored_tracks.contains(&track_num) {
            return true;
        } else if self.text_track_map.contains_key(&track_num) {
            if is_simple_block {
                // Cue blocks need a BlockGroup to carry their duration.
                return false;
            }
            if block_duration.is_none() {
                return false;
            }
            Kind::Text(track_num)
        } else {
            tracing::warn!("unexpected track number {track_num}");
            return false;
        };

        self.last_block_timecode = Some(timecode);

        let encryption_key_id = match kind {
            Kind::Audio => self.audio_encryption_key_id.as_slice(),
            Kind::Video => self.video_encryption_key_id.as_slice(),
            Kind::Text(_) => &[],
        };

        // Every block of an encrypted track starts with a signal byte; bit 0
        // set means an IV precedes the frame data.
        let (payload, decrypt_config) = if encryption_key_id.is_empty() {
            (frame, None)
        } else {
            let Some((&signal_byte, rest)) = frame.split_first() else {
                tracing::warn!("empty block on an encrypted track");
                return false;
            };
            if signal_byte & 0x01 != 0 {
                if rest.len() < WEBM_IV_SIZE {
                    tracing::warn!("encrypted block is too short to hold an IV");
                    return false;
                }
                let (iv, payload) = rest.split_at(WEBM_IV_SIZE);
                let config =
                    DecryptConfig::new(encryption_key_id.to_vec(), iv.to_vec(), Vec::new());
                (payload, Some(config))
            } else {
                (rest, None)
            }
        };

        let track = match kind {
            Kind::Audio => &self.audio,
            Kind::Video => &self.video,
            Kind::Text(num) => &self.text_track_map[&num],
        };

        // A SimpleBlock carries its keyframe state in the flags; a Block
        // requires payload inspection, which only works on clear frames.
        let is_key_frame = if is_simple_block {
            flags & 0x80 != 0
        } else if decrypt_config.is_some() {
            false
        } else {
            track.is_keyframe(payload)
        };

        let timestamp_us = self.ticks_to_us(cluster_timecode as i64 + timecode);
        let duration_us = block_duration.map_or(0, |d| self.ticks_to_us(d as i64));

        let mut sample =
            MediaSample::copy_from_with_side_data(payload, additional.unwrap_or(&[]), is_key_frame)
                .with_timing(timestamp_us, timestamp_us, duration_us);
        if let Some(config) = decrypt_config {
            sample = sample.with_decrypt_config(config);
        }

        if self.cluster_start_time_us.is_none() {
            self.cluster_start_time_us = Some(timestamp_us);
        }

        let track = match kind {
            Kind::Audio => &mut self.audio,
            Kind::Video => &mut self.video,
            Kind::Text(num) => match self.text_track_map.get_mut(&num) {
                Some(track) => track,
                None => return false,
            },
        };
        track.samples.push(sample);
        true
    }
}

impl WebmParserClient for WebmClusterParser {
    fn on_list_start(&mut self, id: u64) -> Option<ClientRef> {
        match id {
            ids::CLUSTER => {
                self.cluster_timecode = None;
                self.cluster_start_time_us = None;
            },
            ids::BLOCK_GROUP => {
                self.block_data = None;
                self.block_duration = None;
            },
            ids::BLOCK_ADDITIONS => {
                self.block_add_id = None;
                self.block_additional_data = None;
            },
            _ => {},
        }
        Some(ClientRef::This)
    }

    fn on_list_end(&mut self, id: u64) -> bool {
        if id != ids::BLOCK_GROUP {
            return true;
        }
        // Make sure the BlockGroup actually had a Block.
        let Some(block_data) = self.block_data.take() else {
            tracing::warn!("Block missing from BlockGroup");
            return false;
        };
        let additional = self.block_additional_data.take();
        let duration = self.block_duration.take();
        self.block_add_id = None;
        self.parse_block(false, &block_data, additional.as_deref(), duration)
    }

    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let slot = match id {
            ids::TIMECODE => &mut self.cluster_timecode,
            ids::BLOCK_DURATION => &mut self.block_duration,
            ids::BLOCK_ADD_ID => &mut self.block_add_id,
            _ => return true,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    fn on_binary(&mut self, id: u64, data: &[u8]) -> bool {
        match id {
            ids::SIMPLE_BLOCK => self.parse_block(true, data, None, None),
            ids::BLOCK => {
                if self.block_data.is_some() {
                    tracing::warn!("more than 1 Block in a BlockGroup is not supported");
                    return false;
                }
                self.block_data = Some(data.to_vec());
                true
            },
            ids::BLOCK_ADDITIONAL => {
                if self.block_additional_data.is_some() {
                    tracing::warn!(
                        "more than 1 BlockAdditional in a BlockGroup is not supported"
                    );
                    return false;
                }
                // The add-id rides along in front of the side data, in
                // big-endian, mirroring the demuxer convention downstream
                // consumers expect.
                let mut side_data =
                    Vec::with_capacity(std::mem::size_of::<u64>() + data.len());
                side_data.extend_from_slice(&self.block_add_id.unwrap_or(0).to_be_bytes());
                side_data.extend_from_slice(data);
                self.block_additional_data = Some(side_data);
                true
            },
            _ => true,
        }
    }
}
