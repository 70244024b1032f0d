// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The WebM stream-level state machine.
//!
//! Feeds bytes through a rolling queue, parses the segment header, `Info`
//! and `Tracks` exactly once, then loops over clusters, reporting decoded
//! samples and segment boundaries through [`StreamParserEvents`]. A
//! repeated EBML header restarts header parsing (stream splice); a parse
//! error is terminal for the input.

use super::cluster::WebmClusterParser;
use super::ids;
use super::info::WebmInfoParser;
use super::parser::parse_element_header;
use super::tracks::WebmTracksParser;
use packkit_core::types::{MediaSample, StreamInfo, TextSample};
use packkit_core::{PackKitError, Result};
use std::sync::Arc;

/// Init-data type reported with need-key events for WebM content.
pub const WEBM_INIT_DATA_TYPE: &str = "video/webm";

/// Sink for everything the stream parser produces. Sample callbacks return
/// `false` to abort the parse.
pub trait StreamParserEvents: Send {
    /// Headers are parsed. `duration_us` is `None` for unbounded streams.
    fn on_init(&mut self, duration_us: Option<i64>);

    /// One call per adopted audio/video track.
    fn on_stream_info(&mut self, stream_info: Arc<StreamInfo>) -> bool;

    /// An encrypted track needs a key for `key_id`.
    fn on_need_key(&mut self, init_data_type: &str, key_id: &[u8]);

    /// A new cluster begins at `start_time_us`.
    fn on_new_segment(&mut self, start_time_us: i64);

    /// Decoded media samples of one track, in decode order.
    fn on_media_samples(&mut self, track_id: u32, samples: &[Arc<MediaSample>]) -> bool;

    /// Decoded text cues of one track, in decode order.
    fn on_text_samples(&mut self, track_id: u32, samples: &[Arc<TextSample>]) -> bool;

    /// The current cluster has ended.
    fn on_end_of_segment(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingForInit,
    ParsingHeaders,
    ParsingClusters,
    Error,
}

pub struct WebmMediaParser {
    state: State,
    ignore_text_tracks: bool,
    events: Option<Box<dyn StreamParserEvents>>,
    cluster_parser: Option<WebmClusterParser>,
    byte_queue: Vec<u8>,
    waiting_for_buffers: bool,
}

impl WebmMediaParser {
    pub fn new(ignore_text_tracks: bool) -> Self {
        Self {
            state: State::WaitingForInit,
            ignore_text_tracks,
            events: None,
            cluster_parser: None,
            byte_queue: Vec::new(),
            waiting_for_buffers: false,
        }
    }

    /// Install the event sink and arm the parser.
    pub fn init(&mut self, events: Box<dyn StreamParserEvents>) {
        debug_assert_eq!(self.state, State::WaitingForInit);
        self.events = Some(events);
        self.state = State::ParsingHeaders;
    }

    /// Signal end of input: drops buffered bytes and resets cluster state.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == State::WaitingForInit {
            return Err(PackKitError::Parser("flush before init".to_string()));
        }
        self.byte_queue.clear();
        if self.state == State::ParsingClusters {
            if let Some(cluster_parser) = &mut self.cluster_parser {
                cluster_parser.reset();
            }
        }
        Ok(())
    }

    /// Feed bytes. Parses as far as possible and buffers the remainder.
    pub fn parse(&mut self, buf: &[u8]) -> Result<()> {
        if self.state == State::WaitingForInit {
            return Err(PackKitError::Parser("parse before init".to_string()));
        }
        if self.state == State::Error {
            return Err(PackKitError::Parser("parse after a stream error".to_string()));
        }

        self.byte_queue.extend_from_slice(buf);

        let mut bytes_parsed = 0;
        let queue = std::mem::take(&mut self.byte_queue);
        let result = (|| -> Result<()> {
            while bytes_parsed < queue.len() {
                let cur = &queue[bytes_parsed..];
                let old_state = self.state;
                let result = match self.state {
                    State::ParsingHeaders => self.parse_info_and_tracks(cur),
                    State::ParsingClusters => self.parse_cluster(cur),
                    State::WaitingForInit | State::Error => {
                        return Err(PackKitError::Parser("unexpected parser state".to_string()));
                    },
                };
                let consumed = match result {
                    Ok(consumed) => consumed,
                    Err(error) => {
                        self.state = State::Error;
                        return Err(error);
                    },
                };
                if consumed == 0 && self.state == old_state {
                    break; // need more data
                }
                bytes_parsed += consumed;
            }
            Ok(())
        })();
        self.byte_queue = queue[bytes_parsed..].to_vec();
        result
    }

    #[allow(clippy::unwrap_used)] // init() is a precondition of parse()
    fn events(&mut self) -> &mut dyn StreamParserEvents {
        self.events.as_mut().unwrap().as_mut()
    }

    /// Parse the WebM header area: skips over leading level-1 elements,
    /// then parses Info and Tracks together, emits init/config/need-key
    /// events, and transitions to cluster parsing.
    fn parse_info_and_tracks(&mut self, data: &[u8]) -> Result<usize> {
        let Some((id, size, header_length)) = parse_element_header(data)? else {
            return Ok(0);
        };

        match id {
            ids::EBML_HEADER
            | ids::SEEK_HEAD
            | ids::VOID
            | ids::CRC32
            | ids::CUES
            | ids::CHAPTERS
            | ids::TAGS
            | ids::ATTACHMENTS => {
                let Some(element_size) = size else {
                    return Err(PackKitError::Parser(format!(
                        "cannot skip element {id:#x} with unknown size"
                    )));
                };
                let total = header_length + element_size as usize;
                if data.len() < total {
                    // We don't have the whole element yet; signal we need
                    // more data.
                    return Ok(0);
                }
                return Ok(total);
            },
            // Just consume the segment header and descend.
            ids::SEGMENT => return Ok(header_length),
            ids::INFO => {},
            _ => {
                return Err(PackKitError::Parser(format!("unexpected element id {id:#x}")));
            },
        }

        let mut info_parser = WebmInfoParser::new();
        let info_bytes = info_parser.parse(data)?;
        if info_bytes == 0 {
            return Ok(0);
        }

        let mut tracks_parser = WebmTracksParser::new(self.ignore_text_tracks);
        let tracks_bytes = tracks_parser.parse(&data[info_bytes..])?;
        if tracks_bytes == 0 {
            return Ok(0);
        }

        let bytes_parsed = info_bytes + tracks_bytes;

        // duration ticks x (scale ns / 1000) = microseconds.
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let duration_us = info_parser.duration().filter(|&d| d > 0.0).map(|duration| {
            (duration * (info_parser.timecode_scale() as f64 / 1000.0)) as i64
        });

        if let Some(info) = tracks_parser.audio_stream_info() {
            if info.is_encrypted {
                let key_id = tracks_parser.audio_encryption_key_id().to_vec();
                self.events().on_need_key(WEBM_INIT_DATA_TYPE, &key_id);
            }
            if !self.events().on_stream_info(info) {
                return Err(PackKitError::Parser("audio config rejected".to_string()));
            }
        }
        if let Some(info) = tracks_parser.video_stream_info() {
            if info.is_encrypted {
                let key_id = tracks_parser.video_encryption_key_id().to_vec();
                self.events().on_need_key(WEBM_INIT_DATA_TYPE, &key_id);
            }
            if !self.events().on_stream_info(info) {
                return Err(PackKitError::Parser("video config rejected".to_string()));
            }
        }

        self.cluster_parser = Some(WebmClusterParser::new(
            info_parser.timecode_scale(),
            tracks_parser.audio_track_num(),
            tracks_parser.video_track_num(),
            &tracks_parser.text_tracks().keys().copied().collect(),
            tracks_parser.ignored_tracks().clone(),
            tracks_parser.audio_encryption_key_id().to_vec(),
            tracks_parser.video_encryption_key_id().to_vec(),
        ));

        self.state = State::ParsingClusters;
        self.events().on_init(duration_us);

        Ok(bytes_parsed)
    }

    fn parse_cluster(&mut self, data: &[u8]) -> Result<usize> {
        let Some((id, size, header_length)) = parse_element_header(data)? else {
            return Ok(0);
        };

        match id {
            ids::CUES | ids::CHAPTERS | ids::TAGS => {
                let Some(element_size) = size else {
                    return Err(PackKitError::Parser(format!(
                        "cannot skip element {id:#x} with unknown size"
                    )));
                };
                let total = header_length + element_size as usize;
                if data.len() < total {
                    return Ok(0);
                }
                return Ok(total);
            },
            // A new EBML header restarts header parsing.
            ids::EBML_HEADER => {
                self.state = State::ParsingHeaders;
                return Ok(0);
            },
            ids::CLUSTER => self.waiting_for_buffers = true,
            _ => {},
        }

        let Some(mut cluster_parser) =
            self.cluster_parser.take()
        else {
            return Err(PackKitError::Parser("no cluster parser".to_string()));
        };
        let result = self.drive_cluster_parser(&mut cluster_parser, data);
        self.cluster_parser = Some(cluster_parser);
        result
    }

    fn drive_cluster_parser(
        &mut self,
        cluster_parser: &mut WebmClusterParser,
        data: &[u8],
    ) -> Result<usize> {
        let bytes_parsed = cluster_parser.parse(data)?;
        if bytes_parsed == 0 {
            return Ok(0);
        }

        if self.waiting_for_buffers {
            if let Some(start_time_us) = cluster_parser.cluster_start_time_us() {
                self.events().on_new_segment(start_time_us);
                self.waiting_for_buffers = false;
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        if let Some(track_num) = cluster_parser.audio_track_num() {
            let samples = cluster_parser.audio_samples();
            if !samples.is_empty() && !self.events().on_media_samples(track_num as u32, samples) {
                return Err(PackKitError::Parser("audio samples rejected".to_string()));
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        if let Some(track_num) = cluster_parser.video_track_num() {
            let samples = cluster_parser.video_samples();
            if !samples.is_empty() && !self.events().on_media_samples(track_num as u32, samples) {
                return Err(PackKitError::Parser("video samples rejected".to_string()));
            }
        }

        let text_cues: Vec<(u64, Vec<Arc<TextSample>>)> = cluster_parser
            .text_track_samples()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(track_num, samples)| {
                (track_num, samples.iter().filter_map(decode_webvtt_block).collect())
            })
            .collect();
        for (track_num, cues) in text_cues {
            #[allow(clippy::cast_possible_truncation)]
            if !self.events().on_text_samples(track_num as u32, &cues) {
                return Err(PackKitError::Parser("text samples rejected".to_string()));
            }
        }

        if cluster_parser.cluster_ended() {
            self.events().on_end_of_segment();
        }

        Ok(bytes_parsed)
    }
}

/// Decode a WebVTT-in-WebM block payload: an id line, a settings line, and
/// the cue payload, with the cue timing carried by the block itself.
#[allow(clippy::cast_sign_loss)]
fn decode_webvtt_block(sample: &Arc<MediaSample>) -> Option<Arc<TextSample>> {
    let text = std::str::from_utf8(sample.data()).ok()?;
    let mut parts = text.splitn(3, '\n');
    let id = parts.next().unwrap_or("");
    let settings = parts.next().unwrap_or("");
    let payload = parts.next().unwrap_or("");

    let start_ms = sample.pts() / 1000;
    let end_ms = start_ms + sample.duration() / 1000;
    Some(Arc::new(TextSample::new(
        id,
        start_ms.max(0) as u64,
        end_ms.max(0) as u64,
        settings,
        payload,
    )))
}
