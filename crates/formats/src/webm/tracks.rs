// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for the WebM `Tracks` element.
//!
//! One audio and one video track participate; additional tracks of the same
//! kind are ignored. Text tracks are recorded with their kind and language
//! unless text handling is disabled. The first content encoding's key id
//! becomes the track's default encryption key id.

use super::content_encodings::WebmContentEncodingsClient;
use super::ids;
use super::parser::{ClientRef, WebmListParser, WebmParserClient};
use bytes::Bytes;
use packkit_core::types::{Codec, StreamDetails, StreamInfo, VisibleRect};
use packkit_core::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Time scale of WebM-derived audio/video stream infos: timestamps are
/// converted to microseconds during demultiplexing.
pub const MICROSECONDS_TIME_SCALE: u32 = 1_000_000;

/// Kind of an in-band text track, from its codec id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Subtitles,
    Captions,
    Descriptions,
    Metadata,
}

fn codec_id_to_text_kind(codec_id: &str) -> Option<TextKind> {
    match codec_id {
        ids::CODEC_SUBTITLES => Some(TextKind::Subtitles),
        ids::CODEC_CAPTIONS => Some(TextKind::Captions),
        ids::CODEC_DESCRIPTIONS => Some(TextKind::Descriptions),
        ids::CODEC_METADATA => Some(TextKind::Metadata),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTrackInfo {
    pub kind: TextKind,
    pub name: String,
    pub language: String,
}

/// Collects the `Audio` sub-element of a track entry.
#[derive(Default)]
struct WebmAudioClient {
    channels: Option<u64>,
    samples_per_second: Option<f64>,
    output_samples_per_second: Option<f64>,
    bit_depth: Option<u64>,
}

impl WebmAudioClient {
    fn reset(&mut self) {
        *self = Self::default();
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn initialize_stream_info(
        &self,
        track_id: u32,
        codec_id: &str,
        codec_private: &[u8],
        language: &str,
        is_encrypted: bool,
    ) -> Option<StreamInfo> {
        let codec = match codec_id {
            ids::CODEC_VORBIS => Codec::Vorbis,
            ids::CODEC_OPUS => Codec::Opus,
            _ => {
                tracing::warn!("unsupported audio codec_id {codec_id}");
                return None;
            },
        };

        let samples_per_second = self.output_samples_per_second.or(self.samples_per_second)?;
        if samples_per_second <= 0.0 {
            return None;
        }

        Some(StreamInfo {
            track_id,
            codec,
            time_scale: MICROSECONDS_TIME_SCALE,
            duration: None,
            language: language.to_string(),
            is_encrypted,
            codec_config: Bytes::copy_from_slice(codec_private),
            details: StreamDetails::Audio {
                channels: self.channels.unwrap_or(1) as u8,
                sampling_frequency: samples_per_second as u32,
                bit_depth: self.bit_depth.unwrap_or(0) as u8,
            },
        })
    }
}

impl WebmParserClient for WebmAudioClient {
    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let slot = match id {
            ids::CHANNELS => &mut self.channels,
            ids::BIT_DEPTH => &mut self.bit_depth,
            _ => return true,
        };
        if slot.is_some() {
            tracing::warn!("multiple values for audio element {id:#x}");
            return false;
        }
        *slot = Some(value);
        true
    }

    fn on_float(&mut self, id: u64, value: f64) -> bool {
        let slot = match id {
            ids::SAMPLING_FREQUENCY => &mut self.samples_per_second,
            ids::OUTPUT_SAMPLING_FREQUENCY => &mut self.output_samples_per_second,
            _ => return true,
        };
        if value <= 0.0 {
            return false;
        }
        if slot.is_some() {
            tracing::warn!("multiple values for audio element {id:#x}");
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Collects the `Video` sub-element of a track entry.
#[derive(Default)]
struct WebmVideoClient {
    pixel_width: Option<u64>,
    pixel_height: Option<u64>,
    crop_bottom: Option<u64>,
    crop_top: Option<u64>,
    crop_left: Option<u64>,
    crop_right: Option<u64>,
    display_width: Option<u64>,
    display_height: Option<u64>,
    display_unit: Option<u64>,
}

impl WebmVideoClient {
    fn reset(&mut self) {
        *self = Self::default();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn initialize_stream_info(
        &self,
        track_id: u32,
        codec_id: &str,
        codec_private: &[u8],
        language: &str,
        is_encrypted: bool,
    ) -> Option<StreamInfo> {
        let codec = match codec_id {
            ids::CODEC_VP8 => Codec::Vp8,
            ids::CODEC_VP9 => Codec::Vp9,
            _ => {
                tracing::warn!("unsupported video codec_id {codec_id}");
                return None;
            },
        };

        let (pixel_width, pixel_height) = match (self.pixel_width, self.pixel_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return None,
        };

        let crop_top = self.crop_top.unwrap_or(0);
        let crop_left = self.crop_left.unwrap_or(0);
        let crop_right = self.crop_right.unwrap_or(0);
        let crop_bottom = self.crop_bottom.unwrap_or(0);
        if crop_left + crop_right >= pixel_width || crop_top + crop_bottom >= pixel_height {
            return None;
        }

        let (display_width, display_height) = match self.display_unit.unwrap_or(0) {
            // Unit 0: pixels; missing values default to the coded size.
            0 => (
                self.display_width.unwrap_or(pixel_width),
                self.display_height.unwrap_or(pixel_height),
            ),
            // Unit 3: display aspect ratio; both values are required.
            3 => match (self.display_width, self.display_height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
                _ => return None,
            },
            unit => {
                tracing::warn!("unsupported display unit type {unit}");
                return None;
            },
        };

        Some(StreamInfo {
            track_id,
            codec,
            time_scale: MICROSECONDS_TIME_SCALE,
            duration: None,
            language: language.to_string(),
            is_encrypted,
            codec_config: Bytes::copy_from_slice(codec_private),
            details: StreamDetails::Video {
                coded_width: pixel_width as u32,
                coded_height: pixel_height as u32,
                visible_rect: VisibleRect {
                    x: crop_left as u32,
                    y: crop_top as u32,
                    width: (pixel_width - crop_left - crop_right) as u32,
                    height: (pixel_height - crop_top - crop_bottom) as u32,
                },
                display_width: display_width as u32,
                display_height: display_height as u32,
            },
        })
    }
}

impl WebmParserClient for WebmVideoClient {
    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let slot = match id {
            ids::PIXEL_WIDTH => &mut self.pixel_width,
            ids::PIXEL_HEIGHT => &mut self.pixel_height,
            ids::PIXEL_CROP_BOTTOM => &mut self.crop_bottom,
            ids::PIXEL_CROP_TOP => &mut self.crop_top,
            ids::PIXEL_CROP_LEFT => &mut self.crop_left,
            ids::PIXEL_CROP_RIGHT => &mut self.crop_right,
            ids::DISPLAY_WIDTH => &mut self.display_width,
            ids::DISPLAY_HEIGHT => &mut self.display_height,
            ids::DISPLAY_UNIT => &mut self.display_unit,
            _ => return true,
        };
        if slot.is_some() {
            tracing::warn!("multiple values for video element {id:#x}");
            return false;
        }
        *slot = Some(value);
        true
    }
}

// Child slots handed to the element walker.
const SLOT_AUDIO: usize = 0;
const SLOT_VIDEO: usize = 1;
const SLOT_CONTENT_ENCODINGS: usize = 2;

#[derive(Default)]
pub struct WebmTracksParser {
    ignore_text_tracks: bool,

    // Per-entry state.
    track_type: Option<u64>,
    track_num: Option<u64>,
    track_name: String,
    track_language: String,
    codec_id: Option<String>,
    codec_private: Option<Vec<u8>>,
    audio_client: WebmAudioClient,
    video_client: WebmVideoClient,
    content_encodings_client: Option<WebmContentEncodingsClient>,

    // Results.
    audio_track_num: Option<u64>,
    audio_stream_info: Option<Arc<StreamInfo>>,
    audio_encryption_key_id: Vec<u8>,
    video_track_num: Option<u64>,
    video_stream_info: Option<Arc<StreamInfo>>,
    video_encryption_key_id: Vec<u8>,
    text_tracks: BTreeMap<u64, TextTrackInfo>,
    ignored_tracks: BTreeSet<u64>,
}

impl WebmTracksParser {
    pub fn new(ignore_text_tracks: bool) -> Self {
        Self { ignore_text_tracks, ..Self::default() }
    }

    /// Parse a whole `Tracks` element. All-or-nothing: returns the bytes
    /// consumed once the element is complete, 0 when more data is needed.
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize> {
        let ignore_text_tracks = self.ignore_text_tracks;
        *self = Self::new(ignore_text_tracks);

        let mut parser = WebmListParser::new(ids::TRACKS);
        let result = parser.parse(self, buf)?;
        Ok(if parser.is_parsing_complete() { result } else { 0 })
    }

    pub const fn audio_track_num(&self) -> Option<u64> {
        self.audio_track_num
    }

    pub const fn video_track_num(&self) -> Option<u64> {
        self.video_track_num
    }

    pub fn audio_stream_info(&self) -> Option<Arc<StreamInfo>> {
        self.audio_stream_info.clone()
    }

    pub fn video_stream_info(&self) -> Option<Arc<StreamInfo>> {
        self.video_stream_info.clone()
    }

    pub fn audio_encryption_key_id(&self) -> &[u8] {
        &self.audio_encryption_key_id
    }

    pub fn video_encryption_key_id(&self) -> &[u8] {
        &self.video_encryption_key_id
    }

    pub const fn text_tracks(&self) -> &BTreeMap<u64, TextTrackInfo> {
        &self.text_tracks
    }

    pub const fn ignored_tracks(&self) -> &BTreeSet<u64> {
        &self.ignored_tracks
    }

    fn reset_track_entry(&mut self) {
        self.track_type = None;
        self.track_num = None;
        self.track_name.clear();
        self.track_language.clear();
        self.codec_id = None;
        self.codec_private = None;
        self.audio_client.reset();
        self.video_client.reset();
        self.content_encodings_client = None;
    }

    fn finish_track_entry(&mut self) -> bool {
        let (Some(track_type), Some(track_num)) = (self.track_type, self.track_num) else {
            tracing::warn!(
                "missing TrackEntry data: TrackType {:?} TrackNum {:?}",
                self.track_type,
                self.track_num
            );
            return false;
        };

        let codec_id = self.codec_id.clone().unwrap_or_default();

        let text_track_kind = match track_type {
            ids::TRACK_TYPE_AUDIO | ids::TRACK_TYPE_VIDEO => None,
            ids::TRACK_TYPE_SUBTITLES_OR_CAPTIONS => match codec_id_to_text_kind(&codec_id) {
                Some(kind @ (TextKind::Subtitles | TextKind::Captions)) => Some(kind),
                _ => {
                    tracing::warn!("wrong TrackEntry CodecID for TrackNum {track_num}");
                    return false;
                },
            },
            ids::TRACK_TYPE_DESCRIPTIONS_OR_METADATA => match codec_id_to_text_kind(&codec_id) {
                Some(kind @ (TextKind::Descriptions | TextKind::Metadata)) => Some(kind),
                _ => {
                    tracing::warn!("wrong TrackEntry CodecID for TrackNum {track_num}");
                    return false;
                },
            },
            other => {
                tracing::warn!("unexpected TrackType {other}");
                return false;
            },
        };

        // If a track has multiple content encodings, the key id of the first
        // one is adopted as the key id of the track.
        let encryption_key_id = self
            .content_encodings_client
            .as_ref()
            .and_then(|client| client.content_encodings().first())
            .map(|encoding| encoding.encryption_key_id.clone())
            .unwrap_or_default();
        let is_encrypted = !encryption_key_id.is_empty();

        let codec_private = self.codec_private.clone().unwrap_or_default();
        #[allow(clippy::cast_possible_truncation)]
        let track_id = track_num as u32;

        match track_type {
            ids::TRACK_TYPE_AUDIO => {
                if self.audio_track_num.is_none() {
                    let Some(info) = self.audio_client.initialize_stream_info(
                        track_id,
                        &codec_id,
                        &codec_private,
                        &self.track_language,
                        is_encrypted,
                    ) else {
                        return false;
                    };
                    self.audio_track_num = Some(track_num);
                    self.audio_encryption_key_id = encryption_key_id;
                    self.audio_stream_info = Some(Arc::new(info));
                } else {
                    tracing::info!("ignoring audio track {track_num}");
                    self.ignored_tracks.insert(track_num);
                }
            },
            ids::TRACK_TYPE_VIDEO => {
                if self.video_track_num.is_none() {
                    let Some(info) = self.video_client.initialize_stream_info(
                        track_id,
                        &codec_id,
                        &codec_private,
                        &self.track_language,
                        is_encrypted,
                    ) else {
                        return false;
                    };
                    self.video_track_num = Some(track_num);
                    self.video_encryption_key_id = encryption_key_id;
                    self.video_stream_info = Some(Arc::new(info));
                } else {
                    tracing::info!("ignoring video track {track_num}");
                    self.ignored_tracks.insert(track_num);
                }
            },
            _ => {
                #[allow(clippy::unwrap_used)] // text kind checked above
                let kind = text_track_kind.unwrap();
                if self.ignore_text_tracks {
                    tracing::info!("ignoring text track {track_num}");
                    self.ignored_tracks.insert(track_num);
                } else {
                    self.text_tracks.insert(
                        track_num,
                        TextTrackInfo {
                            kind,
                            name: self.track_name.clone(),
                            language: self.track_language.clone(),
                        },
                    );
                }
            },
        }

        self.reset_track_entry();
        true
    }
}

impl WebmParserClient for WebmTracksParser {
    fn on_list_start(&mut self, id: u64) -> Option<ClientRef> {
        match id {
            ids::CONTENT_ENCODINGS => {
                if self.content_encodings_client.is_some() {
                    return None;
                }
                let mut client = WebmContentEncodingsClient::new();
                client.on_list_start(id)?;
                self.content_encodings_client = Some(client);
                Some(ClientRef::Child(SLOT_CONTENT_ENCODINGS))
            },
            ids::TRACK_ENTRY => {
                self.reset_track_entry();
                Some(ClientRef::This)
            },
            ids::AUDIO => Some(ClientRef::Child(SLOT_AUDIO)),
            ids::VIDEO => Some(ClientRef::Child(SLOT_VIDEO)),
            _ => Some(ClientRef::This),
        }
    }

    fn on_list_end(&mut self, id: u64) -> bool {
        match id {
            ids::CONTENT_ENCODINGS => match self.content_encodings_client.as_mut() {
                Some(client) => client.on_list_end(id),
                None => false,
            },
            ids::TRACK_ENTRY => self.finish_track_entry(),
            _ => true,
        }
    }

    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let slot = match id {
            ids::TRACK_NUMBER => &mut self.track_num,
            ids::TRACK_TYPE => &mut self.track_type,
            _ => return true,
        };
        if slot.is_some() {
            tracing::warn!("multiple values for element {id:#x} specified");
            return false;
        }
        *slot = Some(value);
        true
    }

    fn on_binary(&mut self, id: u64, data: &[u8]) -> bool {
        if id == ids::CODEC_PRIVATE {
            if self.codec_private.is_some() {
                tracing::warn!("multiple CodecPrivate fields in a track");
                return false;
            }
            self.codec_private = Some(data.to_vec());
        }
        true
    }

    fn on_string(&mut self, id: u64, value: &str) -> bool {
        match id {
            ids::CODEC_ID => {
                if self.codec_id.is_some() {
                    tracing::warn!("multiple CodecID fields in a track");
                    return false;
                }
                self.codec_id = Some(value.to_string());
            },
            ids::NAME => self.track_name = value.to_string(),
            ids::LANGUAGE => self.track_language = value.to_string(),
            _ => {},
        }
        true
    }

    fn child_client(&mut self, slot: usize) -> &mut dyn WebmParserClient {
        match slot {
            SLOT_AUDIO => &mut self.audio_client,
            SLOT_VIDEO => &mut self.video_client,
            SLOT_CONTENT_ENCODINGS => match self.content_encodings_client.as_mut() {
                Some(client) => client,
                None => unreachable!("content encodings list not open"),
            },
            _ => unreachable!("unknown child slot {slot}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! Builders for Tracks/TrackEntry fixtures used across the webm tests.

    use super::ids;

    pub fn element(id: u64, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        push_id(&mut out, id);
        push_size(&mut out, body.len() as u64);
        out.extend_from_slice(body);
        out
    }

    pub fn uint_element(id: u64, value: u64) -> Vec<u8> {
        let mut body = value.to_be_bytes().to_vec();
        while body.len() > 1 && body[0] == 0 {
            body.remove(0);
        }
        element(id, &body)
    }

    pub fn float_element(id: u64, value: f64) -> Vec<u8> {
        element(id, &value.to_be_bytes())
    }

    pub fn string_element(id: u64, value: &str) -> Vec<u8> {
        element(id, value.as_bytes())
    }

    fn push_id(out: &mut Vec<u8>, id: u64) {
        let mut bytes = id.to_be_bytes().to_vec();
        while bytes.len() > 1 && bytes[0] == 0 {
            bytes.remove(0);
        }
        out.extend_from_slice(&bytes);
    }

    fn push_size(out: &mut Vec<u8>, size: u64) {
        // Two-byte encoding covers every fixture in the suite.
        assert!(size < 0x3FFF);
        out.push(0x40 | (size >> 8) as u8);
        out.push((size & 0xFF) as u8);
    }

    pub struct TrackEntryBuilder {
        body: Vec<u8>,
    }

    impl TrackEntryBuilder {
        pub fn new(track_num: u64, track_type: u64, codec_id: &str) -> Self {
            let mut body = Vec::new();
            body.extend_from_slice(&uint_element(ids::TRACK_NUMBER, track_num));
            body.extend_from_slice(&uint_element(ids::TRACK_TYPE, track_type));
            body.extend_from_slice(&string_element(ids::CODEC_ID, codec_id));
            Self { body }
        }

        pub fn raw(mut self, bytes: &[u8]) -> Self {
            self.body.extend_from_slice(bytes);
            self
        }

        pub fn audio_defaults(self) -> Self {
            let audio = float_element(ids::SAMPLING_FREQUENCY, 48000.0);
            let audio_list = element(ids::AUDIO, &audio);
            self.raw(&audio_list)
        }

        pub fn video_defaults(self) -> Self {
            let mut video = Vec::new();
            video.extend_from_slice(&uint_element(ids::PIXEL_WIDTH, 320));
            video.extend_from_slice(&uint_element(ids::PIXEL_HEIGHT, 240));
            let video_list = element(ids::VIDEO, &video);
            self.raw(&video_list)
        }

        pub fn build(self) -> Vec<u8> {
            element(ids::TRACK_ENTRY, &self.body)
        }
    }

    pub fn tracks_element(entries: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = entries.iter().flatten().copied().collect();
        element(ids::TRACKS, &body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::{
        element, string_element, tracks_element, uint_element, TrackEntryBuilder,
    };
    use super::*;
    use packkit_core::types::StreamDetails;

    #[test]
    fn test_audio_and_video_tracks() {
        let tracks = tracks_element(&[
            TrackEntryBuilder::new(1, ids::TRACK_TYPE_VIDEO, ids::CODEC_VP8)
                .video_defaults()
                .build(),
            TrackEntryBuilder::new(2, ids::TRACK_TYPE_AUDIO, ids::CODEC_VORBIS)
                .audio_defaults()
                .build(),
        ]);

        let mut parser = WebmTracksParser::new(true);
        assert_eq!(parser.parse(&tracks).unwrap(), tracks.len());
        assert_eq!(parser.audio_track_num(), Some(2));
        assert_eq!(parser.video_track_num(), Some(1));

        let audio = parser.audio_stream_info().unwrap();
        assert!(matches!(
            audio.details,
            StreamDetails::Audio { channels: 1, sampling_frequency: 48000, .. }
        ));
        let video = parser.video_stream_info().unwrap();
        match video.details {
            StreamDetails::Video { coded_width, coded_height, display_width, .. } => {
                assert_eq!((coded_width, coded_height, display_width), (320, 240, 320));
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_extra_tracks_of_same_kind_are_ignored() {
        let tracks = tracks_element(&[
            TrackEntryBuilder::new(1, ids::TRACK_TYPE_AUDIO, ids::CODEC_VORBIS)
                .audio_defaults()
                .build(),
            TrackEntryBuilder::new(2, ids::TRACK_TYPE_AUDIO, ids::CODEC_VORBIS)
                .audio_defaults()
                .build(),
        ]);

        let mut parser = WebmTracksParser::new(true);
        assert_eq!(parser.parse(&tracks).unwrap(), tracks.len());
        assert_eq!(parser.audio_track_num(), Some(1));
        assert!(parser.ignored_tracks().contains(&2));
    }

    #[test]
    fn test_text_tracks_recorded_with_kind_and_language() {
        let entry = TrackEntryBuilder::new(3, ids::TRACK_TYPE_SUBTITLES_OR_CAPTIONS, ids::CODEC_SUBTITLES)
            .raw(&string_element(ids::LANGUAGE, "fra"))
            .build();
        let tracks = tracks_element(&[entry.clone()]);

        let mut parser = WebmTracksParser::new(false);
        assert_eq!(parser.parse(&tracks).unwrap(), tracks.len());
        let info = parser.text_tracks().get(&3).unwrap();
        assert_eq!(info.kind, TextKind::Subtitles);
        assert_eq!(info.language, "fra");

        // The same track is ignored when text handling is disabled.
        let mut ignoring = WebmTracksParser::new(true);
        let tracks = tracks_element(&[entry]);
        assert_eq!(ignoring.parse(&tracks).unwrap(), tracks.len());
        assert!(ignoring.text_tracks().is_empty());
        assert!(ignoring.ignored_tracks().contains(&3));
    }

    #[test]
    fn test_text_track_with_wrong_codec_fails() {
        let tracks = tracks_element(&[TrackEntryBuilder::new(
            3,
            ids::TRACK_TYPE_SUBTITLES_OR_CAPTIONS,
            ids::CODEC_METADATA,
        )
        .build()]);
        assert!(WebmTracksParser::new(false).parse(&tracks).is_err());
    }

    #[test]
    fn test_duplicate_track_number_fails() {
        let entry = TrackEntryBuilder::new(1, ids::TRACK_TYPE_AUDIO, ids::CODEC_VORBIS)
            .raw(&uint_element(ids::TRACK_NUMBER, 1))
            .audio_defaults()
            .build();
        let tracks = tracks_element(&[entry]);
        assert!(WebmTracksParser::new(true).parse(&tracks).is_err());
    }

    #[test]
    fn test_duplicate_codec_id_fails() {
        let entry = TrackEntryBuilder::new(1, ids::TRACK_TYPE_AUDIO, ids::CODEC_VORBIS)
            .raw(&string_element(ids::CODEC_ID, ids::CODEC_VORBIS))
            .audio_defaults()
            .build();
        let tracks = tracks_element(&[entry]);
        assert!(WebmTracksParser::new(true).parse(&tracks).is_err());
    }

    #[test]
    fn test_encrypted_track_adopts_first_key_id() {
        let mut encryption = Vec::new();
        encryption.extend_from_slice(&uint_element(ids::CONTENT_ENC_ALGO, 5));
        encryption.extend_from_slice(&element(ids::CONTENT_ENC_KEY_ID, &[0xAB; 8]));
        let mut encoding = Vec::new();
        encoding.extend_from_slice(&uint_element(ids::CONTENT_ENCODING_TYPE, 1));
        encoding.extend_from_slice(&element(ids::CONTENT_ENCRYPTION, &encryption));
        let encodings = element(ids::CONTENT_ENCODINGS, &element(ids::CONTENT_ENCODING, &encoding));

        let entry = TrackEntryBuilder::new(1, ids::TRACK_TYPE_VIDEO, ids::CODEC_VP9)
            .video_defaults()
            .raw(&encodings)
            .build();
        let tracks = tracks_element(&[entry]);

        let mut parser = WebmTracksParser::new(true);
        assert_eq!(parser.parse(&tracks).unwrap(), tracks.len());
        assert_eq!(parser.video_encryption_key_id(), &[0xAB; 8]);
        assert!(parser.video_stream_info().unwrap().is_encrypted);
    }

    #[test]
    fn test_missing_track_type_fails() {
        let mut body = Vec::new();
        body.extend_from_slice(&uint_element(ids::TRACK_NUMBER, 1));
        let tracks = tracks_element(&[element(ids::TRACK_ENTRY, &body)]);
        assert!(WebmTracksParser::new(true).parse(&tracks).is_err());
    }
}
