// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WebM/EBML element ids and the per-list child tables that drive the
//! element walker. Ids keep their length-marker bits, as they appear on the
//! wire.

// Top level
pub const EBML_HEADER: u64 = 0x1A45_DFA3;
pub const SEGMENT: u64 = 0x1853_8067;
pub const SEEK_HEAD: u64 = 0x114D_9B74;
pub const INFO: u64 = 0x1549_A966;
pub const CLUSTER: u64 = 0x1F43_B675;
pub const TRACKS: u64 = 0x1654_AE6B;
pub const CUES: u64 = 0x1C53_BB6B;
pub const CHAPTERS: u64 = 0x1043_A770;
pub const TAGS: u64 = 0x1254_C367;
pub const ATTACHMENTS: u64 = 0x1941_A469;
pub const VOID: u64 = 0xEC;
pub const CRC32: u64 = 0xBF;

// Info
pub const TIMECODE_SCALE: u64 = 0x2A_D7B1;
pub const DURATION: u64 = 0x4489;
pub const DATE_UTC: u64 = 0x4461;
pub const TITLE: u64 = 0x7BA9;
pub const MUXING_APP: u64 = 0x4D80;
pub const WRITING_APP: u64 = 0x5741;
pub const SEGMENT_UID: u64 = 0x73A4;

// Cluster
pub const TIMECODE: u64 = 0xE7;
pub const SIMPLE_BLOCK: u64 = 0xA3;
pub const BLOCK_GROUP: u64 = 0xA0;
pub const POSITION: u64 = 0xA7;
pub const PREV_SIZE: u64 = 0xAB;

// BlockGroup
pub const BLOCK: u64 = 0xA1;
pub const BLOCK_DURATION: u64 = 0x9B;
pub const BLOCK_ADDITIONS: u64 = 0x75A1;
pub const REFERENCE_BLOCK: u64 = 0xFB;

// BlockAdditions
pub const BLOCK_MORE: u64 = 0xA6;
pub const BLOCK_ADD_ID: u64 = 0xEE;
pub const BLOCK_ADDITIONAL: u64 = 0xA5;

// Tracks
pub const TRACK_ENTRY: u64 = 0xAE;
pub const TRACK_NUMBER: u64 = 0xD7;
pub const TRACK_UID: u64 = 0x73C5;
pub const TRACK_TYPE: u64 = 0x83;
pub const FLAG_ENABLED: u64 = 0xB9;
pub const FLAG_DEFAULT: u64 = 0x88;
pub const FLAG_FORCED: u64 = 0x55AA;
pub const FLAG_LACING: u64 = 0x9C;
pub const DEFAULT_DURATION: u64 = 0x23_E383;
pub const NAME: u64 = 0x536E;
pub const LANGUAGE: u64 = 0x22_B59C;
pub const CODEC_ID: u64 = 0x86;
pub const CODEC_PRIVATE: u64 = 0x63A2;
pub const CODEC_NAME: u64 = 0x25_8688;
pub const CODEC_DELAY: u64 = 0x56AA;
pub const SEEK_PRE_ROLL: u64 = 0x56BB;

// TrackEntry -> Audio
pub const AUDIO: u64 = 0xE1;
pub const SAMPLING_FREQUENCY: u64 = 0xB5;
pub const OUTPUT_SAMPLING_FREQUENCY: u64 = 0x78B5;
pub const CHANNELS: u64 = 0x9F;
pub const BIT_DEPTH: u64 = 0x6264;

// TrackEntry -> Video
pub const VIDEO: u64 = 0xE0;
pub const FLAG_INTERLACED: u64 = 0x9A;
pub const PIXEL_WIDTH: u64 = 0xB0;
pub const PIXEL_HEIGHT: u64 = 0xBA;
pub const PIXEL_CROP_BOTTOM: u64 = 0x54AA;
pub const PIXEL_CROP_TOP: u64 = 0x54BB;
pub const PIXEL_CROP_LEFT: u64 = 0x54CC;
pub const PIXEL_CROP_RIGHT: u64 = 0x54DD;
pub const DISPLAY_WIDTH: u64 = 0x54B0;
pub const DISPLAY_HEIGHT: u64 = 0x54BA;
pub const DISPLAY_UNIT: u64 = 0x54B2;
pub const ALPHA_MODE: u64 = 0x53C0;

// TrackEntry -> ContentEncodings
pub const CONTENT_ENCODINGS: u64 = 0x6D80;
pub const CONTENT_ENCODING: u64 = 0x6240;
pub const CONTENT_ENCODING_ORDER: u64 = 0x5031;
pub const CONTENT_ENCODING_SCOPE: u64 = 0x5032;
pub const CONTENT_ENCODING_TYPE: u64 = 0x5033;
pub const CONTENT_COMPRESSION: u64 = 0x5034;
pub const CONTENT_COMP_ALGO: u64 = 0x4254;
pub const CONTENT_COMP_SETTINGS: u64 = 0x4255;
pub const CONTENT_ENCRYPTION: u64 = 0x5035;
pub const CONTENT_ENC_ALGO: u64 = 0x47E1;
pub const CONTENT_ENC_KEY_ID: u64 = 0x47E2;
pub const CONTENT_SIGNATURE: u64 = 0x47E3;
pub const CONTENT_SIG_KEY_ID: u64 = 0x47E4;
pub const CONTENT_SIG_ALGO: u64 = 0x47E5;
pub const CONTENT_SIG_HASH_ALGO: u64 = 0x47E6;
pub const CONTENT_ENC_AES_SETTINGS: u64 = 0x47E7;
pub const AES_SETTINGS_CIPHER_MODE: u64 = 0x47E8;

// Matroska track type codes
pub const TRACK_TYPE_VIDEO: u64 = 1;
pub const TRACK_TYPE_AUDIO: u64 = 2;
pub const TRACK_TYPE_SUBTITLES_OR_CAPTIONS: u64 = 0x11;
pub const TRACK_TYPE_DESCRIPTIONS_OR_METADATA: u64 = 0x21;

// Codec id strings
pub const CODEC_VP8: &str = "V_VP8";
pub const CODEC_VP9: &str = "V_VP9";
pub const CODEC_VORBIS: &str = "A_VORBIS";
pub const CODEC_OPUS: &str = "A_OPUS";
pub const CODEC_SUBTITLES: &str = "D_WEBVTT/SUBTITLES";
pub const CODEC_CAPTIONS: &str = "D_WEBVTT/CAPTIONS";
pub const CODEC_DESCRIPTIONS: &str = "D_WEBVTT/DESCRIPTIONS";
pub const CODEC_METADATA: &str = "D_WEBVTT/METADATA";

/// Type of a primitive or list element, as dispatched to parse clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Uint,
    Float,
    Str,
    Binary,
    List,
}

use ElementType::{Binary, Float, List, Str, Uint};

/// The known children of `list_id`, or `None` for lists this parser does
/// not descend into. Child ids missing from a table are skipped by size.
pub(crate) fn list_children(list_id: u64) -> Option<&'static [(u64, ElementType)]> {
    Some(match list_id {
        INFO => &[
            (TIMECODE_SCALE, Uint),
            (DURATION, Float),
            (DATE_UTC, Binary),
            (TITLE, Str),
            (MUXING_APP, Str),
            (WRITING_APP, Str),
            (SEGMENT_UID, Binary),
        ],
        TRACKS => &[(TRACK_ENTRY, List)],
        TRACK_ENTRY => &[
            (TRACK_NUMBER, Uint),
            (TRACK_UID, Uint),
            (TRACK_TYPE, Uint),
            (FLAG_ENABLED, Uint),
            (FLAG_DEFAULT, Uint),
            (FLAG_FORCED, Uint),
            (FLAG_LACING, Uint),
            (DEFAULT_DURATION, Uint),
            (CODEC_DELAY, Uint),
            (SEEK_PRE_ROLL, Uint),
            (NAME, Str),
            (LANGUAGE, Str),
            (CODEC_ID, Str),
            (CODEC_NAME, Str),
            (CODEC_PRIVATE, Binary),
            (AUDIO, List),
            (VIDEO, List),
            (CONTENT_ENCODINGS, List),
        ],
        AUDIO => &[
            (SAMPLING_FREQUENCY, Float),
            (OUTPUT_SAMPLING_FREQUENCY, Float),
            (CHANNELS, Uint),
            (BIT_DEPTH, Uint),
        ],
        VIDEO => &[
            (FLAG_INTERLACED, Uint),
            (PIXEL_WIDTH, Uint),
            (PIXEL_HEIGHT, Uint),
            (PIXEL_CROP_BOTTOM, Uint),
            (PIXEL_CROP_TOP, Uint),
            (PIXEL_CROP_LEFT, Uint),
            (PIXEL_CROP_RIGHT, Uint),
            (DISPLAY_WIDTH, Uint),
            (DISPLAY_HEIGHT, Uint),
            (DISPLAY_UNIT, Uint),
            (ALPHA_MODE, Uint),
        ],
        CONTENT_ENCODINGS => &[(CONTENT_ENCODING, List)],
        CONTENT_ENCODING => &[
            (CONTENT_ENCODING_ORDER, Uint),
            (CONTENT_ENCODING_SCOPE, Uint),
            (CONTENT_ENCODING_TYPE, Uint),
            (CONTENT_COMPRESSION, List),
            (CONTENT_ENCRYPTION, List),
        ],
        CONTENT_COMPRESSION => &[(CONTENT_COMP_ALGO, Uint), (CONTENT_COMP_SETTINGS, Binary)],
        CONTENT_ENCRYPTION => &[
            (CONTENT_ENC_ALGO, Uint),
            (CONTENT_ENC_KEY_ID, Binary),
            (CONTENT_SIGNATURE, Binary),
            (CONTENT_SIG_KEY_ID, Binary),
            (CONTENT_SIG_ALGO, Uint),
            (CONTENT_SIG_HASH_ALGO, Uint),
            (CONTENT_ENC_AES_SETTINGS, List),
        ],
        CONTENT_ENC_AES_SETTINGS => &[(AES_SETTINGS_CIPHER_MODE, Uint)],
        CLUSTER => &[
            (TIMECODE, Uint),
            (SIMPLE_BLOCK, Binary),
            (BLOCK_GROUP, List),
            (POSITION, Uint),
            (PREV_SIZE, Uint),
        ],
        BLOCK_GROUP => &[
            (BLOCK, Binary),
            (BLOCK_DURATION, Uint),
            (BLOCK_ADDITIONS, List),
            (REFERENCE_BLOCK, Binary),
        ],
        BLOCK_ADDITIONS => &[(BLOCK_MORE, List)],
        BLOCK_MORE => &[(BLOCK_ADD_ID, Uint), (BLOCK_ADDITIONAL, Binary)],
        _ => return None,
    })
}

/// Look up the element type of `child_id` inside `list_id`.
pub(crate) fn child_type(list_id: u64, child_id: u64) -> Option<ElementType> {
    list_children(list_id)?
        .iter()
        .find(|(id, _)| *id == child_id)
        .map(|(_, element_type)| *element_type)
}
