// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PackKit Formats - Container parsing and segmented text output.
//!
//! - [`webm`]: the EBML element-walker, the WebM header/track/cluster
//!   parsers, and the stream-level state machine that turns a WebM byte
//!   stream into timed samples.
//! - [`webvtt`]: the WebVTT cue parser, the text segmenter, and the
//!   WebVTT output handler writing per-segment files.

pub mod webm;
pub mod webvtt;
