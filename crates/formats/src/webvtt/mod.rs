// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The WebVTT text pipeline: source parser, segmenter, and output handler.
//!
//! Wired as `WebVttParser -> WebVttSegmenter -> WebVttOutputHandler`, it
//! turns a WebVTT byte stream into per-segment `.vtt` files plus listener
//! events for manifest generation.

pub mod output;
pub mod parser;
pub mod segmenter;
pub mod text_readers;
pub mod timestamp;

pub use output::WebVttOutputHandler;
pub use parser::WebVttParser;
pub use segmenter::WebVttSegmenter;
pub use text_readers::{BlockReader, LineReader};
pub use timestamp::{format_timestamp, parse_timestamp};
