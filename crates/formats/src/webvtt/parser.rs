// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WebVTT source parser: the origin of the text pipeline.
//!
//! Classifies blank-line-delimited blocks into the header, NOTE comments,
//! STYLE/REGION configuration, and cues (with or without an id line). A
//! text stream info carrying the serialized style/region configuration is
//! dispatched before the first cue. Cues whose end time is not after their
//! start time are dropped with a warning instead of failing the stream.

use super::text_readers::BlockReader;
use super::timestamp::parse_timestamp;
use bytes::Bytes;
use packkit_core::types::{Codec, StreamDetails, StreamInfo, TextSample};
use packkit_core::{Downstreams, MediaHandler, PackKitError, Result};
use std::sync::Arc;

const STREAM_INDEX: usize = 0;
/// Text timings are in milliseconds.
const TEXT_TIME_SCALE: u32 = 1000;

// Comments are blocks that start with the word "NOTE".
fn is_likely_note(line: &str) -> bool {
    line == "NOTE" || line.starts_with("NOTE ") || line.starts_with("NOTE\t")
}

// Cue timings are the only lines allowed to contain "-->".
fn is_likely_cue_timing(line: &str) -> bool {
    line.contains("-->")
}

// A cue identifier is any line not containing "-->".
fn maybe_cue_id(line: &str) -> bool {
    !line.contains("-->")
}

fn is_likely_style(line: &str) -> bool {
    line.trim_end() == "STYLE"
}

fn is_likely_region(line: &str) -> bool {
    line.trim_end() == "REGION"
}

fn block_to_string(block: &[String]) -> String {
    let mut out = String::from(" --- BLOCK START ---\n");
    for line in block {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(" --- BLOCK END ---");
    out
}

pub struct WebVttParser {
    out: Downstreams,
    reader: BlockReader,
    language: String,
    style_region_config: String,
    /// NOTE content waiting to be attached to the next cue.
    pending_comment: Vec<String>,
    header_checked: bool,
    saw_cue: bool,
    stream_info_dispatched: bool,
}

impl WebVttParser {
    pub fn new(language: &str, downstream: Box<dyn MediaHandler>) -> Self {
        let mut out = Downstreams::new();
        out.connect_next(downstream);
        Self {
            out,
            reader: BlockReader::new(),
            language: language.to_string(),
            style_region_config: String::new(),
            pending_comment: Vec::new(),
            header_checked: false,
            saw_cue: false,
            stream_info_dispatched: false,
        }
    }

    /// Initialize the downstream pipeline. Call once before `parse`.
    pub async fn initialize(&mut self) -> Result<()> {
        self.out.initialize().await
    }

    /// Feed source bytes and dispatch every cue that completes.
    pub async fn parse(&mut self, data: &[u8]) -> Result<()> {
        self.reader.push_data(data);
        self.process_blocks().await
    }

    /// Signal end of input: parses buffered remains, dispatches the stream
    /// info if it has not gone out yet, and flushes the pipeline.
    pub async fn flush(&mut self) -> Result<()> {
        self.reader.flush();
        self.process_blocks().await?;
        if !self.stream_info_dispatched {
            self.dispatch_stream_info().await?;
        }
        self.out.flush_all_downstreams().await
    }

    async fn process_blocks(&mut self) -> Result<()> {
        while let Some(block) = self.reader.next() {
            // The header block must come first. A 0xFEFF BOM may precede it.
            if !self.header_checked {
                if block.len() != 1 || (block[0] != "WEBVTT" && block[0] != "\u{FEFF}WEBVTT") {
                    return Err(PackKitError::Parser(format!(
                        "missing WEBVTT header, first block is:\n{}",
                        block_to_string(&block)
                    )));
                }
                self.header_checked = true;
                continue;
            }

            if is_likely_note(&block[0]) {
                // Keep the comment so it can ride along with the next cue.
                let remainder = block[0]["NOTE".len()..].trim_start();
                if !remainder.is_empty() {
                    self.pending_comment.push(remainder.to_string());
                }
                self.pending_comment.extend(block[1..].iter().cloned());
                continue;
            }

            if is_likely_style(&block[0]) || is_likely_region(&block[0]) {
                if self.saw_cue {
                    tracing::warn!(
                        "found style or region block after seeing a cue; ignoring block"
                    );
                } else {
                    self.update_config(&block);
                }
                continue;
            }

            // CUE with an id line.
            if block.len() >= 2 && maybe_cue_id(&block[0]) && is_likely_cue_timing(&block[1]) {
                self.parse_cue(&block[0], &block[1..]).await?;
                self.saw_cue = true;
                continue;
            }

            // CUE with no id.
            if is_likely_cue_timing(&block[0]) {
                self.parse_cue("", &block).await?;
                self.saw_cue = true;
                continue;
            }

            return Err(PackKitError::Parser(format!(
                "failed to determine block classification:\n{}",
                block_to_string(&block)
            )));
        }
        Ok(())
    }

    fn update_config(&mut self, block: &[String]) {
        if !self.style_region_config.is_empty() {
            self.style_region_config.push_str("\n\n");
        }
        self.style_region_config.push_str(&block.join("\n"));
    }

    async fn parse_cue(&mut self, id: &str, block: &[String]) -> Result<()> {
        let time_and_style: Vec<&str> = block[0].split_whitespace().collect();

        let times = if time_and_style.len() >= 3 && time_and_style[1] == "-->" {
            parse_timestamp(time_and_style[0])
                .zip(parse_timestamp(time_and_style[2]))
        } else {
            None
        };
        let Some((start_time, end_time)) = times else {
            return Err(PackKitError::Parser(format!(
                "could not parse start time, -->, and end time from '{}'",
                block[0]
            )));
        };

        if !self.stream_info_dispatched {
            self.dispatch_stream_info().await?;
        }

        // WebVTT requires the end time to be greater than the start time,
        // but such cues do show up in the field; drop the cue instead of
        // failing the whole package.
        if end_time <= start_time {
            tracing::warn!(
                "start time ({start_time}) should be less than end time ({end_time}); \
                 skipping webvtt cue:\n{}",
                block_to_string(block)
            );
            return Ok(());
        }

        let mut sample = TextSample::new(id, start_time, end_time, "", "");
        for style in &time_and_style[3..] {
            sample.append_style(style);
        }
        for line in &block[1..] {
            sample.append_payload(line);
        }
        for line in self.pending_comment.drain(..) {
            sample.append_comment(&line);
        }

        self.out.dispatch_text_sample(STREAM_INDEX, Arc::new(sample)).await
    }

    async fn dispatch_stream_info(&mut self) -> Result<()> {
        self.stream_info_dispatched = true;
        let info = StreamInfo {
            track_id: 0,
            codec: Codec::WebVtt,
            time_scale: TEXT_TIME_SCALE,
            // The whole file would have to be read ahead to know the real
            // duration; downstream handlers derive it from the samples.
            duration: None,
            language: self.language.clone(),
            is_encrypted: false,
            codec_config: Bytes::from(self.style_region_config.clone().into_bytes()),
            details: StreamDetails::Text {
                width: 0,
                height: 0,
                css_config: self.style_region_config.clone(),
            },
        };
        self.out.dispatch_stream_info(STREAM_INDEX, Arc::new(info)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use packkit_core::StreamData;
    use std::sync::Mutex;

    struct Collector {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Collector {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (Self { seen: Arc::clone(&seen) }, seen)
        }
    }

    #[async_trait]
    impl MediaHandler for Collector {
        async fn initialize(&mut self) -> Result<()> {
            Ok(())
        }

        async fn process(&mut self, stream_data: StreamData) -> Result<()> {
            let entry = match &stream_data {
                StreamData::StreamInfo(info) => {
                    format!("info config='{}'", String::from_utf8_lossy(&info.codec_config))
                },
                StreamData::TextSample(sample) => {
                    let mut entry = format!(
                        "cue id='{}' [{}, {}) settings='{}' '{}'",
                        sample.id(),
                        sample.start_time(),
                        sample.end_time(),
                        sample.settings(),
                        sample.payload()
                    );
                    if !sample.comment().is_empty() {
                        entry.push_str(&format!(" comment='{}'", sample.comment()));
                    }
                    entry
                },
                other => other.kind().to_string(),
            };
            self.seen.lock().unwrap().push(entry);
            Ok(())
        }

        async fn on_flush_request(&mut self, _input_stream_index: usize) -> Result<()> {
            self.seen.lock().unwrap().push("flush".to_string());
            Ok(())
        }
    }

    async fn run(input: &str) -> Result<Vec<String>> {
        let (collector, seen) = Collector::new();
        let mut parser = WebVttParser::new("en", Box::new(collector));
        parser.initialize().await?;
        parser.parse(input.as_bytes()).await?;
        parser.flush().await?;
        let log = seen.lock().unwrap().clone();
        Ok(log)
    }

    #[tokio::test]
    async fn test_single_cue() {
        let log = run("WEBVTT\n\n00:01:00.000 --> 01:00:00.000\nsubtitle\n").await.unwrap();
        assert_eq!(
            log,
            vec![
                "info config=''".to_string(),
                "cue id='' [60000, 3600000) settings='' 'subtitle'".to_string(),
                "flush".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_cue_with_id_and_settings() {
        let log = run(
            "WEBVTT\n\nid\n00:00:01.000 --> 00:00:02.000 align:left line:0\npayload\nline 2\n",
        )
        .await
        .unwrap();
        assert_eq!(
            log[1],
            "cue id='id' [1000, 2000) settings='align:left line:0' 'payload\nline 2'"
        );
    }

    #[tokio::test]
    async fn test_styles_and_regions_become_config() {
        let log = run(
            "WEBVTT\n\nSTYLE\n::cue { color: lime }\n\nREGION\nid:scroll\nscrol:up\n\n\
             00:00:01.000 --> 00:00:02.000\nhello\n",
        )
        .await
        .unwrap();
        assert_eq!(
            log[0],
            "info config='STYLE\n::cue { color: lime }\n\nREGION\nid:scroll\nscrol:up'"
        );
        assert_eq!(log[1], "cue id='' [1000, 2000) settings='' 'hello'");
    }

    #[tokio::test]
    async fn test_notes_ride_along_as_comments() {
        let log = run("WEBVTT\n\nNOTE a comment\nmore comment\n\n00:00:01.000 --> 00:00:02.000\nx\n")
            .await
            .unwrap();
        // The NOTE block produces no cue of its own; its text is attached
        // to the next cue as a comment.
        assert_eq!(log.len(), 3); // info, cue, flush
        assert!(log[1].contains("comment='a comment\nmore comment'"));
    }

    #[tokio::test]
    async fn test_non_increasing_cue_is_dropped_with_warning() {
        let log = run("WEBVTT\n\n00:00:02.000 --> 00:00:02.000\ndropped\n").await.unwrap();
        // Stream info still goes out (at cue-parse time), but no cue.
        assert_eq!(
            log,
            vec!["info config=''".to_string(), "flush".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_header_fails() {
        assert!(run("00:00:01.000 --> 00:00:02.000\nhello\n").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_timing_fails() {
        assert!(run("WEBVTT\n\n00:00:01.000 -> 00:00:02.000\nhello\n").await.is_err());
    }

    #[tokio::test]
    async fn test_bom_header_is_accepted() {
        let input = "\u{FEFF}WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nbom\n";
        assert!(run(input).await.is_ok());
    }
}
