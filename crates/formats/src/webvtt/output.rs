// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Terminal handler writing WebVTT segments and reporting them to the
//! muxer listener.
//!
//! In multi-segment mode every `SegmentInfo` produces one file named from
//! the `$Number$` template (1-based); an empty segment still produces a
//! file holding only the `WEBVTT` header. In single-segment mode the same
//! bytes are appended to one output file and each segment's byte range is
//! recorded for the final media-end report.

use super::timestamp::format_timestamp;
use async_trait::async_trait;
use packkit_core::muxer::segment_name;
use packkit_core::types::{SegmentInfo, StreamData, TextSample};
use packkit_core::{
    ContainerType, MediaHandler, MediaRanges, MuxerListener, MuxerOptions, PackKitError, Range,
    Result,
};
use packkit_file::{File, OpenMode};

const WEBVTT_HEADER: &str = "WEBVTT\n\n";
const MILLISECONDS_PER_SECOND: f32 = 1000.0;

pub struct WebVttOutputHandler {
    muxer_options: MuxerOptions,
    listener: Box<dyn MuxerListener>,
    /// Cue text waiting to be written with the next segment.
    buffer: String,
    total_duration_ms: u64,
    segment_index: u64,

    // Single-segment mode state.
    output_file: Option<Box<dyn File>>,
    bytes_written: u64,
    subsegment_ranges: Vec<Range>,
}

impl WebVttOutputHandler {
    pub fn new(muxer_options: MuxerOptions, listener: Box<dyn MuxerListener>) -> Self {
        Self {
            muxer_options,
            listener,
            buffer: String::new(),
            total_duration_ms: 0,
            segment_index: 0,
            output_file: None,
            bytes_written: 0,
            subsegment_ranges: Vec::new(),
        }
    }

    fn write_cue(&mut self, sample: &TextSample) {
        // Ids are optional.
        if !sample.id().is_empty() {
            self.buffer.push_str(sample.id());
            self.buffer.push('\n');
        }

        self.buffer.push_str(&format_timestamp(sample.start_time()));
        self.buffer.push_str(" --> ");
        self.buffer.push_str(&format_timestamp(sample.end_time()));

        // Settings are optional.
        if !sample.settings().is_empty() {
            self.buffer.push(' ');
            self.buffer.push_str(sample.settings());
        }
        self.buffer.push('\n');

        self.buffer.push_str(sample.payload());
        self.buffer.push('\n');
        self.buffer.push('\n');
    }

    async fn on_stream_info(&mut self, stream_data: &StreamData) -> Result<()> {
        let StreamData::StreamInfo(info) = stream_data else {
            return Err(PackKitError::Internal("expected stream info".to_string()));
        };
        self.listener.on_media_start(
            &self.muxer_options,
            info,
            info.time_scale,
            ContainerType::Text,
        );

        if self.muxer_options.single_segment() {
            let mut file =
                packkit_file::open(&self.muxer_options.output_file_name, OpenMode::Write).await?;
            let written = file.write(WEBVTT_HEADER.as_bytes()).await?;
            self.bytes_written = written as u64;
            self.output_file = Some(file);
        }
        Ok(())
    }

    async fn on_segment_info(&mut self, info: SegmentInfo) -> Result<()> {
        // Subsegments are an MP4 concern; text output only cuts on full
        // segment boundaries.
        if info.is_subsegment {
            return Ok(());
        }

        #[allow(clippy::cast_sign_loss)]
        {
            self.total_duration_ms += info.duration.max(0) as u64;
        }
        let segment_index = self.segment_index;
        self.segment_index += 1;

        if self.muxer_options.single_segment() {
            let Some(file) = self.output_file.as_mut() else {
                return Err(PackKitError::Internal(
                    "segment info before stream info".to_string(),
                ));
            };
            let segment_bytes = std::mem::take(&mut self.buffer);
            let start = self.bytes_written;
            let written = file.write(segment_bytes.as_bytes()).await? as u64;
            self.bytes_written += written;
            self.subsegment_ranges.push(Range {
                start,
                end: self.bytes_written.saturating_sub(1),
            });

            self.listener.on_new_segment(
                &self.muxer_options.output_file_name,
                info.start_timestamp,
                info.duration,
                written,
                info.segment_number,
            );
            return Ok(());
        }

        let file_name = segment_name(&self.muxer_options.segment_template, segment_index);
        let segment_bytes = std::mem::take(&mut self.buffer);

        // The file has to exist on disk before the manifest learns about it.
        let mut file = packkit_file::open(&file_name, OpenMode::Write).await?;
        let mut size = file.write(WEBVTT_HEADER.as_bytes()).await? as u64;
        size += file.write(segment_bytes.as_bytes()).await? as u64;
        file.close().await?;

        self.listener.on_new_segment(
            &file_name,
            info.start_timestamp,
            info.duration,
            size,
            info.segment_number,
        );
        Ok(())
    }

    async fn on_stream_end(&mut self) -> Result<()> {
        let mut media_ranges = MediaRanges::default();
        if let Some(file) = self.output_file.take() {
            file.close().await?;
            media_ranges.subsegment_ranges = std::mem::take(&mut self.subsegment_ranges);
        }

        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = self.total_duration_ms as f32 / MILLISECONDS_PER_SECOND;
        self.listener.on_media_end(&media_ranges, duration_seconds);
        Ok(())
    }
}

#[async_trait]
impl MediaHandler for WebVttOutputHandler {
    async fn initialize(&mut self) -> Result<()> {
        self.muxer_options.validate()
    }

    async fn process(&mut self, stream_data: StreamData) -> Result<()> {
        match stream_data {
            info @ StreamData::StreamInfo(_) => self.on_stream_info(&info).await,
            StreamData::TextSample(sample) => {
                self.write_cue(&sample);
                Ok(())
            },
            StreamData::SegmentInfo(info) => self.on_segment_info(info).await,
            other => Err(PackKitError::Internal(format!(
                "invalid stream data type ({}) for this handler",
                other.kind()
            ))),
        }
    }

    async fn on_flush_request(&mut self, _input_stream_index: usize) -> Result<()> {
        self.on_stream_end().await
    }

    fn validate_output_stream_index(&self, _stream_index: usize) -> bool {
        // Terminal handler: no outputs.
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use packkit_core::crypto::{ProtectionScheme, ProtectionSystemSpecificInfo};
    use packkit_core::types::{Codec, StreamDetails, StreamInfo};
    use packkit_file::MemoryFile;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub(crate) struct RecordingListener {
        pub events: Arc<Mutex<Vec<String>>>,
    }

    impl MuxerListener for RecordingListener {
        fn on_encryption_info_ready(
            &mut self,
            _is_initial_encryption_info: bool,
            _protection_scheme: ProtectionScheme,
            _key_id: &[u8],
            _iv: &[u8],
            _key_system_infos: &[ProtectionSystemSpecificInfo],
        ) {
        }

        fn on_encryption_start(&mut self) {}

        fn on_media_start(
            &mut self,
            _muxer_options: &MuxerOptions,
            _stream_info: &StreamInfo,
            time_scale: u32,
            container_type: ContainerType,
        ) {
            self.events
                .lock()
                .unwrap()
                .push(format!("media_start scale={time_scale} container={container_type:?}"));
        }

        fn on_sample_duration_ready(&mut self, _sample_duration: i64) {}

        fn on_new_segment(
            &mut self,
            file_name: &str,
            start_time: i64,
            duration: i64,
            segment_file_size: u64,
            _segment_number: u64,
        ) {
            self.events.lock().unwrap().push(format!(
                "new_segment {file_name} start={start_time} duration={duration} size={segment_file_size}"
            ));
        }

        fn on_key_frame(&mut self, _timestamp: i64, _start_byte_offset: u64, _size: u64) {}

        fn on_cue_event(&mut self, _timestamp: i64, _cue_data: &[u8]) {}

        fn on_media_end(&mut self, media_ranges: &MediaRanges, duration_seconds: f32) {
            self.events.lock().unwrap().push(format!(
                "media_end ranges={:?} duration={duration_seconds}",
                media_ranges.subsegment_ranges
            ));
        }
    }

    fn text_stream_info() -> StreamData {
        StreamData::StreamInfo(Arc::new(StreamInfo {
            track_id: 0,
            codec: Codec::WebVtt,
            time_scale: 1000,
            duration: None,
            language: String::new(),
            is_encrypted: false,
            codec_config: bytes::Bytes::new(),
            details: StreamDetails::Text { width: 0, height: 0, css_config: String::new() },
        }))
    }

    fn text_sample(id: &str, start: u64, end: u64, payload: &str) -> StreamData {
        StreamData::TextSample(Arc::new(TextSample::new(id, start, end, "", payload)))
    }

    fn segment_info(number: u64, start: i64, duration: i64) -> StreamData {
        StreamData::SegmentInfo(SegmentInfo {
            start_timestamp: start,
            duration,
            is_subsegment: false,
            is_encrypted: false,
            segment_number: number,
        })
    }

    async fn read_memory_file(name: &str) -> String {
        String::from_utf8(packkit_file::read_file_to_end(name).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_multi_segment_files_and_listener_events() {
        let listener = RecordingListener::default();
        let events = Arc::clone(&listener.events);

        let muxer_options = MuxerOptions {
            segment_template: "memory://multi/out-$Number$.vtt".to_string(),
            ..Default::default()
        };
        let mut handler = WebVttOutputHandler::new(muxer_options, Box::new(listener));
        handler.initialize().await.unwrap();

        handler.process(text_stream_info()).await.unwrap();
        handler.process(text_sample("", 5000, 6000, "payload 1")).await.unwrap();
        handler.process(segment_info(0, 0, 10_000)).await.unwrap();
        // Empty segment still produces a header-only file.
        handler.process(segment_info(1, 10_000, 10_000)).await.unwrap();
        handler.process(text_sample("", 25_000, 26_000, "payload 2")).await.unwrap();
        handler.process(segment_info(2, 20_000, 10_000)).await.unwrap();
        handler.on_flush_request(0).await.unwrap();

        assert_eq!(
            read_memory_file("memory://multi/out-1.vtt").await,
            "WEBVTT\n\n00:00:05.000 --> 00:00:06.000\npayload 1\n\n"
        );
        assert_eq!(read_memory_file("memory://multi/out-2.vtt").await, "WEBVTT\n\n");
        assert_eq!(
            read_memory_file("memory://multi/out-3.vtt").await,
            "WEBVTT\n\n00:00:25.000 --> 00:00:26.000\npayload 2\n\n"
        );

        let events = events.lock().unwrap();
        assert_eq!(events[0], "media_start scale=1000 container=Text");
        assert!(events[1].starts_with("new_segment memory://multi/out-1.vtt start=0"));
        assert!(events[3].starts_with("new_segment memory://multi/out-3.vtt start=20000"));
        assert_eq!(events[4], "media_end ranges=[] duration=30");

        for i in 1..=3 {
            MemoryFile::delete(&format!("multi/out-{i}.vtt"));
        }
    }

    #[tokio::test]
    async fn test_single_segment_records_byte_ranges() {
        let listener = RecordingListener::default();
        let events = Arc::clone(&listener.events);

        let muxer_options = MuxerOptions {
            output_file_name: "memory://single/out.vtt".to_string(),
            ..Default::default()
        };
        let mut handler = WebVttOutputHandler::new(muxer_options, Box::new(listener));
        handler.initialize().await.unwrap();

        handler.process(text_stream_info()).await.unwrap();
        handler.process(text_sample("", 1000, 2000, "one")).await.unwrap();
        handler.process(segment_info(0, 0, 10_000)).await.unwrap();
        handler.process(text_sample("", 11_000, 12_000, "two")).await.unwrap();
        handler.process(segment_info(1, 10_000, 10_000)).await.unwrap();
        handler.on_flush_request(0).await.unwrap();

        let contents = read_memory_file("memory://single/out.vtt").await;
        assert!(contents.starts_with("WEBVTT\n\n00:00:01.000 --> 00:00:02.000\none\n\n"));
        assert!(contents.ends_with("00:00:11.000 --> 00:00:12.000\ntwo\n\n"));

        // Two contiguous ranges, starting right after the header.
        let events = events.lock().unwrap();
        let media_end = events.last().unwrap();
        let first_cue_len = "00:00:01.000 --> 00:00:02.000\none\n\n".len() as u64;
        let header_len = WEBVTT_HEADER.len() as u64;
        assert!(media_end.contains(&format!(
            "Range {{ start: {header_len}, end: {} }}",
            header_len + first_cue_len - 1
        )));
        assert!(media_end.ends_with("duration=20"));

        MemoryFile::delete("single/out.vtt");
    }

    #[tokio::test]
    async fn test_cue_block_format_with_id_and_settings() {
        let listener = RecordingListener::default();
        let muxer_options = MuxerOptions {
            segment_template: "memory://fmt/out-$Number$.vtt".to_string(),
            ..Default::default()
        };
        let mut handler = WebVttOutputHandler::new(muxer_options, Box::new(listener));
        handler.initialize().await.unwrap();

        handler.process(text_stream_info()).await.unwrap();
        let mut sample = TextSample::new("id", 61_000, 65_500, "", "subtitle");
        sample.append_style("align:left");
        handler.process(StreamData::TextSample(Arc::new(sample))).await.unwrap();
        handler.process(segment_info(0, 60_000, 10_000)).await.unwrap();
        handler.on_flush_request(0).await.unwrap();

        assert_eq!(
            read_memory_file("memory://fmt/out-1.vtt").await,
            "WEBVTT\n\nid\n00:01:01.000 --> 00:01:05.500 align:left\nsubtitle\n\n"
        );
        MemoryFile::delete("fmt/out-1.vtt");
    }

    #[tokio::test]
    async fn test_options_validation() {
        let listener = RecordingListener::default();
        let mut handler = WebVttOutputHandler::new(MuxerOptions::default(), Box::new(listener));
        assert!(matches!(
            handler.initialize().await,
            Err(PackKitError::InvalidArgument(_))
        ));
    }
}
