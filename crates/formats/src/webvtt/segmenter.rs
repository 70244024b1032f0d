// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Groups text samples into fixed-duration segments.
//!
//! Samples are buffered per segment index and emitted, followed by a
//! `SegmentInfo`, as soon as the head segment advances past them. Segments
//! with no samples still emit their `SegmentInfo`; the downstream writer
//! decides what an empty segment produces. A cue that straddles several
//! segments is duplicated into every one of them. Out-of-order cues are
//! dropped with a warning, not a failure.

use async_trait::async_trait;
use packkit_core::types::{SegmentInfo, StreamData, TextSample};
use packkit_core::{Downstreams, MediaHandler, PackKitError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

const STREAM_INDEX: usize = 0;

pub struct WebVttSegmenter {
    segment_duration_ms: u64,
    out: Downstreams,
    /// Buffered samples by segment index.
    segment_map: BTreeMap<u64, Vec<Arc<TextSample>>>,
    /// Lowest segment index that has not been emitted yet.
    head_segment: u64,
}

impl WebVttSegmenter {
    pub fn new(segment_duration_ms: u64, downstream: Box<dyn MediaHandler>) -> Self {
        let mut out = Downstreams::new();
        out.connect_next(downstream);
        Self { segment_duration_ms, out, segment_map: BTreeMap::new(), head_segment: 0 }
    }

    async fn on_text_sample(&mut self, sample: Arc<TextSample>) -> Result<()> {
        if sample.end_time() <= sample.start_time() {
            tracing::warn!(
                "cue [{}, {}) has no duration; skipping sample",
                sample.start_time(),
                sample.end_time()
            );
            return Ok(());
        }

        let start_segment = sample.start_time() / self.segment_duration_ms;
        // The last segment the sample overlaps; the end time is exclusive,
        // so nudge it by one ms for cues ending on a segment boundary.
        let ending_segment = (sample.end_time() - 1) / self.segment_duration_ms;

        // Samples must always be advancing. If a sample comes in out of
        // order, skip the sample.
        if start_segment < self.head_segment {
            tracing::warn!(
                "new sample has arrived out of order; skipping sample as segment start is \
                 {start_segment} and segment head is {}",
                self.head_segment
            );
            return Ok(());
        }

        // Output all segments that come before this cue's first segment,
        // gap segments included.
        while self.head_segment < start_segment {
            let segment = self.head_segment;
            self.on_segment_end(segment).await?;
            self.head_segment += 1;
        }

        for segment in start_segment..=ending_segment {
            self.segment_map.entry(segment).or_default().push(Arc::clone(&sample));
        }
        Ok(())
    }

    async fn on_segment_end(&mut self, segment: u64) -> Result<()> {
        if let Some(samples) = self.segment_map.remove(&segment) {
            for sample in samples {
                self.out.dispatch_text_sample(STREAM_INDEX, sample).await?;
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        let info = SegmentInfo {
            start_timestamp: (segment * self.segment_duration_ms) as i64,
            duration: self.segment_duration_ms as i64,
            is_subsegment: false,
            is_encrypted: false,
            segment_number: segment,
        };
        self.out.dispatch_segment_info(STREAM_INDEX, info).await
    }
}

#[async_trait]
impl MediaHandler for WebVttSegmenter {
    async fn initialize(&mut self) -> Result<()> {
        if self.segment_duration_ms == 0 {
            return Err(PackKitError::InvalidArgument(
                "segment duration must be greater than zero".to_string(),
            ));
        }
        self.out.initialize().await
    }

    async fn process(&mut self, stream_data: StreamData) -> Result<()> {
        match stream_data {
            StreamData::StreamInfo(info) => {
                self.out.dispatch_stream_info(STREAM_INDEX, info).await
            },
            StreamData::TextSample(sample) => self.on_text_sample(sample).await,
            other => Err(PackKitError::Internal(format!(
                "invalid stream data type ({}) for this handler",
                other.kind()
            ))),
        }
    }

    async fn on_flush_request(&mut self, _input_stream_index: usize) -> Result<()> {
        if let Some(&last_segment) = self.segment_map.keys().next_back() {
            while self.head_segment <= last_segment {
                let segment = self.head_segment;
                self.on_segment_end(segment).await?;
                self.head_segment += 1;
            }
        }
        self.out.flush_all_downstreams().await
    }
}
