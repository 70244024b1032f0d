// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The media-handler graph.
//!
//! A pipeline is a tree of [`MediaHandler`]s driven from a single task:
//! every non-terminal handler owns its downstream handlers inside a
//! [`Downstreams`] container and forwards [`StreamData`] through the typed
//! dispatch helpers. Handlers are never invoked reentrantly and may retain
//! state across `process` calls (e.g. a segmenter buffering the current
//! segment). Back-pressure is cooperative: a handler that awaits its own
//! I/O stalls the caller.

use crate::error::Result;
use crate::types::{CueEvent, MediaSample, SegmentInfo, StreamData, StreamInfo, TextSample};
use async_trait::async_trait;
use std::sync::Arc;

/// One node in the pipeline graph.
#[async_trait]
pub trait MediaHandler: Send {
    /// Validates configuration and initializes connected downstreams.
    /// Called once, before any `process` call.
    async fn initialize(&mut self) -> Result<()>;

    /// Consume one item. Ownership transfers to the handler, which may hold
    /// it (via its `Arc` payload) until flushed.
    async fn process(&mut self, stream_data: StreamData) -> Result<()>;

    /// Signals the end of the logical stream feeding input
    /// `input_stream_index`. Handlers emit buffered state and propagate the
    /// flush downstream.
    async fn on_flush_request(&mut self, input_stream_index: usize) -> Result<()>;

    /// Declares which output stream indexes this handler accepts
    /// connections on. The default single-output shape accepts index 0 only.
    fn validate_output_stream_index(&self, stream_index: usize) -> bool {
        stream_index == 0
    }
}

struct Connection {
    output_index: usize,
    handler: Box<dyn MediaHandler>,
}

/// The downstream edges of one handler.
///
/// Dispatch clones the stream data per connected handler on the requested
/// output index (cheap: `Arc` payloads) and returns the first error.
#[derive(Default)]
pub struct Downstreams {
    connections: Vec<Connection>,
}

impl Downstreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `handler` to output `output_index`.
    pub fn connect(&mut self, output_index: usize, handler: Box<dyn MediaHandler>) {
        self.connections.push(Connection { output_index, handler });
    }

    /// Connect `handler` to output 0, the common linear-pipeline case.
    pub fn connect_next(&mut self, handler: Box<dyn MediaHandler>) {
        self.connect(0, handler);
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Initialize every connected handler.
    pub async fn initialize(&mut self) -> Result<()> {
        for connection in &mut self.connections {
            connection.handler.initialize().await?;
        }
        Ok(())
    }

    /// Forward `stream_data` to every handler connected on `output_index`.
    pub async fn dispatch(&mut self, output_index: usize, stream_data: StreamData) -> Result<()> {
        for connection in &mut self.connections {
            if connection.output_index == output_index {
                connection.handler.process(stream_data.clone()).await?;
            }
        }
        Ok(())
    }

    pub async fn dispatch_stream_info(
        &mut self,
        output_index: usize,
        stream_info: Arc<StreamInfo>,
    ) -> Result<()> {
        self.dispatch(output_index, StreamData::StreamInfo(stream_info)).await
    }

    pub async fn dispatch_media_sample(
        &mut self,
        output_index: usize,
        sample: Arc<MediaSample>,
    ) -> Result<()> {
        self.dispatch(output_index, StreamData::MediaSample(sample)).await
    }

    pub async fn dispatch_text_sample(
        &mut self,
        output_index: usize,
        sample: Arc<TextSample>,
    ) -> Result<()> {
        self.dispatch(output_index, StreamData::TextSample(sample)).await
    }

    pub async fn dispatch_segment_info(
        &mut self,
        output_index: usize,
        segment_info: SegmentInfo,
    ) -> Result<()> {
        self.dispatch(output_index, StreamData::SegmentInfo(segment_info)).await
    }

    pub async fn dispatch_cue_event(
        &mut self,
        output_index: usize,
        cue_event: CueEvent,
    ) -> Result<()> {
        self.dispatch(output_index, StreamData::CueEvent(cue_event)).await
    }

    /// Propagate end-of-stream to every handler connected on `output_index`.
    pub async fn flush_downstream(&mut self, output_index: usize) -> Result<()> {
        for connection in &mut self.connections {
            if connection.output_index == output_index {
                connection.handler.on_flush_request(0).await?;
            }
        }
        Ok(())
    }

    /// Propagate end-of-stream to every connected handler.
    pub async fn flush_all_downstreams(&mut self) -> Result<()> {
        for connection in &mut self.connections {
            connection.handler.on_flush_request(0).await?;
        }
        Ok(())
    }
}
