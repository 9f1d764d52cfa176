//! Streaming engine: incremental SSE decoding and delta batching.
//!
//! The decoder is pure and incremental: bytes in, `data:` payloads out.
//! Provider adapters supply a frame parser that turns each payload into
//! canonical [`StreamDelta`]s, so every SSE dialect funnels through the
//! same decode path.

use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::QuillError;
use crate::types::StreamDelta;

/// An event produced by the SSE decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The joined `data:` payload of one frame.
    Data(String),
    /// The `[DONE]` sentinel: end of stream.
    Done,
}

/// Incremental SSE decoder.
///
/// Buffers partial UTF-8 sequences and partial lines across chunk
/// boundaries, splits on blank-line-delimited frames, and joins multi-line
/// `data:` fields with newlines per the SSE spec.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Undecoded byte tail (possibly a partial UTF-8 sequence).
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    pending_line: String,
    /// `data:` lines of the frame currently being assembled.
    frame_data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning all frame events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending_bytes.extend_from_slice(chunk);

        // Decode as much as possible. An incomplete tail sequence stays
        // buffered for the next chunk; an invalid sequence becomes U+FFFD
        // and decoding continues, so one bad byte cannot stall the stream.
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(s) => {
                    text.push_str(s);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(
                        std::str::from_utf8(&self.pending_bytes[..valid])
                            .expect("valid_up_to boundary"),
                    );
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + bad);
                        }
                        None => {
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        let mut events = Vec::new();
        for ch in text.chars() {
            if ch != '\n' {
                self.pending_line.push(ch);
                continue;
            }
            let line = std::mem::take(&mut self.pending_line);
            let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any trailing frame at end of input.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending_bytes.is_empty() {
            // The stream ended inside a multi-byte sequence.
            self.pending_bytes.clear();
            self.pending_line.push(char::REPLACEMENT_CHARACTER);
        }
        if !self.pending_line.is_empty() {
            let line = std::mem::take(&mut self.pending_line);
            if let Some(event) = self.take_line(&line) {
                return Some(event);
            }
        }
        self.end_frame()
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.end_frame();
        }
        if line.starts_with(':') {
            return None; // SSE comment
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.frame_data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // Other fields (event:, id:, retry:) are ignored.
        None
    }

    fn end_frame(&mut self) -> Option<SseEvent> {
        if self.frame_data.is_empty() {
            return None;
        }
        let payload = self.frame_data.join("\n");
        self.frame_data.clear();
        if payload == "[DONE]" {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(payload))
        }
    }
}

/// Decode a chunked HTTP byte stream into canonical deltas.
///
/// `parse_frame` is the provider's dialect: it turns one `data:` payload
/// into zero or more deltas. Transport errors terminate the stream; no
/// retry happens at this layer.
pub fn decode_sse_stream<S, B, F>(
    byte_stream: S,
    mut parse_frame: F,
) -> BoxStream<'static, Result<StreamDelta, QuillError>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    F: FnMut(&str) -> Vec<StreamDelta> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(byte_stream);

        'outer: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(QuillError::Network(e));
                    break;
                }
            };
            for event in decoder.feed(chunk.as_ref()) {
                match event {
                    SseEvent::Data(payload) => {
                        for delta in parse_frame(&payload) {
                            yield Ok(delta);
                        }
                    }
                    SseEvent::Done => break 'outer,
                }
            }
        }

        if let Some(SseEvent::Data(payload)) = decoder.finish() {
            debug!(len = payload.len(), "trailing SSE frame without terminator");
            for delta in parse_frame(&payload) {
                yield Ok(delta);
            }
        }
    };
    Box::pin(stream)
}

/// Flush when this much time has elapsed since the last flush.
pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(8);
/// Flush when this many pieces are buffered.
pub const BATCH_MAX_PIECES: usize = 5;

/// Client-side delta coalescing before the consumer callback.
///
/// Throughput smoothing only: no flow-control signal travels back to the
/// producer.
#[derive(Debug)]
pub struct DeltaBatcher {
    pieces: Vec<String>,
    last_flush: Instant,
    interval: Duration,
    max_pieces: usize,
    /// Batches emitted so far.
    pub batches: usize,
}

impl DeltaBatcher {
    pub fn new() -> Self {
        Self::with_policy(BATCH_FLUSH_INTERVAL, BATCH_MAX_PIECES)
    }

    pub fn with_policy(interval: Duration, max_pieces: usize) -> Self {
        Self {
            pieces: Vec::new(),
            last_flush: Instant::now(),
            interval,
            max_pieces,
            batches: 0,
        }
    }

    /// Buffer a piece; returns a joined batch when the policy says flush.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.pieces.push(text.to_string());
        if self.pieces.len() >= self.max_pieces || self.last_flush.elapsed() >= self.interval {
            return self.flush();
        }
        None
    }

    /// Drain whatever is buffered.
    pub fn flush(&mut self) -> Option<String> {
        self.last_flush = Instant::now();
        if self.pieces.is_empty() {
            return None;
        }
        self.batches += 1;
        Some(std::mem::take(&mut self.pieces).concat())
    }
}

impl Default for DeltaBatcher {
    fn default() -> Self {
        Self::new()
    }
}
