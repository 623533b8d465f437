//! Server-Sent Events framing for the agent's response stream.
//!
//! This module turns a raw byte stream from an HTTP response into a stream of
//! frame payloads: the text after `data:` on each complete line.  Frames may be
//! split across network chunks at any byte, including in the middle of a
//! multi-byte character; the decoder yields the same frames however the stream
//! is partitioned.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::Result;
use crate::observability::{STREAM_BYTES, STREAM_DISCARDED_BYTES, STREAM_FRAMES};

/// Marker that starts every frame line.
pub const FRAME_PREFIX: &str = "data:";

/// A response body as delivered by the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A stream of frame payloads.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Incremental line decoder for `data:` frames.
///
/// The residual buffer holds raw bytes, so a character split across chunks is
/// decoded only once its line is complete.  It never contains a line break,
/// so each push scans only the bytes it appends.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    residual: Vec<u8>,
}

impl FrameDecoder {
    /// Creates a decoder with an empty residual buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scanned = self.residual.len();
        self.residual.extend_from_slice(chunk);
        let Some(last_newline) = chunk.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let last_newline = scanned + last_newline;
        let rest = self.residual.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.residual, rest);
        complete[..last_newline]
            .split(|b| *b == b'\n')
            .filter_map(frame_payload)
            .collect()
    }

    /// Ends the input, discarding any unterminated trailing line.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let discarded = self.residual.len();
        self.residual.clear();
        discarded
    }

    /// Bytes buffered while waiting for a line break.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}

fn frame_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(FRAME_PREFIX.as_bytes())?;
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);
    Some(String::from_utf8_lossy(payload).into_owned())
}

/// Process a stream of bytes into a stream of frame payloads.
///
/// Transport errors are passed through as `Err` items.  When the byte stream
/// ends, a trailing partial line is dropped and the frame stream ends.
pub fn frames(bytes: ByteStream) -> FrameStream {
    let state = (bytes, FrameDecoder::new(), VecDeque::new());
    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    STREAM_FRAMES.click();
                    return Some((Ok(frame), (bytes, decoder, pending)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        STREAM_BYTES.count(chunk.len() as u64);
                        pending.extend(decoder.push(&chunk));
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (bytes, decoder, pending)));
                    }
                    None => {
                        STREAM_DISCARDED_BYTES.count(decoder.finish() as u64);
                        return None;
                    }
                }
            }
        },
    ))
}
