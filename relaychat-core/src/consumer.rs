//! Stream consumer.
//!
//! Reads the relay's chunked body in arrival order, decodes it to text,
//! and keeps the assistant placeholder in sync with everything received so
//! far. Lifecycle:
//!
//! ```text
//! Idle ──start──▶ Streaming ──finish──▶ Settled{persisted: false} ──confirm──▶ Settled{persisted: true}
//!                     │
//!                     └──fail──▶ Failed
//! ```

use std::future::Future;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use relaychat_types::{ChatTurn, Message, StreamingStats};
use tracing::{debug, warn};

use crate::error::{ClientError, ConsumerError, StreamError};
use crate::stats;

/// Raw relay body, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Opens the relay for a conversation history.
pub trait ChatTransport: Send + Sync {
    /// Resolves once response headers arrive. A non-success status is an
    /// error here, never answer text.
    fn open(
        &self,
        history: &[ChatTurn],
    ) -> impl Future<Output = Result<ByteStream, ClientError>> + Send;
}

/// Receives every incremental update while a reply streams in.
pub trait StreamObserver {
    /// `placeholder.content` is the full text so far, not the delta.
    fn on_update(&mut self, placeholder: &Message, stats: &StreamingStats);
}

impl StreamObserver for () {
    fn on_update(&mut self, _: &Message, _: &StreamingStats) {}
}

// ── UTF-8 decoding ────────────────────────────────────────────────────────────

/// Streaming UTF-8 decoder.
///
/// A character split across two chunks is held back until its remaining
/// bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut input = buf.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// End of input: an incomplete trailing sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StreamState {
    Idle,
    Streaming {
        placeholder: Message,
        stats: Option<StreamingStats>,
    },
    /// The stream ended cleanly. `message` is the placeholder holding the
    /// final text until `persisted` flips with [`StreamConsumer::confirm`].
    Settled {
        message: Message,
        stats: Option<StreamingStats>,
        persisted: bool,
    },
    /// The read failed; the placeholder keeps its partial text.
    Failed {
        placeholder: Message,
        stats: Option<StreamingStats>,
        reason: String,
    },
}

impl StreamState {
    fn name(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Streaming { .. } => "streaming",
            StreamState::Settled { persisted: false, .. } => "settled",
            StreamState::Settled { persisted: true, .. } => "confirmed",
            StreamState::Failed { .. } => "failed",
        }
    }

    pub fn stats(&self) -> Option<&StreamingStats> {
        match self {
            StreamState::Idle => None,
            StreamState::Streaming { stats, .. }
            | StreamState::Settled { stats, .. }
            | StreamState::Failed { stats, .. } => stats.as_ref(),
        }
    }
}

/// Owns one reply's placeholder from creation to replacement.
#[derive(Debug)]
pub struct StreamConsumer {
    decoder: Utf8ChunkDecoder,
    accumulated: String,
    state: StreamState,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self {
            decoder: Utf8ChunkDecoder::default(),
            accumulated: String::new(),
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Everything decoded so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// The placeholder (or its persisted replacement) in any non-idle state.
    pub fn message(&self) -> Option<&Message> {
        match &self.state {
            StreamState::Idle => None,
            StreamState::Streaming { placeholder, .. } | StreamState::Failed { placeholder, .. } => {
                Some(placeholder)
            }
            StreamState::Settled { message, .. } => Some(message),
        }
    }

    /// Begin streaming into `placeholder`. Its content is reset to empty.
    pub fn start(&mut self, mut placeholder: Message) -> Result<(), ConsumerError> {
        if !matches!(self.state, StreamState::Idle) {
            return Err(self.invalid("start"));
        }
        placeholder.content.clear();
        self.state = StreamState::Streaming {
            placeholder,
            stats: None,
        };
        Ok(())
    }

    /// Append one transport chunk. The placeholder content becomes the full
    /// accumulated text and stats are recomputed.
    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        elapsed_ms: u64,
    ) -> Result<StreamingStats, ConsumerError> {
        if !matches!(self.state, StreamState::Streaming { .. }) {
            return Err(self.invalid("push a chunk"));
        }
        let text = self.decoder.decode(chunk);
        self.accumulated.push_str(&text);
        Ok(self.refresh(elapsed_ms))
    }

    /// Clean end of stream. Returns the final answer text.
    pub fn finish(&mut self, elapsed_ms: u64) -> Result<String, ConsumerError> {
        if !matches!(self.state, StreamState::Streaming { .. }) {
            return Err(self.invalid("finish"));
        }
        let tail = self.decoder.finish();
        if !tail.is_empty() {
            self.accumulated.push_str(&tail);
            self.refresh(elapsed_ms);
        }
        if let StreamState::Streaming { placeholder, stats } =
            std::mem::replace(&mut self.state, StreamState::Idle)
        {
            self.state = StreamState::Settled {
                message: placeholder,
                stats,
                persisted: false,
            };
        }
        Ok(self.accumulated.clone())
    }

    /// The read failed. The partial text stays on the placeholder but will
    /// never be confirmed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ConsumerError> {
        match std::mem::replace(&mut self.state, StreamState::Idle) {
            StreamState::Streaming { placeholder, stats } => {
                self.state = StreamState::Failed {
                    placeholder,
                    stats,
                    reason: reason.into(),
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("fail"))
            }
        }
    }

    /// Replace the placeholder identity with the persisted record.
    pub fn confirm(&mut self, persisted: Message) -> Result<(), ConsumerError> {
        if let StreamState::Settled {
            message,
            persisted: confirmed @ false,
            ..
        } = &mut self.state
        {
            *message = persisted;
            *confirmed = true;
            return Ok(());
        }
        Err(self.invalid("confirm"))
    }

    /// Drive `chunks` to completion, notifying `observer` after every chunk
    /// and once more if the end of the stream changed the text.
    ///
    /// Elapsed time is measured from `started`, the moment the request was
    /// issued. On a read error the consumer moves to `Failed` and the error
    /// is returned; the partial text is not the answer. Must be called while
    /// streaming.
    pub async fn consume<O>(
        &mut self,
        mut chunks: ByteStream,
        started: Instant,
        observer: &mut O,
    ) -> Result<String, StreamError>
    where
        O: StreamObserver + ?Sized,
    {
        let mut received = 0usize;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    received += 1;
                    let stats = self.push_chunk(&bytes, elapsed_ms(started))?;
                    if let Some(placeholder) = self.message() {
                        observer.on_update(placeholder, &stats);
                    }
                }
                Err(e) => {
                    warn!(error = %e, chunks = received, "reply stream failed");
                    self.fail(e.to_string())?;
                    return Err(StreamError::Read(e));
                }
            }
        }
        let streamed = self.accumulated.len();
        let text = self.finish(elapsed_ms(started))?;
        if text.len() != streamed {
            // The decoder flushed a truncated trailing character.
            if let (Some(message), Some(stats)) = (self.message(), self.state.stats()) {
                observer.on_update(message, stats);
            }
        }
        debug!(chunks = received, chars = text.chars().count(), "reply stream ended");
        Ok(text)
    }

    fn refresh(&mut self, elapsed_ms: u64) -> StreamingStats {
        let current = stats::measure(&self.accumulated, elapsed_ms);
        if let StreamState::Streaming { placeholder, stats } = &mut self.state {
            placeholder.content.clone_from(&self.accumulated);
            *stats = Some(current);
        }
        current
    }

    fn invalid(&self, op: &'static str) -> ConsumerError {
        ConsumerError {
            op,
            state: self.state.name(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
