//! Server-sent event decoding for chat-completion streams.
//!
//! [`LineDecoder`] is the sans-IO framer: it buffers bytes, splits complete
//! lines and turns `data:` lines into [`LineEvent`]s. [`DeltaStream`] drives
//! it from a pull-based byte stream and yields text deltas.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Marker that starts every significant line.
pub const DATA_PREFIX: &str = "data:";
/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Categories of stream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Non-success HTTP status from the service
    HttpStatus,
    /// Connection or request timeout
    Timeout,
    /// Request failed or the connection dropped mid-stream
    Transport,
    /// Error object delivered inside the event stream
    Api,
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorKind::HttpStatus => write!(f, "http_status"),
            StreamErrorKind::Timeout => write!(f, "timeout"),
            StreamErrorKind::Transport => write!(f, "transport"),
            StreamErrorKind::Api => write!(f, "api_error"),
        }
    }
}

/// A failure that ends the in-flight turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Timeout, message)
    }

    /// Creates an HTTP status error, lifting `error.message` out of a JSON body.
    pub fn http_status(status: u16, body: &str) -> Self {
        if body.is_empty() {
            return Self::new(StreamErrorKind::HttpStatus, format!("HTTP {status}"));
        }
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(msg) = json
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        {
            return Self {
                kind: StreamErrorKind::HttpStatus,
                message: format!("HTTP {status}: {msg}"),
                details: Some(body.to_string()),
            };
        }
        Self {
            kind: StreamErrorKind::HttpStatus,
            message: format!("HTTP {status}"),
            details: Some(body.to_string()),
        }
    }

    pub fn api(error_type: &str, message: &str) -> Self {
        Self::new(StreamErrorKind::Api, format!("{error_type}: {message}"))
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Boxed stream of text deltas.
pub type BoxDeltaStream = BoxStream<'static, StreamResult<String>>;

/// Outcome of one complete `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Delta(String),
    Done,
    Error(StreamError),
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Decodes one complete line. Lines without the data prefix, malformed
/// payloads and payloads without content produce nothing.
pub fn decode_line(line: &str) -> Option<LineEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == DONE_SENTINEL {
        return Some(LineEvent::Done);
    }

    let chunk = match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            debug!(error = %err, "discarding malformed event payload");
            return None;
        }
    };

    if let Some(error) = chunk.error {
        return Some(LineEvent::Error(StreamError::api(
            error.error_type.as_deref().unwrap_or("error"),
            error.message.as_deref().unwrap_or("Unknown error"),
        )));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map(LineEvent::Delta)
}

/// Incremental line framer.
///
/// Bytes are buffered until a `\n` arrives, so lines (and multi-byte UTF-8
/// sequences) split across chunks are reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
    done: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminating event has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds a chunk and returns events for every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LineEvent> {
        if self.done {
            return Vec::new();
        }
        self.partial.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.partial[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.partial[start..end]);
            start = end + 1;
            if let Some(event) = decode_line(&line) {
                let terminal = !matches!(event, LineEvent::Delta(_));
                events.push(event);
                if terminal {
                    self.done = true;
                    break;
                }
            }
        }

        if self.done {
            self.partial.clear();
        } else {
            self.partial.drain(..start);
        }
        events
    }

    /// Flushes the final unterminated line once the source is exhausted.
    pub fn finish(&mut self) -> Vec<LineEvent> {
        if self.done || self.partial.is_empty() {
            self.partial.clear();
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        self.done = true;
        decode_line(&line).into_iter().collect()
    }
}

/// Lazy, finite stream of text deltas over a chunked byte source.
///
/// Ends after `[DONE]`, after an error, or when the source completes.
pub struct DeltaStream<S> {
    inner: S,
    decoder: LineDecoder,
    pending: VecDeque<StreamResult<String>>,
    finished: bool,
}

impl<S> DeltaStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn enqueue(&mut self, events: Vec<LineEvent>) {
        for event in events {
            match event {
                LineEvent::Delta(text) => self.pending.push_back(Ok(text)),
                LineEvent::Done => self.finished = true,
                LineEvent::Error(err) => {
                    self.pending.push_back(Err(err));
                    self.finished = true;
                }
            }
        }
    }
}

impl<S, B, E> Stream for DeltaStream<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    type Item = StreamResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let events = self.decoder.push(chunk.as_ref());
                    self.enqueue(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(StreamError::transport(format!(
                        "Stream read failed: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    let events = self.decoder.finish();
                    self.enqueue(events);
                    self.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
