//! Stream transport
//!
//! Server-to-client event frames for one translation request:
//!
//! ```text
//! event: <name>      (omitted for chunk frames)
//! data: <json>
//!
//! ```
//!
//! A stream opens with exactly one `connected` frame, carries any number of
//! unnamed chunk frames, and closes with exactly one `done` or `error` frame.
//! The same framing is used by OpenAI-compatible upstreams, so the decoder
//! here also reads upstream model streams.

use serde_json::{json, Value};

use crate::{Error, Result};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

/// One event on a translation stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Opens the stream
    Connected,
    /// Incremental text fragment
    Chunk(String),
    /// Normal end; optional stage payload (the analysis stage sends the parsed result)
    Done(Option<Value>),
    /// Failure end
    Error(String),
}

impl StreamEvent {
    /// `event:` line value, `None` for unnamed chunk frames
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            StreamEvent::Connected => Some(EVENT_CONNECTED),
            StreamEvent::Chunk(_) => None,
            StreamEvent::Done(_) => Some(EVENT_DONE),
            StreamEvent::Error(_) => Some(EVENT_ERROR),
        }
    }

    /// JSON payload carried on the `data:` line
    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Connected => json!({}),
            StreamEvent::Chunk(text) => json!({ "chunk": text }),
            StreamEvent::Done(None) => json!({}),
            StreamEvent::Done(Some(value)) => json!({ "json": value }),
            StreamEvent::Error(message) => json!({ "error": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }

    /// Encode as wire text, including the blank terminator line
    pub fn encode(&self) -> String {
        let mut frame = String::new();
        if let Some(name) = self.event_name() {
            frame.push_str("event: ");
            frame.push_str(name);
            frame.push('\n');
        }
        frame.push_str("data: ");
        frame.push_str(&self.payload().to_string());
        frame.push_str("\n\n");
        frame
    }

    /// Interpret a raw frame as a translation stream event
    pub fn from_frame(frame: &RawFrame) -> Result<Self> {
        let data: Value = if frame.data.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&frame.data)
                .map_err(|e| Error::Protocol(format!("frame data is not JSON: {}", e)))?
        };

        match frame.event.as_deref() {
            Some(EVENT_CONNECTED) => Ok(StreamEvent::Connected),
            Some(EVENT_DONE) => Ok(StreamEvent::Done(data.get("json").cloned())),
            Some(EVENT_ERROR) => {
                let message = data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                Ok(StreamEvent::Error(message))
            }
            None | Some("message") => data
                .get("chunk")
                .and_then(Value::as_str)
                .map(|text| StreamEvent::Chunk(text.to_string()))
                .ok_or_else(|| Error::Protocol("chunk frame without 'chunk' field".to_string())),
            Some(other) => Err(Error::Protocol(format!("unknown event '{}'", other))),
        }
    }
}

/// A complete frame as read off the wire, before interpretation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental frame decoder
///
/// Buffers raw bytes, splits on blank-line boundaries and keeps the partial
/// tail until more bytes arrive. Frames without a `data:` line (keep-alive
/// comments) are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every frame completed by them in arrival order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some((end, terminator_len)) = find_frame_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + terminator_len).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(frame) = parse_block(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &str) -> Option<RawFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(RawFrame {
        event,
        data: data_lines.join("\n"),
    })
}
