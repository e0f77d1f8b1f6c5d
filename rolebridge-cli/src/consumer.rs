//! Stream consumer
//!
//! Reads one translation stream and tracks the request through
//! `Idle → Connecting → Streaming → {Completed | Cancelled | Failed}`.
//!
//! Cancellation is checked before every frame: once the token fires, frames
//! already received but not yet handled are dropped and the connection is
//! torn down.

use futures::StreamExt;
use rolebridge_common::{FrameDecoder, StreamEvent};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Longest wait for the body of a rejected request
const REJECTION_BODY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerState::Idle => "idle",
            ConsumerState::Connecting => "connecting",
            ConsumerState::Streaming => "streaming",
            ConsumerState::Completed => "completed",
            ConsumerState::Cancelled => "cancelled",
            ConsumerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How one stream ended
///
/// Text received before a failure or cancel is kept as `partial`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed {
        text: String,
        payload: Option<Value>,
    },
    Cancelled {
        partial: String,
    },
    Failed {
        message: String,
        partial: String,
    },
}

impl StreamOutcome {
    /// Completed text and payload, or the matching error
    pub fn into_result(self) -> Result<(String, Option<Value>), ClientError> {
        match self {
            StreamOutcome::Completed { text, payload } => Ok((text, payload)),
            StreamOutcome::Cancelled { .. } => Err(ClientError::Cancelled),
            StreamOutcome::Failed { message, .. } => Err(ClientError::Failed(message)),
        }
    }
}

/// Consumer for a single request
#[derive(Debug)]
pub struct StreamConsumer {
    state: ConsumerState,
    text: String,
    rejection_timeout: Duration,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self {
            state: ConsumerState::Idle,
            text: String::new(),
            rejection_timeout: REJECTION_BODY_TIMEOUT,
        }
    }

    /// Bound the wait for a rejection body
    pub fn with_rejection_timeout(mut self, timeout: Duration) -> Self {
        self.rejection_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    fn transition(&mut self, next: ConsumerState) {
        debug!(from = %self.state, to = %next, "Stream state");
        self.state = next;
    }

    fn cancelled(&mut self) -> StreamOutcome {
        self.transition(ConsumerState::Cancelled);
        StreamOutcome::Cancelled {
            partial: std::mem::take(&mut self.text),
        }
    }

    fn failed(&mut self, message: impl Into<String>) -> StreamOutcome {
        let message = message.into();
        warn!(state = %self.state, "Stream failed: {}", message);
        self.transition(ConsumerState::Failed);
        StreamOutcome::Failed {
            message,
            partial: std::mem::take(&mut self.text),
        }
    }

    /// Send `request` and read its stream to the end
    ///
    /// `on_chunk` receives each fragment and the text accumulated so far, for
    /// re-rendering the partial result.
    pub async fn run<F>(
        &mut self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str, &str),
    {
        self.text.clear();
        self.transition(ConsumerState::Connecting);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled(),
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return self.failed(format!("connection failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                body = tokio::time::timeout(self.rejection_timeout, response.text()) => {
                    body.ok().and_then(Result::ok).unwrap_or_default()
                }
            };
            return self.failed(rejection_message(status.as_u16(), &body));
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                next = bytes.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return self.failed(format!("read failed: {}", e)),
                None => {
                    return self.failed(format!(
                        "stream closed without a terminal frame while {}",
                        self.state
                    ))
                }
            };

            for frame in decoder.push(&chunk) {
                if cancel.is_cancelled() {
                    return self.cancelled();
                }

                let event = match StreamEvent::from_frame(&frame) {
                    Ok(event) => event,
                    Err(e) => return self.failed(e.to_string()),
                };

                match event {
                    StreamEvent::Connected => {
                        if self.state != ConsumerState::Connecting {
                            return self.failed("duplicate connected frame");
                        }
                        self.transition(ConsumerState::Streaming);
                    }
                    StreamEvent::Chunk(fragment) => {
                        if self.state != ConsumerState::Streaming {
                            return self.failed("chunk frame before connected");
                        }
                        self.text.push_str(&fragment);
                        on_chunk(&fragment, &self.text);
                    }
                    StreamEvent::Done(payload) => {
                        if self.state != ConsumerState::Streaming {
                            return self.failed("done frame before connected");
                        }
                        self.transition(ConsumerState::Completed);
                        return StreamOutcome::Completed {
                            text: std::mem::take(&mut self.text),
                            payload,
                        };
                    }
                    StreamEvent::Error(message) => return self.failed(message),
                }
            }
        }
    }
}

/// Message for a non-streamed rejection (`{error:{code,message}}` when present)
fn rejection_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    format!("HTTP {}: {}", status, detail)
}
