//! Server-Sent Events (SSE) utilities
//!
//! Turns a channel of `StreamEvent`s into an axum SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stream::StreamEvent;

/// Keep-alive comment interval
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a stream event into an axum SSE event
pub fn to_sse_event(event: &StreamEvent) -> Event {
    // Fields are written in call order; keep `event:` ahead of `data:`
    let sse = match event.event_name() {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    sse.data(event.payload().to_string())
}

/// Build an SSE response that forwards events from `rx`
///
/// The response ends right after the first terminal event, so nothing can
/// follow `done`/`error`. `guard` lives as long as the response stream: when
/// the client disconnects axum drops the stream and the guard with it
/// (pass a cancellation drop guard to stop upstream work).
///
/// # Example
/// ```rust,ignore
/// let (tx, rx) = tokio::sync::mpsc::channel(64);
/// let cancel = CancellationToken::new();
/// tokio::spawn(run_stage(tx, cancel.clone()));
/// rolebridge_common::sse::event_stream_response(rx, cancel.drop_guard())
/// ```
pub fn event_stream_response<G>(
    mut rx: mpsc::Receiver<StreamEvent>,
    guard: G,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    G: Send + 'static,
{
    let stream = async_stream::stream! {
        let _guard = guard;

        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            yield Ok(to_sse_event(&event));

            if terminal {
                debug!("SSE: terminal frame sent, closing stream");
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}
