//! Spawning a stage behind an SSE response

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use rolebridge_common::{sse::event_stream_response, Stage};
use serde_json::Value;
use std::convert::Infallible;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::llm::ChunkSender;
use crate::pipeline::run_stage;

/// Frames buffered between the stage task and the HTTP body
const EVENT_BUFFER: usize = 64;

/// Run `work` on its own task and stream its events
///
/// The response holds a drop guard on the request's cancellation token:
/// a client disconnect drops the body, cancels the token and stops the
/// upstream call.
pub fn spawn_stage<F, Fut>(
    request_id: Uuid,
    stage: Stage,
    work: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: FnOnce(ChunkSender, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<Value>, PipelineError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    let task_cancel = cancel.clone();
    tokio::spawn(
        async move {
            run_stage(tx, task_cancel, move |chunks| work(chunks, token)).await;
        }
        .instrument(info_span!("stage", request_id = %request_id, stage = %stage)),
    );

    event_stream_response(rx, cancel.drop_guard())
}
