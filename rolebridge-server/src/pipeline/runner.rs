//! Stage runner
//!
//! Drives one stage for one SSE response: opens the stream, forwards
//! fragments in arrival order while the stage works, then closes with
//! exactly one terminal frame. Cancelled runs close with no terminal frame.

use rolebridge_common::StreamEvent;
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::emitter::EventEmitter;
use crate::error::PipelineError;
use crate::llm::ChunkSender;

/// Fragments buffered between the gateway and the SSE channel
const CHUNK_BUFFER: usize = 64;

/// How a stage run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Run `work` and stream its fragments to `events`
///
/// `work` receives the fragment sender and returns the payload of the `done`
/// frame. Once `cancel` fires no further chunk frame is emitted, even for
/// fragments already buffered.
pub async fn run_stage<F, Fut>(
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    work: F,
) -> StageOutcome
where
    F: FnOnce(ChunkSender) -> Fut,
    Fut: Future<Output = Result<Option<Value>, PipelineError>>,
{
    let Some(emitter) = EventEmitter::open(events).await else {
        debug!("Client gone before stream opened");
        cancel.cancel();
        return StageOutcome::Cancelled;
    };

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(CHUNK_BUFFER);
    let work = work(chunk_tx);

    let forward = async {
        let mut forwarded = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = chunk_rx.recv() => match next {
                    Some(text) => {
                        if !emitter.chunk(text).await {
                            debug!("Client disconnected mid-stream");
                            cancel.cancel();
                            break;
                        }
                        forwarded += 1;
                    }
                    None => break,
                },
            }
        }
        // Unblock a producer still waiting on a full buffer
        chunk_rx.close();
        forwarded
    };

    let (outcome, forwarded) = tokio::join!(work, forward);

    if cancel.is_cancelled() {
        info!(chunks = forwarded, "Stage cancelled");
        emitter.abandon();
        return StageOutcome::Cancelled;
    }

    match outcome {
        Ok(payload) => {
            debug!(chunks = forwarded, "Stage completed");
            emitter.done(payload).await;
            StageOutcome::Completed
        }
        Err(PipelineError::Cancelled) => {
            info!(chunks = forwarded, "Stage cancelled");
            emitter.abandon();
            StageOutcome::Cancelled
        }
        Err(e) => {
            warn!(chunks = forwarded, error = %e, "Stage failed");
            emitter.fail(e.to_string()).await;
            StageOutcome::Failed
        }
    }
}
