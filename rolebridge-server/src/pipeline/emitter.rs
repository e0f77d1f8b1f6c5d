//! Per-request event emitter
//!
//! Wraps the channel feeding one SSE response. `open` sends `connected`,
//! `chunk` forwards fragments, and the terminal methods take the emitter by
//! value, so no frame can follow `done` or `error`.

use rolebridge_common::StreamEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

pub struct EventEmitter {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventEmitter {
    /// Send the `connected` frame
    ///
    /// Returns `None` when the client is already gone.
    pub async fn open(tx: mpsc::Sender<StreamEvent>) -> Option<Self> {
        tx.send(StreamEvent::Connected).await.ok()?;
        Some(Self { tx })
    }

    /// Forward one fragment; `false` once the client has disconnected
    pub async fn chunk(&self, text: String) -> bool {
        self.tx.send(StreamEvent::Chunk(text)).await.is_ok()
    }

    pub async fn done(self, payload: Option<Value>) {
        if self.tx.send(StreamEvent::Done(payload)).await.is_err() {
            debug!("Client gone before done frame");
        }
    }

    pub async fn fail(self, message: String) {
        if self.tx.send(StreamEvent::Error(message)).await.is_err() {
            debug!("Client gone before error frame");
        }
    }

    /// Close without a terminal frame (cancelled streams)
    pub fn abandon(self) {}
}
