//! Audit trail for model calls
//!
//! Every gateway call records three checkpoints: the invocation summary, the
//! full request payload, and either the full response or the error detail.
//! Controllers receive the sink as an injected capability, so tests can swap
//! in [`MemoryAuditSink`] or [`NoopAuditSink`].
//!
//! Sinks are shared by concurrent requests and must never interleave the
//! bytes of two records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::translation::{Stage, TranslationDirection};
use crate::Result;

/// One audit checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Call is about to be issued
    Invocation {
        model: String,
        direction: TranslationDirection,
        stage: Stage,
        max_tokens: u32,
        streaming: bool,
        input_chars: usize,
    },
    /// Full request payload sent upstream
    Request { payload: Value },
    /// Full response text
    Response { text: String },
    /// Error detail
    Failure { detail: String },
    /// Controller-level observation that is not a gateway checkpoint
    Note { message: String },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Invocation { .. } => "invocation",
            AuditEvent::Request { .. } => "request",
            AuditEvent::Response { .. } => "response",
            AuditEvent::Failure { .. } => "failure",
            AuditEvent::Note { .. } => "note",
        }
    }
}

/// Audit record: event plus correlation data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(request_id: Uuid, event: AuditEvent) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Capability for recording audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

/// Emits records through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match &record.event {
            AuditEvent::Invocation {
                model,
                direction,
                stage,
                max_tokens,
                streaming,
                input_chars,
            } => info!(
                request_id = %record.request_id,
                model = %model,
                direction = %direction,
                stage = %stage,
                max_tokens = max_tokens,
                streaming = streaming,
                input_chars = input_chars,
                "LLM call"
            ),
            AuditEvent::Request { payload } => {
                debug!(request_id = %record.request_id, payload = %payload, "LLM request")
            }
            AuditEvent::Response { text } => debug!(
                request_id = %record.request_id,
                response_chars = text.chars().count(),
                response = %text,
                "LLM response"
            ),
            AuditEvent::Failure { detail } => {
                warn!(request_id = %record.request_id, detail = %detail, "LLM call failed")
            }
            AuditEvent::Note { message } => {
                info!(request_id = %record.request_id, "{}", message)
            }
        }
    }
}

/// Keeps records in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Record kinds in order, e.g. `["invocation", "request", "response"]`
    pub fn kinds(&self) -> Vec<&'static str> {
        self.records().iter().map(|r| r.event.kind()).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

/// Appends one JSON line per record to a file
///
/// Each line is serialized up front and written with a single `write_all`
/// while holding the file lock.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Audit log: {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Audit: failed to serialize record: {}", e);
                return;
            }
        };
        line.push('\n');

        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("Audit: write to {} failed: {}", self.path.display(), e);
                }
            }
            Err(_) => warn!("Audit: log file lock poisoned, record dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn invocation() -> AuditEvent {
        AuditEvent::Invocation {
            model: "test-model".to_string(),
            direction: TranslationDirection::ForwardToImplementer,
            stage: Stage::Analysis,
            max_tokens: 2048,
            streaming: true,
            input_chars: 12,
        }
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let id = Uuid::new_v4();
        sink.record(AuditRecord::new(id, invocation()));
        sink.record(AuditRecord::new(id, AuditEvent::Response { text: "ok".into() }));
        assert_eq!(sink.kinds(), vec!["invocation", "response"]);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = AuditRecord::new(Uuid::nil(), invocation());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "invocation");
        assert_eq!(value["direction"], "pm-to-dev");
        assert_eq!(value["stage"], "analysis");
    }

    #[test]
    fn test_jsonl_sink_concurrent_writers_produce_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let sink = Arc::new(JsonlAuditSink::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.record(AuditRecord::new(
                            Uuid::new_v4(),
                            AuditEvent::Response {
                                text: format!("worker {} line {} {}", worker, i, "x".repeat(200)),
                            },
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let record: AuditRecord = serde_json::from_str(line).unwrap();
            assert_eq!(record.event.kind(), "response");
        }
    }
}
