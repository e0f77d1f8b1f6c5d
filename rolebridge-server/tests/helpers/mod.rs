//! Shared fixtures for rolebridge-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rolebridge_common::audit::MemoryAuditSink;
use rolebridge_common::config::LimitsConfig;
use rolebridge_common::{FrameDecoder, Stage, StreamEvent};
use rolebridge_server::llm::{
    AuditedGateway, ChunkSender, CompletionRequest, GatewayError, LlmGateway,
};
use rolebridge_server::{build_router, AppState};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Gateway replying with canned text per stage and capturing every request
#[derive(Default)]
pub struct StubGateway {
    replies: HashMap<Stage, Result<String, u16>>,
    captured: Mutex<Vec<CompletionRequest>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, stage: Stage, text: &str) -> Self {
        self.replies.insert(stage, Ok(text.to_string()));
        self
    }

    /// Make `stage` fail with an upstream HTTP status
    pub fn fail(mut self, stage: Stage, status: u16) -> Self {
        self.replies.insert(stage, Err(status));
        self
    }

    pub fn captured(&self) -> Vec<CompletionRequest> {
        self.captured.lock().unwrap().clone()
    }

    fn answer(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.captured.lock().unwrap().push(request.clone());
        match self.replies.get(&request.stage) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(status)) => Err(GatewayError::Upstream {
                status: *status,
                body: "stub failure".to_string(),
            }),
            None => Ok(format!("# {} output", request.stage)),
        }
    }
}

#[async_trait]
impl LlmGateway for StubGateway {
    fn model(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.answer(request)
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        chunks: ChunkSender,
        _cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let text = self.answer(request)?;
        // Split on character boundaries into a few fragments
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(8) {
            chunks
                .send(piece.iter().collect())
                .await
                .map_err(|_| GatewayError::Cancelled)?;
        }
        Ok(text)
    }
}

/// Gateway emitting one fragment per `interval` until cancelled
pub struct SlowGateway {
    pub interval: Duration,
    pub emitted: Arc<AtomicUsize>,
}

impl SlowGateway {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            emitted: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LlmGateway for SlowGateway {
    fn model(&self) -> &str {
        "slow-model"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
        Err(GatewayError::Timeout(self.interval))
    }

    async fn complete_streaming(
        &self,
        _request: &CompletionRequest,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let mut text = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
            let fragment = format!("part{} ", self.emitted.load(Ordering::SeqCst));
            text.push_str(&fragment);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                sent = chunks.send(fragment) => {
                    sent.map_err(|_| GatewayError::Cancelled)?;
                }
            }
            self.emitted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Router over `gateway`, audited into the returned memory sink
pub fn test_app<G: LlmGateway + 'static>(gateway: Arc<G>) -> (Router, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let audited = AuditedGateway::new(SharedGateway(gateway), audit.clone());
    let state = AppState::new(Arc::new(audited), audit.clone(), LimitsConfig::default());
    (build_router(state), audit)
}

/// Lets a test keep a handle on the gateway it hands to the router
pub struct SharedGateway<G>(pub Arc<G>);

#[async_trait]
impl<G: LlmGateway> LlmGateway for SharedGateway<G> {
    fn model(&self) -> &str {
        self.0.model()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.0.complete(request).await
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        self.0.complete_streaming(request, chunks, cancel).await
    }
}

/// POST a JSON body and collect the whole response
pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Decode an SSE body into stream events
pub fn parse_events(body: &str) -> Vec<StreamEvent> {
    let mut decoder = FrameDecoder::new();
    decoder
        .push(body.as_bytes())
        .iter()
        .map(|frame| StreamEvent::from_frame(frame).unwrap())
        .collect()
}

/// Concatenated chunk text
pub fn chunk_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub const EXPORT_REPORT_ANALYSIS: &str = r#"{
  "direction": "pm-to-dev",
  "intent": "一键导出报表",
  "confidenceScore": 0.85,
  "structuredData": {
    "logicCore": "export the current report with one click",
    "constraints": ["single click"],
    "techContext": ["reporting"]
  },
  "missingInfo": [],
  "canProceedDirectly": true
}"#;

pub const SETTLEMENT_ANALYSIS: &str = r#"{
  "direction": "pm-to-dev",
  "intent": "settlement report",
  "confidenceScore": 0.55,
  "structuredData": {
    "logicCore": "daily settlement export",
    "constraints": [],
    "techContext": []
  },
  "missingInfo": [
    {
      "id": "Q1",
      "priority": "HIGH",
      "question": "expected peak load?",
      "reason": "drives capacity planning",
      "options": ["QPS<100", "QPS<1000"],
      "defaultAssumption": "QPS<100"
    },
    {
      "id": "Q2",
      "priority": "MEDIUM",
      "question": "settlement cycle?",
      "reason": "drives data freshness",
      "options": [],
      "defaultAssumption": "T+1"
    }
  ],
  "canProceedDirectly": false
}"#;
