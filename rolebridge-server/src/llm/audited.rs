//! Audit decorator for gateways

use async_trait::async_trait;
use rolebridge_common::audit::{AuditEvent, AuditRecord, AuditSink};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{ChunkSender, CompletionRequest, GatewayError, LlmGateway};

/// Wraps a gateway and records invocation, request and outcome of every call
pub struct AuditedGateway<G> {
    inner: G,
    sink: Arc<dyn AuditSink>,
}

impl<G: LlmGateway> AuditedGateway<G> {
    pub fn new(inner: G, sink: Arc<dyn AuditSink>) -> Self {
        Self { inner, sink }
    }

    fn record(&self, request: &CompletionRequest, event: AuditEvent) {
        self.sink.record(AuditRecord::new(request.request_id, event));
    }

    fn record_start(&self, request: &CompletionRequest, streaming: bool) {
        self.record(
            request,
            AuditEvent::Invocation {
                model: self.inner.model().to_string(),
                direction: request.direction,
                stage: request.stage,
                max_tokens: request.max_tokens,
                streaming,
                input_chars: request.input_chars(),
            },
        );
        self.record(
            request,
            AuditEvent::Request {
                payload: self.inner.request_payload(request, streaming),
            },
        );
    }

    fn record_outcome(&self, request: &CompletionRequest, outcome: &Result<String, GatewayError>) {
        let event = match outcome {
            Ok(text) => AuditEvent::Response { text: text.clone() },
            Err(e) => AuditEvent::Failure {
                detail: e.to_string(),
            },
        };
        self.record(request, event);
    }
}

#[async_trait]
impl<G: LlmGateway> LlmGateway for AuditedGateway<G> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn request_payload(&self, request: &CompletionRequest, stream: bool) -> Value {
        self.inner.request_payload(request, stream)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.record_start(request, false);
        let outcome = self.inner.complete(request).await;
        self.record_outcome(request, &outcome);
        outcome
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        self.record_start(request, true);
        let outcome = self.inner.complete_streaming(request, chunks, cancel).await;
        self.record_outcome(request, &outcome);
        outcome
    }
}
