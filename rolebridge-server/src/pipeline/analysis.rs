//! Analysis stage
//!
//! One structured-output gateway call. Fragments stream to the caller for
//! live display; the accumulated text must decode into an `AnalysisResult`
//! or the stage fails with `ResponseNotJson`. No retry, no clamping.

use rolebridge_common::audit::{AuditEvent, AuditRecord, AuditSink};
use rolebridge_common::{AnalysisResult, Stage, TranslationDirection};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{input_message, prompts};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, ChunkSender, CompletionRequest, LlmGateway};

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub direction: TranslationDirection,
    pub content: String,
    pub context: Option<String>,
}

pub struct AnalysisController {
    gateway: Arc<dyn LlmGateway>,
    audit: Arc<dyn AuditSink>,
    max_tokens: u32,
}

impl AnalysisController {
    pub fn new(gateway: Arc<dyn LlmGateway>, audit: Arc<dyn AuditSink>, max_tokens: u32) -> Self {
        Self {
            gateway,
            audit,
            max_tokens,
        }
    }

    pub fn build_request(&self, request_id: Uuid, input: &AnalysisInput) -> CompletionRequest {
        CompletionRequest {
            request_id,
            direction: input.direction,
            stage: Stage::Analysis,
            messages: vec![
                ChatMessage::system(prompts::template(input.direction, Stage::Analysis)),
                ChatMessage::user(input_message(&input.content, input.context.as_deref())),
            ],
            max_tokens: self.max_tokens,
            structured_output: true,
        }
    }

    pub async fn run(
        &self,
        request_id: Uuid,
        input: &AnalysisInput,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let request = self.build_request(request_id, input);
        let text = self
            .gateway
            .complete_streaming(&request, chunks, cancel)
            .await?;

        let result = AnalysisResult::from_model_output(&text, input.direction)
            .map_err(|e| PipelineError::ResponseNotJson(e.to_string()))?;

        // The flag is trusted as reported; an inconsistent one is only noted
        if result.has_inconsistent_confidence() {
            warn!(
                request_id = %request_id,
                confidence = result.confidence_score,
                "Model set canProceedDirectly despite low confidence"
            );
            self.audit.record(AuditRecord::new(
                request_id,
                AuditEvent::Note {
                    message: format!(
                        "canProceedDirectly=true with confidenceScore {} below threshold",
                        result.confidence_score
                    ),
                },
            ));
        }

        debug!(
            request_id = %request_id,
            missing = result.missing_info.len(),
            skips_clarification = result.skips_clarification(),
            "Analysis decoded"
        );
        Ok(result)
    }
}
