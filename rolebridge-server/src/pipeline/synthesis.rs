//! Synthesis stage
//!
//! Packages the analysis, the answers and the original text verbatim into
//! one prompt. Filling each gap (answer, then default assumption, then
//! original text) is left to the model; the prose reply is delivered as-is.

use rolebridge_common::{AnalysisResult, Answer, Stage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::prompts;
use crate::error::PipelineError;
use crate::llm::{ChatMessage, ChunkSender, CompletionRequest, LlmGateway};

#[derive(Debug, Clone)]
pub struct SynthesisInput {
    pub analysis: AnalysisResult,
    pub answers: Vec<Answer>,
    pub original_text: String,
    pub context: Option<String>,
}

pub struct SynthesisController {
    gateway: Arc<dyn LlmGateway>,
    max_tokens: u32,
}

impl SynthesisController {
    pub fn new(gateway: Arc<dyn LlmGateway>, max_tokens: u32) -> Self {
        Self {
            gateway,
            max_tokens,
        }
    }

    pub fn build_request(
        &self,
        request_id: Uuid,
        input: &SynthesisInput,
    ) -> Result<CompletionRequest, PipelineError> {
        let direction = input.analysis.direction;
        Ok(CompletionRequest {
            request_id,
            direction,
            stage: Stage::Synthesis,
            messages: vec![
                ChatMessage::system(prompts::template(direction, Stage::Synthesis)),
                ChatMessage::user(synthesis_message(input)?),
            ],
            max_tokens: self.max_tokens,
            structured_output: false,
        })
    }

    /// Stream the final document; returns its full text
    pub async fn run(
        &self,
        request_id: Uuid,
        input: &SynthesisInput,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let request = self.build_request(request_id, input)?;
        Ok(self
            .gateway
            .complete_streaming(&request, chunks, cancel)
            .await?)
    }
}

fn synthesis_message(input: &SynthesisInput) -> Result<String, PipelineError> {
    let analysis = serde_json::to_string_pretty(&input.analysis)
        .map_err(|e| PipelineError::Internal(e.to_string()))?;
    let answers = serde_json::to_string_pretty(&input.answers)
        .map_err(|e| PipelineError::Internal(e.to_string()))?;

    let mut message = format!(
        "Analysis JSON:\n```json\n{}\n```\n\nAnswers JSON:\n```json\n{}\n```\n\nOriginal text:\n{}\n",
        analysis, answers, input.original_text
    );
    if let Some(context) = input.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        message.push_str("\nContext:\n");
        message.push_str(context);
        message.push('\n');
    }
    Ok(message)
}
