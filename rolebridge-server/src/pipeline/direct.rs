//! Direct translation: one call, no analysis, no questions

use rolebridge_common::{Stage, TranslationDirection};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{input_message, prompts};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, ChunkSender, CompletionRequest, LlmGateway};

#[derive(Debug, Clone)]
pub struct DirectInput {
    pub direction: TranslationDirection,
    pub content: String,
}

pub struct DirectController {
    gateway: Arc<dyn LlmGateway>,
    max_tokens: u32,
}

impl DirectController {
    pub fn new(gateway: Arc<dyn LlmGateway>, max_tokens: u32) -> Self {
        Self {
            gateway,
            max_tokens,
        }
    }

    pub fn build_request(&self, request_id: Uuid, input: &DirectInput) -> CompletionRequest {
        CompletionRequest {
            request_id,
            direction: input.direction,
            stage: Stage::Direct,
            messages: vec![
                ChatMessage::system(prompts::template(input.direction, Stage::Direct)),
                ChatMessage::user(input_message(&input.content, None)),
            ],
            max_tokens: self.max_tokens,
            structured_output: false,
        }
    }

    pub async fn run(
        &self,
        request_id: Uuid,
        input: &DirectInput,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let request = self.build_request(request_id, input);
        Ok(self
            .gateway
            .complete_streaming(&request, chunks, cancel)
            .await?)
    }
}
