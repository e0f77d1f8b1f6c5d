//! LLM Gateway
//!
//! Chat-completion calls against the upstream model, buffered or streamed.
//! The gateway asks for a JSON object when structured output is requested
//! but never checks the schema; that is the caller's job.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible HTTP implementation
//! - `audited`: decorator recording the audit checkpoints of every call

mod audited;
mod openai;

pub use audited::AuditedGateway;
pub use openai::OpenAiCompatibleGateway;

use async_trait::async_trait;
use rolebridge_common::{Stage, TranslationDirection};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Receives streamed text fragments in arrival order
///
/// Dropping the receiving side stops the streaming call.
pub type ChunkSender = mpsc::Sender<String>;

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything one gateway call needs
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub request_id: Uuid,
    pub direction: TranslationDirection,
    pub stage: Stage,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    /// Ask the upstream model for a single JSON object
    pub structured_output: bool,
}

impl CompletionRequest {
    /// Characters in the user-authored part of the prompt
    pub fn input_chars(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.chars().count())
            .sum()
    }

    /// Concatenated user messages, handy for assertions and logs
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Gateway failures
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-success HTTP status from the upstream endpoint
    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Request never got a response (DNS, connect, reset)
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// No response or no fragment within the bound
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Response arrived but could not be decoded
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Cancellation token fired or the fragment receiver went away
    #[error("Call cancelled")]
    Cancelled,
}

/// Upstream chat-completion capability
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Model identifier, for audit records
    fn model(&self) -> &str;

    /// Request body as it will be sent upstream, for audit records
    fn request_payload(&self, request: &CompletionRequest, stream: bool) -> Value {
        json!({
            "model": self.model(),
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "stream": stream,
            "structured_output": request.structured_output,
        })
    }

    /// Buffered call: whole text once the response is complete
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;

    /// Incremental call
    ///
    /// Sends each fragment to `chunks` in arrival order and returns the
    /// accumulated text on normal completion. Stops with
    /// `GatewayError::Cancelled` when `cancel` fires or `chunks` is closed.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError>;
}

/// Forward one fragment, giving up if the call is cancelled meanwhile
pub(crate) async fn send_chunk(
    chunks: &ChunkSender,
    fragment: String,
    cancel: &CancellationToken,
) -> Result<(), GatewayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        sent = chunks.send(fragment) => sent.map_err(|_| GatewayError::Cancelled),
    }
}
