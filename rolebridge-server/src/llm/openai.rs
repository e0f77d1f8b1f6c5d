//! OpenAI-compatible chat-completions client
//!
//! `POST {base_url}/chat/completions` with a bearer credential. Streaming
//! responses arrive as SSE frames carrying `choices[0].delta.content` and end
//! with `data: [DONE]`.

use async_trait::async_trait;
use futures::StreamExt;
use rolebridge_common::config::{LimitsConfig, UpstreamSettings};
use rolebridge_common::FrameDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{send_chunk, ChatMessage, ChunkSender, CompletionRequest, GatewayError, LlmGateway};

const USER_AGENT: &str = concat!("rolebridge/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_END_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Gateway talking to any OpenAI-compatible endpoint
pub struct OpenAiCompatibleGateway {
    http_client: reqwest::Client,
    settings: UpstreamSettings,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGateway")
            .field("settings", &self.settings)
            .field("request_timeout", &self.request_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl OpenAiCompatibleGateway {
    pub fn new(settings: UpstreamSettings, limits: &LimitsConfig) -> Result<Self, GatewayError> {
        // No overall client timeout: it would cut long streams. Waits are
        // bounded per phase instead.
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        info!(
            base_url = %settings.base_url,
            model = %settings.model,
            "Upstream gateway configured"
        );

        Ok(Self {
            http_client,
            settings,
            request_timeout: Duration::from_secs(limits.request_timeout_secs),
            idle_timeout: Duration::from_secs(limits.idle_timeout_secs),
        })
    }

    /// Override both waits (tests use short ones)
    pub fn with_timeouts(mut self, request_timeout: Duration, idle_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.idle_timeout = idle_timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &self.settings.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream,
            response_format: request.structured_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }

    /// Send the request and wait for the response head
    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        debug!(
            request_id = %request.request_id,
            stage = %request.stage,
            stream = stream,
            "Sending chat completion request"
        );

        let pending = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&self.body(request, stream))
            .send();

        let response = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| GatewayError::Timeout(self.request_timeout))?
            .map_err(|e| classify_reqwest_error(e, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = match tokio::time::timeout(self.request_timeout, response.text()).await {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => format!("<error body unreadable: {}>", e),
                Err(_) => "<error body not received>".to_string(),
            };
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmGateway for OpenAiCompatibleGateway {
    fn model(&self) -> &str {
        &self.settings.model
    }

    fn request_payload(&self, request: &CompletionRequest, stream: bool) -> Value {
        serde_json::to_value(self.body(request, stream)).unwrap_or(Value::Null)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let response = self.send(request, false).await?;

        let body = tokio::time::timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| GatewayError::Timeout(self.request_timeout))?
            .map_err(|e| classify_reqwest_error(e, self.request_timeout))?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::MalformedResponse("no content in response".to_string()))
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        chunks: ChunkSender,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            response = self.send(request, true) => response?,
        };

        let mut stream = response.bytes_stream();
        let mut decoder = FrameDecoder::new();
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, stream.next()) => next,
            };

            let bytes = match next {
                Err(_) => return Err(GatewayError::Timeout(self.idle_timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(classify_reqwest_error(e, self.idle_timeout)),
                Ok(Some(Ok(bytes))) => bytes,
            };

            for frame in decoder.push(&bytes) {
                if frame.data.trim() == STREAM_END_MARKER {
                    debug!(
                        request_id = %request.request_id,
                        chars = accumulated.chars().count(),
                        "Upstream stream complete"
                    );
                    return Ok(accumulated);
                }

                if let Some(fragment) = parse_stream_fragment(&frame.data)? {
                    accumulated.push_str(&fragment);
                    send_chunk(&chunks, fragment, cancel).await?;
                }
            }
        }

        // Some compatible servers close the stream without the end marker
        debug!(
            request_id = %request.request_id,
            trailing_bytes = decoder.pending(),
            "Upstream closed without end marker"
        );
        Ok(accumulated)
    }
}

/// Extract the text fragment from one upstream stream frame
fn parse_stream_fragment(data: &str) -> Result<Option<String>, GatewayError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| GatewayError::MalformedResponse(format!("bad stream frame: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(GatewayError::Upstream {
            status: 200,
            body: error.to_string(),
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

fn classify_reqwest_error(error: reqwest::Error, bound: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(bound)
    } else if error.is_decode() {
        GatewayError::MalformedResponse(error.to_string())
    } else {
        GatewayError::Transport(error.to_string())
    }
}
