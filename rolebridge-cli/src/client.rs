//! Translation client
//!
//! One method per server operation, plus the interactive flow:
//! analysis, then clarification unless the analysis says it can be skipped,
//! then synthesis.

use rolebridge_common::{AnalysisResult, Answer, Stage, TranslationDirection};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clarify::ClarificationHandler;
use crate::consumer::{StreamConsumer, StreamOutcome};
use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a complete interactive run
#[derive(Debug, Clone)]
pub struct InteractiveOutcome {
    pub analysis: AnalysisResult,
    pub answers: Vec<Answer>,
    pub clarification_skipped: bool,
    pub document: String,
}

#[derive(Debug, Clone)]
pub struct TranslatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl TranslatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Failed(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("accept", "text/event-stream")
            .json(&body)
    }

    /// Direct translation
    pub async fn translate<F>(
        &self,
        direction: TranslationDirection,
        content: &str,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str, &str),
    {
        let request = self.post(
            "/api/translate",
            json!({"direction": direction, "content": content}),
        );
        StreamConsumer::new().run(request, cancel, on_chunk).await
    }

    /// Analysis; the result comes from the `done` frame payload
    pub async fn analyze<F>(
        &self,
        direction: TranslationDirection,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> Result<AnalysisResult, ClientError>
    where
        F: FnMut(&str, &str),
    {
        let request = self.post(
            "/api/analyze",
            json!({"direction": direction, "content": content, "context": context}),
        );
        let (_, payload) = StreamConsumer::new()
            .run(request, cancel, on_chunk)
            .await
            .into_result()?;

        let payload = payload
            .ok_or_else(|| ClientError::Protocol("analysis done frame without result".to_string()))?;
        let analysis: AnalysisResult = serde_json::from_value(payload)
            .map_err(|e| ClientError::Protocol(format!("analysis result: {}", e)))?;
        analysis
            .validate(direction)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        Ok(analysis)
    }

    /// Synthesis from an analysis and the answers given (possibly none)
    pub async fn synthesize<F>(
        &self,
        analysis: &AnalysisResult,
        answers: &[Answer],
        original_text: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
        on_chunk: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str, &str),
    {
        let request = self.post(
            "/api/synthesize",
            json!({
                "analysisJson": analysis,
                "answers": answers,
                "originalText": original_text,
                "context": context,
            }),
        );
        StreamConsumer::new().run(request, cancel, on_chunk).await
    }

    /// Analyze, clarify if needed, synthesize
    ///
    /// `on_chunk` receives the stage with every fragment.
    pub async fn run_interactive<H, F>(
        &self,
        direction: TranslationDirection,
        content: &str,
        context: Option<&str>,
        clarifier: &mut H,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<InteractiveOutcome, ClientError>
    where
        H: ClarificationHandler + ?Sized,
        F: FnMut(Stage, &str),
    {
        let analysis = self
            .analyze(direction, content, context, cancel, |fragment, _| {
                on_chunk(Stage::Analysis, fragment)
            })
            .await?;

        let clarification_skipped = analysis.skips_clarification();
        let answers = if clarification_skipped {
            info!(
                confidence = analysis.confidence_score,
                "Analysis complete, no clarification needed"
            );
            Vec::new()
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                answers = clarifier.clarify(&analysis) => answers?,
            }
        };

        let (document, _) = self
            .synthesize(&analysis, &answers, content, context, cancel, |fragment, _| {
                on_chunk(Stage::Synthesis, fragment)
            })
            .await
            .into_result()?;

        Ok(InteractiveOutcome {
            analysis,
            answers,
            clarification_skipped,
            document,
        })
    }
}
