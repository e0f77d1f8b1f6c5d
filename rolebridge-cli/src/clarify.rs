//! Clarification step
//!
//! Presents the analysis questions and collects answers. An empty answer
//! means "use the default assumption" and produces no `Answer` for that id.

use async_trait::async_trait;
use rolebridge_common::translation::MissingInfo;
use rolebridge_common::{AnalysisResult, Answer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::ClientError;

/// Source of answers for the questions of one analysis
#[async_trait]
pub trait ClarificationHandler: Send {
    async fn clarify(&mut self, analysis: &AnalysisResult) -> Result<Vec<Answer>, ClientError>;
}

/// Asks on a terminal (or any line-oriented reader/writer pair)
pub struct StdinClarifier<R, W> {
    input: R,
    output: W,
}

impl StdinClarifier<BufReader<tokio::io::Stdin>, tokio::io::Stderr> {
    /// Questions go to stderr so stdout carries only the document
    pub fn terminal() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> StdinClarifier<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    async fn ask(&mut self, index: usize, entry: &MissingInfo) -> Result<Option<String>, ClientError> {
        let mut prompt = format!(
            "\n[{}] ({:?}) {}\n    why: {}\n",
            index + 1,
            entry.priority,
            entry.question,
            entry.reason
        );
        for (i, option) in entry.options.iter().enumerate() {
            prompt.push_str(&format!("    {}) {}\n", i + 1, option));
        }
        prompt.push_str(&format!(
            "    default: {}\n> ",
            entry.default_assumption
        ));
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            // EOF: keep defaults for this and any remaining question
            return Ok(None);
        }
        Ok(resolve_reply(line.trim(), &entry.options))
    }
}

#[async_trait]
impl<R, W> ClarificationHandler for StdinClarifier<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn clarify(&mut self, analysis: &AnalysisResult) -> Result<Vec<Answer>, ClientError> {
        let header = format!(
            "\n{} question(s) before the document is written. Press Enter to keep the default.\n",
            analysis.missing_info.len()
        );
        self.output.write_all(header.as_bytes()).await?;

        let mut answers = Vec::new();
        for (index, entry) in analysis.missing_info.iter().enumerate() {
            if let Some(reply) = self.ask(index, entry).await? {
                answers.push(Answer::new(entry.id.clone(), reply));
            }
        }
        Ok(answers)
    }
}

/// A bare option number selects that option; blank keeps the default
fn resolve_reply(reply: &str, options: &[String]) -> Option<String> {
    if reply.is_empty() {
        return None;
    }
    let chosen = reply
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i));
    Some(chosen.cloned().unwrap_or_else(|| reply.to_string()))
}
