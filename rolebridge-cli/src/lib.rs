//! # rolebridge client
//!
//! Terminal client for rolebridge-server:
//! - Stream consumer with an explicit request state machine and cancellation
//! - Typed client for the three translation operations
//! - Interactive analyze, clarify, synthesize orchestration

pub mod clarify;
pub mod client;
pub mod consumer;
pub mod error;

pub use clarify::{ClarificationHandler, StdinClarifier};
pub use client::{InteractiveOutcome, TranslatorClient};
pub use consumer::{ConsumerState, StreamConsumer, StreamOutcome};
pub use error::ClientError;
