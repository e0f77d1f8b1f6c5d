//! # rolebridge Common Library
//!
//! Shared code for the rolebridge server and client including:
//! - Translation data model (directions, analysis results, answers)
//! - Stream transport (event frames, encoder, incremental decoder)
//! - SSE adapter for axum handlers
//! - Audit sink capability
//! - Configuration loading

pub mod audit;
pub mod config;
pub mod error;
pub mod sse;
pub mod stream;
pub mod translation;

pub use error::{Error, Result};
pub use stream::{FrameDecoder, RawFrame, StreamEvent};
pub use translation::{AnalysisResult, Answer, Stage, TranslationDirection};
