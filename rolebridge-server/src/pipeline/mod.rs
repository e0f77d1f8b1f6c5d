//! Translation pipeline
//!
//! Stage controllers (analysis, synthesis, direct), the prompt templates they
//! use, and the runner that turns a stage into an event stream.

pub mod analysis;
pub mod direct;
pub mod emitter;
pub mod prompts;
pub mod runner;
pub mod synthesis;

pub use analysis::{AnalysisController, AnalysisInput};
pub use direct::{DirectController, DirectInput};
pub use runner::{run_stage, StageOutcome};
pub use synthesis::{SynthesisController, SynthesisInput};

/// User message embedding the raw input and optional free-text context
pub(crate) fn input_message(content: &str, context: Option<&str>) -> String {
    let mut message = format!("Input:\n{}\n", content);
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        message.push_str("\nContext:\n");
        message.push_str(context);
        message.push('\n');
    }
    message
}
