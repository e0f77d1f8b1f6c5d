//! POST /api/synthesize: synthesis stage

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use rolebridge_common::Stage;
use tracing::info;
use uuid::Uuid;

use super::stream::spawn_stage;
use super::validation::SynthesizeRequest;
use crate::error::{ApiResult, PipelineError};
use crate::AppState;

/// Streams the final document; `done` carries `{}`
pub async fn synthesize(
    State(state): State<AppState>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let input = request.into_input(state.limits.max_content_chars)?;

    let request_id = Uuid::new_v4();
    info!(
        request_id = %request_id,
        direction = %input.analysis.direction,
        gaps = input.analysis.missing_info.len(),
        answers = input.answers.len(),
        "Synthesis requested"
    );

    let controller = state.synthesis_controller();
    let sse = spawn_stage(request_id, Stage::Synthesis, move |chunks, cancel| async move {
        controller.run(request_id, &input, chunks, &cancel).await?;
        Ok::<_, PipelineError>(None)
    });
    Ok(sse.into_response())
}
