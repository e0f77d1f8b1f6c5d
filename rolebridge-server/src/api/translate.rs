//! POST /api/translate: direct translation

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use rolebridge_common::Stage;
use tracing::info;
use uuid::Uuid;

use super::stream::spawn_stage;
use super::validation::TranslateRequest;
use crate::error::{ApiResult, PipelineError};
use crate::AppState;

/// Streams the translated document; `done` carries `{}`
pub async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let input = request.into_input(state.limits.max_content_chars)?;

    let request_id = Uuid::new_v4();
    info!(
        request_id = %request_id,
        direction = %input.direction,
        chars = input.content.chars().count(),
        "Direct translation requested"
    );

    let controller = state.direct_controller();
    let sse = spawn_stage(request_id, Stage::Direct, move |chunks, cancel| async move {
        controller.run(request_id, &input, chunks, &cancel).await?;
        Ok::<_, PipelineError>(None)
    });
    Ok(sse.into_response())
}
