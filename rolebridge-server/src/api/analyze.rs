//! POST /api/analyze: analysis stage

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use rolebridge_common::Stage;
use tracing::info;
use uuid::Uuid;

use super::stream::spawn_stage;
use super::validation::AnalyzeRequest;
use crate::error::{ApiResult, PipelineError};
use crate::AppState;

/// Streams the raw analysis JSON as it is generated
///
/// The `done` frame carries the decoded result as `{"json": AnalysisResult}`;
/// output that does not decode ends with an `error` frame instead.
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let input = request.into_input(state.limits.max_content_chars)?;

    let request_id = Uuid::new_v4();
    info!(
        request_id = %request_id,
        direction = %input.direction,
        chars = input.content.chars().count(),
        has_context = input.context.is_some(),
        "Analysis requested"
    );

    let controller = state.analysis_controller();
    let sse = spawn_stage(request_id, Stage::Analysis, move |chunks, cancel| async move {
        let result = controller.run(request_id, &input, chunks, &cancel).await?;
        let payload =
            serde_json::to_value(&result).map_err(|e| PipelineError::Internal(e.to_string()))?;
        Ok::<_, PipelineError>(Some(payload))
    });
    Ok(sse.into_response())
}
