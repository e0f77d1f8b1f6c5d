//! Error types for rolebridge-server
//!
//! `ApiError` covers rejections returned before a stream opens. Once the
//! `connected` frame is out, failures travel as a terminal `error` frame
//! built from `PipelineError`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::llm::GatewayError;

/// Failure of one stage run, after the stream has opened
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upstream endpoint failed or could not be reached
    #[error("Upstream model error: {0}")]
    Upstream(String),

    /// No upstream data within the bound
    #[error("Upstream model timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Analysis output was not a valid AnalysisResult
    #[error("Model response is not valid analysis JSON: {0}")]
    ResponseNotJson(String),

    /// Client went away or stopped the request
    #[error("Cancelled by user")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

impl From<GatewayError> for PipelineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Cancelled => PipelineError::Cancelled,
            GatewayError::Timeout(bound) => PipelineError::Timeout(bound),
            other => PipelineError::Upstream(other.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400), no stream opened
    #[error("Validation error: {0}")]
    BadRequest(String),

    /// Server misconfiguration (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<rolebridge_common::Error> for ApiError {
    fn from(err: rolebridge_common::Error) -> Self {
        match err {
            rolebridge_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            rolebridge_common::Error::Config(msg) => ApiError::Config(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
