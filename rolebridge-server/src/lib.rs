//! rolebridge-server library interface
//!
//! Exposes the router, gateway and pipeline for integration testing.

pub mod api;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use rolebridge_common::audit::AuditSink;
use rolebridge_common::config::LimitsConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::llm::LlmGateway;
use crate::pipeline::{AnalysisController, DirectController, SynthesisController};

/// Application state shared across handlers
///
/// Nothing here is mutated by requests; the audit sink is the only shared
/// resource written to.
#[derive(Clone)]
pub struct AppState {
    /// Upstream model, normally wrapped in an `AuditedGateway`
    pub gateway: Arc<dyn LlmGateway>,
    /// Sink for controller-level audit notes
    pub audit: Arc<dyn AuditSink>,
    pub limits: LimitsConfig,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn LlmGateway>, audit: Arc<dyn AuditSink>, limits: LimitsConfig) -> Self {
        Self {
            gateway,
            audit,
            limits,
            startup_time: Utc::now(),
        }
    }

    pub fn analysis_controller(&self) -> AnalysisController {
        AnalysisController::new(
            self.gateway.clone(),
            self.audit.clone(),
            self.limits.analysis_max_tokens,
        )
    }

    pub fn synthesis_controller(&self) -> SynthesisController {
        SynthesisController::new(self.gateway.clone(), self.limits.synthesis_max_tokens)
    }

    pub fn direct_controller(&self) -> DirectController {
        DirectController::new(self.gateway.clone(), self.limits.direct_max_tokens)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::translation_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Browser front-ends are served from elsewhere
        .layer(CorsLayer::permissive())
}
