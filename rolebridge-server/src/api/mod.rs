//! HTTP API handlers for rolebridge-server
//!
//! Three streaming operations plus a health check. Request validation runs
//! before any stream opens; after that, every outcome is an SSE frame.

pub mod analyze;
pub mod health;
pub mod stream;
pub mod synthesize;
pub mod translate;
pub mod validation;

pub use health::health_routes;

use axum::{routing::post, Router};

use crate::AppState;

/// Build translation routes
pub fn translation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/translate", post(translate::translate))
        .route("/api/analyze", post(analyze::analyze))
        .route("/api/synthesize", post(synthesize::synthesize))
}
