//! HTTP server module

mod api;
mod attempts;
mod history;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

pub use api::{HealthResponse, QuestionSetListResponse};
pub use attempts::LiveSnapshotResponse;
pub use history::{HistoryQuery, HistoryResponse};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/question-sets", get(api::list_question_sets))
        .route("/api/tests/generate", post(attempts::generate))
        .route("/api/tests/progress", post(attempts::save_progress))
        .route("/api/tests/submit", post(attempts::submit))
        .route("/api/tests/:id", get(attempts::live_snapshot))
        .route("/api/history", get(history::list_history))
        .with_state(state)
}
