//! Health and catalogue handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use storage::repository::QuestionSetSummary;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetListResponse {
    pub question_sets: Vec<QuestionSetSummary>,
}

/// GET /api/question-sets
pub async fn list_question_sets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QuestionSetListResponse>, ApiError> {
    let question_sets = state.services.question_sets().await?;
    Ok(Json(QuestionSetListResponse { question_sets }))
}
