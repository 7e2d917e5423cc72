//! History REST API endpoints

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use storage::repository::SessionRecord;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub candidate: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub sessions: Vec<SessionRecord>,
}

/// GET /api/history?candidate=…
///
/// Anonymous attempts are never listed, so a missing candidate yields an
/// empty list rather than everything.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Some(candidate) = query.candidate else {
        return Ok(Json(HistoryResponse {
            sessions: Vec::new(),
        }));
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let sessions = state.services.attempts().history(&candidate, limit).await?;
    Ok(Json(HistoryResponse { sessions }))
}
