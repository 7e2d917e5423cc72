//! Generate / save progress / submit / resume handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drill_core::model::{Responses, Test, TestId, TestResult, sanitize_answer};
use services::{GenerateRequest, SaveAck, SaveProgressRequest, SubmitRequest};

use crate::AppState;
use crate::error::ApiError;

/// Last autosaved state of a live attempt.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshotResponse {
    pub test: Test,
    pub responses: Responses,
    pub current_section_index: usize,
    pub current_question_index: usize,
    pub saved_at: Option<DateTime<Utc>>,
    pub result: Option<TestResult>,
}

/// POST /api/tests/generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Test>, ApiError> {
    let test = state.services.generator().generate(request).await?;
    Ok(Json(test))
}

/// POST /api/tests/progress
pub async fn save_progress(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<SaveProgressRequest>,
) -> Result<Json<SaveAck>, ApiError> {
    sanitize_responses(&mut request.responses);
    let ack = state.services.attempts().save_progress(request).await?;
    Ok(Json(ack))
}

/// POST /api/tests/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<SubmitRequest>,
) -> Result<Json<TestResult>, ApiError> {
    sanitize_responses(&mut request.responses);
    let result = state.services.attempts().submit(request).await?;
    Ok(Json(result))
}

/// GET /api/tests/:id
pub async fn live_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LiveSnapshotResponse>, ApiError> {
    let test_id: TestId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid test id: {id}")))?;
    let live = state.services.attempts().live_snapshot(test_id).await?;
    Ok(Json(LiveSnapshotResponse {
        current_section_index: live.position.section_index,
        current_question_index: live.position.question_index,
        test: live.test,
        responses: live.responses,
        saved_at: live.saved_at,
        result: live.result,
    }))
}

/// Answers reach the state machine and the scorer only as `-?[0-9]*`.
fn sanitize_responses(responses: &mut Responses) {
    for response in responses.values_mut() {
        if let Some(raw) = response.user_answer.take() {
            let clean = sanitize_answer(&raw);
            response.user_answer = (!clean.is_empty()).then_some(clean);
        }
    }
}
