use chrono::{DateTime, Utc};
use drill_core::model::{
    IntervalStats, Mode, QuestionSetId, SectionResult, SessionId, TestId, TestResult,
};
use sqlx::Row;

use crate::repository::{ResponseRecord, SessionRecord, SessionStatus, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn question_set_id_from_i64(v: i64) -> Result<QuestionSetId, StorageError> {
    Ok(QuestionSetId::new(i64_to_u64("question_set_id", v)?))
}

pub(crate) fn parse_mode(s: &str) -> Result<Mode, StorageError> {
    Mode::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid mode: {s}")))
}

pub(crate) fn parse_status(s: &str) -> Result<SessionStatus, StorageError> {
    SessionStatus::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid status: {s}")))
}

/// Columns selected by every session query, in this order.
pub(crate) const SESSION_COLUMNS: &str = r"
    id, test_id, question_set_id, candidate_name, mode, status, total_questions,
    attempted, correct, incorrect, unanswered, score, time_taken,
    section_results, intervals, started_at, completed_at
";

fn result_from_row(
    row: &sqlx::sqlite::SqliteRow,
    test_id: TestId,
    total_questions: u32,
) -> Result<TestResult, StorageError> {
    let count = |field: &'static str| -> Result<u32, StorageError> {
        let v: Option<i64> = row.try_get(field).map_err(ser)?;
        u32_from_i64(
            field,
            v.ok_or_else(|| StorageError::Serialization(format!("missing {field}")))?,
        )
    };

    let section_results: Vec<SectionResult> = serde_json::from_str(
        &row.try_get::<Option<String>, _>("section_results")
            .map_err(ser)?
            .unwrap_or_else(|| "[]".into()),
    )
    .map_err(ser)?;
    let intervals: Vec<IntervalStats> = serde_json::from_str(
        &row.try_get::<Option<String>, _>("intervals")
            .map_err(ser)?
            .unwrap_or_else(|| "[]".into()),
    )
    .map_err(ser)?;
    let completed_at: DateTime<Utc> = row
        .try_get::<Option<DateTime<Utc>>, _>("completed_at")
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization("missing completed_at".into()))?;

    Ok(TestResult {
        test_id,
        total_questions,
        attempted: count("attempted")?,
        correct: count("correct")?,
        incorrect: count("incorrect")?,
        unanswered: count("unanswered")?,
        score: row
            .try_get::<Option<f64>, _>("score")
            .map_err(ser)?
            .unwrap_or_default(),
        time_taken: count("time_taken")?,
        section_results,
        intervals,
        completed_at,
    })
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StorageError> {
    let test_id: TestId = row
        .try_get::<String, _>("test_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let status = parse_status(&row.try_get::<String, _>("status").map_err(ser)?)?;
    let total_questions = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;

    let result = match status {
        SessionStatus::Completed => Some(result_from_row(row, test_id, total_questions)?),
        SessionStatus::InProgress => None,
    };

    Ok(SessionRecord {
        id: session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        test_id,
        question_set_id: question_set_id_from_i64(
            row.try_get::<i64, _>("question_set_id").map_err(ser)?,
        )?,
        mode: parse_mode(&row.try_get::<String, _>("mode").map_err(ser)?)?,
        candidate: row.try_get("candidate_name").map_err(ser)?,
        status,
        total_questions,
        started_at: row.try_get("started_at").map_err(ser)?,
        result,
    })
}

pub(crate) fn map_response_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResponseRecord, StorageError> {
    Ok(ResponseRecord {
        question_number: u32_from_i64(
            "question_number",
            row.try_get::<i64, _>("question_number").map_err(ser)?,
        )?,
        expression: row.try_get("expression").map_err(ser)?,
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        user_answer: row.try_get("user_answer").map_err(ser)?,
        is_correct: row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
        answered_at: row.try_get("answered_at").map_err(ser)?,
        time_spent: u32_from_i64(
            "time_spent",
            row.try_get::<i64, _>("time_spent").map_err(ser)?,
        )?,
    })
}
