use drill_core::model::{SessionId, TestResult};

use super::SqliteRepository;
use super::mapping::{SESSION_COLUMNS, conn, id_i64, map_response_row, map_session_row, ser};
use crate::repository::{
    NewSession, ResponseRecord, SessionRecord, SessionRepository, SessionStatus, StorageError,
};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO sessions (
                    test_id, question_set_id, candidate_name, mode, status,
                    total_questions, started_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(session.test_id.to_string())
        .bind(id_i64("question_set_id", session.question_set_id.value())?)
        .bind(session.candidate.as_deref())
        .bind(session.mode.as_str())
        .bind(SessionStatus::InProgress.as_str())
        .bind(i64::from(session.total_questions))
        .bind(session.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StorageError::Conflict;
                }
            }
            conn(e)
        })?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("session id sign overflow".into()))?;
        Ok(SessionId::new(id))
    }

    async fn complete_session(
        &self,
        id: SessionId,
        result: &TestResult,
        responses: &[ResponseRecord],
    ) -> Result<(), StorageError> {
        let session_id = id_i64("session_id", id.value())?;
        let section_results = serde_json::to_string(&result.section_results).map_err(ser)?;
        let intervals = serde_json::to_string(&result.intervals).map_err(ser)?;

        // Dropping `tx` on an early return rolls both halves back.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let updated = sqlx::query(
            r"
                UPDATE sessions SET
                    status = ?2,
                    total_questions = ?3,
                    attempted = ?4,
                    correct = ?5,
                    incorrect = ?6,
                    unanswered = ?7,
                    score = ?8,
                    time_taken = ?9,
                    section_results = ?10,
                    intervals = ?11,
                    completed_at = ?12
                WHERE id = ?1
            ",
        )
        .bind(session_id)
        .bind(SessionStatus::Completed.as_str())
        .bind(i64::from(result.total_questions))
        .bind(i64::from(result.attempted))
        .bind(i64::from(result.correct))
        .bind(i64::from(result.incorrect))
        .bind(i64::from(result.unanswered))
        .bind(result.score)
        .bind(i64::from(result.time_taken))
        .bind(section_results)
        .bind(intervals)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        for response in responses {
            sqlx::query(
                r"
                    INSERT INTO session_responses (
                        session_id, question_number, expression, correct_answer,
                        user_answer, is_correct, answered_at, time_spent
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(session_id, question_number) DO UPDATE SET
                        expression = excluded.expression,
                        correct_answer = excluded.correct_answer,
                        user_answer = excluded.user_answer,
                        is_correct = excluded.is_correct,
                        answered_at = excluded.answered_at,
                        time_spent = excluded.time_spent
                ",
            )
            .bind(session_id)
            .bind(i64::from(response.question_number))
            .bind(response.expression.as_str())
            .bind(response.correct_answer)
            .bind(response.user_answer.as_deref())
            .bind(i64::from(response.is_correct))
            .bind(response.answered_at)
            .bind(i64::from(response.time_spent))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("session_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn list_sessions_for_candidate(
        &self,
        candidate: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let sql = format!(
            r"
                SELECT {SESSION_COLUMNS}
                FROM sessions
                WHERE candidate_name = ?1 AND status = ?2
                ORDER BY completed_at DESC, id DESC
                LIMIT ?3
            "
        );
        let rows = sqlx::query(&sql)
            .bind(candidate)
            .bind(SessionStatus::Completed.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_session_row(&row)?);
        }
        Ok(out)
    }

    async fn responses_for_session(&self, id: SessionId) -> Result<Vec<ResponseRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    question_number, expression, correct_answer, user_answer,
                    is_correct, answered_at, time_spent
                FROM session_responses
                WHERE session_id = ?1
                ORDER BY question_number ASC
            ",
        )
        .bind(id_i64("session_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_response_row(&row)?);
        }
        Ok(out)
    }
}
