use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates question sets with their items, sessions, per-question session
/// responses, and indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_sets (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_set_items (
                    set_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    expression TEXT NOT NULL,
                    correct_answer INTEGER NOT NULL,
                    PRIMARY KEY (set_id, position),
                    FOREIGN KEY (set_id) REFERENCES question_sets(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    test_id TEXT NOT NULL UNIQUE,
                    question_set_id INTEGER NOT NULL,
                    candidate_name TEXT,
                    mode TEXT NOT NULL CHECK (mode IN ('practice', 'test')),
                    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed')),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    attempted INTEGER,
                    correct INTEGER,
                    incorrect INTEGER,
                    unanswered INTEGER,
                    score REAL,
                    time_taken INTEGER,
                    section_results TEXT,
                    intervals TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_responses (
                    session_id INTEGER NOT NULL,
                    question_number INTEGER NOT NULL CHECK (question_number >= 1),
                    expression TEXT NOT NULL,
                    correct_answer INTEGER NOT NULL,
                    user_answer TEXT,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    answered_at TEXT,
                    time_spent INTEGER NOT NULL CHECK (time_spent >= 0),
                    PRIMARY KEY (session_id, question_number),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_candidate_completed
                    ON sessions (candidate_name, status, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
