use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drill_core::model::{
    Mode, QuestionSet, QuestionSetId, SessionId, TestId, TestResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::live::{InMemoryLiveStore, LiveSessionStore};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ──────────────────────────────────────────────────────────────────
//

/// Lifecycle of a persisted session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// Input for `SessionRepository::create_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub test_id: TestId,
    pub question_set_id: QuestionSetId,
    pub mode: Mode,
    pub candidate: Option<String>,
    pub total_questions: u32,
    pub started_at: DateTime<Utc>,
}

/// Persisted session row. `result` is present once the session is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub test_id: TestId,
    pub question_set_id: QuestionSetId,
    pub mode: Mode,
    pub candidate: Option<String>,
    pub status: SessionStatus,
    pub total_questions: u32,
    pub started_at: DateTime<Utc>,
    pub result: Option<TestResult>,
}

/// One per-question row of a completed session, with the question's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub question_number: u32,
    pub expression: String,
    pub correct_answer: i64,
    pub user_answer: Option<String>,
    pub is_correct: bool,
    pub answered_at: Option<DateTime<Utc>>,
    pub time_spent: u32,
}

/// Catalogue entry for a question set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSetSummary {
    pub id: QuestionSetId,
    pub name: String,
    pub question_count: u32,
}

impl QuestionSetSummary {
    #[must_use]
    pub fn from_set(set: &QuestionSet) -> Self {
        Self {
            id: set.id(),
            name: set.name().to_owned(),
            question_count: u32::try_from(set.len()).unwrap_or(u32::MAX),
        }
    }
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// Source of authored question sets.
#[async_trait]
pub trait QuestionSetRepository: Send + Sync {
    /// Persist or replace a question set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the set cannot be stored.
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError>;

    /// Fetch a question set by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_question_set(&self, id: QuestionSetId) -> Result<QuestionSet, StorageError>;

    /// List catalogue entries ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_question_sets(&self, limit: u32) -> Result<Vec<QuestionSetSummary>, StorageError>;
}

/// Durable record of attempts and their per-question responses.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session in state `in_progress`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a session for the same test already exists.
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError>;

    /// Mark the session completed with `result` and upsert one row per question,
    /// keyed by `(session_id, question_number)`, all in one transaction.
    ///
    /// Calling this again with the same arguments converges to the same state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session. On any error
    /// neither the session row nor the responses are changed.
    async fn complete_session(
        &self,
        id: SessionId,
        result: &TestResult,
        responses: &[ResponseRecord],
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError>;

    /// Completed sessions for a named candidate, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions_for_candidate(
        &self,
        candidate: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// Response rows ordered by question number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn responses_for_session(&self, id: SessionId) -> Result<Vec<ResponseRecord>, StorageError>;
}

//
// ─── IN-MEMORY ────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct SessionTables {
    next_id: u64,
    sessions: HashMap<SessionId, SessionRecord>,
    responses: HashMap<SessionId, BTreeMap<u32, ResponseRecord>>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    question_sets: Arc<Mutex<BTreeMap<QuestionSetId, QuestionSet>>>,
    sessions: Arc<Mutex<SessionTables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionSetRepository for InMemoryRepository {
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError> {
        let mut guard = self.question_sets.lock().map_err(poisoned)?;
        guard.insert(set.id(), set.clone());
        Ok(())
    }

    async fn get_question_set(&self, id: QuestionSetId) -> Result<QuestionSet, StorageError> {
        let guard = self.question_sets.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_question_sets(&self, limit: u32) -> Result<Vec<QuestionSetSummary>, StorageError> {
        let guard = self.question_sets.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .values()
            .take(limit)
            .map(QuestionSetSummary::from_set)
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        let mut tables = self.sessions.lock().map_err(poisoned)?;
        if tables
            .sessions
            .values()
            .any(|s| s.test_id == session.test_id)
        {
            return Err(StorageError::Conflict);
        }
        tables.next_id += 1;
        let id = SessionId::new(tables.next_id);
        tables.sessions.insert(
            id,
            SessionRecord {
                id,
                test_id: session.test_id,
                question_set_id: session.question_set_id,
                mode: session.mode,
                candidate: session.candidate,
                status: SessionStatus::InProgress,
                total_questions: session.total_questions,
                started_at: session.started_at,
                result: None,
            },
        );
        Ok(id)
    }

    async fn complete_session(
        &self,
        id: SessionId,
        result: &TestResult,
        responses: &[ResponseRecord],
    ) -> Result<(), StorageError> {
        // single lock = single transaction
        let mut tables = self.sessions.lock().map_err(poisoned)?;
        let record = tables.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        record.status = SessionStatus::Completed;
        record.result = Some(result.clone());

        let rows = tables.responses.entry(id).or_default();
        for response in responses {
            rows.insert(response.question_number, response.clone());
        }
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let tables = self.sessions.lock().map_err(poisoned)?;
        tables.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_sessions_for_candidate(
        &self,
        candidate: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let tables = self.sessions.lock().map_err(poisoned)?;
        let mut out: Vec<SessionRecord> = tables
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Completed)
            .filter(|s| s.candidate.as_deref() == Some(candidate))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            let a_at = a.result.as_ref().map(|r| r.completed_at);
            let b_at = b.result.as_ref().map(|r| r.completed_at);
            b_at.cmp(&a_at).then(b.id.cmp(&a.id))
        });
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }

    async fn responses_for_session(&self, id: SessionId) -> Result<Vec<ResponseRecord>, StorageError> {
        let tables = self.sessions.lock().map_err(poisoned)?;
        Ok(tables
            .responses
            .get(&id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub question_sets: Arc<dyn QuestionSetRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub live: Arc<dyn LiveSessionStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(live: InMemoryLiveStore) -> Self {
        let repo = InMemoryRepository::new();
        let question_sets: Arc<dyn QuestionSetRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo);
        Self {
            question_sets,
            sessions,
            live: Arc::new(live),
        }
    }
}
