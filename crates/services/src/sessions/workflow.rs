use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use drill_core::model::{
    IntervalStats, Mode, Responses, Test, TestId, TestResult, TestStatus, is_correct_answer,
    reconcile_intervals,
};
use drill_core::navigation::Position;
use drill_core::scoring::score_attempt;
use storage::live::{LiveSession, LiveSessionStore};
use storage::repository::{ResponseRecord, SessionRecord, SessionRepository, StorageError};

use super::requests::{SaveAck, SaveProgressRequest, SubmitRequest};
use crate::Clock;
use crate::error::AttemptError;

/// The two calls a running attempt makes to the backend.
///
/// `AttemptService` is the in-process implementation; the client driver only
/// sees this trait so a failing transport can stand in for it.
#[async_trait]
pub trait AttemptGateway: Send + Sync {
    /// # Errors
    ///
    /// Returns `AttemptError` if the snapshot could not be stored.
    async fn save_progress(&self, request: SaveProgressRequest) -> Result<SaveAck, AttemptError>;

    /// # Errors
    ///
    /// Returns `AttemptError` if the attempt could not be scored and persisted.
    async fn submit(&self, request: SubmitRequest) -> Result<TestResult, AttemptError>;
}

type AttemptLocks = Arc<Mutex<HashMap<TestId, Arc<AsyncMutex<()>>>>>;

/// Server-side handling of autosave, submission and history.
///
/// Writes to one attempt are serialized: a save and a submit for the same
/// test never interleave their read and write of the live entry.
#[derive(Clone)]
pub struct AttemptService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    live: Arc<dyn LiveSessionStore>,
    locks: AttemptLocks,
}

impl AttemptService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        live: Arc<dyn LiveSessionStore>,
    ) -> Self {
        Self {
            clock,
            sessions,
            live,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Overwrite the working snapshot of a live attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotFound` for an unknown or expired test,
    /// `AttemptError::AlreadySubmitted` once it has been scored, and
    /// `AttemptError::InvalidPosition` if the cursor is outside the test.
    pub async fn save_progress(
        &self,
        request: SaveProgressRequest,
    ) -> Result<SaveAck, AttemptError> {
        let lock = self.attempt_lock(request.test_id)?;
        let _guard = lock.lock().await;
        let mut live = self.load(request.test_id).await?;
        if live.result.is_some() {
            return Err(AttemptError::AlreadySubmitted(request.test_id));
        }

        let position = request.position();
        if !position_exists(&live.test, position) {
            return Err(AttemptError::InvalidPosition {
                section: position.section_index,
                question: position.question_index,
            });
        }

        let saved_at = self.clock.now();
        live.responses = request.responses;
        live.position = position;
        live.saved_at = Some(saved_at);
        live.test.set_status(TestStatus::InProgress);
        self.live.put(live).await?;

        tracing::debug!(test_id = %request.test_id, "progress saved");
        Ok(SaveAck {
            success: true,
            saved_at,
        })
    }

    /// Score an attempt and persist it as completed.
    ///
    /// A resubmission of an already scored attempt replays the stored result
    /// through the same idempotent write, so retries converge.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotFound` for an unknown or expired test and
    /// `AttemptError::Storage` if the completing transaction fails. In that
    /// case the session stays `in_progress`.
    pub async fn submit(&self, request: SubmitRequest) -> Result<TestResult, AttemptError> {
        let SubmitRequest {
            test_id,
            responses,
            time_taken,
            intervals,
        } = request;
        let lock = self.attempt_lock(test_id)?;
        let _guard = lock.lock().await;
        let mut live = self.load(test_id).await?;

        let result = match live.result.clone() {
            Some(previous) => previous,
            None => {
                let result = self.score(&live.test, &responses, time_taken, intervals);
                live.responses = responses;
                result
            }
        };
        let records = response_records(&live.test, &live.responses);

        if let Err(e) = self
            .sessions
            .complete_session(live.session_id, &result, &records)
            .await
        {
            tracing::warn!(test_id = %test_id, error = %e, "submission not persisted");
            return Err(e.into());
        }

        live.test.set_status(TestStatus::Completed);
        live.result = Some(result.clone());
        self.live.put(live).await?;

        tracing::info!(
            test_id = %test_id,
            score = result.score,
            attempted = result.attempted,
            correct = result.correct,
            "submission persisted"
        );
        Ok(result)
    }

    /// Last autosaved state of a live attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotFound` for an unknown or expired test.
    pub async fn live_snapshot(&self, test_id: TestId) -> Result<LiveSession, AttemptError> {
        self.load(test_id).await
    }

    /// Completed sessions of one named candidate, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` on repository failures.
    pub async fn history(
        &self,
        candidate: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, AttemptError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .sessions
            .list_sessions_for_candidate(candidate, limit)
            .await?)
    }

    /// Drop idle live attempts.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::Storage` on store failures.
    pub async fn evict_expired(&self) -> Result<usize, AttemptError> {
        let evicted = self.live.evict_expired().await?;
        // nobody is waiting on a lock held only by the map
        if let Ok(mut locks) = self.locks.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(evicted)
    }

    fn attempt_lock(&self, test_id: TestId) -> Result<Arc<AsyncMutex<()>>, AttemptError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| AttemptError::Storage(StorageError::Connection(e.to_string())))?;
        Ok(Arc::clone(locks.entry(test_id).or_default()))
    }

    async fn load(&self, test_id: TestId) -> Result<LiveSession, AttemptError> {
        self.live.get(test_id).await.map_err(|e| match e {
            StorageError::NotFound => AttemptError::NotFound(test_id),
            other => AttemptError::Storage(other),
        })
    }

    fn score(
        &self,
        test: &Test,
        responses: &Responses,
        time_taken: u32,
        intervals: Option<Vec<IntervalStats>>,
    ) -> TestResult {
        let time_taken = test
            .time_limit()
            .map_or(time_taken, |limit| time_taken.min(limit));
        let mut result = score_attempt(test, responses, time_taken, Vec::new(), self.clock.now());
        if test.mode() == Mode::Practice {
            result.intervals =
                reconcile_intervals(intervals.unwrap_or_default(), time_taken, result.totals());
        }
        result
    }
}

#[async_trait]
impl AttemptGateway for AttemptService {
    async fn save_progress(&self, request: SaveProgressRequest) -> Result<SaveAck, AttemptError> {
        AttemptService::save_progress(self, request).await
    }

    async fn submit(&self, request: SubmitRequest) -> Result<TestResult, AttemptError> {
        AttemptService::submit(self, request).await
    }
}

fn position_exists(test: &Test, position: Position) -> bool {
    test.sections()
        .get(position.section_index)
        .is_some_and(|s| position.question_index < s.question_count())
}

/// One row per question of the test, answered or not.
///
/// `is_correct` is recomputed from the raw answer, never copied from the
/// client's eager flag.
#[must_use]
pub fn response_records(test: &Test, responses: &Responses) -> Vec<ResponseRecord> {
    test.questions()
        .map(|question| {
            let response = responses.get(&question.id());
            let answer = response
                .and_then(|r| r.user_answer.clone())
                .filter(|a| !a.is_empty());
            ResponseRecord {
                question_number: question.question_number(),
                expression: question.expression().to_owned(),
                correct_answer: question.correct_answer(),
                is_correct: answer
                    .as_deref()
                    .is_some_and(|a| is_correct_answer(a, question.correct_answer())),
                answered_at: answer.as_ref().and(response.map(|r| r.answered_at)),
                user_answer: answer,
                time_spent: response.map_or(0, |r| r.time_spent),
            }
        })
        .collect()
}
