//! Working set of attempts that are still being answered.
//!
//! Live sessions are addressed by `TestId` and expire after a period without
//! writes. Nothing here is the record of truth; completed attempts live in
//! `SessionRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use drill_core::Clock;
use drill_core::model::{Responses, SessionId, Test, TestId, TestResult};
use drill_core::navigation::Position;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::repository::StorageError;

/// Snapshot of one in-flight attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSession {
    pub test: Test,
    pub session_id: SessionId,
    pub candidate: Option<String>,
    pub responses: Responses,
    pub position: Position,
    pub started_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
    /// Set once the attempt has been scored; replayed on resubmission.
    pub result: Option<TestResult>,
}

impl LiveSession {
    #[must_use]
    pub fn new(
        test: Test,
        session_id: SessionId,
        candidate: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            test,
            session_id,
            candidate,
            responses: Responses::new(),
            position: Position::default(),
            started_at,
            saved_at: None,
            result: None,
        }
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test.id()
    }
}

#[async_trait]
pub trait LiveSessionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is unknown or expired.
    async fn get(&self, id: TestId) -> Result<LiveSession, StorageError>;

    /// Insert or overwrite; last write wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn put(&self, session: LiveSession) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures. Deleting a missing id is not an error.
    async fn delete(&self, id: TestId) -> Result<(), StorageError>;

    /// Drop every entry idle for longer than the TTL. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn evict_expired(&self) -> Result<usize, StorageError>;
}

/// Process-local live store with idle-time eviction.
#[derive(Clone)]
pub struct InMemoryLiveStore {
    clock: Clock,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<TestId, (LiveSession, DateTime<Utc>)>>>,
}

impl InMemoryLiveStore {
    #[must_use]
    pub fn new(clock: Clock, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn is_expired(&self, touched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - touched_at > self.ttl
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl LiveSessionStore for InMemoryLiveStore {
    async fn get(&self, id: TestId) -> Result<LiveSession, StorageError> {
        let now = self.clock.now();
        let mut guard = self.entries.lock().map_err(poisoned)?;
        match guard.get(&id) {
            Some((_, touched_at)) if self.is_expired(*touched_at, now) => {
                guard.remove(&id);
                tracing::debug!(test_id = %id, "live session expired");
                Err(StorageError::NotFound)
            }
            Some((session, _)) => Ok(session.clone()),
            None => Err(StorageError::NotFound),
        }
    }

    async fn put(&self, session: LiveSession) -> Result<(), StorageError> {
        let now = self.clock.now();
        let mut guard = self.entries.lock().map_err(poisoned)?;
        guard.insert(session.test_id(), (session, now));
        Ok(())
    }

    async fn delete(&self, id: TestId) -> Result<(), StorageError> {
        let mut guard = self.entries.lock().map_err(poisoned)?;
        guard.remove(&id);
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize, StorageError> {
        let now = self.clock.now();
        let mut guard = self.entries.lock().map_err(poisoned)?;
        let before = guard.len();
        guard.retain(|_, (_, touched_at)| !self.is_expired(*touched_at, now));
        let evicted = before - guard.len();
        if evicted > 0 {
            tracing::info!(evicted, "evicted idle live sessions");
        }
        Ok(evicted)
    }
}
