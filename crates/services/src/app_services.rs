use std::sync::Arc;

use drill_core::model::QuestionSetId;
use storage::live::InMemoryLiveStore;
use storage::repository::{QuestionSetRepository, QuestionSetSummary, Storage};

use crate::Clock;
use crate::error::AppServicesError;
use crate::expressions::{ExpressionGenerator, ExpressionSpec};
use crate::sessions::{AttemptService, SessionGenerator};

/// Upper bound on catalogue listings.
const CATALOGUE_LIMIT: u32 = 256;

/// Assembles the services the HTTP layer and the binary need.
#[derive(Clone)]
pub struct AppServices {
    generator: Arc<SessionGenerator>,
    attempts: Arc<AttemptService>,
    question_sets: Arc<dyn QuestionSetRepository>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and a process-local live store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        live_ttl: chrono::Duration,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url, InMemoryLiveStore::new(clock, live_ttl)).await?;
        Ok(Self::from_storage(storage, clock))
    }

    #[must_use]
    pub fn in_memory(clock: Clock, live_ttl: chrono::Duration) -> Self {
        Self::from_storage(
            Storage::in_memory(InMemoryLiveStore::new(clock, live_ttl)),
            clock,
        )
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let generator = Arc::new(SessionGenerator::new(
            clock,
            Arc::clone(&storage.question_sets),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.live),
        ));
        let attempts = Arc::new(AttemptService::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.live),
        ));
        Self {
            generator,
            attempts,
            question_sets: storage.question_sets,
        }
    }

    #[must_use]
    pub fn generator(&self) -> Arc<SessionGenerator> {
        Arc::clone(&self.generator)
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptService> {
        Arc::clone(&self.attempts)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` on repository failures.
    pub async fn question_sets(&self) -> Result<Vec<QuestionSetSummary>, AppServicesError> {
        Ok(self.question_sets.list_question_sets(CATALOGUE_LIMIT).await?)
    }

    /// Write `sheets` generated sheets named `Sheet 1..=n`, replacing any
    /// sheet with the same id.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if generation or storage fails.
    pub async fn seed_generated_sets(
        &self,
        sheets: u32,
        questions: usize,
        seed: Option<u64>,
    ) -> Result<Vec<QuestionSetSummary>, AppServicesError> {
        let mut generator = ExpressionGenerator::new(ExpressionSpec::default(), seed)?;
        let mut written = Vec::new();
        for n in 1..=sheets {
            let set =
                generator.question_set(QuestionSetId::new(u64::from(n)), format!("Sheet {n}"), questions)?;
            self.question_sets.upsert_question_set(&set).await?;
            written.push(QuestionSetSummary::from_set(&set));
        }
        tracing::info!(sheets, questions, "seeded question sets");
        Ok(written)
    }

    /// Seed the catalogue only when it is empty.
    ///
    /// Returns true if anything was written.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if listing, generation or storage fails.
    pub async fn ensure_question_sets(
        &self,
        sheets: u32,
        questions: usize,
    ) -> Result<bool, AppServicesError> {
        if !self.question_sets.list_question_sets(1).await?.is_empty() {
            return Ok(false);
        }
        self.seed_generated_sets(sheets, questions, None).await?;
        Ok(true)
    }
}
