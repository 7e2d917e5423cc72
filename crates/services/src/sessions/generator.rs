use std::sync::Arc;

use drill_core::model::{
    Mode, Question, QuestionId, QuestionSet, Section, SectionId, Test, TestError, TestId,
};
use storage::live::{LiveSession, LiveSessionStore};
use storage::repository::{NewSession, QuestionSetRepository, SessionRepository, StorageError};

use super::requests::GenerateRequest;
use crate::Clock;
use crate::error::GenerateError;

/// Section kind used for sheets turned into tests.
pub const MENTAL_MATH_SECTION: &str = "mental_math";

/// Turns a stored question set into a live attempt.
#[derive(Clone)]
pub struct SessionGenerator {
    clock: Clock,
    question_sets: Arc<dyn QuestionSetRepository>,
    sessions: Arc<dyn SessionRepository>,
    live: Arc<dyn LiveSessionStore>,
}

impl SessionGenerator {
    #[must_use]
    pub fn new(
        clock: Clock,
        question_sets: Arc<dyn QuestionSetRepository>,
        sessions: Arc<dyn SessionRepository>,
        live: Arc<dyn LiveSessionStore>,
    ) -> Self {
        Self {
            clock,
            question_sets,
            sessions,
            live,
        }
    }

    /// Build a fresh `Test` from the requested set and register it.
    ///
    /// The attempt gets an `in_progress` session row and an empty live
    /// snapshot. The question set itself is never touched.
    ///
    /// # Errors
    ///
    /// Returns `GenerateError::QuestionSetNotFound` for an unknown set; no
    /// test is created in that case. Storage failures surface as
    /// `GenerateError::Storage`.
    pub async fn generate(&self, request: GenerateRequest) -> Result<Test, GenerateError> {
        let set = self
            .question_sets
            .get_question_set(request.question_set_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => GenerateError::QuestionSetNotFound(request.question_set_id),
                other => GenerateError::Storage(other),
            })?;

        let test = build_test(TestId::generate(), &set, request.mode)?;
        let candidate = request
            .candidate
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty());
        let now = self.clock.now();

        let session_id = self
            .sessions
            .create_session(NewSession {
                test_id: test.id(),
                question_set_id: set.id(),
                mode: request.mode,
                candidate: candidate.clone(),
                total_questions: test.total_questions(),
                started_at: now,
            })
            .await?;

        self.live
            .put(LiveSession::new(test.clone(), session_id, candidate, now))
            .await?;

        tracing::info!(
            test_id = %test.id(),
            session_id = %session_id,
            question_set_id = %set.id(),
            mode = request.mode.as_str(),
            questions = test.total_questions(),
            "test generated"
        );
        Ok(test)
    }
}

/// One section holding every item of the set, numbered from 1 in source order.
///
/// # Errors
///
/// Returns `TestError` only if the set violates its own invariants.
pub fn build_test(id: TestId, set: &QuestionSet, mode: Mode) -> Result<Test, TestError> {
    let section_id = SectionId::new(1);
    let questions = set
        .items()
        .iter()
        .zip(1_u32..)
        .map(|(item, number)| {
            Question::new(
                QuestionId::new(u64::from(number)),
                section_id,
                number,
                item.expression.clone(),
                item.correct_answer,
            )
        })
        .collect();
    let section = Section::new(section_id, set.name(), MENTAL_MATH_SECTION, questions);
    Test::new(id, set.name(), mode, set.id(), vec![section])
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::model::{QuestionItem, QuestionSetId, TEST_TIME_LIMIT_SECS, TestStatus};
    use drill_core::time::fixed_now;
    use storage::live::InMemoryLiveStore;
    use storage::repository::{InMemoryRepository, SessionStatus};

    fn sheet() -> QuestionSet {
        QuestionSet::new(
            QuestionSetId::new(9),
            "Sheet 9",
            vec![
                QuestionItem::new("1 + 1", 2),
                QuestionItem::new("6 ÷ 3", 2),
                QuestionItem::new("4 × 5", 20),
            ],
        )
        .unwrap()
    }

    async fn generator() -> (SessionGenerator, InMemoryRepository, InMemoryLiveStore) {
        let repo = InMemoryRepository::new();
        repo.upsert_question_set(&sheet()).await.unwrap();
        let live = InMemoryLiveStore::new(Clock::fixed(fixed_now()), chrono::Duration::hours(4));
        let generator = SessionGenerator::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(live.clone()),
        );
        (generator, repo, live)
    }

    #[test]
    fn build_test_numbers_questions_in_source_order() {
        let test = build_test(TestId::generate(), &sheet(), Mode::Practice).unwrap();
        assert_eq!(test.sections().len(), 1);
        assert_eq!(test.sections()[0].kind(), MENTAL_MATH_SECTION);
        let numbers: Vec<u32> = test.questions().map(Question::question_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let expressions: Vec<&str> = test.questions().map(Question::expression).collect();
        assert_eq!(expressions, vec!["1 + 1", "6 ÷ 3", "4 × 5"]);
        assert_eq!(test.time_limit(), None);
        assert_eq!(test.status(), TestStatus::NotStarted);
    }

    #[tokio::test]
    async fn generate_registers_session_and_live_snapshot() {
        let (generator, repo, live) = generator().await;
        let test = generator
            .generate(GenerateRequest {
                mode: Mode::Test,
                question_set_id: QuestionSetId::new(9),
                candidate: Some("  ana ".into()),
            })
            .await
            .unwrap();

        assert_eq!(test.time_limit(), Some(TEST_TIME_LIMIT_SECS));
        assert_eq!(test.total_questions(), 3);

        let snapshot = live.get(test.id()).await.unwrap();
        assert!(snapshot.responses.is_empty());
        assert_eq!(snapshot.candidate.as_deref(), Some("ana"));

        let record = repo.get_session(snapshot.session_id).await.unwrap();
        assert_eq!(record.status, SessionStatus::InProgress);
        assert_eq!(record.test_id, test.id());
        assert_eq!(record.total_questions, 3);
    }

    #[tokio::test]
    async fn blank_candidate_is_anonymous() {
        let (generator, _repo, live) = generator().await;
        let test = generator
            .generate(GenerateRequest {
                mode: Mode::Practice,
                question_set_id: QuestionSetId::new(9),
                candidate: Some("   ".into()),
            })
            .await
            .unwrap();
        assert_eq!(live.get(test.id()).await.unwrap().candidate, None);
    }

    #[tokio::test]
    async fn unknown_question_set_creates_nothing() {
        let (generator, repo, _live) = generator().await;
        let err = generator
            .generate(GenerateRequest {
                mode: Mode::Practice,
                question_set_id: QuestionSetId::new(404),
                candidate: Some("ana".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::QuestionSetNotFound(id) if id == QuestionSetId::new(404)));
        assert!(repo.list_sessions_for_candidate("ana", 10).await.unwrap().is_empty());
    }
}
