use std::sync::Arc;

use async_trait::async_trait;
use drill_core::model::{
    IntervalStats, Mode, QuestionId, QuestionItem, QuestionSet, QuestionSetId, Response,
    Responses, SessionId, Test, TestId, TestResult, Totals, intervals_tile,
};
use drill_core::navigation::Action;
use drill_core::time::fixed_now;
use services::{
    AttemptDriver, AttemptError, AttemptService, Clock, GenerateRequest, SaveProgressRequest,
    SessionGenerator, SubmitRequest, TimerConfig,
};
use storage::live::{InMemoryLiveStore, LiveSession, LiveSessionStore};
use storage::repository::{
    InMemoryRepository, NewSession, QuestionSetRepository, ResponseRecord, SessionRecord,
    SessionRepository, SessionStatus, StorageError,
};

fn sheet(len: u32) -> QuestionSet {
    let items = (1..=len)
        .map(|n| QuestionItem::new(format!("{n} + {n}"), i64::from(n * 2)))
        .collect();
    QuestionSet::new(QuestionSetId::new(1), "Sheet 1", items).unwrap()
}

struct Harness {
    repo: InMemoryRepository,
    generator: SessionGenerator,
    attempts: AttemptService,
}

async fn harness(len: u32) -> Harness {
    let clock = Clock::fixed(fixed_now());
    let repo = InMemoryRepository::new();
    repo.upsert_question_set(&sheet(len)).await.unwrap();
    let live = Arc::new(InMemoryLiveStore::new(clock, chrono::Duration::hours(4)));
    Harness {
        generator: SessionGenerator::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            live.clone(),
        ),
        attempts: AttemptService::new(clock, Arc::new(repo.clone()), live),
        repo,
    }
}

async fn generate(h: &Harness, mode: Mode) -> Test {
    h.generator
        .generate(GenerateRequest {
            mode,
            question_set_id: QuestionSetId::new(1),
            candidate: Some("ana".into()),
        })
        .await
        .unwrap()
}

/// Answers `1..=correct` right and the next `incorrect` wrong.
fn responses(correct: u32, incorrect: u32) -> Responses {
    let mut out = Responses::new();
    for n in 1..=correct + incorrect {
        let expected = i64::from(n * 2);
        let answer = if n <= correct { expected } else { expected + 1 };
        out.insert(
            QuestionId::new(u64::from(n)),
            Response::record(&answer.to_string(), expected, fixed_now(), 4),
        );
    }
    out
}

#[tokio::test]
async fn sixty_six_question_sheet_scores_against_total() {
    let h = harness(66).await;
    let test = generate(&h, Mode::Test).await;

    let result = h
        .attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: responses(50, 10),
            time_taken: 1800,
            intervals: None,
        })
        .await
        .unwrap();

    assert_eq!(result.correct, 50);
    assert_eq!(result.incorrect, 10);
    assert_eq!(result.unanswered, 6);
    assert!((result.score - 100.0 * 50.0 / 66.0).abs() < 1e-9);
    assert!(result.intervals.is_empty());

    let live = h.attempts.live_snapshot(test.id()).await.unwrap();
    let record = h.repo.get_session(live.session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    let rows = h.repo.responses_for_session(live.session_id).await.unwrap();
    assert_eq!(rows.len(), 66);
    assert_eq!(rows.iter().filter(|r| r.is_correct).count(), 50);
}

#[tokio::test]
async fn timed_submission_clamps_time_to_the_limit() {
    let h = harness(3).await;
    let test = generate(&h, Mode::Test).await;
    let result = h
        .attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: Responses::new(),
            time_taken: 4000,
            intervals: None,
        })
        .await
        .unwrap();
    assert_eq!(result.time_taken, 3600);
    assert_eq!(result.score, 0.0);
}

#[tokio::test]
async fn forged_correctness_flags_are_ignored() {
    let h = harness(4).await;
    let test = generate(&h, Mode::Practice).await;

    let mut forged = Responses::new();
    forged.insert(
        QuestionId::new(1),
        Response {
            user_answer: Some("999".into()),
            is_correct: Some(true),
            answered_at: fixed_now(),
            time_spent: 1,
        },
    );
    let result = h
        .attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: forged,
            time_taken: 30,
            intervals: None,
        })
        .await
        .unwrap();
    assert_eq!(result.attempted, 1);
    assert_eq!(result.correct, 0);
}

#[tokio::test]
async fn practice_submission_reconciles_client_intervals() {
    let h = harness(10).await;
    let test = generate(&h, Mode::Practice).await;

    let first = IntervalStats::from_delta(
        1,
        0,
        420,
        Totals {
            attempted: 6,
            correct: 6,
            incorrect: 0,
        },
    );
    let result = h
        .attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: responses(10, 0),
            time_taken: 500,
            intervals: Some(vec![first.clone()]),
        })
        .await
        .unwrap();

    assert_eq!(result.score, 100.0);
    assert_eq!(result.intervals.len(), 2);
    assert_eq!(result.intervals[0], first);
    assert_eq!(result.intervals[1].start_time, 420);
    assert_eq!(result.intervals[1].questions_attempted, 4);
    assert!(intervals_tile(&result.intervals, 500));
}

#[tokio::test]
async fn resubmission_converges_on_the_first_result() {
    let h = harness(5).await;
    let test = generate(&h, Mode::Practice).await;
    let request = SubmitRequest {
        test_id: test.id(),
        responses: responses(2, 1),
        time_taken: 90,
        intervals: None,
    };

    let first = h.attempts.submit(request.clone()).await.unwrap();
    let second = h.attempts.submit(request).await.unwrap();
    assert_eq!(first, second);

    let live = h.attempts.live_snapshot(test.id()).await.unwrap();
    let rows = h.repo.responses_for_session(live.session_id).await.unwrap();
    assert_eq!(rows.len(), 5);
}

/// Live store whose unscored writes land late, like an autosave still in flight.
struct LaggingLiveStore(InMemoryLiveStore);

#[async_trait]
impl LiveSessionStore for LaggingLiveStore {
    async fn get(&self, id: TestId) -> Result<LiveSession, StorageError> {
        self.0.get(id).await
    }

    async fn put(&self, session: LiveSession) -> Result<(), StorageError> {
        if session.result.is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        self.0.put(session).await
    }

    async fn delete(&self, id: TestId) -> Result<(), StorageError> {
        self.0.delete(id).await
    }

    async fn evict_expired(&self) -> Result<usize, StorageError> {
        self.0.evict_expired().await
    }
}

#[tokio::test]
async fn overlapping_autosave_cannot_undo_a_submission() {
    let clock = Clock::fixed(fixed_now());
    let repo = InMemoryRepository::new();
    repo.upsert_question_set(&sheet(5)).await.unwrap();
    let live = Arc::new(LaggingLiveStore(InMemoryLiveStore::new(
        clock,
        chrono::Duration::hours(4),
    )));
    let generator =
        SessionGenerator::new(clock, Arc::new(repo.clone()), Arc::new(repo.clone()), live.clone());
    let attempts = AttemptService::new(clock, Arc::new(repo.clone()), live);
    let test = generator
        .generate(GenerateRequest {
            mode: Mode::Test,
            question_set_id: QuestionSetId::new(1),
            candidate: Some("ana".into()),
        })
        .await
        .unwrap();

    let save = attempts.save_progress(SaveProgressRequest {
        test_id: test.id(),
        responses: responses(2, 0),
        current_section_index: 0,
        current_question_index: 2,
    });
    let submit = attempts.submit(SubmitRequest {
        test_id: test.id(),
        responses: responses(5, 0),
        time_taken: 300,
        intervals: None,
    });
    let (saved, first) = tokio::join!(save, submit);
    assert!(saved.is_ok() || matches!(saved, Err(AttemptError::AlreadySubmitted(_))));
    let first = first.unwrap();
    assert_eq!(first.score, 100.0);

    let snapshot = attempts.live_snapshot(test.id()).await.unwrap();
    assert_eq!(snapshot.result.as_ref(), Some(&first));

    let retry = attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: responses(4, 1),
            time_taken: 310,
            intervals: None,
        })
        .await
        .unwrap();
    assert_eq!(retry, first);
    let record = repo.get_session(snapshot.session_id).await.unwrap();
    assert_eq!(record.result.map(|r| r.score), Some(100.0));
}

#[tokio::test]
async fn save_progress_overwrites_the_snapshot() {
    let h = harness(5).await;
    let test = generate(&h, Mode::Practice).await;

    for answered in [1, 3] {
        let ack = h
            .attempts
            .save_progress(SaveProgressRequest {
                test_id: test.id(),
                responses: responses(answered, 0),
                current_section_index: 0,
                current_question_index: usize::try_from(answered).unwrap(),
            })
            .await
            .unwrap();
        assert!(ack.success);
        assert_eq!(ack.saved_at, fixed_now());
    }

    let live = h.attempts.live_snapshot(test.id()).await.unwrap();
    assert_eq!(live.responses.len(), 3);
    assert_eq!(live.position.question_index, 3);
    assert_eq!(live.saved_at, Some(fixed_now()));
}

#[tokio::test]
async fn save_progress_rejects_bad_positions_and_finished_attempts() {
    let h = harness(2).await;
    let test = generate(&h, Mode::Practice).await;

    let err = h
        .attempts
        .save_progress(SaveProgressRequest {
            test_id: test.id(),
            responses: Responses::new(),
            current_section_index: 1,
            current_question_index: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::InvalidPosition { section: 1, .. }));

    h.attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: Responses::new(),
            time_taken: 5,
            intervals: None,
        })
        .await
        .unwrap();
    let err = h
        .attempts
        .save_progress(SaveProgressRequest {
            test_id: test.id(),
            responses: Responses::new(),
            current_section_index: 0,
            current_question_index: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::AlreadySubmitted(id) if id == test.id()));
}

#[tokio::test]
async fn unknown_test_is_not_found() {
    let h = harness(2).await;
    let unknown = TestId::generate();
    let err = h
        .attempts
        .submit(SubmitRequest {
            test_id: unknown,
            responses: Responses::new(),
            time_taken: 1,
            intervals: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AttemptError::NotFound(id) if id == unknown));
}

#[tokio::test]
async fn history_lists_named_candidates_only() {
    let h = harness(3).await;
    let test = generate(&h, Mode::Practice).await;
    h.attempts
        .submit(SubmitRequest {
            test_id: test.id(),
            responses: responses(3, 0),
            time_taken: 20,
            intervals: None,
        })
        .await
        .unwrap();

    let history = h.attempts.history("ana", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result.as_ref().map(|r| r.score), Some(100.0));
    assert!(h.attempts.history("  ", 10).await.unwrap().is_empty());
}

/// Session store whose completing transaction always fails.
#[derive(Clone)]
struct BrokenCommit(InMemoryRepository);

#[async_trait]
impl SessionRepository for BrokenCommit {
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        self.0.create_session(session).await
    }

    async fn complete_session(
        &self,
        _id: SessionId,
        _result: &TestResult,
        _responses: &[ResponseRecord],
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk I/O error".into()))
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        self.0.get_session(id).await
    }

    async fn list_sessions_for_candidate(
        &self,
        candidate: &str,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        self.0.list_sessions_for_candidate(candidate, limit).await
    }

    async fn responses_for_session(
        &self,
        id: SessionId,
    ) -> Result<Vec<ResponseRecord>, StorageError> {
        self.0.responses_for_session(id).await
    }
}

#[tokio::test]
async fn failed_commit_leaves_session_in_progress_and_driver_scores_locally() {
    let clock = Clock::fixed(fixed_now());
    let repo = InMemoryRepository::new();
    repo.upsert_question_set(&sheet(4)).await.unwrap();
    let broken = Arc::new(BrokenCommit(repo.clone()));
    let live = Arc::new(InMemoryLiveStore::new(clock, chrono::Duration::hours(4)));
    let generator = SessionGenerator::new(clock, Arc::new(repo.clone()), broken.clone(), live.clone());
    let attempts = AttemptService::new(clock, broken, live);

    let test = generator
        .generate(GenerateRequest {
            mode: Mode::Practice,
            question_set_id: QuestionSetId::new(1),
            candidate: None,
        })
        .await
        .unwrap();

    let mut driver = AttemptDriver::start(test.clone(), &TimerConfig::default(), clock).unwrap();
    for n in 1..=3_u64 {
        driver.dispatch(Action::SetResponse {
            question_id: QuestionId::new(n),
            answer: (n * 2).to_string(),
        });
    }
    for _ in 0..60 {
        driver.tick();
    }

    let outcome = driver.finish(&attempts).await;
    assert!(!outcome.persisted);
    assert_eq!(outcome.result.correct, 3);
    assert_eq!(outcome.result.score, 75.0);
    assert_eq!(outcome.result.time_taken, 60);

    let session_id = attempts.live_snapshot(test.id()).await.unwrap().session_id;
    let record = repo.get_session(session_id).await.unwrap();
    assert_eq!(record.status, SessionStatus::InProgress);
    assert!(repo.responses_for_session(session_id).await.unwrap().is_empty());

    // a second finish does not resubmit
    let again = driver.finish(&attempts).await;
    assert_eq!(again, outcome);
}
