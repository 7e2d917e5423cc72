use drill_core::model::{
    IntervalStats, Mode, QuestionItem, QuestionSet, QuestionSetId, SectionId, SectionResult,
    SessionId, TestId, TestResult, Totals,
};
use drill_core::time::fixed_now;
use storage::repository::{
    NewSession, QuestionSetRepository, ResponseRecord, SessionRepository, SessionStatus,
    StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn sheet(id: u64, len: u32) -> QuestionSet {
    let items = (1..=len)
        .map(|n| QuestionItem::new(format!("{n}+{n}"), i64::from(n * 2)))
        .collect();
    QuestionSet::new(QuestionSetId::new(id), format!("Sheet {id}"), items).unwrap()
}

fn new_session(test_id: TestId, candidate: Option<&str>, total: u32) -> NewSession {
    NewSession {
        test_id,
        question_set_id: QuestionSetId::new(1),
        mode: Mode::Practice,
        candidate: candidate.map(str::to_owned),
        total_questions: total,
        started_at: fixed_now(),
    }
}

fn result(test_id: TestId, total: u32) -> TestResult {
    TestResult {
        test_id,
        total_questions: total,
        attempted: 2,
        correct: 1,
        incorrect: 1,
        unanswered: total - 2,
        score: 100.0 / f64::from(total),
        time_taken: 500,
        section_results: vec![SectionResult {
            section_id: SectionId::new(1),
            section_name: "Sheet 1".into(),
            total_questions: total,
            attempted: 2,
            correct: 1,
            incorrect: 1,
            accuracy: 50.0,
        }],
        intervals: vec![
            IntervalStats::from_delta(
                1,
                0,
                420,
                Totals {
                    attempted: 1,
                    correct: 1,
                    incorrect: 0,
                },
            ),
            IntervalStats::from_delta(
                2,
                420,
                500,
                Totals {
                    attempted: 1,
                    correct: 0,
                    incorrect: 1,
                },
            ),
        ],
        completed_at: fixed_now(),
    }
}

fn rows(total: u32) -> Vec<ResponseRecord> {
    (1..=total)
        .map(|n| ResponseRecord {
            question_number: n,
            expression: format!("{n}+{n}"),
            correct_answer: i64::from(n * 2),
            user_answer: match n {
                1 => Some("2".into()),
                2 => Some("5".into()),
                _ => None,
            },
            is_correct: n == 1,
            answered_at: (n <= 2).then(fixed_now),
            time_spent: n,
        })
        .collect()
}

#[tokio::test]
async fn sqlite_question_sets_keep_order_and_replace_items() {
    let repo = connect("memdb_question_sets").await;

    repo.upsert_question_set(&sheet(1, 5)).await.unwrap();
    let fetched = repo.get_question_set(QuestionSetId::new(1)).await.unwrap();
    assert_eq!(fetched, sheet(1, 5));

    repo.upsert_question_set(&sheet(1, 3)).await.unwrap();
    let fetched = repo.get_question_set(QuestionSetId::new(1)).await.unwrap();
    assert_eq!(fetched.len(), 3);

    let listed = repo.list_question_sets(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].question_count, 3);

    assert!(matches!(
        repo.get_question_set(QuestionSetId::new(42)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_complete_session_is_idempotent() {
    let repo = connect("memdb_complete_idempotent").await;
    let test_id = TestId::generate();
    let id = repo
        .create_session(new_session(test_id, Some("ana"), 6))
        .await
        .unwrap();

    let in_progress = repo.get_session(id).await.unwrap();
    assert_eq!(in_progress.status, SessionStatus::InProgress);
    assert!(in_progress.result.is_none());

    repo.complete_session(id, &result(test_id, 6), &rows(6)).await.unwrap();
    repo.complete_session(id, &result(test_id, 6), &rows(6)).await.unwrap();

    let responses = repo.responses_for_session(id).await.unwrap();
    assert_eq!(responses.len(), 6);
    assert_eq!(responses, rows(6));

    let record = repo.get_session(id).await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.result, Some(result(test_id, 6)));
}

#[tokio::test]
async fn sqlite_complete_unknown_session_writes_nothing() {
    let repo = connect("memdb_complete_unknown").await;
    let err = repo
        .complete_session(SessionId::new(77), &result(TestId::generate(), 3), &rows(3))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert!(repo
        .responses_for_session(SessionId::new(77))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn sqlite_failed_response_row_rolls_back_the_completion() {
    let repo = connect("memdb_complete_rollback").await;
    let test_id = TestId::generate();
    let id = repo
        .create_session(new_session(test_id, Some("ana"), 3))
        .await
        .unwrap();

    // the status update succeeds before the second row trips the CHECK constraint
    let mut bad_rows = rows(3);
    bad_rows[1].question_number = 0;
    assert!(repo
        .complete_session(id, &result(test_id, 3), &bad_rows)
        .await
        .is_err());

    let record = repo.get_session(id).await.unwrap();
    assert_eq!(record.status, SessionStatus::InProgress);
    assert!(record.result.is_none());
    assert!(repo.responses_for_session(id).await.unwrap().is_empty());

    repo.complete_session(id, &result(test_id, 3), &rows(3)).await.unwrap();
    assert_eq!(repo.get_session(id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn sqlite_duplicate_test_id_conflicts() {
    let repo = connect("memdb_duplicate_test").await;
    let test_id = TestId::generate();
    repo.create_session(new_session(test_id, None, 3)).await.unwrap();
    assert!(matches!(
        repo.create_session(new_session(test_id, None, 3)).await,
        Err(StorageError::Conflict)
    ));
}

#[tokio::test]
async fn sqlite_history_is_per_candidate_and_completed_only() {
    let repo = connect("memdb_history").await;

    let done = TestId::generate();
    let done_id = repo.create_session(new_session(done, Some("ana"), 3)).await.unwrap();
    repo.complete_session(done_id, &result(done, 3), &rows(3)).await.unwrap();

    repo.create_session(new_session(TestId::generate(), Some("ana"), 3))
        .await
        .unwrap();

    let other = TestId::generate();
    let other_id = repo.create_session(new_session(other, Some("ben"), 3)).await.unwrap();
    repo.complete_session(other_id, &result(other, 3), &rows(3)).await.unwrap();

    let history = repo.list_sessions_for_candidate("ana", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, done_id);
    assert_eq!(history[0].candidate.as_deref(), Some("ana"));
}
