use std::sync::Arc;
use std::time::Duration;

use drill_core::model::{Mode, QuestionId, QuestionItem, QuestionSet, QuestionSetId, intervals_tile};
use drill_core::navigation::Action;
use drill_core::time::fixed_now;
use drill_core::timer::TimerEvent;
use services::{
    AppServices, AttemptDriver, AttemptGateway, AttemptRuntime, AutosaveConfig, Clock, Command,
    GenerateRequest, RuntimeEvent, TimerConfig,
};
use storage::live::InMemoryLiveStore;
use storage::repository::{QuestionSetRepository, SessionStatus, Storage};

async fn services_with_sheet(len: u32) -> AppServices {
    let clock = Clock::fixed(fixed_now());
    let storage = Storage::in_memory(InMemoryLiveStore::new(clock, chrono::Duration::hours(4)));
    let items = (1..=len)
        .map(|n| QuestionItem::new(format!("{n} × 1"), i64::from(n)))
        .collect();
    storage
        .question_sets
        .upsert_question_set(&QuestionSet::new(QuestionSetId::new(1), "Sheet 1", items).unwrap())
        .await
        .unwrap();
    AppServices::from_storage(storage, clock)
}

fn answer(n: u64) -> Action {
    Action::SetResponse {
        question_id: QuestionId::new(n),
        answer: n.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn runtime_autosaves_checkpoints_and_submits() {
    let services = services_with_sheet(10).await;
    let test = services
        .generator()
        .generate(GenerateRequest {
            mode: Mode::Practice,
            question_set_id: QuestionSetId::new(1),
            candidate: Some("ana".into()),
        })
        .await
        .unwrap();
    let test_id = test.id();

    let timer = TimerConfig::default();
    let driver = AttemptDriver::start(test, &timer, Clock::fixed(fixed_now())).unwrap();
    let gateway: Arc<dyn AttemptGateway> = services.attempts();
    let mut handle = AttemptRuntime::spawn(driver, gateway, &timer, &AutosaveConfig::default());

    for n in 1..=6 {
        handle.dispatch(answer(n)).await.unwrap();
    }

    // first autosave lands after five seconds
    loop {
        match handle.next_event().await {
            Some(RuntimeEvent::Saved(ack)) => {
                assert!(ack.success);
                break;
            }
            Some(_) => {}
            None => panic!("runtime stopped before autosave"),
        }
    }
    let snapshot = services.attempts().live_snapshot(test_id).await.unwrap();
    assert_eq!(snapshot.responses.len(), 6);

    let checkpoint = loop {
        match handle.next_event().await {
            Some(RuntimeEvent::Timer(TimerEvent::IntervalReached(stats))) => break stats,
            Some(_) => {}
            None => panic!("runtime stopped before checkpoint"),
        }
    };
    assert_eq!((checkpoint.start_time, checkpoint.end_time), (0, 420));
    assert_eq!(checkpoint.questions_attempted, 6);

    handle.send(Command::Resume).await.unwrap();
    for n in 7..=10 {
        handle.dispatch(answer(n)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(80)).await;

    let outcome = handle.finish().await.unwrap();
    assert!(outcome.persisted);
    assert_eq!(outcome.result.score, 100.0);
    assert!(outcome.result.time_taken >= 420);
    assert!(intervals_tile(&outcome.result.intervals, outcome.result.time_taken));
    assert_eq!(outcome.result.intervals[0].questions_attempted, 6);
    let later: u32 = outcome.result.intervals[1..]
        .iter()
        .map(|i| i.questions_attempted)
        .sum();
    assert_eq!(later, 4);

    let history = services.attempts().history("ana", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn timed_runtime_submits_on_time_up() {
    let services = services_with_sheet(3).await;
    let test = services
        .generator()
        .generate(GenerateRequest {
            mode: Mode::Test,
            question_set_id: QuestionSetId::new(1),
            candidate: None,
        })
        .await
        .unwrap();

    let timer = TimerConfig::default();
    let driver = AttemptDriver::start(test, &timer, Clock::fixed(fixed_now())).unwrap();
    let gateway: Arc<dyn AttemptGateway> = services.attempts();
    let mut handle = AttemptRuntime::spawn(driver, gateway, &timer, &AutosaveConfig::default());
    handle.dispatch(answer(1)).await.unwrap();

    let outcome = loop {
        match handle.next_event().await {
            Some(RuntimeEvent::Finished(outcome)) => break outcome,
            Some(_) => {}
            None => panic!("runtime stopped without finishing"),
        }
    };
    assert!(outcome.persisted);
    assert_eq!(outcome.result.time_taken, 3600);
    assert_eq!(outcome.result.correct, 1);
    assert!(outcome.result.intervals.is_empty());

    // the loop already ended; finishing again just collects the outcome
    assert_eq!(handle.finish().await.unwrap(), outcome);
}
