//! Client-side owner of one running attempt.
//!
//! Every mutation goes through `&mut self`, so the navigation state and the
//! timer have exactly one writer. `AttemptRuntime` wraps this in a task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use drill_core::model::{Responses, Test, TestResult};
use drill_core::navigation::{Action, NavigationState, Position, Transition};
use drill_core::scoring::score_attempt;
use drill_core::timer::{DEFAULT_INTERVAL_SECONDS, TimerEvent, TimerTracker};

use super::progress::AttemptProgress;
use super::requests::{SaveProgressRequest, SubmitRequest};
use super::workflow::AttemptGateway;
use crate::Clock;
use crate::error::DriverError;

/// Timer tunables for a running attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Checkpoint length for count-up attempts.
    pub interval_seconds: u32,
    /// Real-time period of one timer tick.
    pub tick: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            tick: Duration::from_secs(1),
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishOutcome {
    pub result: TestResult,
    /// False when the backend rejected the submission and the result was
    /// computed locally. The session is then still `in_progress` server-side.
    pub persisted: bool,
}

pub struct AttemptDriver {
    clock: Clock,
    navigation: NavigationState,
    timer: TimerTracker,
    outcome: Option<FinishOutcome>,
}

impl AttemptDriver {
    /// Start a fresh attempt at the first question.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::IntervalConfig` for a zero checkpoint length.
    pub fn start(test: Test, config: &TimerConfig, clock: Clock) -> Result<Self, DriverError> {
        let timer = TimerTracker::for_test(&test, config.interval_seconds)?;
        Ok(Self {
            clock,
            navigation: NavigationState::new(test, clock.now()),
            timer,
            outcome: None,
        })
    }

    /// Pick up an attempt from its last autosaved snapshot.
    ///
    /// The timer continues from the time passed since `started_at`, so a
    /// reload never refills a timed attempt's budget.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::InvalidSnapshot` if the position is not in the test.
    pub fn restore(
        test: Test,
        position: Position,
        responses: Responses,
        started_at: DateTime<Utc>,
        config: &TimerConfig,
        clock: Clock,
    ) -> Result<Self, DriverError> {
        let mut timer = TimerTracker::for_test(&test, config.interval_seconds)?;
        timer.catch_up(clock.seconds_since(started_at));
        let navigation = NavigationState::restore(test, position, responses, clock.now())
            .ok_or(DriverError::InvalidSnapshot)?;
        Ok(Self {
            clock,
            navigation,
            timer,
            outcome: None,
        })
    }

    #[must_use]
    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    #[must_use]
    pub fn timer(&self) -> &TimerTracker {
        &self.timer
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&FinishOutcome> {
        self.outcome.as_ref()
    }

    /// Route one user action through the state machine.
    pub fn dispatch(&mut self, action: Action) -> Transition {
        self.navigation.apply(action, self.clock.now())
    }

    /// Advance the timer by one second.
    ///
    /// Time-up finishes the attempt wherever the cursor is.
    pub fn tick(&mut self) -> Option<TimerEvent> {
        if self.navigation.is_finished() {
            return None;
        }
        // the fixed clock only moves when told to
        self.clock.advance(chrono::Duration::seconds(1));
        let event = self.timer.tick(self.navigation.totals());
        if matches!(event, Some(TimerEvent::TimeUp)) {
            let _ = self.navigation.apply(Action::Finish, self.clock.now());
        }
        event
    }

    /// Manual pause. Refused for timed attempts.
    pub fn pause(&mut self) -> bool {
        if self.navigation.is_finished() {
            return false;
        }
        self.timer.pause()
    }

    /// Clear a manual or checkpoint pause.
    pub fn resume(&mut self) {
        if !self.navigation.is_finished() {
            self.timer.resume(self.navigation.totals());
        }
    }

    /// Autosave payload for the current state.
    #[must_use]
    pub fn snapshot(&self) -> SaveProgressRequest {
        let position = self.navigation.position();
        SaveProgressRequest {
            test_id: self.navigation.test().id(),
            responses: self.navigation.responses().clone(),
            current_section_index: position.section_index,
            current_question_index: position.question_index,
        }
    }

    #[must_use]
    pub fn progress(&self) -> AttemptProgress {
        let total = self.navigation.test().total_questions();
        let answered = self.navigation.totals().attempted;
        AttemptProgress {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            current_number: self
                .navigation
                .current_question()
                .map(|q| q.question_number()),
            elapsed: self.timer.elapsed(),
            time_remaining: self.timer.time_remaining(),
            is_paused: self.timer.is_paused(),
            checkpoint_pending: self.timer.checkpoint_pending(),
            is_finished: self.navigation.is_finished(),
        }
    }

    /// Submission payload. Closes out the interval list, so call once.
    pub fn submission(&mut self) -> SubmitRequest {
        let totals = self.navigation.totals();
        let intervals = self.timer.finalize_intervals(totals);
        SubmitRequest {
            test_id: self.navigation.test().id(),
            responses: self.navigation.responses().clone(),
            time_taken: self.timer.elapsed(),
            intervals: (!intervals.is_empty()).then_some(intervals),
        }
    }

    /// End the attempt and hand it to the backend.
    ///
    /// If the backend fails, the same scoring runs locally so the user still
    /// sees a result. Calling again after a finish returns the first outcome.
    pub async fn finish(&mut self, gateway: &dyn AttemptGateway) -> FinishOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        if !self.navigation.is_finished() {
            let _ = self.navigation.apply(Action::Finish, self.clock.now());
        }

        let request = self.submission();
        let test_id = request.test_id;
        let outcome = match gateway.submit(request.clone()).await {
            Ok(result) => FinishOutcome {
                result,
                persisted: true,
            },
            Err(e) => {
                tracing::warn!(
                    test_id = %test_id,
                    error = %e,
                    "submission failed, scoring locally"
                );
                let result = score_attempt(
                    self.navigation.test(),
                    &request.responses,
                    request.time_taken,
                    request.intervals.unwrap_or_default(),
                    self.clock.now(),
                );
                FinishOutcome {
                    result,
                    persisted: false,
                }
            }
        };

        self.navigation.mark_completed();
        self.outcome = Some(outcome.clone());
        outcome
    }
}
