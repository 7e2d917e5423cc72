//! Navigation and response capture for a live attempt.
//!
//! All mutation goes through [`NavigationState::apply`], one [`Action`] at a
//! time. Every action yields a [`Transition`]; a rejected action leaves the
//! state untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Mode, Question, QuestionId, Response, Responses, Test, TestStatus, Totals,
};
use crate::time::whole_seconds;

//
// ─── ACTIONS & TRANSITIONS ────────────────────────────────────────────────────
//

/// The closed set of inputs the state machine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Next,
    Prev,
    Goto { section: usize, question: usize },
    SetResponse { question_id: QuestionId, answer: String },
    ToggleBookmark { question_id: QuestionId },
    Finish,
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Timed attempts only move forward.
    BackwardNavigation,
    SectionLocked,
    OutOfRange,
    AtStart,
    UnknownQuestion,
    /// Bookmarks are a study aid and are off in timed attempts.
    BookmarksDisabled,
    AlreadyFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Rejected(Rejection),
    /// The attempt has left its last question; hand over to submission.
    Finished,
}

impl Transition {
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Transition::Applied | Transition::Finished)
    }
}

/// Current `(section, question)` cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub section_index: usize,
    pub question_index: usize,
}

impl Position {
    #[must_use]
    pub fn new(section_index: usize, question_index: usize) -> Self {
        Self {
            section_index,
            question_index,
        }
    }
}

//
// ─── STATE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
pub struct NavigationState {
    test: Test,
    position: Position,
    responses: Responses,
    entered_at: DateTime<Utc>,
    finished: bool,
}

impl NavigationState {
    /// Start an attempt at the first question.
    #[must_use]
    pub fn new(mut test: Test, now: DateTime<Utc>) -> Self {
        test.set_status(TestStatus::InProgress);
        Self {
            test,
            position: Position::default(),
            responses: Responses::new(),
            entered_at: now,
            finished: false,
        }
    }

    /// Rebuild an attempt from an autosaved snapshot.
    ///
    /// Timed attempts get every section before the cursor sealed again, and
    /// section progress is recomputed from the responses.
    /// Returns `None` if the position does not exist in the test.
    #[must_use]
    pub fn restore(
        test: Test,
        position: Position,
        responses: Responses,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let section = test.sections().get(position.section_index)?;
        if position.question_index >= section.question_count() {
            return None;
        }
        let mut state = Self::new(test, now);
        state.position = position;
        state.responses = responses;
        for index in 0..position.section_index {
            state.leave_section(index);
        }
        if state.mode() == Mode::Practice {
            for index in 0..state.test.sections().len() {
                state.refresh_progress(index);
            }
        }
        Some(state)
    }

    #[must_use]
    pub fn test(&self) -> &Test {
        &self.test
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.test.mode()
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    #[must_use]
    pub fn responses(&self) -> &Responses {
        &self.responses
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals::from_responses(&self.responses)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.test
            .sections()
            .get(self.position.section_index)?
            .questions()
            .get(self.position.question_index)
    }

    pub fn mark_completed(&mut self) {
        self.finished = true;
        self.test.set_status(TestStatus::Completed);
    }

    #[must_use]
    pub fn into_parts(self) -> (Test, Responses) {
        (self.test, self.responses)
    }

    /// Apply one action. Total over every state/action pair.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> Transition {
        if self.finished {
            return Transition::Rejected(Rejection::AlreadyFinished);
        }

        match action {
            Action::Next => self.next(now),
            Action::Prev => self.prev(now),
            Action::Goto { section, question } => self.goto(Position::new(section, question), now),
            Action::SetResponse {
                question_id,
                answer,
            } => self.set_response(question_id, &answer, now),
            Action::ToggleBookmark { question_id } => self.toggle_bookmark(question_id),
            Action::Finish => self.finish(),
        }
    }

    fn next(&mut self, now: DateTime<Utc>) -> Transition {
        let Position {
            section_index,
            question_index,
        } = self.position;
        let section_len = self.section_len(section_index);

        if question_index + 1 < section_len {
            self.move_to(Position::new(section_index, question_index + 1), now);
            Transition::Applied
        } else if section_index + 1 < self.test.sections().len() {
            self.leave_section(section_index);
            self.move_to(Position::new(section_index + 1, 0), now);
            Transition::Applied
        } else {
            self.finish()
        }
    }

    fn prev(&mut self, now: DateTime<Utc>) -> Transition {
        if self.mode() == Mode::Test {
            return Transition::Rejected(Rejection::BackwardNavigation);
        }

        let Position {
            section_index,
            question_index,
        } = self.position;
        let target = if question_index > 0 {
            Position::new(section_index, question_index - 1)
        } else if section_index > 0 {
            let prev_len = self.section_len(section_index - 1);
            Position::new(section_index - 1, prev_len.saturating_sub(1))
        } else {
            return Transition::Rejected(Rejection::AtStart);
        };

        if self.test.sections()[target.section_index].is_locked() {
            return Transition::Rejected(Rejection::SectionLocked);
        }
        self.move_to(target, now);
        Transition::Applied
    }

    fn goto(&mut self, target: Position, now: DateTime<Utc>) -> Transition {
        let Some(section) = self.test.sections().get(target.section_index) else {
            return Transition::Rejected(Rejection::OutOfRange);
        };
        if target.question_index >= section.question_count() {
            return Transition::Rejected(Rejection::OutOfRange);
        }
        if section.is_locked() {
            return Transition::Rejected(Rejection::SectionLocked);
        }
        if self.mode() == Mode::Test && target < self.position {
            return Transition::Rejected(Rejection::BackwardNavigation);
        }

        for skipped in self.position.section_index..target.section_index {
            self.leave_section(skipped);
        }
        self.move_to(target, now);
        Transition::Applied
    }

    fn set_response(&mut self, question_id: QuestionId, answer: &str, now: DateTime<Utc>) -> Transition {
        let Some((section_index, question_index)) = self.test.locate(question_id) else {
            return Transition::Rejected(Rejection::UnknownQuestion);
        };
        let section = &self.test.sections()[section_index];
        if section.is_locked() {
            return Transition::Rejected(Rejection::SectionLocked);
        }
        let correct_answer = section.questions()[question_index].correct_answer();

        let time_spent = if self.position == Position::new(section_index, question_index) {
            whole_seconds(self.entered_at, now)
        } else {
            self.responses.get(&question_id).map_or(0, |r| r.time_spent)
        };

        self.responses.insert(
            question_id,
            Response::record(answer, correct_answer, now, time_spent),
        );

        if self.mode() == Mode::Practice {
            self.refresh_progress(section_index);
        }
        Transition::Applied
    }

    fn toggle_bookmark(&mut self, question_id: QuestionId) -> Transition {
        if self.mode() == Mode::Test {
            return Transition::Rejected(Rejection::BookmarksDisabled);
        }
        let Some((section_index, question_index)) = self.test.locate(question_id) else {
            return Transition::Rejected(Rejection::UnknownQuestion);
        };
        if let Some(question) = self
            .test
            .section_mut(section_index)
            .and_then(|s| s.question_mut(question_index))
        {
            question.toggle_bookmark();
        }
        Transition::Applied
    }

    fn finish(&mut self) -> Transition {
        self.leave_section(self.position.section_index);
        self.finished = true;
        Transition::Finished
    }

    fn move_to(&mut self, target: Position, now: DateTime<Utc>) {
        if target != self.position {
            self.entered_at = now;
        }
        self.position = target;
    }

    /// Timed attempts seal every section they move past.
    fn leave_section(&mut self, index: usize) {
        if self.mode() != Mode::Test {
            return;
        }
        if let Some(section) = self.test.section_mut(index) {
            section.lock();
        }
    }

    fn refresh_progress(&mut self, index: usize) {
        let Some(section) = self.test.sections().get(index) else {
            return;
        };
        let total = section.question_count();
        let answered = section
            .questions()
            .iter()
            .filter(|q| self.responses.get(&q.id()).is_some_and(Response::is_answered))
            .count();
        let progress = if total == 0 {
            0
        } else {
            u8::try_from(answered * 100 / total).unwrap_or(100)
        };
        if let Some(section) = self.test.section_mut(index) {
            section.set_progress(progress);
        }
    }

    fn section_len(&self, index: usize) -> usize {
        self.test
            .sections()
            .get(index)
            .map_or(0, crate::model::Section::question_count)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
