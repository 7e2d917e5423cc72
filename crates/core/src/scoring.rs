//! Authoritative scoring.
//!
//! The same function runs on the server at submission and on the client when
//! submission fails, so it must depend only on its inputs. Correctness is
//! recomputed from the raw answer; the eager `is_correct` flag is ignored.

use chrono::{DateTime, Utc};

use crate::model::{
    IntervalStats, Responses, SectionResult, Test, TestResult, is_correct_answer,
};

/// `100 × part / whole`, or 0 when `whole` is 0.
#[must_use]
pub fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * f64::from(part) / f64::from(whole)
    }
}

/// Score `responses` against the test's answer key.
///
/// `time_taken` comes from the caller and is stored as-is.
#[must_use]
pub fn score_attempt(
    test: &Test,
    responses: &Responses,
    time_taken: u32,
    intervals: Vec<IntervalStats>,
    completed_at: DateTime<Utc>,
) -> TestResult {
    let mut attempted = 0_u32;
    let mut correct = 0_u32;
    let mut section_results = Vec::with_capacity(test.sections().len());

    for section in test.sections() {
        let mut section_attempted = 0_u32;
        let mut section_correct = 0_u32;

        for question in section.questions() {
            let Some(answer) = responses
                .get(&question.id())
                .and_then(|r| r.user_answer.as_deref())
                .filter(|a| !a.is_empty())
            else {
                continue;
            };
            section_attempted += 1;
            if is_correct_answer(answer, question.correct_answer()) {
                section_correct += 1;
            }
        }

        attempted += section_attempted;
        correct += section_correct;
        let section_total = u32::try_from(section.question_count()).unwrap_or(u32::MAX);
        section_results.push(SectionResult {
            section_id: section.id(),
            section_name: section.name().to_owned(),
            total_questions: section_total,
            attempted: section_attempted,
            correct: section_correct,
            incorrect: section_attempted - section_correct,
            accuracy: percentage(section_correct, section_attempted),
        });
    }

    let total_questions = test.total_questions();
    TestResult {
        test_id: test.id(),
        total_questions,
        attempted,
        correct,
        incorrect: attempted - correct,
        unanswered: total_questions.saturating_sub(attempted),
        score: percentage(correct, total_questions),
        time_taken,
        section_results,
        intervals,
        completed_at,
    }
}
