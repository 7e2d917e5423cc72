use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

/// Captured answers for one attempt, keyed by question.
pub type Responses = BTreeMap<QuestionId, Response>;

/// The learner's latest answer to one question.
///
/// `is_correct` is the eager, client-side signal; scoring recomputes
/// correctness from `user_answer` and never trusts this flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub user_answer: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    pub answered_at: DateTime<Utc>,
    #[serde(default)]
    pub time_spent: u32,
}

impl Response {
    /// Record an answer, computing the eager correctness flag.
    #[must_use]
    pub fn record(
        answer: &str,
        correct_answer: i64,
        answered_at: DateTime<Utc>,
        time_spent: u32,
    ) -> Self {
        let user_answer = (!answer.is_empty()).then(|| answer.to_owned());
        Self {
            is_correct: user_answer
                .as_deref()
                .map(|a| is_correct_answer(a, correct_answer)),
            user_answer,
            answered_at,
            time_spent,
        }
    }

    /// True when a non-empty answer was given.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.user_answer.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Parse an answer the way the input box produced it: optional leading `-`, digits.
#[must_use]
pub fn parse_answer(answer: &str) -> Option<i64> {
    answer.parse::<i64>().ok()
}

/// Unparseable answers (a lone `-`, overflow) are simply wrong.
#[must_use]
pub fn is_correct_answer(answer: &str, correct_answer: i64) -> bool {
    parse_answer(answer) == Some(correct_answer)
}

/// Filter raw keyboard input down to `-?[0-9]*`.
///
/// A minus sign survives only in first position; everything else that is not
/// an ASCII digit is dropped.
#[must_use]
pub fn sanitize_answer(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_digit() || (c == '-' && out.is_empty()) {
            out.push(c);
        }
    }
    out
}

//
// ─── TOTALS ───────────────────────────────────────────────────────────────────
//

/// Running attempt counts, used as checkpoint baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub attempted: u32,
    pub correct: u32,
    pub incorrect: u32,
}

impl Totals {
    /// Count answered/correct/incorrect from the eager flags.
    #[must_use]
    pub fn from_responses(responses: &Responses) -> Self {
        let mut totals = Self::default();
        for response in responses.values().filter(|r| r.is_answered()) {
            totals.attempted += 1;
            if response.is_correct == Some(true) {
                totals.correct += 1;
            } else {
                totals.incorrect += 1;
            }
        }
        totals
    }

    /// Delta between these totals and an earlier baseline.
    #[must_use]
    pub fn since(&self, baseline: &Totals) -> Totals {
        Totals {
            attempted: self.attempted.saturating_sub(baseline.attempted),
            correct: self.correct.saturating_sub(baseline.correct),
            incorrect: self.incorrect.saturating_sub(baseline.incorrect),
        }
    }
}
