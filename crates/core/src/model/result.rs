use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{SectionId, TestId};
use crate::model::response::Totals;

//
// ─── INTERVAL STATS ───────────────────────────────────────────────────────────
//

/// Statistics for one checkpoint slice `[start_time, end_time)` of elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalStats {
    pub interval_number: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub questions_attempted: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub avg_time_per_question: f64,
}

impl IntervalStats {
    /// Build an interval from the counts accumulated over `[start_time, end_time)`.
    #[must_use]
    pub fn from_delta(interval_number: u32, start_time: u32, end_time: u32, delta: Totals) -> Self {
        let avg_time_per_question = if delta.attempted == 0 {
            0.0
        } else {
            f64::from(end_time.saturating_sub(start_time)) / f64::from(delta.attempted)
        };
        Self {
            interval_number,
            start_time,
            end_time,
            questions_attempted: delta.attempted,
            correct: delta.correct,
            incorrect: delta.incorrect,
            avg_time_per_question,
        }
    }

    fn totals(&self) -> Totals {
        Totals {
            attempted: self.questions_attempted,
            correct: self.correct,
            incorrect: self.incorrect,
        }
    }
}

/// True when the intervals are numbered `1..`, start at zero, abut exactly,
/// and end at `elapsed`. An empty list tiles only an empty session.
#[must_use]
pub fn intervals_tile(intervals: &[IntervalStats], elapsed: u32) -> bool {
    let mut cursor = 0_u32;
    for (i, interval) in intervals.iter().enumerate() {
        let expected_number = u32::try_from(i + 1).unwrap_or(u32::MAX);
        if interval.interval_number != expected_number
            || interval.start_time != cursor
            || interval.end_time <= interval.start_time
        {
            return false;
        }
        cursor = interval.end_time;
    }
    cursor == elapsed
}

/// Make a client-reported interval list consistent with the authoritative totals.
///
/// A well-formed prefix that stops short of `elapsed` gets one tail interval
/// carrying whatever the prefix does not account for. Anything malformed is
/// replaced by a single interval spanning the whole session.
#[must_use]
pub fn reconcile_intervals(
    intervals: Vec<IntervalStats>,
    elapsed: u32,
    totals: Totals,
) -> Vec<IntervalStats> {
    if elapsed == 0 {
        return Vec::new();
    }

    let last_end = intervals.last().map_or(0, |i| i.end_time);
    let prefix_ok = last_end <= elapsed && intervals_tile(&intervals, last_end);
    let mut recorded = Totals::default();
    for interval in &intervals {
        let t = interval.totals();
        recorded.attempted = recorded.attempted.saturating_add(t.attempted);
        recorded.correct = recorded.correct.saturating_add(t.correct);
        recorded.incorrect = recorded.incorrect.saturating_add(t.incorrect);
    }
    let counts_ok = recorded.attempted <= totals.attempted
        && recorded.correct <= totals.correct
        && recorded.incorrect <= totals.incorrect;

    if !prefix_ok || !counts_ok {
        tracing::debug!(
            reported = intervals.len(),
            elapsed,
            "discarding inconsistent interval list"
        );
        return vec![IntervalStats::from_delta(1, 0, elapsed, totals)];
    }

    let mut out = intervals;
    if last_end < elapsed {
        let number = u32::try_from(out.len() + 1).unwrap_or(u32::MAX);
        out.push(IntervalStats::from_delta(
            number,
            last_end,
            elapsed,
            totals.since(&recorded),
        ));
    }
    out
}

//
// ─── RESULTS ──────────────────────────────────────────────────────────────────
//

/// Per-section rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    pub section_id: SectionId,
    pub section_name: String,
    pub total_questions: u32,
    pub attempted: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub accuracy: f64,
}

/// Final, authoritative outcome of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_id: TestId,
    pub total_questions: u32,
    pub attempted: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub score: f64,
    pub time_taken: u32,
    pub section_results: Vec<SectionResult>,
    pub intervals: Vec<IntervalStats>,
    pub completed_at: DateTime<Utc>,
}

impl TestResult {
    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals {
            attempted: self.attempted,
            correct: self.correct,
            incorrect: self.incorrect,
        }
    }
}
