//! Timing disciplines and checkpoint tracking.
//!
//! The tracker has no clock of its own: something outside calls [`TimerTracker::tick`]
//! once per second. Timed attempts count down from their budget; practice
//! attempts count up and are cut into checkpoint intervals.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{IntervalStats, Mode, Test, Totals};

/// Default checkpoint length (7 minutes).
pub const DEFAULT_INTERVAL_SECONDS: u32 = 420;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntervalConfigError {
    #[error("interval length must be > 0 seconds")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discipline {
    Countdown { time_limit: u32 },
    CountUp { interval_seconds: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// The countdown hit zero. Fires once.
    TimeUp,
    /// A checkpoint boundary was crossed; the tracker is now paused.
    IntervalReached(IntervalStats),
}

#[derive(Debug, Clone)]
pub struct TimerTracker {
    discipline: Discipline,
    elapsed: u32,
    time_remaining: u32,
    time_up_fired: bool,
    is_paused: bool,
    checkpoint_pending: bool,
    last_interval_index: u32,
    interval_start: u32,
    baseline: Totals,
    intervals: Vec<IntervalStats>,
}

impl TimerTracker {
    #[must_use]
    pub fn countdown(time_limit: u32) -> Self {
        Self::with_discipline(Discipline::Countdown { time_limit })
    }

    /// # Errors
    ///
    /// Returns `IntervalConfigError::ZeroInterval` for a zero-length interval.
    pub fn count_up(interval_seconds: u32) -> Result<Self, IntervalConfigError> {
        if interval_seconds == 0 {
            return Err(IntervalConfigError::ZeroInterval);
        }
        Ok(Self::with_discipline(Discipline::CountUp { interval_seconds }))
    }

    /// Pick the discipline from the test's mode.
    ///
    /// # Errors
    ///
    /// Returns `IntervalConfigError` if a practice test gets a zero interval.
    pub fn for_test(test: &Test, interval_seconds: u32) -> Result<Self, IntervalConfigError> {
        match (test.mode(), test.time_limit()) {
            (Mode::Test, Some(limit)) => Ok(Self::countdown(limit)),
            _ => Self::count_up(interval_seconds),
        }
    }

    fn with_discipline(discipline: Discipline) -> Self {
        let time_remaining = match discipline {
            Discipline::Countdown { time_limit } => time_limit,
            Discipline::CountUp { .. } => 0,
        };
        Self {
            discipline,
            elapsed: 0,
            time_remaining,
            time_up_fired: false,
            is_paused: false,
            checkpoint_pending: false,
            last_interval_index: 0,
            interval_start: 0,
            baseline: Totals::default(),
            intervals: Vec::new(),
        }
    }

    #[must_use]
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Seconds the attempt has been running (excluding paused time).
    #[must_use]
    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    /// Countdown only; `None` when counting up.
    #[must_use]
    pub fn time_remaining(&self) -> Option<u32> {
        match self.discipline {
            Discipline::Countdown { .. } => Some(self.time_remaining),
            Discipline::CountUp { .. } => None,
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    #[must_use]
    pub fn is_time_up(&self) -> bool {
        self.time_up_fired
    }

    /// A checkpoint is being presented and awaits `resume`.
    #[must_use]
    pub fn checkpoint_pending(&self) -> bool {
        self.checkpoint_pending
    }

    #[must_use]
    pub fn intervals(&self) -> &[IntervalStats] {
        &self.intervals
    }

    /// Advance by one second. `totals` are the attempt's current running counts.
    pub fn tick(&mut self, totals: Totals) -> Option<TimerEvent> {
        match self.discipline {
            Discipline::Countdown { .. } => {
                if self.time_up_fired {
                    return None;
                }
                if self.time_remaining > 0 {
                    self.time_remaining -= 1;
                    self.elapsed += 1;
                }
                if self.time_remaining == 0 {
                    self.time_up_fired = true;
                    tracing::info!(elapsed = self.elapsed, "time is up");
                    return Some(TimerEvent::TimeUp);
                }
                None
            }
            Discipline::CountUp { interval_seconds } => {
                if self.is_paused {
                    return None;
                }
                self.elapsed += 1;
                let current = self.elapsed / interval_seconds;
                if current <= self.last_interval_index {
                    return None;
                }
                self.last_interval_index = current;
                let stats = self.close_interval(totals);
                self.is_paused = true;
                self.checkpoint_pending = true;
                tracing::debug!(
                    interval = stats.interval_number,
                    attempted = stats.questions_attempted,
                    "checkpoint reached"
                );
                Some(TimerEvent::IntervalReached(stats))
            }
        }
    }

    /// Continue an attempt that already ran for `elapsed` seconds.
    ///
    /// A countdown resumes with what is left of its budget and reports
    /// time-up on the next tick if nothing is. A count-up skips the
    /// checkpoints it already passed; its next interval starts at zero so
    /// the interval list still tiles.
    pub fn catch_up(&mut self, elapsed: u32) {
        match self.discipline {
            Discipline::Countdown { time_limit } => {
                self.elapsed = elapsed.min(time_limit);
                self.time_remaining = time_limit - self.elapsed;
            }
            Discipline::CountUp { interval_seconds } => {
                self.elapsed = elapsed;
                self.last_interval_index = elapsed / interval_seconds;
            }
        }
    }

    /// Suspend a count-up timer. Timed attempts cannot be paused.
    pub fn pause(&mut self) -> bool {
        match self.discipline {
            Discipline::Countdown { .. } => false,
            Discipline::CountUp { .. } => {
                self.is_paused = true;
                true
            }
        }
    }

    /// Clear the pause gate. After a checkpoint this also starts the next
    /// interval from the given totals.
    pub fn resume(&mut self, totals: Totals) {
        if self.checkpoint_pending {
            self.baseline = totals;
            self.interval_start = self.elapsed;
            self.checkpoint_pending = false;
        }
        if matches!(self.discipline, Discipline::CountUp { .. }) {
            self.is_paused = false;
        }
    }

    /// Close out the interval list at submission.
    ///
    /// If time has passed since the last recorded interval, one more interval
    /// covering the remainder is appended so the list tiles `[0, elapsed)`.
    pub fn finalize_intervals(&mut self, totals: Totals) -> Vec<IntervalStats> {
        if matches!(self.discipline, Discipline::Countdown { .. }) {
            return Vec::new();
        }
        let last_end = self.intervals.last().map_or(0, |i| i.end_time);
        if self.elapsed > last_end {
            // without a resume since the last checkpoint the baseline is stale
            if self.checkpoint_pending {
                self.baseline = totals;
            }
            let delta = totals.since(&self.baseline);
            let number = self.next_interval_number();
            self.intervals
                .push(IntervalStats::from_delta(number, last_end, self.elapsed, delta));
            self.baseline = totals;
            self.interval_start = self.elapsed;
        }
        self.intervals.clone()
    }

    fn close_interval(&mut self, totals: Totals) -> IntervalStats {
        let stats = IntervalStats::from_delta(
            self.next_interval_number(),
            self.interval_start,
            self.elapsed,
            totals.since(&self.baseline),
        );
        self.intervals.push(stats.clone());
        stats
    }

    fn next_interval_number(&self) -> u32 {
        u32::try_from(self.intervals.len() + 1).unwrap_or(u32::MAX)
    }
}
