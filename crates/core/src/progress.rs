//! Progress estimation for a tool that reports no progress of its own.
//!
//! Progress is a piecewise-linear function of the time since the process was
//! spawned:
//!
//! | elapsed            | progress        |
//! |--------------------|-----------------|
//! | `[0, early)`       | 20 -> 30        |
//! | `[early, middle)`  | 30 -> 60        |
//! | `[middle, ..)`     | 60 -> 90, capped|
//!
//! Output lines only change the status text, never the number.

use std::time::Duration;

/// Progress reported the moment the process has been spawned.
pub const SPAWN_PROGRESS: u8 = 20;

/// Upper bound while the process is still running. 100 is reserved for a
/// confirmed success.
pub const RUNNING_CAP: u8 = 90;

/// Breakpoints of the elapsed-time schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSchedule {
    /// End of the 20 -> 30 segment.
    pub early: Duration,
    /// End of the 30 -> 60 segment.
    pub middle: Duration,
    /// Length of the final 60 -> 90 ramp.
    pub tail: Duration,
}

impl Default for ProgressSchedule {
    fn default() -> Self {
        Self {
            early: Duration::from_secs(10),
            middle: Duration::from_secs(30),
            tail: Duration::from_secs(60),
        }
    }
}

/// Pure mapping from elapsed time to a progress value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressEstimator {
    schedule: ProgressSchedule,
}

impl ProgressEstimator {
    pub fn new(schedule: ProgressSchedule) -> Self {
        Self { schedule }
    }

    /// Estimated progress after `elapsed` of runtime, within `20..=90`.
    pub fn estimate(&self, elapsed: Duration) -> u8 {
        let s = self.schedule;
        let e = elapsed.as_secs_f64();
        let early = s.early.as_secs_f64();
        let middle = s.middle.as_secs_f64().max(early);
        let tail = s.tail.as_secs_f64();

        let value = if e < early {
            20.0 + 10.0 * ratio(e, early)
        } else if e < middle {
            30.0 + 30.0 * ratio(e - early, middle - early)
        } else {
            60.0 + 30.0 * ratio(e - middle, tail)
        };

        (value.floor() as u8).clamp(SPAWN_PROGRESS, RUNNING_CAP)
    }

    /// The next value to publish, or `None` if it would not raise `current`.
    pub fn advance(&self, current: u8, elapsed: Duration) -> Option<u8> {
        let next = self.estimate(elapsed);
        (next > current).then_some(next)
    }
}

fn ratio(value: f64, span: f64) -> f64 {
    if span <= 0.0 {
        1.0
    } else {
        (value / span).clamp(0.0, 1.0)
    }
}

/// Case-insensitive substring triggers, checked in order.
const STATUS_TRIGGERS: &[(&[&str], &str)] = &[
    (&["load", "model"], "Loading model..."),
    (&["process", "separat"], "Processing audio..."),
    (&["sav", "writ", "output"], "Saving separated tracks..."),
    (&["convert"], "Converting output format..."),
    (&["enhance", "filter"], "Applying filters..."),
];

/// Status text suggested by one line of separator stdout, if any.
pub fn status_for_line(line: &str) -> Option<&'static str> {
    let lower = line.to_lowercase();
    STATUS_TRIGGERS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, status)| *status)
}
