//! Chess clock for one side of a game.

use chrono::TimeDelta;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Misuse of a [`Clock`]. Always a sequencing bug in the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock is already running")]
    AlreadyRunning,
    #[error("clock is not running")]
    NotRunning,
}

/// Remaining thinking time of one side.
///
/// The remaining time is signed: a clock that overran its budget reports a
/// negative value, and it is up to the caller to decide what that means.
#[derive(Debug, Clone)]
pub struct Clock {
    remaining: TimeDelta,
    started_at: Option<Instant>,
}

impl Clock {
    pub fn new(budget: Duration) -> Self {
        Self {
            remaining: delta(budget),
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Starts counting down.
    pub fn start(&mut self) -> Result<(), ClockError> {
        if self.started_at.is_some() {
            return Err(ClockError::AlreadyRunning);
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Stops the clock and charges the elapsed time. Returns what is left.
    pub fn stop(&mut self) -> Result<TimeDelta, ClockError> {
        let started_at = self.started_at.take().ok_or(ClockError::NotRunning)?;
        self.remaining -= delta(started_at.elapsed());
        Ok(self.remaining)
    }

    pub fn remaining(&self) -> TimeDelta {
        self.remaining
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.remaining.num_microseconds().unwrap_or(i64::MIN) as f64 / 1_000_000.0
    }

    /// Remaining time in whole milliseconds, clamped at zero, as sent to
    /// engines in `wtime`/`btime`.
    pub fn remaining_millis(&self) -> u64 {
        self.remaining.num_milliseconds().max(0) as u64
    }

    pub fn is_expired(&self) -> bool {
        self.remaining < TimeDelta::zero()
    }
}

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
