//! Idle timer state machine, free of any clock.
//!
//! The service drives this with ticks; the timer only counts and compares.

use serde::Serialize;

use super::settings::Thresholds;

/// Fixed length of one tick.
pub const TICK_PERIOD_MS: u64 = 1_000;

/// Whether the idle timer is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Stopped,
    Running,
}

/// What one tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub elapsed_ms: u64,
    /// Elapsed time landed exactly on the warning point.
    pub warning: bool,
    /// Elapsed time reached the total timeout; the timer is now stopped.
    pub expired: bool,
}

/// Elapsed-idle counter plus running flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTimer {
    phase: TimerPhase,
    elapsed_ms: u64,
}

impl IdleTimer {
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::Stopped,
            elapsed_ms: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Start counting from zero.
    pub fn begin(&mut self) {
        self.elapsed_ms = 0;
        self.phase = TimerPhase::Running;
    }

    /// Stop counting. Returns whether the timer was running.
    pub fn halt(&mut self) -> bool {
        let was_running = self.is_running();
        self.phase = TimerPhase::Stopped;
        was_running
    }

    /// Advance one tick and evaluate the thresholds.
    ///
    /// The warning is an exact match on the tick boundary: a tick that steps
    /// over `total - warning` without landing on it never warns.
    pub fn tick(&mut self, thresholds: Thresholds) -> TickReport {
        if !self.is_running() {
            return TickReport {
                elapsed_ms: self.elapsed_ms,
                warning: false,
                expired: false,
            };
        }

        self.elapsed_ms = self.elapsed_ms.saturating_add(TICK_PERIOD_MS);

        let warning = thresholds.warning_at_ms() == Some(self.elapsed_ms);
        let expired = self.elapsed_ms >= thresholds.total_ms;
        if expired {
            self.halt();
        }

        TickReport {
            elapsed_ms: self.elapsed_ms,
            warning,
            expired,
        }
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}
