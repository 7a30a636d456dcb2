//! Session idle timeout: thresholds, the timer state machine and the service
//! that runs it.

mod service;
mod settings;
mod timer;

pub use service::{TimeoutEvent, TimeoutHandle, TimeoutService, TimerStatus, RETRY_DELAY};
pub use settings::{
    Thresholds, TimeoutSettings, DEFAULT_TOTAL_TIMEOUT, DEFAULT_WARNING_TIMEOUT,
};
pub use timer::{IdleTimer, TickReport, TimerPhase, TICK_PERIOD_MS};
