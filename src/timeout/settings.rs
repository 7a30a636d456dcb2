//! Runtime-adjustable timeout thresholds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default idle time before the session closes.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(120);
/// Default lead time of the warning before the session closes.
pub const DEFAULT_WARNING_TIMEOUT: Duration = Duration::from_secs(60);

/// Threshold values captured at one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub total_ms: u64,
    pub warning_ms: u64,
}

impl Thresholds {
    /// Elapsed time at which the warning fires, if it can fire at all.
    pub fn warning_at_ms(&self) -> Option<u64> {
        self.total_ms.checked_sub(self.warning_ms)
    }

    pub fn is_configured(&self) -> bool {
        self.total_ms > 0
    }
}

#[derive(Debug)]
struct Inner {
    total_ms: AtomicU64,
    warning_ms: AtomicU64,
}

/// Shared handle to the two timeout thresholds.
///
/// Clones observe the same values. Updates are picked up at the next tick;
/// nothing already fired is re-evaluated.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    inner: Arc<Inner>,
}

impl TimeoutSettings {
    pub fn new(total: Duration, warning: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                total_ms: AtomicU64::new(as_millis(total)),
                warning_ms: AtomicU64::new(as_millis(warning)),
            }),
        }
    }

    /// Settings with no total timeout yet; the timer defers until one is set.
    pub fn unconfigured() -> Self {
        Self::new(Duration::ZERO, DEFAULT_WARNING_TIMEOUT)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.total_ms.load(Ordering::SeqCst))
    }

    pub fn warning_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.warning_ms.load(Ordering::SeqCst))
    }

    pub fn set_total_timeout(&self, total: Duration) {
        self.inner.total_ms.store(as_millis(total), Ordering::SeqCst);
    }

    pub fn set_warning_timeout(&self, warning: Duration) {
        self.inner.warning_ms.store(as_millis(warning), Ordering::SeqCst);
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            total_ms: self.inner.total_ms.load(Ordering::SeqCst),
            warning_ms: self.inner.warning_ms.load(Ordering::SeqCst),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_TIMEOUT, DEFAULT_WARNING_TIMEOUT)
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
