//! Wake clock: time since the host last woke from sleep
//!
//! Fed by whatever observes OS power events (a signal handler, an HTTP hook
//! from sleepwatcher). Read-only to the decision engine.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared record of the last wake
#[derive(Debug, Clone, Default)]
pub struct WakeClock {
    inner: Arc<Mutex<WakeRecord>>,
}

#[derive(Debug, Default)]
struct WakeRecord {
    last_sleep: Option<Instant>,
    last_wake: Option<Instant>,
}

impl WakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sleep(&self) {
        self.with(|r| r.last_sleep = Some(now()));
    }

    pub fn record_wake(&self) {
        self.record_wake_at(now());
    }

    pub fn record_wake_at(&self, at: Instant) {
        self.with(|r| r.last_wake = Some(at));
    }

    /// `None` until the first wake is observed
    pub fn time_since_wake(&self) -> Option<Duration> {
        self.with(|r| r.last_wake.map(|w| now().saturating_duration_since(w)))
    }

    pub fn last_sleep(&self) -> Option<Instant> {
        self.with(|r| r.last_sleep)
    }

    fn with<T>(&self, f: impl FnOnce(&mut WakeRecord) -> T) -> T {
        // a poisoned record is still a valid pair of timestamps
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

/// Tokio-aware now, so paused test clocks apply
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
