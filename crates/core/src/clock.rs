//! Monotonic and wall-clock time abstraction.
//!
//! The engine never calls `Instant::now()`/`Utc::now()` directly outside
//! this module — every timing decision (readiness timeouts, cooldown
//! windows, snapshot timestamps) goes through a `Clock` so tests can
//! control time deterministically.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// An opaque monotonic instant, comparable and subtractable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockInstant(Instant);

impl ClockInstant {
    pub fn duration_since(&self, earlier: ClockInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    pub fn elapsed_since(&self, clock: &dyn Clock) -> Duration {
        clock.now().duration_since(*self)
    }
}

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for timeouts, cooldowns, durations.
    fn now(&self) -> ClockInstant;

    /// Wall-clock time, used for serialized timestamps (`startedAt`, snapshots).
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real wall-clock/monotonic clock for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ClockInstant {
        ClockInstant(Instant::now())
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic, manually-advanceable clock for tests.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    base_instant: Instant,
    elapsed: Duration,
    utc: DateTime<Utc>,
}

impl FakeClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                base_instant: Instant::now(),
                elapsed: Duration::ZERO,
                utc,
            })),
        }
    }

    /// Advance both the monotonic and wall clocks by `d`.
    pub fn advance(&self, d: Duration) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += d;
        state.utc += chrono::Duration::from_std(d).unwrap_or_default();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> ClockInstant {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ClockInstant(state.base_instant + state.elapsed)
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).utc
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
