//! Pace calls against a virtual schedule.
//!
//! The N-th call (counting from 1) is due `N × period` after an anchor instant. A call that
//! arrives before its slot sleeps until the slot; a call that arrives late returns immediately.
//! The counter advances on every call, so a burst after a stall is smoothed out over the
//! following slots instead of being released at once. Call [Limiter::reset] after a long pause
//! to re-anchor the schedule at the current time.

use std::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

struct Schedule {
    counter: u64,
    anchor: Instant,
}

/// Paces callers to a fixed number of events per second.
///
/// A single [Limiter] may be shared across tasks: every call reserves a distinct slot, so the
/// rate applies to all callers combined.
pub struct Limiter {
    period: Option<u64>,
    schedule: Mutex<Schedule>,
}

impl Limiter {
    /// Create a new [Limiter] allowing `rate` events per second.
    ///
    /// A `rate` that is not strictly positive disables pacing.
    pub fn new(rate: f64) -> Self {
        let period = (rate > 0.0 && rate.is_finite()).then(|| (NANOS_PER_SECOND / rate) as u64);
        Self {
            period,
            schedule: Mutex::new(Schedule {
                counter: 1,
                anchor: Instant::now(),
            }),
        }
    }

    /// Returns true if calls are paced.
    pub fn enabled(&self) -> bool {
        self.period.is_some()
    }

    /// Reserve the next slot, returning when it is due.
    fn reserve(&self) -> Option<Instant> {
        let period = self.period?;
        let mut schedule = self.schedule.lock().unwrap();
        let offset = Duration::from_nanos(period.saturating_mul(schedule.counter));
        schedule.counter += 1;
        Some(schedule.anchor + offset)
    }

    /// Wait until the next slot is due.
    pub async fn pace(&self) {
        if let Some(deadline) = self.reserve() {
            sleep_until(deadline).await;
        }
    }

    /// Restart the schedule from the current time.
    pub fn reset(&self) {
        let mut schedule = self.schedule.lock().unwrap();
        schedule.counter = 1;
        schedule.anchor = Instant::now();
    }
}
