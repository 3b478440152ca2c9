//! Time utilities for media streams
//!
//! Provides a monotonic timestamp, a periodic timer for housekeeping such
//! as statistics logging, and a drift-free ticker for pacing frames.

use std::ops::{Add, Sub};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Get the current timestamp
    #[inline]
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    /// Get the underlying instant
    #[inline]
    pub fn as_instant(&self) -> Instant {
        self.0
    }

    /// Calculate elapsed time since this timestamp
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}

/// Timer for periodic operations
pub struct Timer {
    interval: Duration,
    last_fire: Timestamp,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Timestamp::now(),
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Timestamp::now();
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}

/// Fixed-cadence ticker
///
/// Deadlines are computed from the start time rather than from the last
/// wakeup, so sleep overshoot does not accumulate.
pub struct Ticker {
    period: Duration,
    next: Instant,
    ticks: u64,
}

impl Ticker {
    /// Create a ticker whose first tick is due immediately
    pub fn new(period: Duration) -> Self {
        Ticker {
            period,
            next: Instant::now(),
            ticks: 0,
        }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks delivered
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sleep until the next deadline
    ///
    /// Returns the number of deadlines that had already passed on entry
    /// (0 when on time). A late ticker catches up one tick per call.
    pub fn wait(&mut self) -> u32 {
        let now = Instant::now();
        let mut missed = 0;

        if self.next > now {
            thread::sleep(self.next - now);
        } else {
            let behind = now - self.next;
            missed = (behind.as_nanos() / self.period.as_nanos().max(1)) as u32;
        }

        self.next += self.period;
        self.ticks += 1;
        missed
    }
}
